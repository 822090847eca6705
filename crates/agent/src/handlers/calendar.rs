//! CALENDAR: look up upcoming events and answer from them. No
//! knowledge-base search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tars_core::{CalendarEvent, CalendarProvider, CalendarQuery, CollaboratorError, Error, Result};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{HandlerReply, IntentHandler};
use crate::context::ContextManager;
use crate::responder::Responder;

/// Upper bound on events listed in one reply.
pub const MAX_EVENTS: usize = 20;

pub const UNAVAILABLE: &str =
    "Calendar integration is not available. Connect a calendar to ask about your schedule.";

const CALENDAR_PROMPT: &str = "You are TARS, a scheduling assistant. Answer the user's question about \
their calendar using the events listed below and the conversation so far. Be concise and actionable. \
If the events do not answer the question, say so.";

/// How many days ahead a query is asking about.
pub fn days_ahead(query: &str) -> u32 {
    let q = query.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if has(&["today", "this morning", "this afternoon"]) {
        1
    } else if has(&["tomorrow", "next day"]) {
        2
    } else if has(&["next week"]) {
        14
    } else if has(&["this week", "week"]) {
        7
    } else if has(&["month"]) {
        30
    } else {
        7
    }
}

pub struct CalendarHandler {
    calendar: Option<Arc<dyn CalendarProvider>>,
    responder: Arc<Responder>,
    timeout: Duration,
}

impl CalendarHandler {
    pub fn new(calendar: Option<Arc<dyn CalendarProvider>>, responder: Arc<Responder>, timeout: Duration) -> Self {
        Self {
            calendar,
            responder,
            timeout,
        }
    }
}

#[async_trait]
impl IntentHandler for CalendarHandler {
    async fn handle(&self, query: &str, context: &mut ContextManager) -> Result<HandlerReply> {
        let Some(calendar) = &self.calendar else {
            return Ok(HandlerReply::text(UNAVAILABLE));
        };

        let request = CalendarQuery {
            text: query.to_string(),
            days_ahead: days_ahead(query),
            max_results: MAX_EVENTS,
        };
        debug!(days_ahead = request.days_ahead, "Fetching calendar events");

        let mut events = match timeout(self.timeout, calendar.upcoming_events(&request)).await {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                warn!(error = %e, "Calendar lookup failed");
                return Err(Error::Collaborator(e));
            }
            Err(_) => {
                return Err(Error::Collaborator(CollaboratorError::Timeout {
                    service: "calendar".into(),
                    secs: self.timeout.as_secs(),
                }));
            }
        };

        if events.is_empty() {
            return Ok(HandlerReply::text(format!(
                "No upcoming events found for the next {} days.",
                request.days_ahead
            )));
        }

        events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));
        events.truncate(MAX_EVENTS);

        let system = format!("{CALENDAR_PROMPT}\n\n{}", format_events(&events, request.days_ahead));
        let generated = self.responder.generate(&system, context, query).await?;
        Ok(HandlerReply::text(generated.text))
    }
}

fn format_events(events: &[CalendarEvent], days: u32) -> String {
    let mut out = format!("Upcoming events for the next {days} days:");
    for event in events {
        out.push_str(&format!("\n- {}: {}", event.start.format("%a %b %d %H:%M"), event.title));
        if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
            out.push_str(&format!(" ({location})"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{MockCalendar, SequentialMockProvider, event};
    use std::sync::Mutex;
    use tars_core::Role;

    fn ctx() -> ContextManager {
        ContextManager::from_config(&Default::default()).unwrap()
    }

    fn responder(provider: &Arc<SequentialMockProvider>) -> Arc<Responder> {
        Arc::new(Responder::new(provider.clone()))
    }

    #[test]
    fn time_windows() {
        assert_eq!(days_ahead("What's on today?"), 1);
        assert_eq!(days_ahead("anything this afternoon"), 1);
        assert_eq!(days_ahead("meetings tomorrow"), 2);
        assert_eq!(days_ahead("What do I have next week?"), 14);
        assert_eq!(days_ahead("this week"), 7);
        assert_eq!(days_ahead("rest of the week"), 7);
        assert_eq!(days_ahead("this month"), 30);
        assert_eq!(days_ahead("any meetings?"), 7);
    }

    #[test]
    fn formats_events_with_location() {
        let events = vec![event("Standup", 17, 9, Some("Room 4")), event("Retro", 17, 15, None)];
        assert_eq!(
            format_events(&events, 2),
            "Upcoming events for the next 2 days:\n- Sat Oct 17 09:00: Standup (Room 4)\n- Sat Oct 17 15:00: Retro"
        );
    }

    #[tokio::test]
    async fn missing_integration_says_so() {
        let provider = Arc::new(SequentialMockProvider::texts(&[]));
        let handler = CalendarHandler::new(None, responder(&provider), Duration::from_secs(5));
        let reply = handler.handle("today?", &mut ctx()).await.unwrap();
        assert_eq!(reply.text, UNAVAILABLE);
        assert!(!reply.context_free);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn events_and_history_reach_the_model() {
        let calendar = Arc::new(MockCalendar::with_events(vec![
            event("Retro", 17, 15, None),
            event("Standup", 17, 9, Some("Room 4")),
        ]));
        let provider = Arc::new(SequentialMockProvider::texts(&["You are free after 09:00 until the 15:00 retro."]));
        let handler = CalendarHandler::new(Some(calendar.clone()), responder(&provider), Duration::from_secs(5));
        let mut context = ctx();
        context.record_turn(Role::User, "What do I have tomorrow?");
        context.record_turn(Role::Assistant, "A standup and a retro.");

        let reply = handler.handle("Am I free after the standup tomorrow?", &mut context).await.unwrap();
        assert_eq!(reply.text, "You are free after 09:00 until the 15:00 retro.");

        let request = &provider.requests()[0];
        assert!(request.system.starts_with(CALENDAR_PROMPT));
        assert!(request.system.contains("- Sat Oct 17 09:00: Standup (Room 4)\n- Sat Oct 17 15:00: Retro"));
        assert!(request.messages.iter().any(|m| m.content == "A standup and a retro."));
        assert_eq!(request.messages.last().unwrap().content, "Am I free after the standup tomorrow?");

        let queries = calendar.queries();
        assert_eq!(queries[0].days_ahead, 2);
        assert_eq!(queries[0].max_results, MAX_EVENTS);
    }

    #[tokio::test]
    async fn caps_event_count() {
        let events = (0..30).map(|i| event(&format!("e{i:02}"), 20, i % 24, None)).collect();
        let provider = Arc::new(SequentialMockProvider::texts(&["Busy month."]));
        let handler = CalendarHandler::new(
            Some(Arc::new(MockCalendar::with_events(events))),
            responder(&provider),
            Duration::from_secs(5),
        );

        handler.handle("this month", &mut ctx()).await.unwrap();
        let system = &provider.requests()[0].system;
        assert_eq!(system.lines().filter(|l| l.starts_with("- ")).count(), MAX_EVENTS);
    }

    #[tokio::test]
    async fn no_events_message_names_window() {
        let provider = Arc::new(SequentialMockProvider::texts(&[]));
        let handler = CalendarHandler::new(
            Some(Arc::new(MockCalendar::with_events(vec![]))),
            responder(&provider),
            Duration::from_secs(5),
        );
        let reply = handler.handle("next week", &mut ctx()).await.unwrap();
        assert_eq!(reply.text, "No upcoming events found for the next 14 days.");
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn collaborator_failure_is_recoverable_error() {
        let calendar = MockCalendar {
            events: vec![],
            queries: Mutex::new(Vec::new()),
            fail: true,
        };
        let provider = Arc::new(SequentialMockProvider::texts(&[]));
        let handler = CalendarHandler::new(Some(Arc::new(calendar)), responder(&provider), Duration::from_secs(5));
        let err = handler.handle("today", &mut ctx()).await.unwrap_err();
        assert!(matches!(err, Error::Collaborator(CollaboratorError::RequestFailed { .. })));
        assert!(err.is_recoverable());
    }
}
