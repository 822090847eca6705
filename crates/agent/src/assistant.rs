//! The assistant façade: classify, dispatch, record.

use std::sync::Arc;

use serde::Serialize;
use tars_config::AppConfig;
use tars_core::{CalendarProvider, CompletionProvider, EmailProvider, Intent, Result};
use tars_knowledge::KnowledgeBase;
use tracing::info;
use uuid::Uuid;

use crate::context::ContextManager;
use crate::handlers::{CalendarHandler, EmailHandler, IntentHandler, IntentHandlers, RetrievalHandler};
use crate::responder::Responder;
use crate::router::IntentRouter;

/// One conversation. Owns its context; nothing is shared between sessions.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    context: ContextManager,
}

impl Session {
    pub fn new(context: ContextManager) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(ContextManager::from_config(&config.context)?))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextManager {
        &mut self.context
    }
}

/// The answer to one query.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub intent: Intent,
    /// Answered without knowledge-base excerpts.
    pub context_free: bool,
    pub sources: Vec<String>,
}

pub struct Assistant {
    router: IntentRouter,
    responder: Arc<Responder>,
    history_hint_turns: usize,
    collaborator_timeout: std::time::Duration,
}

impl Assistant {
    /// Wire up an assistant with retrieval handlers. Calendar and email
    /// report themselves unavailable until attached.
    pub fn new(completion: Arc<dyn CompletionProvider>, knowledge: Arc<KnowledgeBase>, config: &AppConfig) -> Self {
        let responder = Arc::new(Responder::from_config(completion.clone(), config));
        let k = &config.knowledge;
        let collaborator_timeout = config.timeouts.collaborator();

        let handlers = IntentHandlers::new(
            Arc::new(RetrievalHandler::knowledge(
                knowledge.clone(),
                responder.clone(),
                k.knowledge_top_k,
                k.min_score,
            )),
            Arc::new(CalendarHandler::new(None, responder.clone(), collaborator_timeout)),
            Arc::new(EmailHandler::new(None, responder.clone(), collaborator_timeout)),
            Arc::new(RetrievalHandler::analysis(knowledge, responder.clone(), k.analysis_top_k, k.min_score)),
        );

        let router = IntentRouter::new(completion, handlers)
            .with_classifier_max_tokens(config.anthropic.classifier_max_tokens)
            .with_timeout(config.timeouts.completion());

        Self {
            router,
            responder,
            history_hint_turns: config.context.history_hint_turns,
            collaborator_timeout,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarProvider>) -> Self {
        let handler = CalendarHandler::new(Some(calendar), self.responder.clone(), self.collaborator_timeout);
        self.router.handlers_mut().replace(Intent::Calendar, Arc::new(handler));
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailProvider>) -> Self {
        let handler = EmailHandler::new(Some(email), self.responder.clone(), self.collaborator_timeout);
        self.router.handlers_mut().replace(Intent::Email, Arc::new(handler));
        self
    }

    /// Replace the handler for any intent.
    pub fn with_handler(mut self, intent: Intent, handler: Arc<dyn IntentHandler>) -> Self {
        self.router.handlers_mut().replace(intent, handler);
        self
    }

    pub fn router(&self) -> &IntentRouter {
        &self.router
    }

    /// Answer `query` within `session`, recording the exchange.
    pub async fn chat(&self, session: &mut Session, query: &str) -> Result<AssistantReply> {
        let hint = session.context.history_hint(self.history_hint_turns);
        let intent = self.router.classify(query, &hint).await;
        let reply = self.router.dispatch(intent, query, &mut session.context).await?;

        info!(
            session = %session.id,
            intent = %intent,
            context_free = reply.context_free,
            sources = reply.sources.len(),
            "Query answered"
        );

        Ok(AssistantReply {
            text: reply.text,
            intent,
            context_free: reply.context_free,
            sources: reply.sources,
        })
    }
}
