//! EMAIL: have the model compose a message, then send or draft it.
//!
//! The model replies in a fixed `TO:` / `SUBJECT:` / `BODY:` layout.
//! A query that mentions "draft" creates a draft; anything else sends, but
//! only once a recipient is known.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tars_core::{CollaboratorError, EmailDraft, EmailProvider, EmailStatus, Error, Result};
use tokio::time::timeout;
use tracing::{info, warn};

use super::{HandlerReply, IntentHandler};
use crate::context::ContextManager;
use crate::responder::Responder;

pub const UNAVAILABLE: &str = "Email integration is not available. Connect an email account to send or draft messages.";

const COMPOSE_PROMPT: &str = "You are TARS, composing an email on the user's behalf. \
Use the conversation for names, addresses and details. Reply in exactly this format:
TO: <recipient email address, or MISSING if the user has not given one>
SUBJECT: <subject line>
BODY:
<email body>";

/// A composed email as parsed from the model's reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedEmail {
    pub to: Option<String>,
    pub subject: String,
    pub body: String,
}

impl ParsedEmail {
    /// Absent, blank, or a placeholder the model was told to use.
    pub fn recipient_missing(&self) -> bool {
        match self.to.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(to) => to.to_uppercase().contains("MISSING"),
        }
    }
}

/// Split a `TO:` / `SUBJECT:` / `BODY:` reply into its parts.
///
/// Everything after `BODY:` is the body. Without a `BODY:` marker, the lines
/// that are not headers are used.
pub fn parse_composition(text: &str) -> ParsedEmail {
    let mut parsed = ParsedEmail::default();
    let mut loose: Vec<&str> = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if let Some(rest) = strip_header(trimmed, "TO:") {
            parsed.to = Some(rest.to_string()).filter(|s| !s.is_empty());
        } else if let Some(rest) = strip_header(trimmed, "SUBJECT:") {
            parsed.subject = rest.to_string();
        } else if let Some(rest) = strip_header(trimmed, "BODY:") {
            let mut body: Vec<&str> = Vec::new();
            if !rest.is_empty() {
                body.push(rest);
            }
            body.extend(lines.by_ref());
            parsed.body = body.join("\n").trim().to_string();
            return parsed;
        } else {
            loose.push(line);
        }
    }

    parsed.body = loose.join("\n").trim().to_string();
    parsed
}

fn strip_header<'a>(line: &'a str, header: &str) -> Option<&'a str> {
    let head = line.get(..header.len())?;
    head.eq_ignore_ascii_case(header).then(|| line[header.len()..].trim())
}

pub struct EmailHandler {
    email: Option<Arc<dyn EmailProvider>>,
    responder: Arc<Responder>,
    timeout: Duration,
}

impl EmailHandler {
    pub fn new(email: Option<Arc<dyn EmailProvider>>, responder: Arc<Responder>, timeout: Duration) -> Self {
        Self {
            email,
            responder,
            timeout,
        }
    }

    async fn call(
        &self,
        op: impl Future<Output = std::result::Result<EmailStatus, CollaboratorError>>,
    ) -> Result<EmailStatus> {
        match timeout(self.timeout, op).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => {
                warn!(error = %e, "Email operation failed");
                Err(Error::Collaborator(e))
            }
            Err(_) => Err(Error::Collaborator(CollaboratorError::Timeout {
                service: "email".into(),
                secs: self.timeout.as_secs(),
            })),
        }
    }
}

#[async_trait]
impl IntentHandler for EmailHandler {
    async fn handle(&self, query: &str, context: &mut ContextManager) -> Result<HandlerReply> {
        let Some(email) = &self.email else {
            return Ok(HandlerReply::text(UNAVAILABLE));
        };

        let composed = self.responder.generate(COMPOSE_PROMPT, context, query).await?;
        let parsed = parse_composition(&composed.text);
        let wants_draft = query.to_lowercase().contains("draft");
        let missing = parsed.recipient_missing();

        if missing && !wants_draft {
            return Ok(HandlerReply::text(format!(
                "Who should I send this to? Give me the recipient's address and I'll send it.\n\nSubject: {}\n\n{}",
                parsed.subject, parsed.body
            )));
        }

        let draft = EmailDraft {
            to: if missing { String::new() } else { parsed.to.clone().unwrap_or_default() },
            subject: parsed.subject,
            body: parsed.body,
        };

        let status = if wants_draft {
            self.call(email.create_draft(&draft)).await?
        } else {
            self.call(email.send(&draft)).await?
        };
        info!(draft = wants_draft, "Email handled");

        let to = if draft.to.is_empty() { "(no recipient yet)" } else { draft.to.as_str() };
        let headline = match status {
            EmailStatus::Sent { message_id } => format!("Email sent to {to} (message id {message_id})."),
            EmailStatus::Drafted { draft_id } => format!("Draft saved (draft id {draft_id})."),
        };
        Ok(HandlerReply::text(format!(
            "{headline}\n\nTo: {to}\nSubject: {}\n\n{}",
            draft.subject, draft.body
        )))
    }
}
