//! Calendar and email collaborators.
//!
//! These are black boxes invoked only when a query routes to the calendar
//! or email intent. Their authentication lifecycle lives outside this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// A calendar lookup derived from a natural-language query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarQuery {
    /// The user's original wording.
    pub text: String,
    /// How many days ahead of now to look.
    pub days_ahead: u32,
    /// Upper bound on events returned.
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn upcoming_events(&self, query: &CalendarQuery) -> Result<Vec<CalendarEvent>, CollaboratorError>;
}

/// A composed email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outcome of an email operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EmailStatus {
    Sent { message_id: String },
    Drafted { draft_id: String },
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, draft: &EmailDraft) -> Result<EmailStatus, CollaboratorError>;

    async fn create_draft(&self, draft: &EmailDraft) -> Result<EmailStatus, CollaboratorError>;
}
