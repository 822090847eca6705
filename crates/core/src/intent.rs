//! The closed set of query intents.

use serde::{Deserialize, Serialize};

/// What a user query is asking for. Determines which handler runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    /// Answer from the knowledge base (the fallback intent).
    #[default]
    Knowledge,
    /// Look up calendar events.
    Calendar,
    /// Compose and send or draft an email.
    Email,
    /// Analyse or synthesise across many documents.
    Analysis,
}

impl Intent {
    pub const ALL: [Intent; 4] = [Intent::Knowledge, Intent::Calendar, Intent::Email, Intent::Analysis];

    /// The label the classifier is asked to emit.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Knowledge => "KNOWLEDGE",
            Intent::Calendar => "CALENDAR",
            Intent::Email => "EMAIL",
            Intent::Analysis => "ANALYSIS",
        }
    }

    /// Exact, case-insensitive label match.
    pub fn from_label(label: &str) -> Option<Intent> {
        let label = label.trim();
        Self::ALL.into_iter().find(|i| i.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
