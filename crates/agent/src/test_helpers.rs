//! Shared test doubles for agent tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tars_core::{
    CalendarEvent, CalendarProvider, CalendarQuery, CollaboratorError, CompletionProvider, CompletionRequest,
    CompletionResponse, Document, EmailDraft, EmailProvider, EmailStatus, EmbeddingProvider, ProviderError, Usage,
};
use tars_knowledge::{ChunkerConfig, InMemoryDocumentStore, KnowledgeBase, KnowledgeOptions};

/// A completion provider that returns scripted responses in order.
///
/// Panics if more calls are made than responses provided.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let n = requests.len();
        if n >= responses.len() {
            panic!("SequentialMockProvider: no more responses (call #{n}, have {})", responses.len());
        }
        requests.push(request);
        responses[n].clone().map(|text| CompletionResponse {
            text,
            model: "mock-model".into(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

/// A provider that never answers.
pub struct StalledProvider;

#[async_trait]
impl CompletionProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(ProviderError::Timeout("unreachable".into()))
    }
}

const VOCAB: [&str; 8] = ["refund", "ship", "rust", "memory", "meeting", "invoice", "holiday", "policy"];

/// Bag-of-words embedder over a small fixed vocabulary.
pub struct KeywordEmbedder {
    pub fail: bool,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.fail {
            return Err(ProviderError::Network("connection refused".into()));
        }
        let lower = text.to_lowercase();
        Ok(VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect())
    }
}

/// An in-memory knowledge base holding `docs` as `(source, text)` pairs.
pub async fn knowledge_base(docs: &[(&str, &str)]) -> Arc<KnowledgeBase> {
    knowledge_base_with(docs, KeywordEmbedder { fail: false }).await
}

pub async fn knowledge_base_with(docs: &[(&str, &str)], embedder: KeywordEmbedder) -> Arc<KnowledgeBase> {
    let options = KnowledgeOptions {
        chunker: ChunkerConfig::new(200, 20).unwrap(),
        ..KnowledgeOptions::default()
    };
    let kb = KnowledgeBase::open(Arc::new(InMemoryDocumentStore::new()), Arc::new(embedder), options)
        .await
        .unwrap();
    for (source, text) in docs {
        kb.ingest(Document::plain(*source, *text)).await.unwrap();
    }
    Arc::new(kb)
}

/// Calendar double that records every query it sees.
pub struct MockCalendar {
    pub events: Vec<CalendarEvent>,
    pub queries: Mutex<Vec<CalendarQuery>>,
    pub fail: bool,
}

impl MockCalendar {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            queries: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn queries(&self) -> Vec<CalendarQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn upcoming_events(&self, query: &CalendarQuery) -> Result<Vec<CalendarEvent>, CollaboratorError> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            return Err(CollaboratorError::RequestFailed {
                service: "calendar".into(),
                reason: "token expired".into(),
            });
        }
        Ok(self.events.clone())
    }
}

pub fn event(title: &str, day: u32, hour: u32, location: Option<&str>) -> CalendarEvent {
    CalendarEvent {
        title: title.into(),
        start: Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap(),
        end: None,
        location: location.map(String::from),
    }
}

/// Email double that records sends and drafts.
#[derive(Default)]
pub struct MockEmail {
    pub sent: Mutex<Vec<EmailDraft>>,
    pub drafts: Mutex<Vec<EmailDraft>>,
}

impl MockEmail {
    pub fn sent(&self) -> Vec<EmailDraft> {
        self.sent.lock().unwrap().clone()
    }

    pub fn drafts(&self) -> Vec<EmailDraft> {
        self.drafts.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for MockEmail {
    async fn send(&self, draft: &EmailDraft) -> Result<EmailStatus, CollaboratorError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(draft.clone());
        Ok(EmailStatus::Sent {
            message_id: format!("msg-{}", sent.len()),
        })
    }

    async fn create_draft(&self, draft: &EmailDraft) -> Result<EmailStatus, CollaboratorError> {
        let mut drafts = self.drafts.lock().unwrap();
        drafts.push(draft.clone());
        Ok(EmailStatus::Drafted {
            draft_id: format!("draft-{}", drafts.len()),
        })
    }
}
