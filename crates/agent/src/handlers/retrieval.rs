//! KNOWLEDGE and ANALYSIS: search the knowledge base, then answer.

use std::sync::Arc;

use async_trait::async_trait;
use tars_core::{Intent, Result, SearchResult};
use tars_knowledge::KnowledgeBase;
use tracing::{debug, warn};

use super::{HandlerReply, IntentHandler};
use crate::context::ContextManager;
use crate::responder::Responder;

const KNOWLEDGE_PROMPT: &str = "You are TARS, a helpful assistant. Answer the user's question. \
When excerpts from their documents are provided, ground your answer in them and cite sources \
as [Source n]. If the excerpts do not contain the answer, say so before answering from general knowledge.";

const ANALYSIS_PROMPT: &str = "You are TARS, an analyst. Compare, summarise and synthesise the \
provided document excerpts to answer the user's request. Cite sources as [Source n], point out \
agreements and contradictions between sources, and state clearly what the excerpts do not cover.";

const NO_CONTEXT_NOTE: &str = "\n\nNo excerpts from the user's documents matched this request. \
Answer from the conversation and general knowledge, and mention that the knowledge base had nothing relevant.";

/// Retrieval-backed handler, used for both retrieval intents.
pub struct RetrievalHandler {
    intent: Intent,
    knowledge: Arc<KnowledgeBase>,
    responder: Arc<Responder>,
    top_k: usize,
    min_score: f32,
}

impl RetrievalHandler {
    /// Handler for direct questions.
    pub fn knowledge(knowledge: Arc<KnowledgeBase>, responder: Arc<Responder>, top_k: usize, min_score: f32) -> Self {
        Self {
            intent: Intent::Knowledge,
            knowledge,
            responder,
            top_k,
            min_score,
        }
    }

    /// Handler for cross-document analysis. Usually given a larger `top_k`.
    pub fn analysis(knowledge: Arc<KnowledgeBase>, responder: Arc<Responder>, top_k: usize, min_score: f32) -> Self {
        Self {
            intent: Intent::Analysis,
            ..Self::knowledge(knowledge, responder, top_k, min_score)
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self.intent {
            Intent::Analysis => ANALYSIS_PROMPT,
            _ => KNOWLEDGE_PROMPT,
        }
    }

    /// Search, degrading to no results when search fails.
    async fn retrieve(&self, query: &str) -> Vec<SearchResult> {
        match self.knowledge.search(query, self.top_k, self.min_score).await {
            Ok(results) => results,
            Err(e) => {
                warn!(
                    intent = %self.intent,
                    error = %e,
                    "Search failed, answering without knowledge-base context"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl IntentHandler for RetrievalHandler {
    async fn handle(&self, query: &str, context: &mut ContextManager) -> Result<HandlerReply> {
        let results = self.retrieve(query).await;
        let context_free = results.is_empty();
        debug!(intent = %self.intent, results = results.len(), "Retrieved excerpts");

        let mut sources: Vec<String> = Vec::new();
        for r in &results {
            if !sources.contains(&r.document_source) {
                sources.push(r.document_source.clone());
            }
        }

        // The batch is committed only once an answer exists.
        let mut staged = context.clone();
        staged.record_search(query, results);

        let generated = if context_free {
            let system = format!("{}{NO_CONTEXT_NOTE}", self.system_prompt());
            self.responder.generate(&system, &staged, query).await?
        } else {
            self.responder.generate(self.system_prompt(), &staged, query).await?
        };
        *context = staged;

        Ok(HandlerReply {
            text: generated.text,
            context_free,
            sources,
        })
    }
}
