//! Per-session context: rolling conversation history, recent retrieval
//! results, and token-bounded prompt assembly.
//!
//! # Prompt layout
//!
//! | Part | Source | Trim order |
//! |------|--------|------------|
//! | System | caller | never trimmed |
//! | History | retained turns, oldest first | first, oldest turn dropped |
//! | Excerpts | retained search batches | second, oldest batch dropped |
//! | Query | caller | never trimmed |
//!
//! Excerpts are rendered into the final user message ahead of the query.
//! Assembly is deterministic and never mutates the manager.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tars_config::ContextConfig;
use tars_core::provider::{CompletionRequest, PromptMessage};
use tars_core::{ConversationTurn, Error, Result, Role, SearchResult};
use tracing::debug;

use super::token::TokenEstimator;

/// Per-turn character cap inside a history hint.
pub const HINT_CHARS_PER_TURN: usize = 200;

const EXCERPT_HEADER: &str = "Relevant excerpts from the knowledge base:";

/// One recorded set of search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchBatch {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub recorded_at: DateTime<Utc>,
}

/// A prompt ready to send, plus what assembly had to drop.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system: String,
    /// History turns, then the final user message (excerpts + query).
    pub messages: Vec<PromptMessage>,
    pub estimated_tokens: usize,
    pub budget: usize,
    pub turns_included: usize,
    pub excerpts_included: usize,
    pub trimmed_turns: usize,
    pub trimmed_batches: usize,
}

impl AssembledPrompt {
    pub fn into_request(self, max_response_tokens: u32) -> CompletionRequest {
        CompletionRequest::new(self.system, self.messages, max_response_tokens)
    }

    pub fn was_trimmed(&self) -> bool {
        self.trimmed_turns > 0 || self.trimmed_batches > 0
    }
}

/// Conversation and retrieval memory for one session.
///
/// Both sequences are bounded FIFOs. A session owns exactly one manager and
/// mutates it through `&mut`, so no locking is involved.
#[derive(Debug, Clone)]
pub struct ContextManager {
    turns: VecDeque<ConversationTurn>,
    batches: VecDeque<SearchBatch>,
    max_turns: usize,
    max_batches: usize,
    estimator: TokenEstimator,
}

impl ContextManager {
    pub fn new(max_turns: usize, max_batches: usize, estimator: TokenEstimator) -> Result<Self> {
        if max_turns == 0 || max_batches == 0 {
            return Err(Error::InvalidConfig(
                "max_turns and max_search_batches must be > 0".into(),
            ));
        }
        Ok(Self {
            turns: VecDeque::with_capacity(max_turns),
            batches: VecDeque::with_capacity(max_batches),
            max_turns,
            max_batches,
            estimator,
        })
    }

    pub fn from_config(config: &ContextConfig) -> Result<Self> {
        Self::new(
            config.max_turns,
            config.max_search_batches,
            TokenEstimator::new(config.chars_per_token)?,
        )
    }

    // ── Recording ──────────────────────────────────────────────────────────

    /// Append a turn, evicting the oldest when full.
    pub fn record_turn(&mut self, role: Role, text: impl Into<String>) {
        if self.turns.len() == self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn::new(role, text));
    }

    /// Remember a batch of search results, evicting the oldest batch when
    /// full. Empty batches are not kept.
    pub fn record_search(&mut self, query: impl Into<String>, results: Vec<SearchResult>) {
        if results.is_empty() {
            return;
        }
        if self.batches.len() == self.max_batches {
            self.batches.pop_front();
        }
        self.batches.push_back(SearchBatch {
            query: query.into(),
            results,
            recorded_at: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.batches.clear();
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn search_batches(&self) -> impl Iterator<Item = &SearchBatch> {
        self.batches.iter()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.estimator
    }

    /// The last `n` turns as `role: text` lines, each cut to
    /// [`HINT_CHARS_PER_TURN`] characters.
    pub fn history_hint(&self, n: usize) -> String {
        let skip = self.turns.len().saturating_sub(n);
        self.turns
            .iter()
            .skip(skip)
            .map(|t| format!("{}: {}", t.role, truncate_chars(&t.text, HINT_CHARS_PER_TURN)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ── Assembly ───────────────────────────────────────────────────────────

    /// Assemble a prompt that fits in `max_tokens`.
    ///
    /// Drops the oldest turns first, then the oldest search batches. Fails
    /// with `ContextBudgetExceeded` only when the system prompt and query
    /// alone do not fit.
    pub fn build_prompt(&self, system_prompt: &str, query: &str, max_tokens: usize) -> Result<AssembledPrompt> {
        let est = self.estimator;
        let system_cost = est.estimate_message(system_prompt);

        let required = system_cost + est.estimate_message(query);
        if required > max_tokens {
            return Err(Error::ContextBudgetExceeded {
                required,
                budget: max_tokens,
            });
        }

        let turn_costs: Vec<usize> = self.turns.iter().map(|t| est.estimate_message(&t.text)).collect();
        let mut turn_start = 0;
        let mut batch_start = 0;

        loop {
            let (final_message, excerpts) = self.render_final_message(batch_start, query);
            let tokens =
                system_cost + turn_costs[turn_start..].iter().sum::<usize>() + est.estimate_message(&final_message);

            if tokens <= max_tokens {
                let mut messages: Vec<PromptMessage> = self
                    .turns
                    .range(turn_start..)
                    .map(|t| PromptMessage {
                        role: t.role,
                        content: t.text.clone(),
                    })
                    .collect();
                messages.push(PromptMessage::user(final_message));

                if turn_start > 0 || batch_start > 0 {
                    debug!(
                        trimmed_turns = turn_start,
                        trimmed_batches = batch_start,
                        tokens,
                        budget = max_tokens,
                        "Trimmed context to fit budget"
                    );
                }

                return Ok(AssembledPrompt {
                    system: system_prompt.to_string(),
                    messages,
                    estimated_tokens: tokens,
                    budget: max_tokens,
                    turns_included: self.turns.len() - turn_start,
                    excerpts_included: excerpts,
                    trimmed_turns: turn_start,
                    trimmed_batches: batch_start,
                });
            }

            if turn_start < self.turns.len() {
                turn_start += 1;
            } else if batch_start < self.batches.len() {
                batch_start += 1;
            } else {
                // Only system and query remain, which were checked above.
                return Err(Error::ContextBudgetExceeded {
                    required: tokens,
                    budget: max_tokens,
                });
            }
        }
    }

    /// Render excerpts from batches `batch_start..` followed by the query.
    ///
    /// A chunk retrieved by several batches appears once, at its newest
    /// position.
    fn render_final_message(&self, batch_start: usize, query: &str) -> (String, usize) {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut picked: Vec<&SearchResult> = Vec::new();
        for batch in self.batches.range(batch_start..).rev() {
            for result in batch.results.iter().rev() {
                if seen.insert(result.chunk_id.as_str()) {
                    picked.push(result);
                }
            }
        }
        if picked.is_empty() {
            return (query.to_string(), 0);
        }
        picked.reverse();

        let mut out = String::from(EXCERPT_HEADER);
        for (i, result) in picked.iter().enumerate() {
            out.push_str(&format!(
                "\n\n[Source {}: {}] (relevance {:.2})\n{}",
                i + 1,
                result.document_source,
                result.score,
                result.text
            ));
        }
        out.push_str("\n\n---\n\n");
        out.push_str(query);
        (out, picked.len())
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_turns: usize, max_batches: usize) -> ContextManager {
        ContextManager::new(max_turns, max_batches, TokenEstimator::default()).unwrap()
    }

    fn result(id: &str, source: &str, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: id.into(),
            score,
            text: text.into(),
            document_source: source.into(),
        }
    }

    #[test]
    fn rejects_zero_bounds() {
        assert!(ContextManager::new(0, 10, TokenEstimator::default()).is_err());
        assert!(ContextManager::new(20, 0, TokenEstimator::default()).is_err());
    }

    #[test]
    fn turns_evict_oldest_first() {
        let mut ctx = manager(3, 10);
        for i in 0..4 {
            ctx.record_turn(Role::User, format!("turn {i}"));
        }
        let texts: Vec<&str> = ctx.turns().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 1", "turn 2", "turn 3"]);
    }

    #[test]
    fn batches_evict_oldest_first_and_skip_empty() {
        let mut ctx = manager(20, 2);
        ctx.record_search("q0", vec![result("c0", "a.md", "zero", 0.9)]);
        ctx.record_search("empty", vec![]);
        ctx.record_search("q1", vec![result("c1", "a.md", "one", 0.9)]);
        ctx.record_search("q2", vec![result("c2", "a.md", "two", 0.9)]);

        let queries: Vec<&str> = ctx.search_batches().map(|b| b.query.as_str()).collect();
        assert_eq!(queries, vec!["q1", "q2"]);
    }

    #[test]
    fn prompt_order_is_history_then_excerpts_then_query() {
        let mut ctx = manager(20, 10);
        ctx.record_turn(Role::User, "What is the refund window?");
        ctx.record_turn(Role::Assistant, "Thirty days.");
        ctx.record_search("refunds", vec![result("c1", "policy.md", "Refunds within 30 days.", 0.8312)]);

        let p = ctx.build_prompt("You are TARS.", "And for sale items?", 10_000).unwrap();
        assert_eq!(p.system, "You are TARS.");
        assert_eq!(p.messages.len(), 3);
        assert_eq!(p.messages[0].role, Role::User);
        assert_eq!(p.messages[1].role, Role::Assistant);

        let last = &p.messages[2];
        assert_eq!(last.role, Role::User);
        assert!(last.content.starts_with(EXCERPT_HEADER));
        assert!(last.content.contains("[Source 1: policy.md] (relevance 0.83)\nRefunds within 30 days."));
        assert!(last.content.ends_with("And for sale items?"));
        assert_eq!(p.excerpts_included, 1);
        assert!(!p.was_trimmed());
    }

    #[test]
    fn without_batches_final_message_is_the_query() {
        let ctx = manager(20, 10);
        let p = ctx.build_prompt("sys", "hello", 100).unwrap();
        assert_eq!(p.messages, vec![PromptMessage::user("hello")]);
        assert_eq!(p.estimated_tokens, 5 + 6);
    }

    #[test]
    fn building_is_deterministic_and_leaves_state_alone() {
        let mut ctx = manager(20, 10);
        ctx.record_turn(Role::User, "a".repeat(40));
        ctx.record_search("q", vec![result("c1", "a.md", "text", 0.5)]);

        let first = ctx.build_prompt("sys", "q?", 20).unwrap();
        let second = ctx.build_prompt("sys", "q?", 20).unwrap();
        assert_eq!(first.messages, second.messages);
        assert_eq!(ctx.turn_count(), 1);
        assert_eq!(ctx.batch_count(), 1);
    }

    #[test]
    fn oldest_turns_are_trimmed_first() {
        let mut ctx = manager(20, 10);
        for c in ['a', 'b', 'c', 'd'] {
            // 40 chars -> 10 tokens + 4 overhead
            ctx.record_turn(Role::User, c.to_string().repeat(40));
        }

        // system "sys" and query "q?" cost 5 each; room for two turns
        let p = ctx.build_prompt("sys", "q?", 10 + 14 * 2).unwrap();
        assert_eq!(p.trimmed_turns, 2);
        assert_eq!(p.turns_included, 2);
        assert!(p.messages[0].content.starts_with('c'));
        assert!(p.messages[1].content.starts_with('d'));
        assert_eq!(p.messages[2].content, "q?");
        assert!(p.estimated_tokens <= p.budget);
    }

    #[test]
    fn batches_are_trimmed_only_after_all_turns() {
        let mut excerpts_only = manager(20, 10);
        excerpts_only.record_search("q", vec![result("c1", "a.md", "short excerpt", 0.7)]);
        let needed = excerpts_only.build_prompt("sys", "q?", 10_000).unwrap().estimated_tokens;

        let mut ctx = excerpts_only.clone();
        ctx.record_turn(Role::User, "x".repeat(40));
        let p = ctx.build_prompt("sys", "q?", needed).unwrap();
        assert_eq!(p.trimmed_turns, 1);
        assert_eq!(p.trimmed_batches, 0);
        assert_eq!(p.excerpts_included, 1);

        let p = ctx.build_prompt("sys", "q?", needed - 1).unwrap();
        assert_eq!(p.trimmed_turns, 1);
        assert_eq!(p.trimmed_batches, 1);
        assert_eq!(p.messages, vec![PromptMessage::user("q?")]);
    }

    #[test]
    fn system_and_query_alone_over_budget_fails() {
        let ctx = manager(20, 10);
        let err = ctx.build_prompt("sys", "q?", 9).unwrap_err();
        assert!(matches!(err, Error::ContextBudgetExceeded { required: 10, budget: 9 }));
    }

    #[test]
    fn budget_never_exceeded_across_sizes() {
        let mut ctx = manager(20, 10);
        for i in 0..20 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            ctx.record_turn(role, format!("message number {i} ").repeat(i + 1));
        }
        for b in 0..5 {
            ctx.record_search(
                format!("q{b}"),
                vec![result(&format!("c{b}"), "doc.md", &"excerpt ".repeat(20), 0.6)],
            );
        }
        for budget in [10, 50, 200, 1_000, 5_000] {
            let p = ctx.build_prompt("sys", "q?", budget).unwrap();
            assert!(p.estimated_tokens <= budget, "budget {budget}: {}", p.estimated_tokens);
            assert_eq!(p.system, "sys");
            assert!(p.messages.last().unwrap().content.ends_with("q?"));
        }
    }

    #[test]
    fn repeated_chunks_render_once() {
        let mut ctx = manager(20, 10);
        ctx.record_search("q1", vec![result("c1", "a.md", "shared", 0.6), result("c2", "a.md", "old", 0.5)]);
        ctx.record_search("q2", vec![result("c1", "a.md", "shared", 0.9)]);

        let p = ctx.build_prompt("sys", "q?", 10_000).unwrap();
        let last = &p.messages.last().unwrap().content;
        assert_eq!(p.excerpts_included, 2);
        assert_eq!(last.matches("shared").count(), 1);
        assert!(last.contains("[Source 1: a.md] (relevance 0.50)\nold"));
        assert!(last.contains("[Source 2: a.md] (relevance 0.90)\nshared"));
    }

    #[test]
    fn history_hint_takes_last_turns_truncated() {
        let mut ctx = manager(20, 10);
        ctx.record_turn(Role::User, "first");
        ctx.record_turn(Role::Assistant, "second");
        ctx.record_turn(Role::User, "é".repeat(HINT_CHARS_PER_TURN + 5));

        let hint = ctx.history_hint(2);
        let lines: Vec<&str> = hint.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "assistant: second");
        assert!(lines[1].starts_with("user: é"));
        assert!(lines[1].ends_with("..."));
        assert_eq!(lines[1].chars().count(), "user: ".len() + HINT_CHARS_PER_TURN + 3);

        assert_eq!(ctx.history_hint(0), "");
    }
}
