//! Pipeline context: an immutable value object threaded through every
//! retrieval/answer stage. Stages take a `Context` by value and return a
//! new one, matching the teacher's preference for explicit data flow over
//! shared mutable state (`workflows/engine.rs`'s step-chaining style).

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::AdapterRegistry;
use crate::types::RetrievalResult;

/// One correction applied during self-correcting search or answer
/// generation, kept for observability.
#[derive(Debug, Clone)]
pub struct Correction {
    pub stage: String,
    pub reason: String,
}

/// A grounding verdict produced by the self-correcting answer loop.
#[derive(Debug, Clone)]
pub struct GroundingVerdict {
    pub grounded: bool,
    pub score: Option<f32>,
}

/// The immutable value threaded through the query/retrieval/answer
/// pipeline. A halted context short-circuits every subsequent stage: they
/// must return it unchanged.
#[derive(Debug, Clone)]
pub struct Context {
    pub question: String,
    pub rewritten_query: Option<String>,
    pub expanded_query: Option<String>,
    pub sub_questions: Vec<String>,
    pub is_complex: bool,
    pub results: Vec<RetrievalResult>,
    pub rerank_scores: HashMap<String, f32>,
    pub answer: Option<String>,
    pub grounding_verdict: Option<GroundingVerdict>,
    pub correction_count: u32,
    pub corrections: Vec<Correction>,
    pub halted: bool,
    pub error: Option<String>,
    pub adapters: Arc<AdapterRegistry>,
    pub opts: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Start a new context for `question`, with no transformations applied
    /// yet.
    pub fn new(question: impl Into<String>, adapters: Arc<AdapterRegistry>) -> Self {
        Self {
            question: question.into(),
            rewritten_query: None,
            expanded_query: None,
            sub_questions: Vec::new(),
            is_complex: false,
            results: Vec::new(),
            rerank_scores: HashMap::new(),
            answer: None,
            grounding_verdict: None,
            correction_count: 0,
            corrections: Vec::new(),
            halted: false,
            error: None,
            adapters,
            opts: HashMap::new(),
        }
    }

    /// `expanded_query ?? rewritten_query ?? question`. Always non-empty if
    /// `question` is non-empty, since it falls through to `question`.
    pub fn effective_query(&self) -> &str {
        self.expanded_query
            .as_deref()
            .or(self.rewritten_query.as_deref())
            .unwrap_or(&self.question)
    }

    /// Halt the context with `error`, marking every later stage a no-op.
    /// Required stages (search, answer) call this; advisory stages
    /// (rewrite, expand, decompose, rerank) must not.
    pub fn halt(mut self, error: impl Into<String>) -> Self {
        self.halted = true;
        self.error = Some(error.into());
        self
    }

    pub fn record_correction(&mut self, stage: impl Into<String>, reason: impl Into<String>) {
        self.correction_count += 1;
        self.corrections.push(Correction {
            stage: stage.into(),
            reason: reason.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterRegistry;

    fn registry() -> Arc<AdapterRegistry> {
        Arc::new(AdapterRegistry::new())
    }

    #[test]
    fn effective_query_falls_back_to_question() {
        let ctx = Context::new("what is rust", registry());
        assert_eq!(ctx.effective_query(), "what is rust");
    }

    #[test]
    fn effective_query_prefers_expanded_over_rewritten() {
        let mut ctx = Context::new("q", registry());
        ctx.rewritten_query = Some("rewritten".into());
        ctx.expanded_query = Some("expanded".into());
        assert_eq!(ctx.effective_query(), "expanded");
    }

    #[test]
    fn effective_query_nonempty_question_never_empty() {
        let ctx = Context::new("hello", registry());
        assert!(!ctx.effective_query().is_empty());
    }

    #[test]
    fn halt_sets_flag_and_error() {
        let ctx = Context::new("q", registry());
        let halted = ctx.halt("boom");
        assert!(halted.halted);
        assert_eq!(halted.error.as_deref(), Some("boom"));
    }
}
