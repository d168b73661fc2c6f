//! The reranker capability: a second-pass scorer that reorders candidate
//! documents.
//!
//! Grounded directly in the teacher's `rag/reranker.rs::RerankerModelType`
//! (fastembed cross-encoder), generalized behind one trait with an
//! LLM-scored strategy and a passthrough strategy — the teacher only shipped
//! the fastembed path; the trait-ification follows the `LLMClient`/
//! `VectorStore` trait-object pattern used everywhere else in this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::adapters::llm::{instrumented_generate, LlmClient};
use crate::error::Result;
use crate::telemetry::{NullTelemetrySink, Telemetry, TelemetrySink};
use crate::types::RetrievalResult;

/// Options accepted by every [`Reranker`] implementation.
#[derive(Debug, Clone)]
pub struct RerankOptions {
    pub top_n: usize,
    pub threshold: Option<f32>,
}

impl Default for RerankOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            threshold: None,
        }
    }
}

/// Reorders (and optionally filters) retrieval candidates by relevance to
/// `query`.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<RetrievalResult>, opts: RerankOptions) -> Result<Vec<RetrievalResult>>;

    fn model_name(&self) -> &str;
}

/// Identity reranker: keeps the incoming order, only applies `top_n`/
/// `threshold`.
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &str, mut candidates: Vec<RetrievalResult>, opts: RerankOptions) -> Result<Vec<RetrievalResult>> {
        if let Some(threshold) = opts.threshold {
            candidates.retain(|c| c.score >= threshold);
        }
        candidates.truncate(opts.top_n);
        Ok(candidates)
    }

    fn model_name(&self) -> &str {
        "passthrough"
    }
}

#[derive(Debug, Deserialize)]
struct ScoredIndex {
    index: usize,
    score: f32,
}

/// Asks an LLM to score each candidate 1-10 for relevance to `query`,
/// parses a JSON array of `{index, score}`, and sorts by that score. If the
/// LLM call or the JSON parse fails, reranking is skipped and the original
/// ordering is preserved, with telemetry recording `kept = original`.
pub struct LlmReranker {
    llm: Arc<dyn LlmClient>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn build_prompt(query: &str, candidates: &[RetrievalResult]) -> String {
        let mut prompt = format!(
            "Score each document's relevance to the query on a 1-10 scale.\n\
             Query: {query}\n\n\
             Respond with a JSON array of {{\"index\": <int>, \"score\": <float>}}.\n\n"
        );
        for (i, c) in candidates.iter().enumerate() {
            let snippet = c.content.as_deref().unwrap_or_default();
            prompt.push_str(&format!("[{i}] {snippet}\n"));
        }
        prompt
    }

    fn parse_scores(response: &str) -> Option<Vec<ScoredIndex>> {
        let start = response.find('[')?;
        let end = response.rfind(']')?;
        if end < start {
            return None;
        }
        serde_json::from_str(&response[start..=end]).ok()
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(&self, query: &str, candidates: Vec<RetrievalResult>, opts: RerankOptions) -> Result<Vec<RetrievalResult>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let telemetry = Telemetry::new(self.telemetry.as_ref());
        let candidate_count = candidates.len().to_string();
        let span = telemetry.start("rag.rerank", &[("candidate_count", &candidate_count)]);

        let prompt = Self::build_prompt(query, &candidates);
        let response = match instrumented_generate(self.telemetry.as_ref(), self.llm.as_ref(), &prompt).await {
            Ok(r) => r,
            Err(_) => {
                span.stop(&[("kept", "original")]);
                return Ok(apply_limits(candidates, opts));
            }
        };

        let Some(mut scores) = Self::parse_scores(&response) else {
            span.stop(&[("kept", "original")]);
            return Ok(apply_limits(candidates, opts));
        };
        scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut reranked = Vec::with_capacity(scores.len());
        for scored in &scores {
            if let Some(candidate) = candidates.get(scored.index) {
                let mut result = candidate.clone();
                result.score = scored.score / 10.0;
                reranked.push(result);
            }
        }
        if reranked.is_empty() {
            span.stop(&[("kept", "original")]);
            return Ok(apply_limits(candidates, opts));
        }
        let result_count = reranked.len().to_string();
        span.stop(&[("kept", "reranked"), ("result_count", &result_count)]);
        Ok(apply_limits(reranked, opts))
    }

    fn model_name(&self) -> &str {
        self.llm.model_name()
    }
}

fn apply_limits(mut candidates: Vec<RetrievalResult>, opts: RerankOptions) -> Vec<RetrievalResult> {
    if let Some(threshold) = opts.threshold {
        candidates.retain(|c| c.score >= threshold);
    }
    candidates.truncate(opts.top_n);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::test_support::ScriptedLlm;
    use crate::types::ResultSource;

    fn candidate(id: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            content: Some(format!("content for {id}")),
            score,
            metadata: Default::default(),
            source: ResultSource::Vector,
        }
    }

    #[tokio::test]
    async fn passthrough_applies_top_n_and_threshold() {
        let reranker = PassthroughReranker;
        let candidates = vec![candidate("c1", 0.9), candidate("c2", 0.85), candidate("c3", 0.5)];
        let result = reranker
            .rerank(
                "q",
                candidates,
                RerankOptions {
                    top_n: 2,
                    threshold: Some(0.8),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn llm_reranker_filters_with_threshold_scenario() {
        let llm = std::sync::Arc::new(ScriptedLlm::new(vec![
            r#"[{"index":0,"score":9},{"index":1,"score":8},{"index":2,"score":7},{"index":3,"score":6}]"#,
        ]));
        let reranker = LlmReranker::new(llm);
        let candidates = vec![
            candidate("c1", 0.9),
            candidate("c2", 0.85),
            candidate("c3", 0.8),
            candidate("c4", 0.75),
        ];
        let result = reranker
            .rerank(
                "q",
                candidates,
                RerankOptions {
                    top_n: 2,
                    threshold: Some(0.75),
                },
            )
            .await
            .unwrap();
        let ids: Vec<&str> = result.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn llm_reranker_keeps_original_order_on_parse_failure() {
        let llm = std::sync::Arc::new(ScriptedLlm::new(vec!["not valid JSON"]));
        let reranker = LlmReranker::new(llm);
        let candidates = vec![candidate("c1", 0.9), candidate("c2", 0.8)];
        let result = reranker
            .rerank("q", candidates, RerankOptions::default())
            .await
            .unwrap();
        assert_eq!(result[0].id, "c1");
        assert_eq!(result[1].id, "c2");
    }

    #[tokio::test]
    async fn parse_failure_records_kept_original_in_telemetry() {
        use crate::telemetry::TelemetrySink;
        use std::sync::Mutex;

        #[derive(Default)]
        struct CapturingSink {
            stopped_fields: Mutex<Vec<(String, String)>>,
        }
        impl TelemetrySink for CapturingSink {
            fn span_start(&self, _name: &str, _fields: &[(&str, &str)]) {}
            fn span_stop(&self, _name: &str, _duration: std::time::Duration, fields: &[(&str, &str)]) {
                *self.stopped_fields.lock().unwrap() = fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            }
            fn span_exception(&self, _name: &str, _error: &str) {}
            fn counter(&self, _name: &str, _fields: &[(&str, &str)]) {}
        }

        let llm = std::sync::Arc::new(ScriptedLlm::new(vec!["not valid JSON"]));
        let sink = std::sync::Arc::new(CapturingSink::default());
        let reranker = LlmReranker::new(llm).with_telemetry(sink.clone());
        let candidates = vec![candidate("c1", 0.9), candidate("c2", 0.8)];
        reranker.rerank("q", candidates, RerankOptions::default()).await.unwrap();

        let fields = sink.stopped_fields.lock().unwrap();
        assert!(fields.iter().any(|(k, v)| k == "kept" && v == "original"));
    }
}
