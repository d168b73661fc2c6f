//! Query processor: rewrite, expand, decompose. Three independent, advisory
//! stages over a [`Context`](crate::context::Context) — grounded in the
//! bounded, composable-stage shape of the teacher's
//! `llm/coordinator.rs::ToolCoordinator`, trimmed down to single-shot LLM
//! calls with no tool loop.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::adapters::llm::{instrumented_generate, LlmClient};
use crate::context::Context;
use crate::telemetry::{NullTelemetrySink, Telemetry, TelemetrySink};

/// Which advisory stages to run. All three run by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rewrite,
    Expand,
    Decompose,
}

#[derive(Debug, Clone, Default)]
pub struct QueryProcessorOptions {
    pub skip: HashSet<Stage>,
}

impl QueryProcessorOptions {
    pub fn skip(stages: impl IntoIterator<Item = Stage>) -> Self {
        Self {
            skip: stages.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DecomposeResponse {
    #[serde(default)]
    sub_questions: Option<Vec<String>>,
    #[serde(default)]
    questions: Option<Vec<String>>,
}

/// Runs rewrite/expand/decompose over a [`Context`]'s question, threading
/// advisory results back onto the Context. A halted Context passes through
/// every stage unchanged.
pub struct QueryProcessor<'a> {
    llm: &'a dyn LlmClient,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<'a> QueryProcessor<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self {
            llm,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub async fn process(&self, mut ctx: Context, opts: &QueryProcessorOptions) -> Context {
        if ctx.halted {
            return ctx;
        }
        if !opts.skip.contains(&Stage::Rewrite) {
            ctx = self.rewrite(ctx).await;
        }
        if ctx.halted {
            return ctx;
        }
        if !opts.skip.contains(&Stage::Expand) {
            ctx = self.expand(ctx).await;
        }
        if ctx.halted {
            return ctx;
        }
        if !opts.skip.contains(&Stage::Decompose) {
            ctx = self.decompose(ctx).await;
        }
        ctx
    }

    async fn rewrite(&self, mut ctx: Context) -> Context {
        let telemetry = Telemetry::new(self.telemetry.as_ref());
        let span = telemetry.start("rag.rewrite", &[]);
        let prompt = format!(
            "Rewrite the following conversational input as a single-line search query:\n{}",
            ctx.question
        );
        match instrumented_generate(self.telemetry.as_ref(), self.llm, &prompt).await {
            Ok(rewritten) => {
                ctx.rewritten_query = Some(rewritten.trim().to_string());
                span.stop(&[("rewritten", "true")]);
            }
            Err(error) => {
                ctx.rewritten_query = None;
                span.exception(&error.to_string());
            }
        }
        ctx
    }

    async fn expand(&self, mut ctx: Context) -> Context {
        let telemetry = Telemetry::new(self.telemetry.as_ref());
        let span = telemetry.start("rag.expand", &[]);
        let input = ctx.rewritten_query.clone().unwrap_or_else(|| ctx.question.clone());
        let prompt = format!("Expand this search query with synonyms and adjacent terms:\n{input}");
        match instrumented_generate(self.telemetry.as_ref(), self.llm, &prompt).await {
            Ok(expanded) => {
                ctx.expanded_query = Some(expanded.trim().to_string());
                span.stop(&[("expanded", "true")]);
            }
            Err(error) => {
                span.exception(&error.to_string());
            }
        }
        ctx
    }

    async fn decompose(&self, mut ctx: Context) -> Context {
        let telemetry = Telemetry::new(self.telemetry.as_ref());
        let span = telemetry.start("rag.decompose", &[]);
        let prompt = format!(
            "Decompose this question into independent sub-questions. Respond with a JSON \
             object {{\"sub_questions\": [...]}}. Question: {}",
            ctx.question
        );
        let response = instrumented_generate(self.telemetry.as_ref(), self.llm, &prompt).await;

        let sub_questions = response
            .ok()
            .and_then(|text| Self::parse_sub_questions(&text))
            .filter(|qs| !qs.is_empty());

        match sub_questions {
            Some(qs) => {
                ctx.is_complex = qs.len() > 1;
                let sub_question_count = qs.len().to_string();
                ctx.sub_questions = qs;
                span.stop(&[("sub_question_count", &sub_question_count)]);
            }
            None => {
                ctx.is_complex = false;
                ctx.sub_questions = vec![ctx.question.clone()];
                span.stop(&[("sub_question_count", "1")]);
            }
        }
        ctx
    }

    fn parse_sub_questions(text: &str) -> Option<Vec<String>> {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if end < start {
            return None;
        }
        let parsed: DecomposeResponse = serde_json::from_str(&text[start..=end]).ok()?;
        parsed.sub_questions.or(parsed.questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::test_support::ScriptedLlm;
    use crate::adapters::AdapterRegistry;
    use std::sync::Arc;

    fn ctx(question: &str) -> Context {
        Context::new(question, Arc::new(AdapterRegistry::default()))
    }

    #[tokio::test]
    async fn rewrite_expand_populate_advisory_fields() {
        let llm = ScriptedLlm::new(vec!["rewritten query", "expanded query", "not valid JSON"]);
        let processor = QueryProcessor::new(&llm);
        let result = processor.process(ctx("original question"), &QueryProcessorOptions::default()).await;
        assert_eq!(result.rewritten_query.as_deref(), Some("rewritten query"));
        assert_eq!(result.expanded_query.as_deref(), Some("expanded query"));
    }

    #[tokio::test]
    async fn decompose_fallback_scenario() {
        // An unparseable decompose response falls back to the original
        // question as the sole sub-question, marked not complex.
        let llm = ScriptedLlm::new(vec!["not valid JSON"]);
        let processor = QueryProcessor::new(&llm);
        let opts = QueryProcessorOptions::skip([Stage::Rewrite, Stage::Expand]);
        let result = processor.process(ctx("original question"), &opts).await;
        assert_eq!(result.sub_questions, vec!["original question".to_string()]);
        assert!(!result.is_complex);
    }

    #[tokio::test]
    async fn decompose_parses_valid_json_and_marks_complex() {
        let llm = ScriptedLlm::new(vec![r#"{"sub_questions": ["a", "b"]}"#]);
        let processor = QueryProcessor::new(&llm);
        let opts = QueryProcessorOptions::skip([Stage::Rewrite, Stage::Expand]);
        let result = processor.process(ctx("q"), &opts).await;
        assert_eq!(result.sub_questions, vec!["a".to_string(), "b".to_string()]);
        assert!(result.is_complex);
    }

    #[tokio::test]
    async fn decompose_accepts_questions_key_alias() {
        let llm = ScriptedLlm::new(vec![r#"{"questions": ["only one"]}"#]);
        let processor = QueryProcessor::new(&llm);
        let opts = QueryProcessorOptions::skip([Stage::Rewrite, Stage::Expand]);
        let result = processor.process(ctx("q"), &opts).await;
        assert_eq!(result.sub_questions, vec!["only one".to_string()]);
        assert!(!result.is_complex);
    }

    #[tokio::test]
    async fn halted_context_passes_through_unchanged() {
        let llm = ScriptedLlm::new(vec!["unused"]);
        let processor = QueryProcessor::new(&llm);
        let halted = ctx("q").halt("boom");
        let result = processor.process(halted, &QueryProcessorOptions::default()).await;
        assert!(result.rewritten_query.is_none());
    }
}
