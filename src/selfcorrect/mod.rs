//! Self-correcting search and answer loops: bounded retries around an LLM
//! sufficiency/grounding check. Grounded in the teacher's
//! `llm/coordinator.rs::ToolCoordinator::execute` bounded-iteration shape
//! (`for iteration in 0..self.config.max_iterations`), generalized from
//! tool-calling turns to search/answer refinement turns.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::adapters::llm::{instrumented_generate, LlmClient};
use crate::context::Context;
use crate::error::Result;
use crate::telemetry::{NullTelemetrySink, Telemetry, TelemetrySink};
use crate::types::RetrievalResult;

/// One retrieval call the self-correcting search loop can retry against.
/// Implemented by [`crate::retrieval::RetrieverComposer`] bound to a fixed
/// mode, or by a test double.
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>>;
}

#[derive(Clone)]
pub struct SelfCorrectingSearchOptions {
    pub max_iterations: u32,
    pub min_results: usize,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Default for SelfCorrectingSearchOptions {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            min_results: 1,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct Sufficiency {
    sufficient: bool,
    #[serde(default)]
    reasoning: Option<String>,
}

fn parse_json_object<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Runs the bounded search/sufficiency-check loop described by §4.6.
pub async fn self_correcting_search(
    mut ctx: Context,
    searcher: &dyn Searcher,
    llm: &dyn LlmClient,
    opts: &SelfCorrectingSearchOptions,
) -> Context {
    if ctx.halted {
        return ctx;
    }

    let telemetry = Telemetry::new(opts.telemetry.as_ref());

    for _ in 0..opts.max_iterations {
        let query = ctx.effective_query().to_string();
        let span = telemetry.start("rag.search", &[("mode", "self_correcting")]);
        let results = match searcher.search(&query).await {
            Ok(results) => results,
            Err(error) => {
                span.exception(&error.to_string());
                return ctx.halt(error.to_string());
            }
        };
        let result_count = results.len().to_string();
        span.stop(&[("result_count", &result_count)]);

        if results.is_empty() && opts.min_results > 0 {
            let prompt = format!("The search for \"{query}\" returned no results. Suggest a better search query.");
            if let Ok(rewritten) = instrumented_generate(opts.telemetry.as_ref(), llm, &prompt).await {
                ctx.rewritten_query = Some(rewritten.trim().to_string());
                ctx.expanded_query = None;
            }
            continue;
        }

        let eval_prompt = format!(
            "Question: {}\n\nResults:\n{}\n\nAre these results sufficient to answer the question? \
             Respond with JSON {{\"sufficient\": bool, \"reasoning\": string}}.",
            ctx.question,
            results.iter().map(|r| r.content.clone().unwrap_or_default()).collect::<Vec<_>>().join("\n---\n")
        );

        let sufficiency = match instrumented_generate(opts.telemetry.as_ref(), llm, &eval_prompt).await {
            Ok(response) => parse_json_object::<Sufficiency>(&response).unwrap_or(Sufficiency {
                sufficient: true,
                reasoning: None,
            }),
            // Fail-open: an LLM error means we trust the current results.
            Err(_) => Sufficiency {
                sufficient: true,
                reasoning: None,
            },
        };

        if sufficiency.sufficient {
            ctx.results = results;
            return ctx;
        }

        let reason = sufficiency.reasoning.unwrap_or_else(|| "insufficient results".to_string());
        let improve_prompt = format!(
            "The previous search for \"{query}\" was judged insufficient: {reason}\n\
             Suggest an improved search query."
        );
        if let Ok(improved) = instrumented_generate(opts.telemetry.as_ref(), llm, &improve_prompt).await {
            ctx.rewritten_query = Some(improved.trim().to_string());
            ctx.expanded_query = None;
        }
        ctx.record_correction("search", reason.clone());
        let correction_count = ctx.correction_count.to_string();
        telemetry.counter("rag.self_correct", &[("correction_count", &correction_count), ("reason", &reason)]);
        ctx.results = results;
    }

    ctx
}

#[derive(Clone)]
pub struct SelfCorrectingAnswerOptions {
    pub max_corrections: u32,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Default for SelfCorrectingAnswerOptions {
    fn default() -> Self {
        Self {
            max_corrections: 2,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct Grounding {
    grounded: bool,
    #[serde(default)]
    score: Option<f32>,
}

fn build_answer_prompt(question: &str, results: &[RetrievalResult], feedback: Option<&str>) -> String {
    let context = results
        .iter()
        .map(|r| r.content.clone().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n---\n");
    match feedback {
        Some(feedback) => format!(
            "Question: {question}\n\nContext:\n{context}\n\nYour previous answer was found \
             ungrounded: {feedback}\nAnswer again, citing only the context above."
        ),
        None => format!("Question: {question}\n\nContext:\n{context}\n\nAnswer using only the context above."),
    }
}

/// Generates an answer from `ctx.results`, then checks groundedness and
/// retries up to `max_corrections` times (§4.7).
pub async fn self_correcting_answer(mut ctx: Context, llm: &dyn LlmClient, opts: &SelfCorrectingAnswerOptions) -> Context {
    if ctx.halted {
        return ctx;
    }

    let telemetry = Telemetry::new(opts.telemetry.as_ref());
    let mut feedback: Option<String> = None;
    loop {
        let prompt = build_answer_prompt(&ctx.question, &ctx.results, feedback.as_deref());
        let answer = match instrumented_generate(opts.telemetry.as_ref(), llm, &prompt).await {
            Ok(answer) => answer,
            Err(error) => return ctx.halt(error.to_string()),
        };

        let grounding_prompt = format!(
            "Question: {}\n\nAnswer: {answer}\n\nIs this answer grounded in the provided context? \
             Respond with JSON {{\"grounded\": bool, \"score\": float}}.",
            ctx.question
        );
        let verdict = match instrumented_generate(opts.telemetry.as_ref(), llm, &grounding_prompt).await {
            Ok(response) => parse_json_object::<Grounding>(&response).unwrap_or(Grounding {
                grounded: true,
                score: None,
            }),
            Err(_) => Grounding { grounded: true, score: None },
        };

        ctx.answer = Some(answer);
        ctx.grounding_verdict = Some(crate::context::GroundingVerdict {
            grounded: verdict.grounded,
            score: verdict.score,
        });

        if verdict.grounded || ctx.correction_count >= opts.max_corrections {
            return ctx;
        }

        feedback = Some(format!("grounding score {:.2}", verdict.score.unwrap_or(0.0)));
        let reason = feedback.clone().unwrap_or_default();
        ctx.record_correction("answer", reason.clone());
        let correction_count = ctx.correction_count.to_string();
        telemetry.counter("rag.self_correct", &[("correction_count", &correction_count), ("reason", &reason)]);
    }
}
