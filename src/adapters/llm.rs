//! The LLM capability, grounded in the teacher's
//! `llm/client.rs::LLMClient` contract, trimmed to what the query
//! processor, reranker, self-correction loops, and GraphRAG extraction
//! actually call: single-shot completion with an optional system prompt and
//! a conversation-history variant. Streaming and tool-calling are out of
//! scope here (no outward-facing chat surface in this crate).

use async_trait::async_trait;

use crate::error::Result;
use crate::telemetry::{Telemetry, TelemetrySink};

/// A chat message role, reused by `generate_with_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Generates text completions from an upstream model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-shot completion from a plain prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Completion with a system prompt steering the model's behavior.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Completion given prior turns, `(role, content)` pairs in order.
    async fn generate_with_history(&self, messages: &[(Role, String)]) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Calls `llm.generate`, wrapped in an `llm.complete` span (§6). `prompt_tokens`/
/// `input_tokens`/`output_tokens` aren't emitted since [`LlmClient::generate`]
/// returns no usage data to report honestly.
pub async fn instrumented_generate(telemetry: &dyn TelemetrySink, llm: &dyn LlmClient, prompt: &str) -> Result<String> {
    let t = Telemetry::new(telemetry);
    let model = llm.model_name().to_string();
    let prompt_length = prompt.len().to_string();
    let span = t.start("llm.complete", &[("model", &model), ("prompt_length", &prompt_length)]);
    match llm.generate(prompt).await {
        Ok(response) => {
            let response_length = response.len().to_string();
            span.stop(&[("success", "true"), ("response_length", &response_length)]);
            Ok(response)
        }
        Err(error) => {
            span.exception(&error.to_string());
            Err(error)
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A scripted LLM double for unit tests elsewhere in the crate. Not
    //! part of the public API; each module that needs canned responses
    //! builds its own small adapter over this.
    use super::*;
    use parking_lot::Mutex;

    pub struct ScriptedLlm {
        responses: Mutex<std::collections::VecDeque<Result<String>>>,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(|s| Ok(s.to_string())).collect()),
            }
        }

        fn next(&self) -> Result<String> {
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.next()
        }

        async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
            self.next()
        }

        async fn generate_with_history(&self, _messages: &[(Role, String)]) -> Result<String> {
            self.next()
        }

        fn model_name(&self) -> &str {
            "scripted-test-llm"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedLlm;
    use super::*;
    use crate::telemetry::NullTelemetrySink;

    #[tokio::test]
    async fn scripted_llm_replays_responses_in_order() {
        let llm = ScriptedLlm::new(vec!["first", "second"]);
        assert_eq!(llm.generate("x").await.unwrap(), "first");
        assert_eq!(llm.generate("x").await.unwrap(), "second");
        assert_eq!(llm.generate("x").await.unwrap(), "");
    }

    #[tokio::test]
    async fn instrumented_generate_passes_through_the_response() {
        let llm = ScriptedLlm::new(vec!["the answer"]);
        let response = instrumented_generate(&NullTelemetrySink, &llm, "prompt").await.unwrap();
        assert_eq!(response, "the answer");
    }
}
