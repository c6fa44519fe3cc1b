//! Grounded question answering over a record summary.
//!
//! Each call is stateless: compose one prompt that embeds the context and the refusal
//! instructions, invoke the model once, return its text unchanged. Multi-turn use means the
//! caller resubmits the full context.

use crate::collaborators::{invoke_with_timeout, CompletionRequest, LlmClient};
use crate::constants::{CHAT_SYSTEM_PROMPT, EMPTY_CONTEXT_ANSWER};
use crate::error::{Stage, SummaryError, SummaryResult};
use std::sync::Arc;
use std::time::Duration;

pub struct GroundedChat {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl GroundedChat {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Build the request for one question.
    pub fn compose(question: &str, context: &str, model: &str) -> CompletionRequest {
        let question = question.trim();
        let question_mark = if question.ends_with('?') { "" } else { "?" };
        let prompt = format!(
            "Here is a medical record:\n\
             <record>\n\
             {context}\n\
             </record>\n\
             \n\
             Review the medical record thoroughly.\n\
             Answer the question using only information contained in the medical record.\n\
             Do not include or reference quoted content verbatim in the answer.\n\
             If the question cannot be answered from the medical record, say so plainly \
             instead of guessing.\n\
             \n\
             Question: {question}{question_mark}"
        );

        CompletionRequest {
            model: model.to_string(),
            prompt,
            system_prompt: Some(CHAT_SYSTEM_PROMPT.to_string()),
        }
    }

    /// Answer `question` from `context`.
    ///
    /// A blank context is answered with [`EMPTY_CONTEXT_ANSWER`] without calling the model.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Llm`] with stage `chat` when the model call fails.
    pub async fn answer(&self, question: &str, context: &str, model: &str) -> SummaryResult<String> {
        if context.trim().is_empty() {
            tracing::info!("chat context is empty, refusing without a model call");
            return Ok(EMPTY_CONTEXT_ANSWER.to_string());
        }

        let request = Self::compose(question, context, model);
        invoke_with_timeout(self.llm.as_ref(), &request, self.timeout)
            .await
            .map_err(|source| SummaryError::Llm {
                stage: Stage::Chat,
                table: None,
                source,
            })
    }
}
