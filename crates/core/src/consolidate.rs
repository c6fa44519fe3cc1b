//! Consolidation of section summaries into one narrative.

use crate::collaborators::{invoke_with_timeout, CompletionRequest, LlmClient};
use crate::constants::{NO_RECORD_DATA_SUMMARY, SUMMARISER_SYSTEM_PROMPT};
use crate::error::{Stage, SummaryError, SummaryResult};
use crate::prompts::{fill, has_placeholder};
use crate::section::SectionSummary;
use std::sync::Arc;
use std::time::Duration;

pub struct Consolidator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Consolidator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Build the consolidation prompt from the caller's template.
    ///
    /// `{summaries}` receives the tagged section blocks and `{patient_id}` the patient
    /// identifier. A template without `{summaries}` gets the blocks appended.
    pub fn build_prompt(template: &str, sections: &[SectionSummary], patient_id: &str) -> String {
        let blocks = render_sections(sections);
        if has_placeholder(template, "summaries") {
            fill(
                template,
                &[("summaries", &blocks), ("patient_id", patient_id)],
            )
        } else {
            let head = fill(template, &[("patient_id", patient_id)]);
            format!("{}\n\n<sections>\n{}\n</sections>", head.trim_end(), blocks)
        }
    }

    /// Merge `sections` into a single summary with one call to `model`.
    ///
    /// With no sections the LLM is not called and [`NO_RECORD_DATA_SUMMARY`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Llm`] with stage `consolidation`; there is no fallback.
    pub async fn consolidate(
        &self,
        sections: &[SectionSummary],
        template: &str,
        patient_id: &str,
        model: &str,
    ) -> SummaryResult<String> {
        if sections.is_empty() {
            tracing::info!("no section summaries to consolidate");
            return Ok(NO_RECORD_DATA_SUMMARY.to_string());
        }

        let request = CompletionRequest {
            model: model.to_string(),
            prompt: Self::build_prompt(template, sections, patient_id),
            system_prompt: Some(SUMMARISER_SYSTEM_PROMPT.to_string()),
        };

        let text = invoke_with_timeout(self.llm.as_ref(), &request, self.timeout)
            .await
            .map_err(|source| SummaryError::Llm {
                stage: Stage::Consolidation,
                table: None,
                source,
            })?;
        Ok(text.trim().to_string())
    }
}

fn render_sections(sections: &[SectionSummary]) -> String {
    sections
        .iter()
        .map(|s| format!("<section table=\"{}\">\n{}\n</section>", s.table, s.summary))
        .collect::<Vec<_>>()
        .join("\n\n")
}
