//! Per-table section summaries.

use crate::budget::{plan_chunks, SectionBudget};
use crate::collaborators::{invoke_with_timeout, CompletionRequest, LlmClient};
use crate::constants::{CHUNK_MERGE_TEMPLATE, SUMMARISER_SYSTEM_PROMPT};
use crate::error::{Stage, SummaryError, SummaryResult};
use crate::extract::TableExtract;
use crate::prompts::fill;
use std::sync::Arc;
use std::time::Duration;
use summary_types::Identifier;

/// Natural-language summary of one table extract.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SectionSummary {
    pub table: Identifier,
    pub summary: String,
    /// Number of chunks the rows were split into (1 unless the table exceeded the budget).
    pub chunks: usize,
    /// Rows dropped because the chunk cap was reached.
    pub omitted_rows: usize,
}

pub struct SectionSummarizer {
    llm: Arc<dyn LlmClient>,
    budget: SectionBudget,
    timeout: Duration,
}

impl SectionSummarizer {
    pub fn new(llm: Arc<dyn LlmClient>, budget: SectionBudget, timeout: Duration) -> Self {
        Self {
            llm,
            budget,
            timeout,
        }
    }

    /// Summarise one extract.
    ///
    /// Returns `Ok(None)` for an extract without rows; the LLM is not called. Rows that exceed
    /// the budget are summarised chunk by chunk and the partial summaries merged with one more
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`SummaryError::Llm`] tagged with this table if any call fails, times out or
    /// comes back empty.
    pub async fn summarize(
        &self,
        extract: &TableExtract,
        template: &str,
        model: &str,
    ) -> SummaryResult<Option<SectionSummary>> {
        let table = &extract.table;
        if extract.is_empty() {
            tracing::debug!(table = %table, "no rows for patient, skipping section");
            return Ok(None);
        }

        let plan = plan_chunks(extract, &self.budget);
        if plan.truncated_rows > 0 || plan.omitted_rows > 0 {
            tracing::warn!(
                table = %table,
                truncated_rows = plan.truncated_rows,
                omitted_rows = plan.omitted_rows,
                "table exceeds section budget"
            );
        }

        let total = plan.chunks.len();
        let mut partials = Vec::with_capacity(total);
        for (index, rows) in plan.chunks.iter().enumerate() {
            let part = if total > 1 {
                format!(" (part {} of {})", index + 1, total)
            } else {
                String::new()
            };
            let prompt = fill(
                template,
                &[("table", table.as_str()), ("part", &part), ("rows", rows)],
            );
            let text = self.call(Stage::SectionSummary, table, model, prompt).await?;
            partials.push(text.trim().to_string());
        }

        let summary = if partials.len() == 1 {
            partials.remove(0)
        } else {
            self.merge(table, model, &partials).await?
        };

        Ok(Some(SectionSummary {
            table: table.clone(),
            summary,
            chunks: total,
            omitted_rows: plan.omitted_rows,
        }))
    }

    async fn merge(
        &self,
        table: &Identifier,
        model: &str,
        partials: &[String],
    ) -> SummaryResult<String> {
        let joined = partials
            .iter()
            .enumerate()
            .map(|(i, text)| format!("[part {}]\n{}", i + 1, text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = fill(
            CHUNK_MERGE_TEMPLATE,
            &[("table", table.as_str()), ("summaries", &joined)],
        );
        let text = self.call(Stage::ChunkMerge, table, model, prompt).await?;
        Ok(text.trim().to_string())
    }

    async fn call(
        &self,
        stage: Stage,
        table: &Identifier,
        model: &str,
        prompt: String,
    ) -> SummaryResult<String> {
        let request = CompletionRequest {
            model: model.to_string(),
            prompt,
            system_prompt: Some(SUMMARISER_SYSTEM_PROMPT.to_string()),
        };
        invoke_with_timeout(self.llm.as_ref(), &request, self.timeout)
            .await
            .map_err(|source| SummaryError::Llm {
                stage,
                table: Some(table.clone()),
                source,
            })
    }
}
