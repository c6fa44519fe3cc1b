//! Patient summary pipeline: select, summarise per table, consolidate.
//!
//! Tables are processed concurrently (bounded by `max_concurrent_sections`) and their results
//! are gathered in request order. Consolidation waits for every table. A failed table either
//! aborts the request or is reported in [`PatientSummary::failures`], depending on the
//! [`FailurePolicy`].

use crate::budget::SectionBudget;
use crate::collaborators::{LlmClient, QueryExecutor};
use crate::config::{FailurePolicy, SummaryConfig};
use crate::consolidate::Consolidator;
use crate::error::{Stage, SummaryError, SummaryResult};
use crate::section::{SectionSummarizer, SectionSummary};
use crate::selector::TableSelector;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use summary_types::{Identifier, NonEmptyText};

/// A validated summary request.
#[derive(Clone, Debug)]
pub struct SummaryRequest {
    pub database: Identifier,
    pub tables: Vec<Identifier>,
    pub patient_id: NonEmptyText,
    pub prompt_template: NonEmptyText,
    /// Model for section summaries; the configured default when `None`.
    pub model: Option<NonEmptyText>,
    /// Model for consolidation; the configured default when `None`.
    pub summary_model: Option<NonEmptyText>,
    /// Overrides the configured failure policy for this request.
    pub failure_policy: Option<FailurePolicy>,
}

/// Marker for a requested table that produced no summary because it failed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SectionFailure {
    pub table: Identifier,
    pub stage: Stage,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PatientSummary {
    pub consolidated_summary: String,
    /// One entry per table that yielded rows, in request order.
    pub sections: Vec<SectionSummary>,
    /// Requested tables with no rows for the patient.
    pub empty_tables: Vec<Identifier>,
    pub failures: Vec<SectionFailure>,
}

enum TableOutcome {
    Summarized(SectionSummary),
    Empty(Identifier),
    Failed(Identifier, SummaryError),
}

pub struct SummaryService {
    cfg: Arc<SummaryConfig>,
    selector: TableSelector,
    summarizer: SectionSummarizer,
    consolidator: Consolidator,
}

impl SummaryService {
    pub fn new(
        cfg: Arc<SummaryConfig>,
        executor: Arc<dyn QueryExecutor>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let limits = cfg.limits();
        let budget = SectionBudget {
            max_chars: limits.section_char_budget,
            max_chunks: limits.max_chunks_per_section,
        };
        Self {
            selector: TableSelector::new(executor, cfg.patient_column().clone()),
            summarizer: SectionSummarizer::new(llm.clone(), budget, limits.llm_timeout),
            consolidator: Consolidator::new(llm, limits.llm_timeout),
            cfg,
        }
    }

    /// Produce the consolidated summary and per-table summaries for one patient.
    ///
    /// # Errors
    ///
    /// - [`SummaryError::InvalidInput`] if no tables were requested.
    /// - Under [`FailurePolicy::Abort`], the first failed table's error in request order.
    /// - [`SummaryError::Llm`] with stage `consolidation` if the final call fails.
    pub async fn summarize(&self, request: SummaryRequest) -> SummaryResult<PatientSummary> {
        let tables = dedup_tables(&request.tables);
        if tables.is_empty() {
            return Err(SummaryError::InvalidInput(
                "at least one table must be requested".into(),
            ));
        }

        let model = request
            .model
            .as_ref()
            .unwrap_or(self.cfg.default_model())
            .as_str();
        let summary_model = request
            .summary_model
            .as_ref()
            .unwrap_or(self.cfg.default_summary_model())
            .as_str();
        let policy = request
            .failure_policy
            .unwrap_or_else(|| self.cfg.failure_policy());
        let patient_id = request.patient_id.as_str();

        tracing::info!(
            database = %request.database,
            tables = tables.len(),
            ?policy,
            "summarising patient record"
        );

        let pending: Vec<_> = tables
            .iter()
            .map(|table| self.summarize_table(&request.database, table, patient_id, model))
            .collect();
        let outcomes: Vec<TableOutcome> = stream::iter(pending)
            .buffered(self.cfg.limits().max_concurrent_sections)
            .collect()
            .await;

        let mut sections = Vec::new();
        let mut empty_tables = Vec::new();
        let mut failures = Vec::new();

        for outcome in outcomes {
            match outcome {
                TableOutcome::Summarized(section) => sections.push(section),
                TableOutcome::Empty(table) => empty_tables.push(table),
                TableOutcome::Failed(table, err) => match policy {
                    FailurePolicy::Abort => {
                        tracing::error!(table = %table, error = %err, "aborting summary");
                        return Err(err);
                    }
                    FailurePolicy::Skip => {
                        tracing::warn!(table = %table, error = %err, "skipping failed table");
                        failures.push(SectionFailure {
                            stage: err.stage().unwrap_or(Stage::Query),
                            message: err.public_message(),
                            table,
                        });
                    }
                },
            }
        }

        let consolidated_summary = self
            .consolidator
            .consolidate(
                &sections,
                request.prompt_template.as_str(),
                patient_id,
                summary_model,
            )
            .await?;

        Ok(PatientSummary {
            consolidated_summary,
            sections,
            empty_tables,
            failures,
        })
    }

    async fn summarize_table(
        &self,
        database: &Identifier,
        table: &Identifier,
        patient_id: &str,
        model: &str,
    ) -> TableOutcome {
        let extract = match self.selector.select_one(database, table, patient_id).await {
            Ok(extract) => extract,
            Err(source) => {
                return TableOutcome::Failed(
                    table.clone(),
                    SummaryError::Query {
                        table: table.clone(),
                        source,
                    },
                )
            }
        };

        match self
            .summarizer
            .summarize(&extract, self.cfg.section_template(), model)
            .await
        {
            Ok(Some(section)) => TableOutcome::Summarized(section),
            Ok(None) => TableOutcome::Empty(table.clone()),
            Err(err) => TableOutcome::Failed(table.clone(), err),
        }
    }
}

fn dedup_tables(tables: &[Identifier]) -> Vec<Identifier> {
    let mut seen = std::collections::HashSet::new();
    tables
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}
