use crate::collaborators::{LlmError, WarehouseError};
use summary_types::Identifier;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Query,
    SectionSummary,
    ChunkMerge,
    Consolidation,
    Chat,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Query => "query",
            Stage::SectionSummary => "section_summary",
            Stage::ChunkMerge => "chunk_merge",
            Stage::Consolidation => "consolidation",
            Stage::Chat => "chat",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read section template: {0}")]
    TemplateRead(std::io::Error),

    #[error("catalog error: {0}")]
    Catalog(#[source] WarehouseError),

    #[error("query failed for table {table}: {source}")]
    Query {
        table: Identifier,
        #[source]
        source: WarehouseError,
    },

    #[error("{stage} failed{}: {source}", table_suffix(.table))]
    Llm {
        stage: Stage,
        table: Option<Identifier>,
        #[source]
        source: LlmError,
    },
}

impl SummaryError {
    /// The pipeline stage the error belongs to, if it came from a collaborator call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SummaryError::Query { .. } => Some(Stage::Query),
            SummaryError::Llm { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The table the error is attributed to, if any.
    pub fn table(&self) -> Option<&Identifier> {
        match self {
            SummaryError::Query { table, .. } => Some(table),
            SummaryError::Llm { table, .. } => table.as_ref(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SummaryError::Llm {
                source: LlmError::Timeout { .. },
                ..
            }
        )
    }

    /// Message safe to return to API callers.
    ///
    /// Keeps stage and table context but drops backend detail such as driver messages or
    /// upstream response bodies. The full error is still available through `Display`.
    pub fn public_message(&self) -> String {
        match self {
            SummaryError::InvalidInput(msg) => msg.clone(),
            SummaryError::Config(_) | SummaryError::TemplateRead(_) => {
                "service is misconfigured".into()
            }
            SummaryError::Catalog(source) => {
                format!("catalog lookup failed: {}", warehouse_message(source))
            }
            SummaryError::Query { table, source } => {
                format!("query failed for table {table}: {}", warehouse_message(source))
            }
            SummaryError::Llm {
                stage,
                table,
                source,
            } => format!("{stage} failed{}: {}", table_suffix(table), llm_message(source)),
        }
    }
}

fn warehouse_message(err: &WarehouseError) -> String {
    match err {
        WarehouseError::NotFound(what) => format!("{what} not found"),
        WarehouseError::InvalidQuery(_) => "invalid query".into(),
        WarehouseError::Backend(_) => "warehouse backend error".into(),
    }
}

fn llm_message(err: &LlmError) -> String {
    match err {
        LlmError::Timeout { after, .. } => {
            format!("model call timed out after {}s", after.as_secs())
        }
        LlmError::EmptyResponse => "model returned an empty response".into(),
        LlmError::Transport(_) => "model service unreachable".into(),
        LlmError::Api { status, .. } => format!("model API returned status {status}"),
    }
}

fn table_suffix(table: &Option<Identifier>) -> String {
    table
        .as_ref()
        .map(|t| format!(" for table {t}"))
        .unwrap_or_default()
}

pub type SummaryResult<T> = std::result::Result<T, SummaryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn llm_error_message_names_stage_and_table() {
        let err = SummaryError::Llm {
            stage: Stage::SectionSummary,
            table: Some(Identifier::parse("conditions").unwrap()),
            source: LlmError::Timeout {
                model: "m".into(),
                after: Duration::from_secs(5),
            },
        };

        let msg = err.to_string();
        assert!(msg.contains("section_summary"), "got: {msg}");
        assert!(msg.contains("conditions"), "got: {msg}");
        assert!(err.is_timeout());
        assert_eq!(err.stage(), Some(Stage::SectionSummary));
    }

    #[test]
    fn consolidation_error_has_no_table() {
        let err = SummaryError::Llm {
            stage: Stage::Consolidation,
            table: None,
            source: LlmError::EmptyResponse,
        };

        assert_eq!(err.to_string(), "consolidation failed: model returned an empty response");
        assert!(err.table().is_none());
        assert!(!err.is_timeout());
    }

    #[test]
    fn public_message_drops_backend_detail() {
        let err = SummaryError::Query {
            table: Identifier::parse("observation").unwrap(),
            source: WarehouseError::Backend("disk I/O error at /var/lib/warehouse".into()),
        };
        assert_eq!(
            err.public_message(),
            "query failed for table observation: warehouse backend error"
        );

        let err = SummaryError::Llm {
            stage: Stage::Chat,
            table: None,
            source: LlmError::Api {
                status: 503,
                message: "upstream trace id 1234".into(),
            },
        };
        let msg = err.public_message();
        assert_eq!(msg, "chat failed: model API returned status 503");
        assert!(!msg.contains("trace"));
    }
}
