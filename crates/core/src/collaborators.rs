//! External collaborator interfaces.
//!
//! The pipeline talks to three outside services: a catalog that enumerates databases and
//! tables, a query executor that returns patient-scoped rows, and an LLM that completes text.
//! Each is a trait so the runner can inject real clients and tests can inject stubs.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use summary_types::Identifier;

/// Errors raised by the catalog and query-execution collaborators.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("warehouse backend error: {0}")]
    Backend(String),
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Errors raised by the LLM collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request to model {model} timed out after {}s", after.as_secs())]
    Timeout { model: String, after: Duration },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },
}

pub type LlmResult<T> = Result<T, LlmError>;

/// Which columns a [`Query`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<Identifier>),
}

/// Equality filter on one column. The value is always bound, never interpolated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: Identifier,
    pub value: String,
}

/// A typed single-table query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub database: Identifier,
    pub table: Identifier,
    pub projection: Projection,
    pub filter: Option<Filter>,
}

impl Query {
    /// All columns of `table` for rows whose `patient_column` equals `patient_id`.
    pub fn patient_rows(
        database: &Identifier,
        table: &Identifier,
        patient_column: &Identifier,
        patient_id: &str,
    ) -> Self {
        Self {
            database: database.clone(),
            table: table.clone(),
            projection: Projection::All,
            filter: Some(Filter {
                column: patient_column.clone(),
                value: patient_id.to_owned(),
            }),
        }
    }

    /// A single column of every row of `table`.
    pub fn column(database: &Identifier, table: &Identifier, column: &Identifier) -> Self {
        Self {
            database: database.clone(),
            table: table.clone(),
            projection: Projection::Columns(vec![column.clone()]),
            filter: None,
        }
    }
}

/// Rows returned by the query executor, columns in declared order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// One prompt for the LLM collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_databases(&self) -> WarehouseResult<Vec<Identifier>>;

    async fn list_tables(&self, database: &Identifier) -> WarehouseResult<Vec<Identifier>>;
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &Query) -> WarehouseResult<ResultSet>;
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(&self, request: &CompletionRequest) -> LlmResult<String>;
}

/// Invoke the LLM with a hard deadline.
///
/// Elapsed deadlines become [`LlmError::Timeout`] and blank completions become
/// [`LlmError::EmptyResponse`], so callers never see an empty success.
pub async fn invoke_with_timeout(
    llm: &dyn LlmClient,
    request: &CompletionRequest,
    timeout: Duration,
) -> LlmResult<String> {
    let text = match tokio::time::timeout(timeout, llm.invoke(request)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(LlmError::Timeout {
                model: request.model.clone(),
                after: timeout,
            })
        }
    };

    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}
