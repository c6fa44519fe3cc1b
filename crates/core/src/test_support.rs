//! Stub collaborators for unit tests.

use crate::collaborators::{
    Catalog, CompletionRequest, LlmClient, LlmError, LlmResult, Projection, Query, QueryExecutor,
    ResultSet, WarehouseError, WarehouseResult,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::Duration;
use summary_types::Identifier;

pub(crate) fn ident(name: &str) -> Identifier {
    Identifier::parse(name).expect("test identifier should be valid")
}

/// Scripted LLM reply.
pub(crate) enum Reply {
    Text(String),
    Delayed(Duration, String),
    Fail(LlmError),
    Hang,
}

type Script = Box<dyn Fn(&CompletionRequest) -> Reply + Send + Sync>;

/// LLM stub that records every request and answers from a script.
pub(crate) struct StubLlm {
    script: Script,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubLlm {
    pub(crate) fn new(script: impl Fn(&CompletionRequest) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies with the prompt text itself.
    pub(crate) fn echo() -> Self {
        Self::new(|req| Reply::Text(req.prompt.clone()))
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn invoke(&self, request: &CompletionRequest) -> LlmResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        match (self.script)(request) {
            Reply::Text(text) => Ok(text),
            Reply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// In-memory warehouse keyed by `(database, table)`.
#[derive(Default)]
pub(crate) struct StubWarehouse {
    tables: BTreeMap<(String, String), ResultSet>,
    failing: BTreeSet<String>,
    queries: Mutex<Vec<Query>>,
}

impl StubWarehouse {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_table(
        mut self,
        database: &str,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.tables.insert(
            (database.to_owned(), table.to_owned()),
            ResultSet {
                columns: columns.iter().map(|c| (*c).to_owned()).collect(),
                rows,
            },
        );
        self
    }

    /// Adds `count` rows for `patient_id` to a `(patient_id, code, value)` table.
    pub(crate) fn with_patient_rows(
        self,
        database: &str,
        table: &str,
        patient_id: &str,
        count: usize,
    ) -> Self {
        let rows = (0..count)
            .map(|i| vec![json!(patient_id), json!(format!("code-{i}")), json!(i)])
            .collect();
        self.with_table(database, table, &["patient_id", "code", "value"], rows)
    }

    pub(crate) fn failing_table(mut self, table: &str) -> Self {
        self.failing.insert(table.to_owned());
        self
    }

    pub(crate) fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Catalog for StubWarehouse {
    async fn list_databases(&self) -> WarehouseResult<Vec<Identifier>> {
        let names: BTreeSet<&str> = self.tables.keys().map(|(db, _)| db.as_str()).collect();
        Ok(names.into_iter().map(ident).collect())
    }

    async fn list_tables(&self, database: &Identifier) -> WarehouseResult<Vec<Identifier>> {
        let tables: Vec<Identifier> = self
            .tables
            .keys()
            .filter(|(db, _)| db == database.as_str())
            .map(|(_, table)| ident(table))
            .collect();
        if tables.is_empty() {
            return Err(WarehouseError::NotFound(format!("database {database}")));
        }
        Ok(tables)
    }
}

#[async_trait]
impl QueryExecutor for StubWarehouse {
    async fn execute(&self, query: &Query) -> WarehouseResult<ResultSet> {
        self.queries.lock().unwrap().push(query.clone());

        if self.failing.contains(query.table.as_str()) {
            return Err(WarehouseError::Backend(format!(
                "table {} is unavailable",
                query.table
            )));
        }

        let key = (query.database.to_string(), query.table.to_string());
        let set = self
            .tables
            .get(&key)
            .ok_or_else(|| WarehouseError::NotFound(format!("table {}", query.table)))?;

        let mut rows: Vec<Vec<Value>> = match &query.filter {
            Some(filter) => {
                let idx = set
                    .columns
                    .iter()
                    .position(|c| c == filter.column.as_str())
                    .ok_or_else(|| {
                        WarehouseError::InvalidQuery(format!("no column {}", filter.column))
                    })?;
                set.rows
                    .iter()
                    .filter(|row| row.get(idx) == Some(&Value::String(filter.value.clone())))
                    .cloned()
                    .collect()
            }
            None => set.rows.clone(),
        };

        let columns = match &query.projection {
            Projection::All => set.columns.clone(),
            Projection::Columns(wanted) => {
                let indices: Vec<usize> = wanted
                    .iter()
                    .filter_map(|w| set.columns.iter().position(|c| c == w.as_str()))
                    .collect();
                rows = rows
                    .into_iter()
                    .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                wanted.iter().map(|w| w.to_string()).collect()
            }
        };

        Ok(ResultSet { columns, rows })
    }
}
