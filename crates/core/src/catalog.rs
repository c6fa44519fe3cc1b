//! Database, table and patient enumeration.

use crate::collaborators::{Catalog, Query, QueryExecutor};
use crate::constants::{PATIENT_ID_COLUMN, PATIENT_TABLE};
use crate::{SummaryError, SummaryResult};
use serde_json::Value;
use std::sync::Arc;
use summary_types::Identifier;

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn Catalog>,
    executor: Arc<dyn QueryExecutor>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn Catalog>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { catalog, executor }
    }

    /// All database names, sorted.
    pub async fn list_databases(&self) -> SummaryResult<Vec<Identifier>> {
        let mut databases = self
            .catalog
            .list_databases()
            .await
            .map_err(SummaryError::Catalog)?;
        databases.sort();
        Ok(databases)
    }

    /// Table names of `database`, sorted.
    pub async fn list_tables(&self, database: &Identifier) -> SummaryResult<Vec<Identifier>> {
        let mut tables = self
            .catalog
            .list_tables(database)
            .await
            .map_err(SummaryError::Catalog)?;
        tables.sort();
        Ok(tables)
    }

    /// Patient identifiers from the canonical patient table, in warehouse order.
    pub async fn list_patients(&self, database: &Identifier) -> SummaryResult<Vec<String>> {
        let table = Identifier::parse(PATIENT_TABLE)
            .map_err(|e| SummaryError::Config(format!("patient table name: {e}")))?;
        let column = Identifier::parse(PATIENT_ID_COLUMN)
            .map_err(|e| SummaryError::Config(format!("patient id column: {e}")))?;

        let set = self
            .executor
            .execute(&Query::column(database, &table, &column))
            .await
            .map_err(SummaryError::Catalog)?;

        Ok(set
            .rows
            .into_iter()
            .filter_map(|row| match row.into_iter().next() {
                Some(Value::String(id)) => Some(id),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            })
            .collect())
    }
}
