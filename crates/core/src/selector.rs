//! Table selection: turn requested table names into patient-scoped extracts.
//!
//! The selector does not check that the patient exists. It issues one scoped query per table
//! and reports each outcome separately; whether a failed table aborts the request is decided
//! by the caller.

use crate::collaborators::{Query, QueryExecutor, WarehouseError};
use crate::extract::TableExtract;
use std::sync::Arc;
use summary_types::Identifier;

pub struct TableSelector {
    executor: Arc<dyn QueryExecutor>,
    patient_column: Identifier,
}

impl TableSelector {
    pub fn new(executor: Arc<dyn QueryExecutor>, patient_column: Identifier) -> Self {
        Self {
            executor,
            patient_column,
        }
    }

    /// Fetch one table's rows for `patient_id`.
    pub async fn select_one(
        &self,
        database: &Identifier,
        table: &Identifier,
        patient_id: &str,
    ) -> Result<TableExtract, WarehouseError> {
        let query = Query::patient_rows(database, table, &self.patient_column, patient_id);
        let set = self.executor.execute(&query).await?;
        tracing::debug!(
            table = %table,
            rows = set.rows.len(),
            "fetched patient rows"
        );
        Ok(TableExtract::from_result_set(
            database.clone(),
            table.clone(),
            set,
        ))
    }

    /// Fetch every requested table in order, one outcome per table.
    pub async fn select(
        &self,
        database: &Identifier,
        tables: &[Identifier],
        patient_id: &str,
    ) -> Vec<(Identifier, Result<TableExtract, WarehouseError>)> {
        let mut outcomes = Vec::with_capacity(tables.len());
        for table in tables {
            let outcome = self.select_one(database, table, patient_id).await;
            outcomes.push((table.clone(), outcome));
        }
        outcomes
    }
}
