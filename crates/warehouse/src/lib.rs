//! # Summary Warehouse
//!
//! Catalog and query-execution collaborators backed by SQLite.
//!
//! A warehouse is a directory holding one `<database>.db` file per database. Each file holds
//! the flattened record tables (for example `patient`, `observation`, `condition`). Text cells
//! that contain a JSON object or array are returned as structured JSON so nested resource
//! fields survive into the prompts.
//!
//! Queries are built from the typed [`Query`] only: identifiers are validated and quoted, and
//! filter values are always bound parameters.

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use summary_core::collaborators::{Projection, WarehouseResult};
use summary_core::{Catalog, Identifier, Query, QueryExecutor, ResultSet, WarehouseError};

pub const ENV_WAREHOUSE_DIR: &str = "SUMMARY_WAREHOUSE_DIR";
pub const DEFAULT_WAREHOUSE_DIR: &str = "warehouse";

const DATABASE_EXTENSION: &str = "db";

/// Warehouse directory from an optional environment value; blank means the default.
pub fn warehouse_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WAREHOUSE_DIR))
}

/// Warehouse rooted at a directory of SQLite files.
#[derive(Clone, Debug)]
pub struct SqliteWarehouse {
    root: PathBuf,
}

impl SqliteWarehouse {
    /// Create a warehouse over `root`.
    ///
    /// # Errors
    ///
    /// Returns [`WarehouseError::NotFound`] if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> WarehouseResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(WarehouseError::NotFound(format!(
                "warehouse directory {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_path(&self, database: &Identifier) -> WarehouseResult<PathBuf> {
        let path = self
            .root
            .join(format!("{}.{DATABASE_EXTENSION}", database.as_str()));
        if !path.is_file() {
            return Err(WarehouseError::NotFound(format!("database {database}")));
        }
        Ok(path)
    }
}

#[async_trait]
impl Catalog for SqliteWarehouse {
    async fn list_databases(&self) -> WarehouseResult<Vec<Identifier>> {
        let root = self.root.clone();
        run_blocking(move || {
            let entries = std::fs::read_dir(&root).map_err(|e| {
                WarehouseError::Backend(format!("failed to read warehouse directory: {e}"))
            })?;

            let mut databases = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some(DATABASE_EXTENSION)
                {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match Identifier::parse(stem) {
                    Ok(id) => databases.push(id),
                    Err(e) => tracing::warn!("ignoring database file {}: {e}", path.display()),
                }
            }
            databases.sort();
            Ok(databases)
        })
        .await
    }

    async fn list_tables(&self, database: &Identifier) -> WarehouseResult<Vec<Identifier>> {
        let path = self.database_path(database)?;
        run_blocking(move || {
            let conn = open_read_only(&path)?;
            Ok(table_names(&conn)?
                .into_iter()
                .filter_map(|name| Identifier::parse(&name).ok())
                .collect())
        })
        .await
    }
}

#[async_trait]
impl QueryExecutor for SqliteWarehouse {
    async fn execute(&self, query: &Query) -> WarehouseResult<ResultSet> {
        let path = self.database_path(&query.database)?;
        let query = query.clone();
        run_blocking(move || {
            let conn = open_read_only(&path)?;
            if !table_names(&conn)?.iter().any(|t| t == query.table.as_str()) {
                return Err(WarehouseError::NotFound(format!(
                    "table {} in database {}",
                    query.table, query.database
                )));
            }
            execute_query(&conn, &query)
        })
        .await
    }
}

async fn run_blocking<T, F>(work: F) -> WarehouseResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> WarehouseResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| WarehouseError::Backend(format!("warehouse task failed: {e}")))?
}

fn backend(err: rusqlite::Error) -> WarehouseError {
    WarehouseError::Backend(err.to_string())
}

fn open_read_only(path: &Path) -> WarehouseResult<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(backend)
}

fn table_names(conn: &Connection) -> WarehouseResult<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .map_err(backend)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(backend)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend)?;
    Ok(names)
}

/// Render the SQL for `query`. The filter value is left as parameter `?1`.
///
/// Rows come back in SQLite scan order; views and `WITHOUT ROWID` tables have no rowid to
/// sort by.
pub fn build_sql(query: &Query) -> String {
    let projection = match &query.projection {
        Projection::All => "*".to_string(),
        Projection::Columns(columns) => columns
            .iter()
            .map(Identifier::quoted)
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!("SELECT {projection} FROM {}", query.table.quoted());
    if let Some(filter) = &query.filter {
        sql.push_str(&format!(" WHERE {} = ?1", filter.column.quoted()));
    }
    sql
}

fn execute_query(conn: &Connection, query: &Query) -> WarehouseResult<ResultSet> {
    let sql = build_sql(query);
    tracing::debug!(%sql, "executing warehouse query");

    let mut stmt = conn.prepare(&sql).map_err(|e| match e {
        rusqlite::Error::SqliteFailure(_, Some(ref msg)) if msg.contains("no such column") => {
            WarehouseError::InvalidQuery(msg.clone())
        }
        other => backend(other),
    })?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = match &query.filter {
        Some(filter) => stmt.query([filter.value.as_str()]),
        None => stmt.query([]),
    }
    .map_err(backend)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(backend)? {
        let mut values = Vec::with_capacity(width);
        for index in 0..width {
            values.push(to_json(row.get_ref(index).map_err(backend)?));
        }
        out.push(values);
    }

    Ok(ResultSet { columns, rows: out })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(json) = serde_json::from_str::<Value>(&text) {
                    return json;
                }
            }
            Value::String(text.into_owned())
        }
        ValueRef::Blob(bytes) => Value::String(format!("<binary {} bytes>", bytes.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn ident(name: &str) -> Identifier {
        Identifier::parse(name).unwrap()
    }

    fn seed(dir: &Path, database: &str) {
        let conn = Connection::open(dir.join(format!("{database}.db"))).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE patient (id TEXT PRIMARY KEY, gender TEXT, birth_date TEXT);
            INSERT INTO patient VALUES ('p-1', 'female', '1970-02-01');
            INSERT INTO patient VALUES ('p-2', 'male', '1985-07-12');

            CREATE TABLE observation (patient_id TEXT, code TEXT, value REAL, coding TEXT, note TEXT);
            INSERT INTO observation VALUES ('p-1', 'HbA1c', 7.2, '{"system":"loinc","code":"4548-4"}', NULL);
            INSERT INTO observation VALUES ('p-2', 'BMI', 31.0, NULL, NULL);
            INSERT INTO observation VALUES ('p-1', 'BP', 128.0, NULL, '{not json');

            CREATE TABLE condition (patient_id TEXT, code TEXT, onset INTEGER);
            "#,
        )
        .unwrap();
    }

    fn warehouse() -> (TempDir, SqliteWarehouse) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        seed(dir.path(), "healthlake_db");
        seed(dir.path(), "archive_db");
        std::fs::write(dir.path().join("notes.txt"), "not a database").unwrap();
        std::fs::write(dir.path().join("bad-name.db"), "").unwrap();
        let warehouse = SqliteWarehouse::new(dir.path()).unwrap();
        (dir, warehouse)
    }

    #[test]
    fn warehouse_dir_defaults_when_unset_or_blank() {
        assert_eq!(warehouse_dir_from_env_value(None), PathBuf::from("warehouse"));
        assert_eq!(
            warehouse_dir_from_env_value(Some("  ".into())),
            PathBuf::from("warehouse")
        );
        assert_eq!(
            warehouse_dir_from_env_value(Some("/data/fhir".into())),
            PathBuf::from("/data/fhir")
        );
    }

    #[test]
    fn rejects_missing_root() {
        let err = SqliteWarehouse::new("/nonexistent/warehouse").expect_err("missing dir");
        assert!(matches!(err, WarehouseError::NotFound(_)));
    }

    #[test]
    fn builds_quoted_sql_with_bound_filter() {
        let query = Query::patient_rows(
            &ident("healthlake_db"),
            &ident("observation"),
            &ident("patient_id"),
            "p-1' OR '1'='1",
        );
        assert_eq!(
            build_sql(&query),
            "SELECT * FROM \"observation\" WHERE \"patient_id\" = ?1"
        );

        let query = Query::column(&ident("healthlake_db"), &ident("patient"), &ident("id"));
        assert_eq!(build_sql(&query), "SELECT \"id\" FROM \"patient\"");
    }

    #[tokio::test]
    async fn lists_database_files_sorted() {
        let (_dir, warehouse) = warehouse();
        let dbs = warehouse.list_databases().await.unwrap();
        assert_eq!(dbs, vec![ident("archive_db"), ident("healthlake_db")]);
    }

    #[tokio::test]
    async fn lists_tables_of_database() {
        let (_dir, warehouse) = warehouse();
        let tables = warehouse.list_tables(&ident("healthlake_db")).await.unwrap();
        assert_eq!(
            tables,
            vec![ident("condition"), ident("observation"), ident("patient")]
        );

        let err = warehouse
            .list_tables(&ident("missing_db"))
            .await
            .expect_err("unknown database");
        assert!(matches!(err, WarehouseError::NotFound(_)));
    }

    #[tokio::test]
    async fn returns_patient_rows_in_declared_column_order() {
        let (_dir, warehouse) = warehouse();
        let query = Query::patient_rows(
            &ident("healthlake_db"),
            &ident("observation"),
            &ident("patient_id"),
            "p-1",
        );

        let set = warehouse.execute(&query).await.unwrap();
        assert_eq!(set.columns, vec!["patient_id", "code", "value", "coding", "note"]);
        assert_eq!(set.rows.len(), 2);
        assert_eq!(
            set.rows[0],
            vec![
                json!("p-1"),
                json!("HbA1c"),
                json!(7.2),
                json!({"system": "loinc", "code": "4548-4"}),
                Value::Null,
            ]
        );
        assert_eq!(set.rows[1][1], json!("BP"));
        assert_eq!(set.rows[1][4], json!("{not json"));
    }

    #[tokio::test]
    async fn injection_attempt_matches_nothing() {
        let (_dir, warehouse) = warehouse();
        let query = Query::patient_rows(
            &ident("healthlake_db"),
            &ident("observation"),
            &ident("patient_id"),
            "p-1' OR '1'='1",
        );
        let set = warehouse.execute(&query).await.unwrap();
        assert!(set.rows.is_empty());
    }

    #[tokio::test]
    async fn empty_table_returns_columns_without_rows() {
        let (_dir, warehouse) = warehouse();
        let query = Query::patient_rows(
            &ident("healthlake_db"),
            &ident("condition"),
            &ident("patient_id"),
            "p-1",
        );
        let set = warehouse.execute(&query).await.unwrap();
        assert_eq!(set.columns, vec!["patient_id", "code", "onset"]);
        assert!(set.rows.is_empty());
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let (_dir, warehouse) = warehouse();
        let query = Query::patient_rows(
            &ident("healthlake_db"),
            &ident("medication"),
            &ident("patient_id"),
            "p-1",
        );
        let err = warehouse.execute(&query).await.expect_err("no such table");
        assert!(matches!(err, WarehouseError::NotFound(msg) if msg.contains("medication")));
    }

    #[tokio::test]
    async fn missing_column_is_an_invalid_query() {
        let (_dir, warehouse) = warehouse();
        let query = Query::patient_rows(
            &ident("healthlake_db"),
            &ident("patient"),
            &ident("patient_id"),
            "p-1",
        );
        let err = warehouse.execute(&query).await.expect_err("no such column");
        assert!(matches!(err, WarehouseError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn listed_views_can_be_queried() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let conn = Connection::open(dir.path().join("views_db.db")).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE obs_raw (patient_id TEXT, code TEXT, value REAL);
            INSERT INTO obs_raw VALUES ('p-1', 'HbA1c', 7.2);
            INSERT INTO obs_raw VALUES ('p-2', 'BMI', 31.0);
            INSERT INTO obs_raw VALUES ('p-1', 'LDL', 2.9);
            CREATE VIEW observation AS SELECT patient_id, code, value FROM obs_raw;
            "#,
        )
        .unwrap();
        drop(conn);

        let warehouse = SqliteWarehouse::new(dir.path()).unwrap();
        let tables = warehouse.list_tables(&ident("views_db")).await.unwrap();
        assert_eq!(tables, vec![ident("obs_raw"), ident("observation")]);

        let query = Query::patient_rows(
            &ident("views_db"),
            &ident("observation"),
            &ident("patient_id"),
            "p-1",
        );
        let set = warehouse
            .execute(&query)
            .await
            .expect("a listed view should be queryable");
        assert_eq!(set.columns, vec!["patient_id", "code", "value"]);
        let codes: Vec<&Value> = set.rows.iter().map(|r| &r[1]).collect();
        assert_eq!(codes, vec![&json!("HbA1c"), &json!("LDL")]);
    }

    #[tokio::test]
    async fn projects_patient_ids() {
        let (_dir, warehouse) = warehouse();
        let query = Query::column(&ident("healthlake_db"), &ident("patient"), &ident("id"));
        let set = warehouse.execute(&query).await.unwrap();
        assert_eq!(set.columns, vec!["id"]);
        assert_eq!(set.rows, vec![vec![json!("p-1")], vec![json!("p-2")]]);
    }
}
