//! In-memory catalog and purge repository recording every statement.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;

use super::statement::{Statement, StatementArgs, StatementKind};
use crate::db::{CatalogRepo, CatalogRow, DbError, DbResult, PurgeRepo};

#[derive(Debug, Clone)]
pub struct Executed {
    pub table: String,
    pub kind: StatementKind,
    pub sql: String,
    pub args: StatementArgs,
}

/// Fake database. Deletes consume a per-table row count, honouring any
/// `limit n` in the statement; set-null updates affect nothing unless
/// configured.
#[derive(Default)]
pub struct RecordingRepo {
    catalog: HashMap<String, Vec<CatalogRow>>,
    column_types: HashMap<(String, String), String>,
    rows: Mutex<HashMap<String, u64>>,
    nullable: Mutex<HashMap<String, u64>>,
    id_batches: Mutex<VecDeque<Vec<String>>>,
    failing_table: Option<String>,
    executed: Mutex<Vec<Executed>>,
    id_queries: Mutex<Vec<String>>,
    catalog_lookups: Mutex<Vec<String>>,
}

impl RecordingRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a foreign key `table(cols) -> remote(remote_cols)` found when
    /// reading the catalog below `root`.
    pub fn with_fk(
        mut self,
        root: &str,
        table: &str,
        cols: &[&str],
        remote: &str,
        remote_cols: &[&str],
    ) -> Self {
        let depth = self.catalog.get(root).map_or(0, Vec::len) as i32 + 1;
        self.catalog.entry(root.to_string()).or_default().push(CatalogRow {
            depth,
            schema: "public".into(),
            table: table.into(),
            referencing_columns: cols.iter().map(|c| c.to_string()).collect(),
            remote_table: remote.into(),
            remote_columns: remote_cols.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn with_column_type(mut self, table: &str, column: &str, ty: &str) -> Self {
        self.column_types
            .insert((table.to_string(), column.to_string()), ty.to_string());
        self
    }

    /// Rows matching the delete statements of `table`.
    pub fn with_rows(self, table: &str, rows: u64) -> Self {
        self.rows.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    /// Rows affected by set-null updates on `table`.
    pub fn with_nullable(self, table: &str, rows: u64) -> Self {
        self.nullable.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    /// Responses of successive id-collection queries. Once exhausted, the
    /// query returns no ids.
    pub fn with_id_batches(self, batches: Vec<Vec<&str>>) -> Self {
        *self.id_batches.lock().unwrap() = batches
            .into_iter()
            .map(|b| b.into_iter().map(str::to_string).collect())
            .collect();
        self
    }

    /// Fail every statement on `table`.
    pub fn failing_on(mut self, table: &str) -> Self {
        self.failing_table = Some(table.to_string());
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().unwrap().clone()
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed().into_iter().map(|e| e.sql).collect()
    }

    pub fn id_queries(&self) -> Vec<String> {
        self.id_queries.lock().unwrap().clone()
    }

    pub fn catalog_lookups(&self) -> Vec<String> {
        self.catalog_lookups.lock().unwrap().clone()
    }

    fn limit_of(sql: &str) -> Option<u64> {
        let idx = sql.rfind(" limit ")?;
        sql[idx + " limit ".len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .ok()
    }

    fn take(counts: &Mutex<HashMap<String, u64>>, table: &str, limit: Option<u64>) -> u64 {
        let mut counts = counts.lock().unwrap();
        let remaining = counts.entry(table.to_string()).or_default();
        let taken = limit.map_or(*remaining, |l| l.min(*remaining));
        *remaining -= taken;
        taken
    }
}

#[async_trait]
impl CatalogRepo for RecordingRepo {
    async fn find_dependents(&self, root_table: &str) -> DbResult<Vec<CatalogRow>> {
        self.catalog_lookups
            .lock()
            .unwrap()
            .push(root_table.to_string());
        Ok(self.catalog.get(root_table).cloned().unwrap_or_default())
    }

    async fn column_type(&self, table: &str, column: &str) -> DbResult<Option<String>> {
        Ok(self
            .column_types
            .get(&(table.to_string(), column.to_string()))
            .cloned())
    }
}

#[async_trait]
impl PurgeRepo for RecordingRepo {
    async fn execute(&self, statement: &Statement, args: &StatementArgs) -> DbResult<u64> {
        if self.failing_table.as_deref() == Some(statement.table.as_str()) {
            return Err(DbError::NotFound);
        }
        self.executed.lock().unwrap().push(Executed {
            table: statement.table.clone(),
            kind: statement.kind.clone(),
            sql: statement.sql.clone(),
            args: args.clone(),
        });

        let limit = Self::limit_of(&statement.sql);
        Ok(match statement.kind {
            StatementKind::SetNull { .. } => Self::take(&self.nullable, &statement.table, limit),
            _ => Self::take(&self.rows, &statement.table, limit),
        })
    }

    async fn fetch_ids(
        &self,
        statement: &Statement,
        _args: &StatementArgs,
    ) -> DbResult<Vec<String>> {
        if self.failing_table.as_deref() == Some(statement.table.as_str()) {
            return Err(DbError::NotFound);
        }
        self.id_queries.lock().unwrap().push(statement.sql.clone());
        Ok(self.id_batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}
