use serde::Serialize;
use uuid::Uuid;

use super::statement::{Statement, StatementKind};

/// One executed (or, in a dry run, rendered) statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// Root table of the purge this statement belongs to.
    pub root: String,
    pub table: String,
    #[serde(flatten)]
    pub kind: StatementKind,
    pub sql: String,
    /// Rows deleted or nulled; ids returned for an id-collection query.
    pub rows: u64,
}

/// Results of one purge run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub steps: Vec<StepReport>,
}

impl PurgeReport {
    pub fn new(run_id: Uuid, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            steps: Vec::new(),
        }
    }

    pub(super) fn record(&mut self, root: &str, statement: &Statement, rows: u64) {
        self.steps.push(StepReport {
            root: root.to_string(),
            table: statement.table.clone(),
            kind: statement.kind.clone(),
            sql: statement.sql.clone(),
            rows,
        });
    }

    /// Rows deleted across all tables.
    pub fn rows_deleted(&self) -> u64 {
        self.steps
            .iter()
            .filter(|s| s.kind == StatementKind::Delete)
            .map(|s| s.rows)
            .sum()
    }

    /// Rows whose circular key was set to NULL.
    pub fn rows_nulled(&self) -> u64 {
        self.steps
            .iter()
            .filter(|s| matches!(s.kind, StatementKind::SetNull { .. }))
            .map(|s| s.rows)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.rows_deleted() + self.rows_nulled()
    }

    pub fn has_deletions(&self) -> bool {
        self.rows_deleted() > 0
    }

    /// Rendered SQL, in execution order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.sql.as_str())
    }
}
