//! Runs rendered statements, once or in batches.

use super::{
    error::{PurgeError, PurgeResult},
    statement::{Statement, StatementArgs},
};
use crate::db::{DbResult, PurgeRepo};

pub struct BatchExecutor<'a> {
    repo: &'a dyn PurgeRepo,
    batched: bool,
    dry_run: bool,
}

impl<'a> BatchExecutor<'a> {
    /// `batched` statements carry a `limit` and are repeated until they
    /// affect no rows.
    pub fn new(repo: &'a dyn PurgeRepo, batched: bool, dry_run: bool) -> Self {
        Self {
            repo,
            batched,
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Execute a statement exactly once.
    pub async fn execute_once(&self, statement: &Statement, args: &StatementArgs) -> DbResult<u64> {
        let affected = self.repo.execute(statement, args).await?;
        tracing::info!(
            table = %statement.table,
            total = affected,
            "Total rows removed from table {}: {}",
            statement.table,
            affected
        );
        Ok(affected)
    }

    /// Execute a limited statement until an execution affects no rows.
    /// Returns the total across executions.
    pub async fn execute_batch(&self, statement: &Statement, args: &StatementArgs) -> DbResult<u64> {
        let mut total: u64 = 0;
        loop {
            let affected = self.repo.execute(statement, args).await?;
            total += affected;
            tracing::info!(
                table = %statement.table,
                total,
                "Total rows removed from table {}: {}",
                statement.table,
                total
            );
            if affected == 0 {
                return Ok(total);
            }
        }
    }

    /// Run a DELETE or UPDATE according to the executor's mode.
    pub async fn run(&self, statement: &Statement, args: &StatementArgs) -> PurgeResult<u64> {
        if self.dry_run {
            tracing::info!(table = %statement.table, sql = %statement.sql, "DRY RUN: would execute");
            return Ok(0);
        }

        tracing::debug!(table = %statement.table, sql = %statement.sql, "Executing");
        let result = if self.batched {
            self.execute_batch(statement, args).await
        } else {
            self.execute_once(statement, args).await
        };
        result.map_err(|source| PurgeError::Execution {
            table: statement.table.clone(),
            source,
        })
    }

    /// Run an id-collection query. Read-only, so it also runs in a dry run.
    pub async fn fetch_ids(
        &self,
        statement: &Statement,
        args: &StatementArgs,
    ) -> PurgeResult<Vec<String>> {
        tracing::debug!(table = %statement.table, sql = %statement.sql, "Collecting ids");
        self.repo
            .fetch_ids(statement, args)
            .await
            .map_err(|source| PurgeError::Execution {
                table: statement.table.clone(),
                source,
            })
    }
}
