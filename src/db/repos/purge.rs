use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    purge::{Statement, StatementArgs},
};

/// Executes rendered purge statements.
///
/// Implementations bind `args` positionally: `$1` before, `$2` after,
/// `$3` tenant, and `$4` the id list when the statement takes one.
#[async_trait]
pub trait PurgeRepo: Send + Sync {
    /// Run a DELETE or UPDATE and return the number of affected rows.
    async fn execute(&self, statement: &Statement, args: &StatementArgs) -> DbResult<u64>;

    /// Run an id-collection query returning a single aggregated array.
    /// An empty or NULL array yields an empty list.
    async fn fetch_ids(&self, statement: &Statement, args: &StatementArgs)
    -> DbResult<Vec<String>>;
}
