use async_trait::async_trait;
use serde::Serialize;

use crate::db::error::DbResult;

/// One foreign key discovered below a purge root.
///
/// `referencing_columns` and `remote_columns` are aligned by key position:
/// element `i` of one is paired with element `i` of the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    /// Distance from the root table (1 = references the root directly).
    pub depth: i32,
    pub schema: String,
    /// Table holding the foreign key.
    pub table: String,
    pub referencing_columns: Vec<String>,
    /// Table the foreign key points at.
    pub remote_table: String,
    pub remote_columns: Vec<String>,
}

/// Read access to the database catalog.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Every foreign key that references `root_table` directly or
    /// transitively, up to four levels deep.
    async fn find_dependents(&self, root_table: &str) -> DbResult<Vec<CatalogRow>>;

    /// The SQL type of a column as rendered by `format_type`, or `None` if
    /// the table or column does not exist.
    async fn column_type(&self, table: &str, column: &str) -> DbResult<Option<String>>;
}
