use thiserror::Error;

use crate::db::DbError;

/// Errors that abort a purge.
///
/// Every variant is fatal: the purge stops at the first error and does not
/// roll back statements that already ran. All configuration errors are
/// raised while planning, before any DML is issued.
#[derive(Debug, Error)]
pub enum PurgeError {
    #[error("Unknown service '{0}' (is it configured under [services]?)")]
    UnknownService(String),

    #[error("Failed to connect to database for service {service}: {source}")]
    Connect {
        service: String,
        #[source]
        source: DbError,
    },

    #[error("Table {table} has {count} self-referencing foreign keys, exactly one is supported")]
    TooManySelfRefFks { table: String, count: usize },

    #[error(
        "Dependency depth is too high: [{}] on table {table}, column {column}, abort",
        chain.join(" -> ")
    )]
    DependencyTooDeep {
        chain: Vec<String>,
        table: String,
        column: String,
    },

    #[error(
        "Reserved table {reserved} references {referenced}; purge {reserved} through its own path first"
    )]
    ReservedTable { reserved: String, referenced: String },

    #[error("Invalid time '{input}': {reason}")]
    InvalidTime { input: String, reason: String },

    #[error("Unsafe extra condition for table {table}: {condition}")]
    UnsafeCondition { table: String, condition: String },

    #[error(
        "Foreign key {table}({}) -> {remote_table}({}) has mismatched column lists",
        referencing.join(", "),
        remote.join(", ")
    )]
    MismatchedForeignKey {
        table: String,
        referencing: Vec<String>,
        remote_table: String,
        remote: Vec<String>,
    },

    #[error("Column {table}.{column} not found")]
    ColumnNotFound { table: String, column: String },

    #[error("Purge of {table} removed no rows while {pending} ids are still pending")]
    NoProgress { table: String, pending: usize },

    #[error("Invalid purge request: {0}")]
    InvalidRequest(String),

    #[error("Failed to read foreign keys referencing {table}: {source}")]
    Catalog {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Failed to purge table {table}: {source}")]
    Execution {
        table: String,
        #[source]
        source: DbError,
    },
}

pub type PurgeResult<T> = Result<T, PurgeError>;
