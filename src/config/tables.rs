//! Per-table purge configuration.
//!
//! # Example
//!
//! ```toml
//! [tables.lessons]
//! created_at_col_name = "start_time"
//! extra_cond = "and deleted_at is null"
//! ignore_fks = ["replaced_by_lesson_id"]
//!
//! [tables.locations]
//! self_ref_fks = [{ referencing = "parent_location_id", referenced = "location_id" }]
//!
//! [tables.students]
//! set_null_on_circular_fk = { users = "student_profile_id" }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// How rows of one table are selected and how its foreign keys are treated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Column holding the row creation timestamp, compared against the
    /// retention window when this table is the root of a purge.
    /// Default: "created_at"
    #[serde(default = "default_created_at_col_name")]
    pub created_at_col_name: String,

    /// Additional SQL condition AND-ed into every predicate on this table.
    /// A leading `and` is accepted and ignored.
    #[serde(default)]
    pub extra_cond: Option<String>,

    /// Foreign-key columns on this table that are not followed when building
    /// the dependency graph. Used to break schema cycles or skip relations
    /// that must not cascade.
    #[serde(default)]
    pub ignore_fks: Vec<String>,

    /// Foreign keys from this table to itself (parent/child hierarchies).
    /// At most one is supported when the table is the root of a purge.
    #[serde(default)]
    pub self_ref_fks: Vec<SelfRefFk>,

    /// Tables with a circular reference back to this one, mapped to the
    /// column on that table which is set to NULL before this table's rows
    /// are deleted.
    #[serde(default)]
    pub set_null_on_circular_fk: HashMap<String, String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            created_at_col_name: default_created_at_col_name(),
            extra_cond: None,
            ignore_fks: Vec::new(),
            self_ref_fks: Vec::new(),
            set_null_on_circular_fk: HashMap::new(),
        }
    }
}

pub fn default_created_at_col_name() -> String {
    "created_at".to_string()
}

/// A foreign key from a table to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct SelfRefFk {
    /// Column pointing at the parent row (e.g. `parent_id`).
    pub referencing: String,
    /// Column the parent is identified by (e.g. `id`).
    pub referenced: String,
}

impl TableConfig {
    pub(super) fn validate(&self, table: &str) -> Result<(), ConfigError> {
        if table.trim().is_empty() {
            return Err(ConfigError::Validation(
                "table names under [tables] cannot be empty".into(),
            ));
        }
        if self.created_at_col_name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "tables.{table}: created_at_col_name cannot be empty"
            )));
        }
        if self.ignore_fks.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "tables.{table}: ignore_fks cannot contain empty column names"
            )));
        }
        for fk in &self.self_ref_fks {
            if fk.referencing.trim().is_empty() || fk.referenced.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tables.{table}: self_ref_fks entries need both 'referencing' and 'referenced'"
                )));
            }
        }
        for (other, column) in &self.set_null_on_circular_fk {
            if other.trim().is_empty() || column.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tables.{table}: set_null_on_circular_fk entries need a table and a column"
                )));
            }
        }
        Ok(())
    }
}
