//! Per-table rules resolved for one purge run.

use std::collections::HashMap;

use crate::config::{SelfRefFk, TableConfig, default_created_at_col_name};

use super::request::ExtraCondition;

/// Rules for one table, with request-level conditions already merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRules {
    pub created_at_column: String,
    /// Conditions AND-ed into every predicate on this table, configured
    /// condition first.
    pub extra_conditions: Vec<String>,
    pub ignore_fks: Vec<String>,
    pub self_ref_fks: Vec<SelfRefFk>,
    /// Circular referrer table -> column to null before this table is purged.
    pub set_null_on_circular_fk: HashMap<String, String>,
}

impl Default for TableRules {
    fn default() -> Self {
        Self {
            created_at_column: default_created_at_col_name(),
            extra_conditions: Vec::new(),
            ignore_fks: Vec::new(),
            self_ref_fks: Vec::new(),
            set_null_on_circular_fk: HashMap::new(),
        }
    }
}

impl From<&TableConfig> for TableRules {
    fn from(config: &TableConfig) -> Self {
        Self {
            created_at_column: config.created_at_col_name.clone(),
            extra_conditions: config
                .extra_cond
                .iter()
                .filter(|c| !c.trim().is_empty())
                .cloned()
                .collect(),
            ignore_fks: config.ignore_fks.clone(),
            self_ref_fks: config.self_ref_fks.clone(),
            set_null_on_circular_fk: config.set_null_on_circular_fk.clone(),
        }
    }
}

impl TableRules {
    pub fn ignores(&self, column: &str) -> bool {
        self.ignore_fks.iter().any(|c| c == column)
    }

    /// Whether `referencing -> referenced` is a declared self-reference.
    pub fn is_self_ref(&self, referencing: &str, referenced: &str) -> bool {
        self.self_ref_fks
            .iter()
            .any(|fk| fk.referencing == referencing && fk.referenced == referenced)
    }
}

/// Rules for every table a purge may touch. Tables without an entry fall
/// back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct PurgeRules {
    tables: HashMap<String, TableRules>,
    fallback: TableRules,
}

impl PurgeRules {
    pub fn from_config(tables: &HashMap<String, TableConfig>) -> Self {
        Self {
            tables: tables
                .iter()
                .map(|(name, config)| (name.clone(), TableRules::from(config)))
                .collect(),
            fallback: TableRules::default(),
        }
    }

    /// Append request-level conditions. A table without configuration gets
    /// a default entry carrying the condition.
    pub fn with_extra_conditions(mut self, extras: &[ExtraCondition]) -> Self {
        for extra in extras {
            if extra.condition.trim().is_empty() {
                continue;
            }
            self.tables
                .entry(extra.table.clone())
                .or_default()
                .extra_conditions
                .push(extra.condition.clone());
        }
        self
    }

    pub fn table(&self, name: &str) -> &TableRules {
        self.tables.get(name).unwrap_or(&self.fallback)
    }
}
