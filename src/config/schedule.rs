//! Recurring purge configuration.
//!
//! # Example
//!
//! ```toml
//! [schedule]
//! enabled = true
//! interval_hours = 24
//!
//! [[schedule.jobs]]
//! name = "stale-lessons"
//! tables = "lessons,lesson_reports"
//! service = "bob"
//! school_id = "-2147483644"
//! before_at = "6 months ago"
//! per_batch = 5000
//! ```

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

use super::{ConfigError, ServiceConfig};
use crate::purge::{ExtraCondition, PurgeEvent};

/// Scheduled purge configuration.
///
/// When enabled, the worker runs every job once per interval. Relative
/// time expressions are resolved again on each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Whether scheduled purging is enabled.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the scheduled jobs (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Jobs to run on every pass, in order.
    #[serde(default)]
    pub jobs: Vec<ScheduledJob>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            jobs: Vec::new(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

/// One recurring purge. Carries the same fields as a trigger payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ScheduledJob {
    /// Label used in log lines. Defaults to the table list.
    #[serde(default)]
    pub name: Option<String>,

    /// Comma-separated root tables, purged in order.
    pub tables: String,

    /// Name of a configured service.
    pub service: String,

    /// Tenant whose rows are purged.
    pub school_id: String,

    /// Rows per batch. 0 runs each statement once without a limit.
    #[serde(default)]
    pub per_batch: i64,

    /// Upper bound of the retention window (RFC 3339 or "<N> days ago").
    pub before_at: String,

    /// Optional lower bound, same format. Empty means unbounded.
    #[serde(default)]
    pub after_at: String,

    /// Extra conditions appended to the configured ones.
    #[serde(default)]
    pub extra_cond: Vec<ExtraCondition>,

    /// Render statements without executing them.
    #[serde(default)]
    pub dry_run: bool,
}

impl ScheduledJob {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.tables)
    }

    /// The trigger payload this job submits on each run.
    pub fn to_event(&self) -> PurgeEvent {
        PurgeEvent {
            tables: self.tables.clone(),
            service: self.service.clone(),
            school_id: self.school_id.clone(),
            per_batch: self.per_batch,
            before_at: self.before_at.clone(),
            after_at: self.after_at.clone(),
            extra_cond: self.extra_cond.clone(),
        }
    }
}

impl ScheduleConfig {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    pub(super) fn validate(
        &self,
        services: &HashMap<String, ServiceConfig>,
    ) -> Result<(), ConfigError> {
        if self.enabled && self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "schedule.interval_hours must be greater than 0".into(),
            ));
        }
        for (idx, job) in self.jobs.iter().enumerate() {
            if !services.contains_key(&job.service) {
                return Err(ConfigError::Validation(format!(
                    "schedule.jobs[{idx}]: unknown service '{}'",
                    job.service
                )));
            }
            if job.tables.split(',').all(|t| t.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "schedule.jobs[{idx}]: tables cannot be empty"
                )));
            }
            if job.school_id.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "schedule.jobs[{idx}]: school_id cannot be empty"
                )));
            }
            if job.before_at.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "schedule.jobs[{idx}]: before_at cannot be empty"
                )));
            }
        }
        Ok(())
    }
}
