//! Purge requests and the trigger payload they are decoded from.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Months, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{PurgeError, PurgeResult};

/// Extra SQL condition for one table, appended to its configured condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ExtraCondition {
    pub table: String,
    pub condition: String,
}

/// Bounds on the root table's creation timestamp. `None` leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    /// Rows created strictly before this instant match.
    pub before: Option<DateTime<Utc>>,
    /// Rows created strictly after this instant match.
    pub after: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// A validated purge invocation. Immutable for the duration of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    /// Root tables, purged in order.
    pub tables: Vec<String>,
    /// Service selecting the target database.
    pub service: String,
    /// Tenant id compared against the tenant column of every root row.
    pub school_id: String,
    /// Rows per batch; `None` runs every statement once without a limit.
    pub per_batch: Option<u32>,
    pub window: TimeWindow,
    pub extra_conds: Vec<ExtraCondition>,
    /// Render statements without executing them.
    pub dry_run: bool,
}

impl PurgeRequest {
    pub fn validate(&self) -> PurgeResult<()> {
        if self.tables.is_empty() {
            return Err(PurgeError::InvalidRequest("no tables to purge".into()));
        }
        if self.service.trim().is_empty() {
            return Err(PurgeError::InvalidRequest("service is required".into()));
        }
        if self.school_id.trim().is_empty() {
            return Err(PurgeError::InvalidRequest("school_id is required".into()));
        }
        if self.per_batch == Some(0) {
            return Err(PurgeError::InvalidRequest(
                "per_batch must be greater than 0 when set".into(),
            ));
        }
        if let Some(extra) = self.extra_conds.iter().find(|e| e.table.trim().is_empty()) {
            return Err(PurgeError::InvalidRequest(format!(
                "extra condition '{}' does not name a table",
                extra.condition
            )));
        }
        Ok(())
    }
}

/// Trigger payload as published by the scheduler or an operator.
///
/// ```json
/// {
///   "tables": "lessons,lesson_reports",
///   "service": "bob",
///   "school_id": "-2147483644",
///   "per_batch": 1000,
///   "before_at": "3 months ago",
///   "after_at": "2021-01-01T00:00:00Z",
///   "extra_cond": [{ "table": "lessons", "condition": "and deleted_at is not null" }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeEvent {
    /// Comma-separated root tables.
    pub tables: String,
    pub service: String,
    pub school_id: String,
    /// 0 or negative disables batching.
    #[serde(default)]
    pub per_batch: i64,
    /// RFC 3339 timestamp or `"<N> day(s)/month(s) ago"`.
    pub before_at: String,
    /// Same format as `before_at`. Empty means no lower bound.
    #[serde(default)]
    pub after_at: String,
    #[serde(default)]
    pub extra_cond: Vec<ExtraCondition>,
}

impl PurgeEvent {
    /// Resolve the payload against `now` and validate it.
    pub fn into_request(self, now: DateTime<Utc>) -> PurgeResult<PurgeRequest> {
        let before = parse_time(&self.before_at, now)?;
        let after = if self.after_at.trim().is_empty() {
            None
        } else {
            Some(parse_time(&self.after_at, now)?)
        };
        let per_batch = if self.per_batch <= 0 {
            None
        } else {
            Some(u32::try_from(self.per_batch).map_err(|_| {
                PurgeError::InvalidRequest(format!("per_batch {} is too large", self.per_batch))
            })?)
        };

        let request = PurgeRequest {
            tables: split_tables(&self.tables),
            service: self.service,
            school_id: self.school_id,
            per_batch,
            window: TimeWindow {
                before: Some(before),
                after,
            },
            extra_conds: self.extra_cond,
            dry_run: false,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Split a comma-separated table list, trimming entries and dropping empties.
pub fn split_tables(tables: &str) -> Vec<String> {
    tables
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

static RELATIVE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+) (day|days|month|months) ago").unwrap());

/// Parse an RFC 3339 timestamp or a relative expression such as
/// `"3 days ago"` (multiples of 24 hours) or `"1 month ago"` (calendar
/// months, clamped to the last day of a shorter month). The relative form
/// may appear anywhere in the input.
pub fn parse_time(input: &str, now: DateTime<Utc>) -> PurgeResult<DateTime<Utc>> {
    let invalid = |reason: String| PurgeError::InvalidTime {
        input: input.to_string(),
        reason,
    };

    if let Some(caps) = RELATIVE_TIME.captures(input) {
        let amount: u32 = caps[1]
            .parse()
            .map_err(|_| invalid("amount out of range".into()))?;
        let resolved = match &caps[2] {
            "day" | "days" => now.checked_sub_signed(Duration::days(i64::from(amount))),
            _ => now.checked_sub_months(Months::new(amount)),
        };
        return resolved.ok_or_else(|| invalid("out of range".into()));
    }

    DateTime::parse_from_rfc3339(input.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| invalid(e.to_string()))
}
