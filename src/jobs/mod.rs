//! Background jobs.
//!
//! - **Scheduled purges**: runs the purges listed under `[schedule]` once per
//!   interval, resolving relative times such as `"6 months ago"` on each pass.
//!
//! # Example
//!
//! ```toml
//! [schedule]
//! enabled = true
//! interval_hours = 24
//!
//! [[schedule.jobs]]
//! tables = "lessons"
//! service = "bob"
//! school_id = "-2147483644"
//! before_at = "6 months ago"
//! ```

mod scheduled_purge;

pub use scheduled_purge::{ScheduleRunResult, run_scheduled_jobs, start_scheduled_purge_worker};
