//! Structured logging for the purger.
//!
//! Log output is configured under `[observability.logging]`: pretty, compact
//! or JSON lines, with `RUST_LOG` taking precedence over the configured level.

mod tracing_init;

pub use tracing_init::*;
