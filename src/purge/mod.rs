//! Cascading purge of a root table and everything that references it.
//!
//! A purge reads the foreign keys below each root table from the catalog,
//! builds a dependency graph, orders the tables depth-first and renders one
//! statement per step. Dependents are deleted before the rows they point at.
//!
//! ```text
//! PurgeRequest -> find_dependents -> DependencyGraph -> PurgeStep* -> Statement* -> BatchExecutor
//! ```

mod engine;
mod error;
mod executor;
mod graph;
mod report;
mod request;
mod rules;
mod self_ref;
mod statement;
mod traversal;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{PurgeEngine, TablePlan, plan_purge, run_purge};
pub use error::{PurgeError, PurgeResult};
pub use executor::BatchExecutor;
pub use graph::{DependencyGraph, GraphNode, build_graph};
pub use report::{PurgeReport, StepReport};
pub use request::{ExtraCondition, PurgeEvent, PurgeRequest, TimeWindow, parse_time, split_tables};
pub use rules::{PurgeRules, TableRules};
pub use statement::{
    MAX_SELF_REF_DEPTH, Predicate, RootFilter, Statement, StatementArgs, StatementBuilder,
    StatementKind, quote_ident,
};
pub use traversal::{MAX_CHAIN_DEPTH, PurgeStep};
