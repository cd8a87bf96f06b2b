//! Cascading, configuration-driven purge of tenant data from PostgreSQL.
//!
//! Given a root table, a tenant and a time window, the purger discovers
//! every table that references the root through foreign keys and deletes
//! the matching rows bottom-up, so no constraint is violated along the way.

pub mod config;
pub mod db;
pub mod jobs;
pub mod observability;
pub mod purge;
