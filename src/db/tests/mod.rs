//! PostgreSQL integration tests for the catalog and purge repositories.
//!
//! These tests run against a testcontainers instance and are `#[ignore]`d by
//! default. Each test gets its own schema, so the catalog only ever sees the
//! tables the test created.
//!
//! # Running tests
//!
//! ```bash
//! cargo test                       # Unit tests only
//! cargo test -- --ignored          # PostgreSQL integration tests (requires Docker)
//! cargo test -- --include-ignored  # Run all tests
//! ```
