//! Purging a root table that references itself.
//!
//! Rows of such a table can only be deleted once the rows pointing at them
//! are gone. A recursive query collects the ids of the matching rows and
//! all their descendants, deepest first; each batch of ids is then purged
//! through the regular plan with the root filtered by id instead of time.

use super::{
    error::{PurgeError, PurgeResult},
    executor::BatchExecutor,
    report::PurgeReport,
    request::TimeWindow,
    statement::{RootFilter, Statement, StatementArgs, StatementBuilder},
    traversal::PurgeStep,
};
use crate::{config::SelfRefFk, db::CatalogRepo};

/// Statements for a self-referencing root, rendered before any DML.
#[derive(Debug, Clone)]
pub struct SelfRefPlan {
    pub collect: Statement,
    pub statements: Vec<Statement>,
}

/// Render the id-collection query and the id-filtered statements for
/// `steps`. The id list is cast to the catalog type of the referenced column.
pub async fn plan(
    catalog: &dyn CatalogRepo,
    builder: &StatementBuilder<'_>,
    root: &str,
    fk: &SelfRefFk,
    steps: &[PurgeStep],
) -> PurgeResult<SelfRefPlan> {
    let column_type = catalog
        .column_type(root, &fk.referenced)
        .await
        .map_err(|source| PurgeError::Catalog {
            table: root.to_string(),
            source,
        })?
        .ok_or_else(|| PurgeError::ColumnNotFound {
            table: root.to_string(),
            column: fk.referenced.clone(),
        })?;

    let collect = builder.collect_ids(root, fk)?;
    let by_id = builder.clone().with_root_filter(RootFilter::Ids {
        column: fk.referenced.clone(),
        column_type,
    });
    let statements = steps
        .iter()
        .map(|step| by_id.build(step))
        .collect::<PurgeResult<Vec<_>>>()?;

    Ok(SelfRefPlan {
        collect,
        statements,
    })
}

/// Collect ids and purge them until the collection query comes back empty.
///
/// Fails with [`PurgeError::NoProgress`] if a pass removes no root rows,
/// since the next query would return the same ids. A dry run renders one
/// pass and stops.
pub async fn run(
    executor: &BatchExecutor<'_>,
    collect: &Statement,
    statements: &[Statement],
    root: &str,
    window: TimeWindow,
    tenant: &str,
    report: &mut PurgeReport,
) -> PurgeResult<()> {
    let seed_args = StatementArgs::new(window, tenant);

    loop {
        let ids = executor.fetch_ids(collect, &seed_args).await?;
        report.record(root, collect, ids.len() as u64);
        if ids.is_empty() {
            tracing::info!(table = %root, "No self-referencing rows left to purge");
            return Ok(());
        }

        let pending = ids.len();
        tracing::info!(table = %root, ids = pending, "Purging self-referencing batch");

        let args = StatementArgs::for_ids(tenant, ids);
        let mut root_removed = 0;
        for (idx, statement) in statements.iter().enumerate() {
            let rows = executor.run(statement, &args).await?;
            report.record(root, statement, rows);
            if idx + 1 == statements.len() {
                root_removed = rows;
            }
        }

        if executor.is_dry_run() {
            return Ok(());
        }
        if root_removed == 0 {
            return Err(PurgeError::NoProgress {
                table: root.to_string(),
                pending,
            });
        }
    }
}
