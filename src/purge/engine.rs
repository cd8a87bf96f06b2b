//! Orchestrates a purge: catalog, graph, plan, statements, execution.

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    error::{PurgeError, PurgeResult},
    executor::BatchExecutor,
    graph::{DependencyGraph, build_graph},
    report::PurgeReport,
    request::PurgeRequest,
    rules::PurgeRules,
    self_ref,
    statement::{Statement, StatementArgs, StatementBuilder},
    traversal::{self, PurgeStep},
};
use crate::{
    config::{PurgeSettings, PurgerConfig, TableConfig},
    db::{CatalogRepo, DbPool, PurgeRepo},
};

/// Everything needed to purge one root table, computed before any DML.
#[derive(Debug, Clone, Serialize)]
pub struct TablePlan {
    pub root: String,
    pub graph: DependencyGraph,
    pub steps: Vec<PurgeStep>,
    /// Id-collection query, for a self-referencing root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collect_ids: Option<Statement>,
    /// One statement per step, in execution order.
    pub statements: Vec<Statement>,
}

pub struct PurgeEngine {
    catalog: Arc<dyn CatalogRepo>,
    repo: Arc<dyn PurgeRepo>,
    settings: PurgeSettings,
    tables: HashMap<String, TableConfig>,
}

impl PurgeEngine {
    pub fn new(
        catalog: Arc<dyn CatalogRepo>,
        repo: Arc<dyn PurgeRepo>,
        settings: PurgeSettings,
        tables: HashMap<String, TableConfig>,
    ) -> Self {
        Self {
            catalog,
            repo,
            settings,
            tables,
        }
    }

    pub fn from_config(db: &DbPool, config: &PurgerConfig) -> Self {
        Self::new(
            db.catalog(),
            db.purge(),
            config.purge.clone(),
            config.tables.clone(),
        )
    }

    pub fn rules(&self, request: &PurgeRequest) -> PurgeRules {
        PurgeRules::from_config(&self.tables).with_extra_conditions(&request.extra_conds)
    }

    /// Read the catalog below `root` and render every statement of its purge.
    pub async fn plan_table(
        &self,
        root: &str,
        rules: &PurgeRules,
        per_batch: Option<u32>,
    ) -> PurgeResult<TablePlan> {
        let rows = self
            .catalog
            .find_dependents(root)
            .await
            .map_err(|source| PurgeError::Catalog {
                table: root.to_string(),
                source,
            })?;

        let graph = build_graph(root, &rows, rules, &self.settings)?;
        tracing::debug!(
            table = %root,
            edges = graph.edge_count(),
            graph = ?graph,
            "Built dependency graph"
        );

        let steps = traversal::plan(root, &graph, rules)?;
        let builder =
            StatementBuilder::new(rules, &self.settings.tenant_column).with_limit(per_batch);

        let (collect_ids, statements) = match rules.table(root).self_ref_fks.as_slice() {
            [] => {
                let statements = steps
                    .iter()
                    .map(|step| builder.build(step))
                    .collect::<PurgeResult<Vec<_>>>()?;
                (None, statements)
            }
            [fk] => {
                let plan = self_ref::plan(self.catalog.as_ref(), &builder, root, fk, &steps).await?;
                (Some(plan.collect), plan.statements)
            }
            fks => {
                return Err(PurgeError::TooManySelfRefFks {
                    table: root.to_string(),
                    count: fks.len(),
                });
            }
        };

        for statement in collect_ids.iter().chain(&statements) {
            tracing::debug!(table = %statement.table, sql = %statement.sql, "Planned statement");
        }

        Ok(TablePlan {
            root: root.to_string(),
            graph,
            steps,
            collect_ids,
            statements,
        })
    }

    /// Purge every table of the request, in order.
    ///
    /// All tables are planned first, so configuration errors abort the run
    /// before any statement executes. Statements are not wrapped in a
    /// transaction: a failure leaves earlier deletes in place, and the run
    /// can be repeated.
    pub async fn run(&self, request: &PurgeRequest) -> PurgeResult<PurgeReport> {
        request.validate()?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "purge",
            %run_id,
            service = %request.service,
            tenant = %request.school_id,
            dry_run = request.dry_run,
        );
        self.run_planned(run_id, request).instrument(span).await
    }

    async fn run_planned(&self, run_id: Uuid, request: &PurgeRequest) -> PurgeResult<PurgeReport> {
        let rules = self.rules(request);

        let mut plans = Vec::with_capacity(request.tables.len());
        for table in &request.tables {
            plans.push(self.plan_table(table, &rules, request.per_batch).await?);
        }

        let executor = BatchExecutor::new(
            self.repo.as_ref(),
            request.per_batch.is_some(),
            request.dry_run,
        );
        let args = StatementArgs::new(request.window, &request.school_id);
        let mut report = PurgeReport::new(run_id, request.dry_run);

        for plan in &plans {
            tracing::info!(
                table = %plan.root,
                service = %request.service,
                tenant = %request.school_id,
                statements = plan.statements.len(),
                "Starting purge of table"
            );

            match &plan.collect_ids {
                None => {
                    for statement in &plan.statements {
                        let rows = executor.run(statement, &args).await?;
                        report.record(&plan.root, statement, rows);
                    }
                }
                Some(collect) => {
                    self_ref::run(
                        &executor,
                        collect,
                        &plan.statements,
                        &plan.root,
                        request.window,
                        &request.school_id,
                        &mut report,
                    )
                    .await?;
                }
            }
        }

        let dry_run_msg = if request.dry_run { " (DRY RUN)" } else { "" };
        tracing::info!(
            deleted = report.rows_deleted(),
            nulled = report.rows_nulled(),
            statements = report.steps.len(),
            "Purge complete{}",
            dry_run_msg
        );

        Ok(report)
    }
}

/// Connect to the request's service and run the purge.
pub async fn run_purge(config: &PurgerConfig, request: &PurgeRequest) -> PurgeResult<PurgeReport> {
    request.validate()?;
    let db = connect(config, &request.service).await?;

    let result = PurgeEngine::from_config(&db, config).run(request).await;
    db.close().await;
    result
}

/// Connect to a service and plan the purge of `table` without executing it.
pub async fn plan_purge(
    config: &PurgerConfig,
    service: &str,
    table: &str,
    per_batch: Option<u32>,
) -> PurgeResult<TablePlan> {
    let db = connect(config, service).await?;

    let engine = PurgeEngine::from_config(&db, config);
    let rules = PurgeRules::from_config(&config.tables);
    let result = engine.plan_table(table, &rules, per_batch).await;
    db.close().await;
    result
}

async fn connect(config: &PurgerConfig, service: &str) -> PurgeResult<DbPool> {
    let service_config = config
        .service(service)
        .ok_or_else(|| PurgeError::UnknownService(service.to_string()))?;

    DbPool::from_config(service_config)
        .await
        .map_err(|source| PurgeError::Connect {
            service: service.to_string(),
            source,
        })
}
