use async_trait::async_trait;
use sqlx::{PgPool, Postgres, postgres::PgArguments, query::Query};

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::PurgeRepo,
    },
    purge::{Statement, StatementArgs},
};

pub struct PostgresPurgeRepo {
    pool: PgPool,
}

impl PostgresPurgeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Bind `$1..$3`, and `$4` when the statement selects by id.
///
/// Purge statements are rendered per run, so they are not cached as
/// prepared statements on the connection.
fn bind_args<'q>(
    statement: &'q Statement,
    args: &StatementArgs,
) -> Query<'q, Postgres, PgArguments> {
    let query = sqlx::query(&statement.sql)
        .persistent(false)
        .bind(args.before)
        .bind(args.after)
        .bind(args.tenant.clone());

    if statement.binds_ids {
        query.bind(args.ids.clone().unwrap_or_default())
    } else {
        query
    }
}

#[async_trait]
impl PurgeRepo for PostgresPurgeRepo {
    async fn execute(&self, statement: &Statement, args: &StatementArgs) -> DbResult<u64> {
        let result = bind_args(statement, args).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_ids(
        &self,
        statement: &Statement,
        args: &StatementArgs,
    ) -> DbResult<Vec<String>> {
        let row: Option<(Option<Vec<String>>,)> = sqlx::query_as(&statement.sql)
            .persistent(false)
            .bind(args.before)
            .bind(args.after)
            .bind(args.tenant.clone())
            .fetch_optional(&self.pool)
            .await?;

        let (ids,) = row.ok_or(DbError::NotFound)?;
        Ok(ids.unwrap_or_default())
    }
}
