use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::db::{
    error::DbResult,
    repos::{CatalogRepo, CatalogRow},
};

pub struct PostgresCatalogRepo {
    pool: PgPool,
}

impl PostgresCatalogRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Walks `pg_constraint` upwards from the root: level 1 holds the foreign
/// keys pointing at the root, level n+1 those pointing at a level-n table.
/// Key columns are unnested with their ordinality so the referencing and
/// remote column lists come back in matching key order.
const FIND_DEPENDENTS: &str = r#"
WITH RECURSIVE fk_hierarchy AS (
    SELECT
        1 AS depth,
        pgc.conrelid,
        pgc.confrelid,
        pgn.nspname AS table_schema,
        put.relname AS table_name,
        pgc.conkey,
        put2.relname AS foreign_table_name,
        pgc.confkey
    FROM pg_constraint pgc
        JOIN pg_namespace pgn ON pgc.connamespace = pgn.oid
        JOIN pg_statio_user_tables put2 ON put2.relid = pgc.confrelid
        JOIN pg_statio_user_tables put ON put.relid = pgc.conrelid
    WHERE pgc.contype = 'f'
        AND put2.relname = $1
        AND put2.schemaname = current_schema()
    UNION ALL
    SELECT
        temp.depth + 1 AS depth,
        spgc.conrelid,
        spgc.confrelid,
        spgn.nspname AS table_schema,
        sput.relname AS table_name,
        spgc.conkey,
        sput2.relname AS foreign_table_name,
        spgc.confkey
    FROM pg_constraint spgc
        JOIN pg_namespace spgn ON spgc.connamespace = spgn.oid
        JOIN pg_statio_user_tables sput2 ON sput2.relid = spgc.confrelid
        JOIN pg_statio_user_tables sput ON sput.relid = spgc.conrelid
        JOIN fk_hierarchy AS temp ON spgn.nspname = temp.table_schema
            AND sput2.relname = temp.table_name
    WHERE spgc.contype = 'f'
        AND temp.depth < 4
)
SELECT
    tree.depth,
    tree.table_schema::text AS table_schema,
    tree.table_name::text AS table_name,
    (
        SELECT array_agg(pga.attname::text ORDER BY key_order.ord)
        FROM pg_attribute pga
            JOIN unnest(tree.conkey) WITH ORDINALITY AS key_order(attnum, ord)
                ON pga.attnum = key_order.attnum AND pga.attrelid = tree.conrelid
    ) AS referencing_columns,
    tree.foreign_table_name::text AS foreign_table_name,
    (
        SELECT array_agg(pga.attname::text ORDER BY key_order.ord)
        FROM pg_attribute pga
            JOIN unnest(tree.confkey) WITH ORDINALITY AS key_order(attnum, ord)
                ON pga.attnum = key_order.attnum AND pga.attrelid = tree.confrelid
    ) AS remote_columns
FROM fk_hierarchy AS tree
ORDER BY tree.depth, tree.foreign_table_name, tree.table_name, referencing_columns
"#;

#[async_trait]
impl CatalogRepo for PostgresCatalogRepo {
    async fn find_dependents(&self, root_table: &str) -> DbResult<Vec<CatalogRow>> {
        let rows = sqlx::query(FIND_DEPENDENTS)
            .bind(root_table)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> DbResult<CatalogRow> {
                Ok(CatalogRow {
                    depth: row.try_get("depth")?,
                    schema: row.try_get("table_schema")?,
                    table: row.try_get("table_name")?,
                    referencing_columns: row
                        .try_get::<Option<Vec<String>>, _>("referencing_columns")?
                        .unwrap_or_default(),
                    remote_table: row.try_get("foreign_table_name")?,
                    remote_columns: row
                        .try_get::<Option<Vec<String>>, _>("remote_columns")?
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn column_type(&self, table: &str, column: &str) -> DbResult<Option<String>> {
        let row = sqlx::query(
            r#"
            SELECT format_type(a.atttypid, a.atttypmod) AS column_type
            FROM pg_attribute a
                JOIN pg_class c ON c.oid = a.attrelid
                JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = current_schema()
                AND c.relname = $1
                AND a.attname = $2
                AND a.attnum > 0
                AND NOT a.attisdropped
            "#,
        )
        .bind(table)
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("column_type")?),
            None => None,
        })
    }
}
