//! SQL rendering for purge steps.
//!
//! Predicates are built as a [`Predicate`] tree folded over the ancestor
//! chain and rendered once. Identifiers are always quoted. Values are bound
//! positionally with a fixed layout:
//!
//! | param | value                                   |
//! |-------|-----------------------------------------|
//! | `$1`  | upper bound of the time window, or NULL |
//! | `$2`  | lower bound of the time window, or NULL |
//! | `$3`  | tenant id                               |
//! | `$4`  | id list (self-reference mode only)      |

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    error::{PurgeError, PurgeResult},
    graph::GraphNode,
    request::TimeWindow,
    rules::PurgeRules,
    traversal::PurgeStep,
};
use crate::config::SelfRefFk;

/// Bound on the recursive descendant walk of a self-referencing table.
pub const MAX_SELF_REF_DEPTH: u32 = 10;

/// Quote an identifier for PostgreSQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A boolean SQL expression over bind parameters and quoted identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `column` inside the `$1`/`$2` window; a NULL bound is open.
    TimeWindow { column: String },
    /// `column = $3`
    Tenant { column: String },
    /// `column = any($4)`, with the ids cast to the column's type.
    AnyOfIds { column: String, column_type: String },
    /// `column is not null`
    NotNull { column: String },
    /// `column = any(select remote_column from remote_table where inner)`
    InSubquery {
        column: String,
        remote_table: String,
        remote_column: String,
        inner: Box<Predicate>,
    },
    /// Operator-supplied condition, already checked.
    Raw(String),
    And(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction of `parts`, without a wrapper when there is only one.
    pub fn all(mut parts: Vec<Predicate>) -> Predicate {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::And(parts)
        }
    }

    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            Predicate::TimeWindow { column } => {
                let col = quote_ident(column);
                let _ = write!(
                    out,
                    "(($1::timestamptz is null or {col} < $1) and ($2::timestamptz is null or {col} > $2))"
                );
            }
            Predicate::Tenant { column } => {
                let _ = write!(out, "{} = $3", quote_ident(column));
            }
            Predicate::AnyOfIds {
                column,
                column_type,
            } => {
                let _ = write!(
                    out,
                    "{} = any($4::text[]::{column_type}[])",
                    quote_ident(column)
                );
            }
            Predicate::NotNull { column } => {
                let _ = write!(out, "{} is not null", quote_ident(column));
            }
            Predicate::InSubquery {
                column,
                remote_table,
                remote_column,
                inner,
            } => {
                let _ = write!(
                    out,
                    "{} = any(select {} from {} where ",
                    quote_ident(column),
                    quote_ident(remote_column),
                    quote_ident(remote_table)
                );
                inner.render(out);
                out.push(')');
            }
            Predicate::Raw(condition) => {
                let _ = write!(out, "({condition})");
            }
            Predicate::And(parts) => {
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        out.push_str(" and ");
                    }
                    part.render(out);
                }
            }
        }
    }

    /// Number of `$3` tenant predicates in the tree.
    pub fn tenant_count(&self) -> usize {
        match self {
            Predicate::Tenant { .. } => 1,
            Predicate::InSubquery { inner, .. } => inner.tenant_count(),
            Predicate::And(parts) => parts.iter().map(Predicate::tenant_count).sum(),
            _ => 0,
        }
    }
}

/// Check an operator-supplied condition and wrap it as a predicate.
///
/// A leading `and` is dropped. Statement separators and comments are
/// rejected. Returns `None` for an empty condition.
pub fn raw_condition(table: &str, condition: &str) -> PurgeResult<Option<Predicate>> {
    let mut trimmed = condition.trim();
    if let Some(head) = trimmed.get(..3)
        && head.eq_ignore_ascii_case("and")
        && trimmed[3..]
            .chars()
            .next()
            .is_none_or(|c| c.is_whitespace() || c == '(')
    {
        trimmed = trimmed[3..].trim_start();
    }
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.contains(';') || trimmed.contains("--") || trimmed.contains("/*") {
        return Err(PurgeError::UnsafeCondition {
            table: table.to_string(),
            condition: condition.to_string(),
        });
    }
    Ok(Some(Predicate::Raw(trimmed.to_string())))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementKind {
    Delete,
    SetNull { column: String },
    CollectIds,
}

/// A rendered statement ready to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    /// Table the statement acts on.
    pub table: String,
    #[serde(flatten)]
    pub kind: StatementKind,
    pub sql: String,
    /// Whether `$4` must be bound.
    #[serde(skip)]
    pub binds_ids: bool,
}

/// Values bound to a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementArgs {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub tenant: String,
    pub ids: Option<Vec<String>>,
}

impl StatementArgs {
    pub fn new(window: TimeWindow, tenant: impl Into<String>) -> Self {
        Self {
            before: window.before,
            after: window.after,
            tenant: tenant.into(),
            ids: None,
        }
    }

    /// Arguments for a pass over an id batch: the window is left open.
    pub fn for_ids(tenant: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            before: None,
            after: None,
            tenant: tenant.into(),
            ids: Some(ids),
        }
    }
}

/// How root rows are selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootFilter {
    /// Time window plus the root table's extra conditions.
    Window,
    /// An explicit id list on `column`. Replaces the root's extra
    /// conditions, which already selected the ids.
    Ids { column: String, column_type: String },
}

/// Renders statements for the steps of one root table.
#[derive(Debug, Clone)]
pub struct StatementBuilder<'a> {
    rules: &'a PurgeRules,
    tenant_column: &'a str,
    root_filter: RootFilter,
    limit: Option<u32>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(rules: &'a PurgeRules, tenant_column: &'a str) -> Self {
        Self {
            rules,
            tenant_column,
            root_filter: RootFilter::Window,
            limit: None,
        }
    }

    /// Append `limit n` to every statement.
    pub fn with_limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_root_filter(mut self, filter: RootFilter) -> Self {
        self.root_filter = filter;
        self
    }

    fn extra_conditions(&self, table: &str) -> PurgeResult<Vec<Predicate>> {
        let mut parts = Vec::new();
        for condition in &self.rules.table(table).extra_conditions {
            if let Some(p) = raw_condition(table, condition)? {
                parts.push(p);
            }
        }
        Ok(parts)
    }

    fn root_predicate(&self, table: &str) -> PurgeResult<Predicate> {
        let mut parts = vec![Predicate::TimeWindow {
            column: self.rules.table(table).created_at_column.clone(),
        }];
        match &self.root_filter {
            RootFilter::Window => parts.extend(self.extra_conditions(table)?),
            RootFilter::Ids {
                column,
                column_type,
            } => parts.push(Predicate::AnyOfIds {
                column: column.clone(),
                column_type: column_type.clone(),
            }),
        }
        parts.push(Predicate::Tenant {
            column: self.tenant_column.to_string(),
        });
        Ok(Predicate::And(parts))
    }

    /// Fold the chain from the root outwards into the predicate selecting
    /// rows of its last table.
    pub fn predicate(&self, chain: &[GraphNode]) -> PurgeResult<Predicate> {
        let Some((root, rest)) = chain.split_first() else {
            return Err(PurgeError::InvalidRequest("empty dependency chain".into()));
        };
        let mut predicate = self.root_predicate(&root.table)?;
        for node in rest {
            let mut parts = vec![Predicate::InSubquery {
                column: node.referencing_column.clone(),
                remote_table: node.remote_table.clone(),
                remote_column: node.remote_column.clone(),
                inner: Box::new(predicate),
            }];
            parts.extend(self.extra_conditions(&node.table)?);
            predicate = Predicate::all(parts);
        }
        Ok(predicate)
    }

    fn limit_clause(&self) -> String {
        self.limit.map(|n| format!(" limit {n}")).unwrap_or_default()
    }

    fn binds_ids(&self) -> bool {
        matches!(self.root_filter, RootFilter::Ids { .. })
    }

    /// Render one planned step.
    pub fn build(&self, step: &PurgeStep) -> PurgeResult<Statement> {
        let table = quote_ident(step.table());
        let predicate = self.predicate(step.chain())?;
        let limit = self.limit_clause();

        let (kind, sql) = match step {
            PurgeStep::Delete { .. } => (
                StatementKind::Delete,
                format!(
                    "delete from {table} where ctid in (select ctid from {table} where {}{limit})",
                    predicate.to_sql()
                ),
            ),
            PurgeStep::SetNull { column, .. } => {
                let predicate = Predicate::And(vec![
                    predicate,
                    Predicate::NotNull {
                        column: column.clone(),
                    },
                ]);
                (
                    StatementKind::SetNull {
                        column: column.clone(),
                    },
                    format!(
                        "update {table} set {} = null where ctid in (select ctid from {table} where {}{limit})",
                        quote_ident(column),
                        predicate.to_sql()
                    ),
                )
            }
        };

        Ok(Statement {
            table: step.table().to_string(),
            kind,
            sql,
            binds_ids: self.binds_ids(),
        })
    }

    /// Render the query collecting ids of matching rows of a
    /// self-referencing table and all their descendants, deepest first.
    pub fn collect_ids(&self, table: &str, fk: &SelfRefFk) -> PurgeResult<Statement> {
        let seed = self.root_predicate(table)?;
        let tbl = quote_ident(table);
        let referenced = quote_ident(&fk.referenced);
        let referencing = quote_ident(&fk.referencing);
        let limit = self.limit_clause();

        let sql = format!(
            "with recursive find_ent_family as (\
             select 1 as depth, l.{referenced}, l.{referencing} from {tbl} l where {seed} \
             union all \
             select temp.depth + 1 as depth, l2.{referenced}, l2.{referencing} from {tbl} l2 \
             join find_ent_family temp on temp.{referenced} = l2.{referencing} \
             where temp.depth < {MAX_SELF_REF_DEPTH} and l2.{referenced} != l2.{referencing}\
             ) \
             select array_agg(batched.{referenced}::text) from (\
             select {referenced} from find_ent_family order by depth desc, {referenced} desc{limit}\
             ) as batched",
            seed = seed.to_sql(),
        );

        Ok(Statement {
            table: table.to_string(),
            kind: StatementKind::CollectIds,
            sql,
            binds_ids: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;
    use crate::config::TableConfig;

    const ROOT_T1: &str = r#"(($1::timestamptz is null or "created_at" < $1) and ($2::timestamptz is null or "created_at" > $2)) and "resource_path" = $3"#;

    fn edge(table: &str, col: &str, remote: &str, remote_col: &str) -> GraphNode {
        GraphNode {
            table: table.into(),
            referencing_column: col.into(),
            remote_table: remote.into(),
            remote_column: remote_col.into(),
        }
    }

    #[test]
    fn test_root_delete() {
        let rules = PurgeRules::default();
        let builder = StatementBuilder::new(&rules, "resource_path");
        let stmt = builder
            .build(&PurgeStep::Delete {
                chain: vec![GraphNode::root("t1")],
            })
            .unwrap();

        assert_eq!(
            stmt.sql,
            format!(r#"delete from "t1" where ctid in (select ctid from "t1" where {ROOT_T1})"#)
        );
        assert_eq!(stmt.kind, StatementKind::Delete);
        assert!(!stmt.binds_ids);
    }

    #[test]
    fn test_nested_delete_with_extra_and_limit() {
        let mut config = HashMap::new();
        config.insert("t1".to_string(), TableConfig {
            created_at_col_name: "start_time".into(),
            extra_cond: Some("and deleted_at is null".into()),
            ..Default::default()
        });
        config.insert("t2".to_string(), TableConfig {
            extra_cond: Some("kind = 'x'".into()),
            ..Default::default()
        });
        let rules = PurgeRules::from_config(&config);
        let builder = StatementBuilder::new(&rules, "resource_path").with_limit(Some(100));

        let stmt = builder
            .build(&PurgeStep::Delete {
                chain: vec![
                    GraphNode::root("t1"),
                    edge("t2", "t1_id", "t1", "id"),
                    edge("t3", "t2_id", "t2", "id"),
                ],
            })
            .unwrap();

        assert_eq!(
            stmt.sql,
            concat!(
                r#"delete from "t3" where ctid in (select ctid from "t3" where "t2_id" = any(select "id" from "t2" where "#,
                r#""t1_id" = any(select "id" from "t1" where "#,
                r#"(($1::timestamptz is null or "start_time" < $1) and ($2::timestamptz is null or "start_time" > $2)) "#,
                r#"and (deleted_at is null) and "resource_path" = $3) and (kind = 'x')) limit 100)"#,
            )
        );
    }

    #[test]
    fn test_set_null_statement() {
        let rules = PurgeRules::default();
        let builder = StatementBuilder::new(&rules, "resource_path").with_limit(Some(10));
        let stmt = builder
            .build(&PurgeStep::SetNull {
                chain: vec![GraphNode::root("t1")],
                column: "t2_id".into(),
            })
            .unwrap();

        assert_eq!(
            stmt.sql,
            format!(
                r#"update "t1" set "t2_id" = null where ctid in (select ctid from "t1" where {ROOT_T1} and "t2_id" is not null limit 10)"#
            )
        );
        assert_eq!(stmt.kind, StatementKind::SetNull {
            column: "t2_id".into()
        });
    }

    #[test]
    fn test_tenant_only_at_innermost_level() {
        let rules = PurgeRules::default();
        let builder = StatementBuilder::new(&rules, "resource_path");
        let chain = vec![
            GraphNode::root("t1"),
            edge("t2", "t1_id", "t1", "id"),
            edge("t3", "t2_id", "t2", "id"),
            edge("t4", "t3_id", "t3", "id"),
        ];
        let predicate = builder.predicate(&chain).unwrap();
        assert_eq!(predicate.tenant_count(), 1);

        let sql = predicate.to_sql();
        assert_eq!(sql.matches(r#""resource_path" = $3"#).count(), 1);
        let innermost = sql.rfind("from \"t1\" where").unwrap();
        assert!(sql.find(r#""resource_path" = $3"#).unwrap() > innermost);
    }

    #[test]
    fn test_id_filter_replaces_root_extra() {
        let mut config = HashMap::new();
        config.insert("locations".to_string(), TableConfig {
            extra_cond: Some("and is_archived".into()),
            ..Default::default()
        });
        let rules = PurgeRules::from_config(&config);
        let builder = StatementBuilder::new(&rules, "resource_path").with_root_filter(
            RootFilter::Ids {
                column: "location_id".into(),
                column_type: "text".into(),
            },
        );

        let stmt = builder
            .build(&PurgeStep::Delete {
                chain: vec![GraphNode::root("locations")],
            })
            .unwrap();
        assert!(stmt.binds_ids);
        assert!(stmt.sql.contains(r#""location_id" = any($4::text[]::text[])"#));
        assert!(!stmt.sql.contains("is_archived"));
    }

    #[test]
    fn test_collect_ids_query() {
        let rules = PurgeRules::default();
        let builder = StatementBuilder::new(&rules, "resource_path").with_limit(Some(50));
        let stmt = builder
            .collect_ids("t4", &SelfRefFk {
                referencing: "parent_id".into(),
                referenced: "id".into(),
            })
            .unwrap();

        assert_eq!(stmt.kind, StatementKind::CollectIds);
        assert!(!stmt.binds_ids);
        assert_eq!(
            stmt.sql,
            concat!(
                r#"with recursive find_ent_family as (select 1 as depth, l."id", l."parent_id" from "t4" l where "#,
                r#"(($1::timestamptz is null or "created_at" < $1) and ($2::timestamptz is null or "created_at" > $2)) and "resource_path" = $3 "#,
                r#"union all select temp.depth + 1 as depth, l2."id", l2."parent_id" from "t4" l2 "#,
                r#"join find_ent_family temp on temp."id" = l2."parent_id" "#,
                r#"where temp.depth < 10 and l2."id" != l2."parent_id") "#,
                r#"select array_agg(batched."id"::text) from (select "id" from find_ent_family order by depth desc, "id" desc limit 50) as batched"#,
            )
        );
    }

    #[test]
    fn test_identifiers_are_quoted() {
        assert_eq!(quote_ident("lessons"), r#""lessons""#);
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }

    #[rstest]
    #[case("and deleted_at is null", Some("(deleted_at is null)"))]
    #[case("AND (a = 1 or b = 2)", Some("((a = 1 or b = 2))"))]
    #[case("android_id is not null", Some("(android_id is not null)"))]
    #[case("  ", None)]
    #[case("and", None)]
    fn test_raw_condition(#[case] input: &str, #[case] expected: Option<&str>) {
        let rendered = raw_condition("t1", input).unwrap().map(|p| p.to_sql());
        assert_eq!(rendered.as_deref(), expected);
    }

    #[rstest]
    #[case("1 = 1; drop table lessons")]
    #[case("and deleted_at is null -- comment")]
    #[case("a /* b */ = 1")]
    fn test_unsafe_condition_rejected(#[case] input: &str) {
        let err = raw_condition("t1", input).unwrap_err();
        assert!(matches!(err, PurgeError::UnsafeCondition { .. }));
    }
}
