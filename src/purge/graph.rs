//! Dependency graph built from catalog foreign keys.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    error::{PurgeError, PurgeResult},
    rules::PurgeRules,
};
use crate::{config::PurgeSettings, db::CatalogRow};

/// One column pair of a foreign key: `table.referencing_column` points at
/// `remote_table.remote_column`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GraphNode {
    pub table: String,
    pub referencing_column: String,
    pub remote_table: String,
    pub remote_column: String,
}

impl GraphNode {
    /// The root of a traversal. It references nothing.
    pub fn root(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            referencing_column: String::new(),
            remote_table: String::new(),
            remote_column: String::new(),
        }
    }
}

/// Referenced table -> the foreign-key columns pointing at it, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<GraphNode>>,
}

impl DependencyGraph {
    /// Tables referencing `table`. Empty for leaves.
    pub fn dependents(&self, table: &str) -> &[GraphNode] {
        self.edges.get(table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Record an edge unless the same edge is already present.
    /// Returns whether the edge was added.
    pub fn insert(&mut self, node: GraphNode) -> bool {
        let bucket = self.edges.entry(node.remote_table.clone()).or_default();
        if bucket.contains(&node) {
            return false;
        }
        bucket.push(node);
        true
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Build the dependency graph from catalog rows.
///
/// Composite keys become one node per column pair. Ignored columns are left
/// out, and so are the declared self-references of `root`, which are purged
/// by id instead. Repeated edges are recorded once. A reserved table showing
/// up as a referencing table is an error.
pub fn build_graph(
    root: &str,
    rows: &[CatalogRow],
    rules: &PurgeRules,
    settings: &PurgeSettings,
) -> PurgeResult<DependencyGraph> {
    let mut graph = DependencyGraph::default();

    for row in rows {
        if settings.is_reserved(&row.table) {
            return Err(PurgeError::ReservedTable {
                reserved: row.table.clone(),
                referenced: row.remote_table.clone(),
            });
        }

        if row.referencing_columns.len() != row.remote_columns.len() {
            return Err(PurgeError::MismatchedForeignKey {
                table: row.table.clone(),
                referencing: row.referencing_columns.clone(),
                remote_table: row.remote_table.clone(),
                remote: row.remote_columns.clone(),
            });
        }

        let table_rules = rules.table(&row.table);
        for (referencing, remote) in row.referencing_columns.iter().zip(&row.remote_columns) {
            if table_rules.ignores(referencing) {
                continue;
            }
            if row.table == root
                && row.remote_table == root
                && table_rules.is_self_ref(referencing, remote)
            {
                continue;
            }
            graph.insert(GraphNode {
                table: row.table.clone(),
                referencing_column: referencing.clone(),
                remote_table: row.remote_table.clone(),
                remote_column: remote.clone(),
            });
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::{SelfRefFk, TableConfig};

    fn row(depth: i32, table: &str, cols: &[&str], remote: &str, remote_cols: &[&str]) -> CatalogRow {
        CatalogRow {
            depth,
            schema: "public".into(),
            table: table.into(),
            referencing_columns: cols.iter().map(|c| c.to_string()).collect(),
            remote_table: remote.into(),
            remote_columns: remote_cols.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn rules(tables: &[(&str, TableConfig)]) -> PurgeRules {
        let map: HashMap<String, TableConfig> = tables
            .iter()
            .map(|(name, config)| (name.to_string(), config.clone()))
            .collect();
        PurgeRules::from_config(&map)
    }

    #[test]
    fn test_composite_key_pairs_in_order() {
        let rows = vec![row(
            1,
            "lesson_members",
            &["user_id", "lesson_id"],
            "lessons",
            &["teacher_id", "lesson_id"],
        )];
        let graph =
            build_graph("lessons", &rows, &PurgeRules::default(), &PurgeSettings::default())
                .unwrap();

        let deps = graph.dependents("lessons");
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].referencing_column, "user_id");
        assert_eq!(deps[0].remote_column, "teacher_id");
        assert_eq!(deps[1].referencing_column, "lesson_id");
        assert_eq!(deps[1].remote_column, "lesson_id");
    }

    #[test]
    fn test_ignored_fk_skipped() {
        let rows = vec![
            row(1, "lessons", &["course_id"], "courses", &["course_id"]),
            row(1, "lessons", &["alt_course_id"], "courses", &["course_id"]),
        ];
        let rules = rules(&[(
            "lessons",
            TableConfig {
                ignore_fks: vec!["alt_course_id".into()],
                ..Default::default()
            },
        )]);
        let graph = build_graph("courses", &rows, &rules, &PurgeSettings::default()).unwrap();

        assert_eq!(graph.dependents("courses").len(), 1);
        assert_eq!(graph.dependents("courses")[0].referencing_column, "course_id");
    }

    #[test]
    fn test_repeated_edges_and_cycles_deduplicated() {
        // a -> b -> a, reported again at every depth by the catalog walk
        let rows = vec![
            row(1, "b", &["a_id"], "a", &["id"]),
            row(2, "a", &["b_id"], "b", &["id"]),
            row(3, "b", &["a_id"], "a", &["id"]),
            row(4, "a", &["b_id"], "b", &["id"]),
            row(1, "b", &["a_id"], "a", &["id"]),
        ];
        let graph =
            build_graph("a", &rows, &PurgeRules::default(), &PurgeSettings::default())
                .unwrap();

        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.dependents("a").len(), 1);
        assert_eq!(graph.dependents("b").len(), 1);
    }

    #[test]
    fn test_reserved_table_rejected() {
        let rows = vec![
            row(1, "lessons", &["course_id"], "courses", &["course_id"]),
            row(1, "organizations", &["owner_course_id"], "courses", &["course_id"]),
        ];
        let err =
            build_graph("courses", &rows, &PurgeRules::default(), &PurgeSettings::default())
                .unwrap_err();

        match err {
            PurgeError::ReservedTable {
                reserved,
                referenced,
            } => {
                assert_eq!(reserved, "organizations");
                assert_eq!(referenced, "courses");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_fixed_reserved_table_rejected_with_custom_list() {
        let rows = vec![row(1, "organizations", &["owner_course_id"], "courses", &["course_id"])];
        for list in ["reserved_tables = []", r#"reserved_tables = ["tenants"]"#] {
            let settings: PurgeSettings = toml::from_str(list).unwrap();
            let err = build_graph("courses", &rows, &PurgeRules::default(), &settings).unwrap_err();
            assert!(
                matches!(err, PurgeError::ReservedTable { ref reserved, .. } if reserved == "organizations"),
                "{list}: {err}"
            );
        }
    }

    #[test]
    fn test_configured_reserved_table_rejected() {
        let rows = vec![row(1, "tenants", &["course_id"], "courses", &["course_id"])];
        let settings: PurgeSettings = toml::from_str(r#"reserved_tables = ["tenants"]"#).unwrap();
        let err = build_graph("courses", &rows, &PurgeRules::default(), &settings).unwrap_err();
        assert!(matches!(err, PurgeError::ReservedTable { .. }));
    }

    #[test]
    fn test_mismatched_columns_rejected() {
        let rows = vec![row(1, "b", &["x", "y"], "a", &["id"])];
        let err =
            build_graph("a", &rows, &PurgeRules::default(), &PurgeSettings::default()).unwrap_err();
        assert!(matches!(err, PurgeError::MismatchedForeignKey { .. }));
    }

    #[test]
    fn test_declared_self_reference_excluded() {
        let rows = vec![
            row(1, "locations", &["parent_location_id"], "locations", &["location_id"]),
            row(1, "lessons", &["location_id"], "locations", &["location_id"]),
        ];
        let rules = rules(&[(
            "locations",
            TableConfig {
                self_ref_fks: vec![SelfRefFk {
                    referencing: "parent_location_id".into(),
                    referenced: "location_id".into(),
                }],
                ..Default::default()
            },
        )]);
        let graph = build_graph("locations", &rows, &rules, &PurgeSettings::default()).unwrap();

        let deps = graph.dependents("locations");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].table, "lessons");
    }

    #[test]
    fn test_self_reference_of_dependent_kept() {
        let rows = vec![
            row(1, "locations", &["course_id"], "courses", &["course_id"]),
            row(2, "locations", &["parent_location_id"], "locations", &["location_id"]),
        ];
        let rules = rules(&[(
            "locations",
            TableConfig {
                self_ref_fks: vec![SelfRefFk {
                    referencing: "parent_location_id".into(),
                    referenced: "location_id".into(),
                }],
                ..Default::default()
            },
        )]);
        let graph = build_graph("courses", &rows, &rules, &PurgeSettings::default()).unwrap();

        let deps = graph.dependents("locations");
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].table, "locations");
        assert_eq!(deps[0].referencing_column, "parent_location_id");
    }

    #[test]
    fn test_empty_catalog() {
        let graph =
            build_graph("anything", &[], &PurgeRules::default(), &PurgeSettings::default())
                .unwrap();
        assert!(graph.is_empty());
        assert!(graph.dependents("anything").is_empty());
    }
}
