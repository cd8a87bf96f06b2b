//! Depth-first ordering of purge steps.
//!
//! For the graph
//!
//! ```text
//! t1 <- t2 <- t3
//!    <- t4 <- t5
//! ```
//!
//! rooted at `t1`, the steps delete `t3, t2, t5, t4, t1`: every table is
//! purged only after all tables referencing it.

use std::collections::VecDeque;

use serde::Serialize;

use super::{
    error::{PurgeError, PurgeResult},
    graph::{DependencyGraph, GraphNode},
    rules::PurgeRules,
};

/// Longest ancestor chain (root included) a step may carry.
pub const MAX_CHAIN_DEPTH: usize = 4;

/// One statement to run, with the ancestor chain selecting its rows.
///
/// `chain[0]` is the root; the last node is the table the step acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PurgeStep {
    /// Null `column` on the last table of the chain to break a circular key.
    SetNull { chain: Vec<GraphNode>, column: String },
    /// Delete the rows of the last table of the chain.
    Delete { chain: Vec<GraphNode> },
}

impl PurgeStep {
    pub fn chain(&self) -> &[GraphNode] {
        match self {
            PurgeStep::SetNull { chain, .. } | PurgeStep::Delete { chain } => chain,
        }
    }

    /// The table this step modifies.
    pub fn table(&self) -> &str {
        self.chain().last().map(|n| n.table.as_str()).unwrap_or_default()
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, PurgeStep::Delete { .. })
    }
}

struct StackItem {
    node: GraphNode,
    remaining: VecDeque<GraphNode>,
}

impl StackItem {
    fn new(node: GraphNode, graph: &DependencyGraph) -> Self {
        let remaining = graph.dependents(&node.table).iter().cloned().collect();
        Self { node, remaining }
    }
}

/// Plan every step of a purge rooted at `root`, in execution order.
///
/// The walk is iterative: the stack always holds the chain from the root to
/// the current table. A table is emitted once its remaining dependents are
/// exhausted, preceded by the set-null steps its circular keys require.
/// Planning fails without emitting anything if a chain would exceed
/// [`MAX_CHAIN_DEPTH`].
pub fn plan(root: &str, graph: &DependencyGraph, rules: &PurgeRules) -> PurgeResult<Vec<PurgeStep>> {
    let mut steps = Vec::new();
    let mut stack = vec![StackItem::new(GraphNode::root(root), graph)];

    while let Some(top) = stack.last_mut() {
        if let Some(next) = top.remaining.pop_front() {
            if stack.len() >= MAX_CHAIN_DEPTH {
                let mut chain: Vec<String> = stack.iter().map(|i| i.node.table.clone()).collect();
                chain.push(next.table.clone());
                return Err(PurgeError::DependencyTooDeep {
                    chain,
                    table: next.table,
                    column: next.referencing_column,
                });
            }
            stack.push(StackItem::new(next, graph));
            continue;
        }

        let chain: Vec<GraphNode> = stack.iter().map(|i| i.node.clone()).collect();
        let deleted = rules.table(&chain[chain.len() - 1].table);
        for (idx, ancestor) in chain.iter().enumerate() {
            if let Some(column) = deleted.set_null_on_circular_fk.get(&ancestor.table) {
                steps.push(PurgeStep::SetNull {
                    chain: chain[..=idx].to_vec(),
                    column: column.clone(),
                });
            }
        }
        steps.push(PurgeStep::Delete { chain });
        stack.pop();
    }

    Ok(steps)
}
