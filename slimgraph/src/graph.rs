//! The pruned, execution ready [`Graph`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Node, reachability::NeededSet};

/// Nodes in evaluation order together with the names the graph reads from outside.
///
/// Every input of every node is the output of an earlier node, an external input or a
/// parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    input_names: BTreeSet<String>,
    parameter_names: BTreeSet<String>,
}

impl Graph {
    pub fn new(
        nodes: Vec<Node>,
        input_names: BTreeSet<String>,
        parameter_names: BTreeSet<String>,
    ) -> Self {
        Self {
            nodes,
            input_names,
            parameter_names,
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn input_names(&self) -> &BTreeSet<String> {
        &self.input_names
    }

    pub fn parameter_names(&self) -> &BTreeSet<String> {
        &self.parameter_names
    }

    /// Names written by the nodes of the graph.
    pub fn produced_names(&self) -> BTreeSet<&String> {
        self.nodes.iter().flat_map(|node| node.outputs()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

impl From<NeededSet> for Graph {
    fn from(needed: NeededSet) -> Self {
        Graph::new(needed.nodes, needed.inputs, needed.parameters)
    }
}
