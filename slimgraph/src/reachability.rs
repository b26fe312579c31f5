//! Backward liveness analysis computing what a set of outputs needs.

use std::collections::{BTreeSet, HashMap, hash_map::Entry};

use tracing::debug;

use crate::{LoadError, Node};

/// The minimal part of a graph needed to compute a set of outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct NeededSet {
    /// Kept nodes, in their original relative order.
    pub nodes: Vec<Node>,
    /// Tensors the caller has to feed.
    pub inputs: BTreeSet<String>,
    /// Initializers read by the kept nodes.
    pub parameters: BTreeSet<String>,
}

/// Maps every produced tensor name to the index of its producer.
///
/// Fails if a name is produced twice or consumed before being produced. The single reverse
/// scan of [`analyze`] is only exact on a node list that passes this check.
fn index_producers(nodes: &[Node]) -> Result<HashMap<&str, usize>, LoadError> {
    let mut producers = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        for output in node.outputs().iter().filter(|name| !name.is_empty()) {
            match producers.entry(output.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(i);
                }
                Entry::Occupied(_) => {
                    return Err(LoadError::DuplicateOutput {
                        name: output.clone(),
                    });
                }
            }
        }
    }
    for (i, node) in nodes.iter().enumerate() {
        for input in node.used_inputs() {
            if matches!(producers.get(input.as_str()), Some(&p) if p >= i) {
                return Err(LoadError::NotTopologicallySorted {
                    node: node.label(),
                    input: input.clone(),
                });
            }
        }
    }
    Ok(producers)
}

/// Checks that every tensor has at most one producer and is produced before it is read.
///
/// Elision passes only rewire consumers placed after the node they remove, so this has to
/// hold on the node list before any rewriting too.
pub fn check_order(nodes: &[Node]) -> Result<(), LoadError> {
    index_producers(nodes).map(|_| ())
}

/// Keeps only the nodes, inputs and parameters the `required` outputs depend on.
pub fn analyze(
    nodes: Vec<Node>,
    parameter_names: &BTreeSet<String>,
    required: &BTreeSet<String>,
) -> Result<NeededSet, LoadError> {
    if required.is_empty() {
        return Err(LoadError::EmptyOutputSet);
    }
    let producers = index_producers(&nodes)?;
    if let Some(name) = required
        .iter()
        .find(|name| !producers.contains_key(name.as_str()))
    {
        return Err(LoadError::DanglingOutputReference { name: name.clone() });
    }

    let mut live: BTreeSet<String> = required.clone();
    let mut keep = vec![false; nodes.len()];
    for (i, node) in nodes.iter().enumerate().rev() {
        if node.outputs().iter().any(|output| live.contains(output)) {
            keep[i] = true;
            live.extend(node.used_inputs().cloned());
        }
    }
    let total = nodes.len();
    let needed_nodes: Vec<Node> = nodes
        .into_iter()
        .zip(keep)
        .filter_map(|(node, keep)| keep.then_some(node))
        .collect();

    let produced: BTreeSet<&String> = needed_nodes
        .iter()
        .flat_map(|node| node.outputs())
        .collect();
    let inputs = live
        .iter()
        .filter(|name| !parameter_names.contains(*name) && !produced.contains(name))
        .cloned()
        .collect();
    let parameters = live.intersection(parameter_names).cloned().collect();

    debug!(
        "kept {} of {} nodes for outputs {:?}",
        needed_nodes.len(),
        total,
        required
    );
    Ok(NeededSet {
        nodes: needed_nodes,
        inputs,
        parameters,
    })
}
