//! Simplification passes removing nodes that are no-ops at inference time.
//!
//! Every pass splices its candidates out of the dependency chain: the candidate is dropped
//! and each later consumer of its first output reads the candidate's first input instead.
//! A candidate whose other outputs (a dropout mask, say) are read by some node is kept.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::{Node, OpKind};

/// What a pass may know about the graph besides the node list itself.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    /// Tensors whose value is fixed before inference: initializers and `Constant` outputs.
    constants: BTreeSet<String>,
}

impl RewriteContext {
    pub fn new(nodes: &[Node], parameter_names: &BTreeSet<String>) -> Self {
        let mut constants = parameter_names.clone();
        constants.extend(
            nodes
                .iter()
                .filter(|node| node.kind() == OpKind::Constant)
                .flat_map(|node| node.outputs().iter().cloned()),
        );
        Self { constants }
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }
}

/// A pattern of nodes that can be spliced out without changing what the graph computes.
pub trait ElisionPass {
    fn name(&self) -> &'static str;

    fn is_candidate(&self, node: &Node, ctx: &RewriteContext) -> bool;

    /// Produces the node list with every candidate spliced out.
    fn apply(&self, nodes: Vec<Node>, ctx: &RewriteContext) -> Vec<Node> {
        let total = nodes.len();
        let consumed: HashSet<String> = nodes
            .iter()
            .flat_map(|node| node.used_inputs().cloned())
            .collect();
        // elided output name -> name that now stands for it
        let mut renames: HashMap<String, String> = HashMap::new();
        let mut kept = Vec::with_capacity(total);
        for mut node in nodes {
            for input in node.inputs.iter_mut() {
                if let Some(source) = renames.get(input.as_str()) {
                    *input = source.clone();
                }
            }
            let splice = match (node.outputs.split_first(), node.inputs.first()) {
                (Some((_, rest)), Some(_)) => {
                    !rest.iter().any(|name| consumed.contains(name))
                        && self.is_candidate(&node, ctx)
                }
                _ => false,
            };
            if splice {
                renames.insert(node.outputs[0].clone(), node.inputs[0].clone());
            } else {
                kept.push(node);
            }
        }
        debug!(
            "{} elision removed {} of {} nodes",
            self.name(),
            total - kept.len(),
            total
        );
        kept
    }
}

/// Removes `Dropout` and `Identity` nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropoutElision;

impl ElisionPass for DropoutElision {
    fn name(&self) -> &'static str {
        "dropout"
    }

    fn is_candidate(&self, node: &Node, _ctx: &RewriteContext) -> bool {
        node.kind().is_identity_at_inference()
    }
}

/// Removes `Reshape` nodes whose target shape is known before inference.
///
/// A shape coming from a runtime tensor is left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReshapeElision;

impl ElisionPass for ReshapeElision {
    fn name(&self) -> &'static str {
        "reshape"
    }

    fn is_candidate(&self, node: &Node, ctx: &RewriteContext) -> bool {
        if !node.kind().is_reshape() {
            return false;
        }
        match node.inputs() {
            // opset < 5 carries the shape as an attribute
            [_] => node.attribute("shape").is_some(),
            [_, shape, ..] => ctx.is_constant(shape),
            [] => false,
        }
    }
}

/// Ordered list of passes, each run exactly once.
pub struct Rewriter {
    passes: Vec<Box<dyn ElisionPass>>,
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::new()
            .with_pass(DropoutElision)
            .with_pass(ReshapeElision)
    }
}

impl Rewriter {
    /// A rewriter without any pass.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn with_pass(mut self, pass: impl ElisionPass + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    pub fn run(&self, nodes: Vec<Node>, parameter_names: &BTreeSet<String>) -> Vec<Node> {
        self.passes.iter().fold(nodes, |nodes, pass| {
            let ctx = RewriteContext::new(&nodes, parameter_names);
            pass.apply(nodes, &ctx)
        })
    }
}
