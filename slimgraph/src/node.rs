//! Module defining [`Node`], the internal form of an ONNX node, and the builder turning
//! raw `NodeProto`s into it.

use std::collections::{BTreeMap, btree_map::Entry};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tract_onnx::pb::NodeProto;

use crate::{Attribute, LoadError, OpKind};

/// One operation of the graph. Tensors are referred to by name: a name written by one
/// node's `outputs` and read in another node's `inputs` is a data dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) kind: OpKind,
    /// The ONNX node name, often empty.
    pub(crate) name: String,
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<String>,
    pub(crate) attributes: BTreeMap<String, Attribute>,
}

impl Node {
    pub fn new(
        kind: OpKind,
        inputs: Vec<String>,
        outputs: Vec<String>,
        attributes: BTreeMap<String, Attribute>,
    ) -> Self {
        Self {
            kind,
            name: String::new(),
            inputs,
            outputs,
            attributes,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input tensor names, positionally meaningful. An empty name is an absent optional input.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn attributes(&self) -> &BTreeMap<String, Attribute> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Inputs that actually reference a tensor.
    pub fn used_inputs(&self) -> impl Iterator<Item = &String> {
        self.inputs.iter().filter(|name| !name.is_empty())
    }

    /// Name used in error messages: the node name if set, its first output otherwise.
    pub fn label(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        match self.outputs.first() {
            Some(output) => format!("{}({})", self.kind, output),
            None => self.kind.to_string(),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] -> [{}]",
            self.kind,
            self.inputs.iter().join(", "),
            self.outputs.iter().join(", ")
        )
    }
}

impl TryFrom<&NodeProto> for Node {
    type Error = LoadError;

    fn try_from(proto: &NodeProto) -> Result<Self, Self::Error> {
        let kind: OpKind = proto.op_type.parse()?;
        let mut attributes = BTreeMap::new();
        for attr in &proto.attribute {
            let value = Attribute::try_from(attr)?;
            match attributes.entry(attr.name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(_) => {
                    let node = if proto.name.is_empty() {
                        proto.output.first().cloned().unwrap_or_default()
                    } else {
                        proto.name.clone()
                    };
                    return Err(LoadError::DuplicateAttribute {
                        node,
                        attribute: attr.name.clone(),
                    });
                }
            }
        }
        Ok(Node::new(kind, proto.input.clone(), proto.output.clone(), attributes)
            .with_name(proto.name.clone()))
    }
}

/// Converts the raw node list, keeping its order.
pub fn build_nodes(protos: &[NodeProto]) -> Result<Vec<Node>, LoadError> {
    protos.iter().map(Node::try_from).collect()
}

#[cfg(test)]
mod tests {
    use tract_onnx::pb::{AttributeProto, attribute_proto::AttributeType};

    use super::*;

    fn proto(op_type: &str, inputs: &[&str], outputs: &[&str]) -> NodeProto {
        NodeProto {
            op_type: op_type.to_string(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn int_attr(name: &str, value: i64) -> AttributeProto {
        AttributeProto {
            name: name.to_string(),
            r#type: AttributeType::Int as i32,
            i: value,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_preserves_order() {
        let mut conv = proto("Conv", &["x", "w", "b"], &["c"]);
        conv.attribute = vec![
            int_attr("group", 1),
            AttributeProto {
                name: "strides".to_string(),
                r#type: AttributeType::Ints as i32,
                ints: vec![2, 2],
                ..Default::default()
            },
        ];
        let protos = vec![conv, proto("Relu", &["c"], &["r"])];
        let nodes = build_nodes(&protos).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind(), OpKind::Conv);
        assert_eq!(nodes[0].inputs(), &["x", "w", "b"]);
        assert_eq!(nodes[0].outputs(), &["c"]);
        assert_eq!(nodes[0].attribute("group"), Some(&Attribute::Int(1)));
        assert_eq!(
            nodes[0].attribute("strides"),
            Some(&Attribute::Ints(vec![2, 2]))
        );
        assert_eq!(nodes[1].kind(), OpKind::Relu);
        assert!(nodes[1].attributes().is_empty());
    }

    #[test]
    fn test_unknown_operator() {
        let protos = vec![proto("Relu", &["x"], &["y"]), proto("Mystery", &["y"], &["z"])];
        assert_eq!(
            build_nodes(&protos),
            Err(LoadError::UnknownOperator {
                name: "Mystery".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_attribute() {
        let mut node = proto("LeakyRelu", &["x"], &["y"]);
        node.name = "leaky".to_string();
        node.attribute = vec![int_attr("alpha", 1), int_attr("alpha", 2)];
        assert_eq!(
            Node::try_from(&node),
            Err(LoadError::DuplicateAttribute {
                node: "leaky".to_string(),
                attribute: "alpha".to_string(),
            })
        );
    }

    #[test]
    fn test_label_and_used_inputs() {
        let node = Node::try_from(&proto("Conv", &["x", "w", ""], &["y"])).unwrap();
        assert_eq!(node.label(), "Conv(y)");
        assert_eq!(node.used_inputs().collect_vec(), vec!["x", "w"]);
        assert_eq!(node.to_string(), "Conv [x, w, ] -> [y]");
        assert_eq!(node.clone().with_name("conv0").label(), "conv0");
    }
}
