//! End to end loading: raw ONNX graph in, pruned [`Graph`] and its parameters out.

use std::{collections::BTreeSet, path::Path};

use anyhow::Context;
use memmap2::Mmap;
use tracing::{debug, info};
use tract_onnx::pb::{GraphProto, ModelProto};

use crate::{
    Graph, LoadError, ParameterTable,
    node::build_nodes,
    parameter::{materialize_parameters, parameter_names},
    reachability,
    rewrite::{DropoutElision, ReshapeElision, Rewriter},
};

/// Knobs of the loading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Splice out `Dropout` and `Identity` nodes.
    pub elide_dropout: bool,
    /// Splice out `Reshape` nodes with a constant target shape.
    pub elide_reshape: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            elide_dropout: true,
            elide_reshape: true,
        }
    }
}

impl LoadOptions {
    pub fn rewriter(&self) -> Rewriter {
        let mut rewriter = Rewriter::new();
        if self.elide_dropout {
            rewriter = rewriter.with_pass(DropoutElision);
        }
        if self.elide_reshape {
            rewriter = rewriter.with_pass(ReshapeElision);
        }
        rewriter
    }
}

/// Result of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub graph: Graph,
    pub parameters: ParameterTable,
    /// Tensors the caller must feed to evaluate the graph.
    pub inputs: BTreeSet<String>,
}

impl LoadedModel {
    pub fn into_parts(self) -> (Graph, ParameterTable, BTreeSet<String>) {
        (self.graph, self.parameters, self.inputs)
    }
}

/// Names listed in the graph's declared outputs.
pub fn declared_outputs(graph: &GraphProto) -> BTreeSet<String> {
    graph.output.iter().map(|value| value.name.clone()).collect()
}

/// Prunes `graph` down to what the `required` outputs need and materializes the weights
/// the remaining nodes read.
pub fn load_graph(
    graph: GraphProto,
    required: &BTreeSet<String>,
    options: &LoadOptions,
) -> Result<LoadedModel, LoadError> {
    let GraphProto {
        node, initializer, ..
    } = graph;
    let nodes = build_nodes(&node)?;
    drop(node);
    let declared = parameter_names(&initializer);
    reachability::check_order(&nodes)?;

    let rewriter = options.rewriter();
    let before = nodes.len();
    let nodes = rewriter.run(nodes, &declared);
    debug!(
        "passes {:?} reduced the graph from {} to {} nodes",
        rewriter.pass_names(),
        before,
        nodes.len()
    );

    let needed = reachability::analyze(nodes, &declared, required)?;
    let inputs = needed.inputs.clone();
    let parameters = materialize_parameters(initializer, &needed.parameters)?;
    let graph = Graph::from(needed);
    info!(
        "pruned graph: {} nodes, {} inputs, {} parameters ({} bytes)",
        graph.len(),
        inputs.len(),
        parameters.len(),
        parameters.byte_len()
    );
    Ok(LoadedModel {
        graph,
        parameters,
        inputs,
    })
}

/// Decodes a serialized ONNX `ModelProto`.
pub fn decode_model(bytes: &[u8]) -> anyhow::Result<ModelProto> {
    use prost_tract_compat::Message;
    ModelProto::decode(bytes).context("decoding ModelProto")
}

/// Maps and decodes the model at `path`.
pub fn read_model(path: impl AsRef<Path>) -> anyhow::Result<ModelProto> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening model file {}", path.display()))?;
    // SAFETY: the file is only read, and not expected to change while mapped
    let mapped = unsafe { Mmap::map(&file) }.context("mmap-ing model file")?;
    decode_model(&mapped)
}

/// Reads the ONNX file at `path` and runs [`load_graph`] on its graph.
///
/// An empty `required` set means the graph's declared outputs.
pub fn load_onnx(
    path: impl AsRef<Path>,
    required: &BTreeSet<String>,
    options: &LoadOptions,
) -> anyhow::Result<LoadedModel> {
    let model = read_model(path)?;
    let graph = model.graph.context("model has no graph")?;
    let required = if required.is_empty() {
        declared_outputs(&graph)
    } else {
        required.clone()
    };
    Ok(load_graph(graph, &required, options)?)
}

#[cfg(test)]
mod tests {
    use tract_onnx::pb::{NodeProto, TensorProto, ValueInfoProto};

    use super::*;
    use crate::{DType, OpKind};

    fn proto(op_type: &str, inputs: &[&str], outputs: &[&str]) -> NodeProto {
        NodeProto {
            op_type: op_type.to_string(),
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: outputs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn initializer(name: &str, dims: &[i64], values: &[f32]) -> TensorProto {
        TensorProto {
            name: name.to_string(),
            dims: dims.to_vec(),
            data_type: DType::F32.onnx_code(),
            raw_data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ..Default::default()
        }
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dropout_relu_scenario() {
        let graph = GraphProto {
            node: vec![proto("Dropout", &["x"], &["y"]), proto("Relu", &["y"], &["z"])],
            ..Default::default()
        };
        let (graph, parameters, inputs) =
            load_graph(graph, &names(&["z"]), &LoadOptions::default())
                .unwrap()
                .into_parts();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.nodes()[0].kind(), OpKind::Relu);
        assert_eq!(graph.nodes()[0].inputs(), &["x"]);
        assert_eq!(graph.nodes()[0].outputs(), &["z"]);
        assert_eq!(inputs, names(&["x"]));
        assert!(parameters.is_empty());
        assert!(graph.parameter_names().is_empty());
    }

    #[test]
    fn test_unreferenced_initializer_is_excluded() {
        let graph = GraphProto {
            node: vec![proto("Relu", &["x"], &["y"])],
            initializer: vec![initializer("w", &[2, 2], &[1.0, 2.0, 3.0, 4.0])],
            ..Default::default()
        };
        let loaded = load_graph(graph, &names(&["y"]), &LoadOptions::default()).unwrap();
        assert!(loaded.parameters.is_empty());
        assert!(!loaded.inputs.contains("w"));
    }

    #[test]
    fn test_reshape_shape_parameter_is_pruned() {
        let graph = GraphProto {
            node: vec![
                proto("Reshape", &["x", "shape"], &["flat"]),
                proto("Gemm", &["flat", "w", "b"], &["y"]),
            ],
            initializer: vec![
                // int64 shapes are never materialized once the reshape is gone
                TensorProto {
                    name: "shape".to_string(),
                    dims: vec![2],
                    data_type: 7,
                    raw_data: vec![0; 16],
                    ..Default::default()
                },
                initializer("w", &[1, 2], &[0.5, 0.5]),
                initializer("b", &[1], &[1.0]),
            ],
            ..Default::default()
        };
        let loaded = load_graph(graph.clone(), &names(&["y"]), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.graph.nodes()[0].inputs(), &["x", "w", "b"]);
        assert_eq!(loaded.graph.parameter_names(), &names(&["b", "w"]));
        assert_eq!(loaded.parameters.len(), 2);

        // keeping the reshape keeps its int64 shape, which cannot be materialized
        let keep = LoadOptions {
            elide_reshape: false,
            ..Default::default()
        };
        assert_eq!(
            load_graph(graph, &names(&["y"]), &keep),
            Err(LoadError::UnsupportedDataType {
                name: "shape".to_string(),
                code: 7,
            })
        );
    }

    #[test]
    fn test_keep_dropout_option() {
        let graph = GraphProto {
            node: vec![proto("Dropout", &["x"], &["y"]), proto("Relu", &["y"], &["z"])],
            ..Default::default()
        };
        let options = LoadOptions {
            elide_dropout: false,
            ..Default::default()
        };
        assert_eq!(options.rewriter().pass_names(), vec!["reshape"]);
        let loaded = load_graph(graph, &names(&["z"]), &options).unwrap();
        assert_eq!(loaded.graph.len(), 2);
        assert_eq!(loaded.inputs, names(&["x"]));
    }

    #[test]
    fn test_errors_are_propagated() {
        let unknown = GraphProto {
            node: vec![proto("Mystery", &["x"], &["y"])],
            ..Default::default()
        };
        assert!(matches!(
            load_graph(unknown, &names(&["y"]), &LoadOptions::default()),
            Err(LoadError::UnknownOperator { .. })
        ));

        let graph = GraphProto {
            node: vec![proto("Relu", &["x"], &["y"])],
            ..Default::default()
        };
        assert_eq!(
            load_graph(graph.clone(), &BTreeSet::new(), &LoadOptions::default()),
            Err(LoadError::EmptyOutputSet)
        );
        assert_eq!(
            load_graph(graph, &names(&["z"]), &LoadOptions::default()),
            Err(LoadError::DanglingOutputReference {
                name: "z".to_string()
            })
        );
    }

    #[test]
    fn test_consumer_before_elided_producer() {
        let graph = GraphProto {
            node: vec![proto("Relu", &["y"], &["z"]), proto("Dropout", &["x"], &["y"])],
            ..Default::default()
        };
        let expected = Err(LoadError::NotTopologicallySorted {
            node: "Relu(z)".to_string(),
            input: "y".to_string(),
        });
        assert_eq!(
            load_graph(graph.clone(), &names(&["z"]), &LoadOptions::default()),
            expected
        );
        let keep = LoadOptions {
            elide_dropout: false,
            ..Default::default()
        };
        assert_eq!(load_graph(graph, &names(&["z"]), &keep), expected);
    }

    #[test]
    fn test_declared_outputs() {
        let graph = GraphProto {
            output: vec![
                ValueInfoProto {
                    name: "logits".to_string(),
                    ..Default::default()
                },
                ValueInfoProto {
                    name: "probs".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(declared_outputs(&graph), names(&["logits", "probs"]));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_model(&[0xff, 0xff, 0xff]).is_err());
    }
}
