//! Turns an ONNX model into the minimal graph needed to compute a chosen set of outputs.
//!
//! The pipeline decodes node attributes, splices out no-op nodes (dropout, constant
//! reshapes), keeps only the nodes the requested outputs depend on and finally materializes
//! just the weights those nodes read. See [`load_graph`] and [`load_onnx`].

pub mod array;
pub mod attribute;
pub mod error;
pub mod graph;
pub mod loader;
pub mod node;
pub mod op;
pub mod parameter;
pub mod reachability;
pub mod rewrite;

pub use array::{Array, DType};
pub use attribute::Attribute;
pub use error::LoadError;
pub use graph::Graph;
pub use loader::{
    LoadOptions, LoadedModel, declared_outputs, decode_model, load_graph, load_onnx, read_model,
};
pub use node::Node;
pub use op::OpKind;
pub use parameter::ParameterTable;
