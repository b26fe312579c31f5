//! Module containing the [`LoadError`] type returned by every stage of the loading pipeline.

/// Errors raised while turning a raw ONNX graph into a pruned [`crate::Graph`].
///
/// None of these are transient: they all point at a malformed model or at a
/// feature we do not handle, so the pipeline stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The node's `op_type` is not one of the known [`crate::OpKind`]s.
    #[error("unknown operator: {name}")]
    UnknownOperator { name: String },

    /// The same attribute name appears twice on a single node.
    #[error("attribute '{attribute}' declared twice on node '{node}'")]
    DuplicateAttribute { node: String, attribute: String },

    /// The attribute carries none of the value kinds we decode.
    #[error("unsupported type {type_code} for attribute '{name}'")]
    UnsupportedAttributeType { name: String, type_code: i32 },

    /// The caller asked for no output at all.
    #[error("the set of required outputs is empty")]
    EmptyOutputSet,

    /// A required output is not produced by any node of the graph.
    #[error("required output '{name}' is not produced by any node")]
    DanglingOutputReference { name: String },

    /// Two nodes write the same tensor name.
    #[error("tensor '{name}' is produced by more than one node")]
    DuplicateOutput { name: String },

    /// A node consumes a tensor that is only produced further down the node list.
    #[error("node '{node}' consumes '{input}' before it is produced")]
    NotTopologicallySorted { node: String, input: String },

    /// Only 32-bit floats can be materialized.
    #[error("unsupported data type {code} for initializer '{name}'")]
    UnsupportedDataType { name: String, code: i32 },

    /// A dimension is negative or the element count overflows.
    #[error("invalid dimension {dim} in initializer '{name}'")]
    InvalidDimension { name: String, dim: i64 },

    /// The payload length disagrees with the declared dims.
    #[error("initializer '{name}' holds {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Two initializers share a name.
    #[error("initializer '{name}' is declared more than once")]
    DuplicateParameter { name: String },
}
