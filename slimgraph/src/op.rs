//! The closed set of operators a pruned graph may contain.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::LoadError;

macro_rules! op_kind_constructor {
    ($(($var:ident, $name:literal)), * $(,)?) => {
        /// Operator kind of a [`crate::Node`], resolved from the ONNX `op_type` string.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum OpKind {
            $( $var ),*
        }

        impl OpKind {
            /// All known kinds, in declaration order.
            pub const ALL: &'static [OpKind] = &[$( OpKind::$var ),*];

            /// The ONNX `op_type` name of this kind.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( OpKind::$var => $name ),*
                }
            }
        }

        impl FromStr for OpKind {
            type Err = LoadError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $( $name => Ok(OpKind::$var), )*
                    _ => Err(LoadError::UnknownOperator {
                        name: name.to_string(),
                    }),
                }
            }
        }
    };
}

op_kind_constructor!(
    (Abs, "Abs"),
    (Add, "Add"),
    (AveragePool, "AveragePool"),
    (BatchNormalization, "BatchNormalization"),
    (Concat, "Concat"),
    (Constant, "Constant"),
    (Conv, "Conv"),
    (Div, "Div"),
    (Dropout, "Dropout"),
    (Elu, "Elu"),
    (Flatten, "Flatten"),
    (Gemm, "Gemm"),
    (GlobalAveragePool, "GlobalAveragePool"),
    (GlobalMaxPool, "GlobalMaxPool"),
    (Identity, "Identity"),
    (LeakyRelu, "LeakyRelu"),
    (Lrn, "LRN"),
    (MatMul, "MatMul"),
    (MaxPool, "MaxPool"),
    (Mul, "Mul"),
    (Relu, "Relu"),
    (Reshape, "Reshape"),
    (Sigmoid, "Sigmoid"),
    (Softmax, "Softmax"),
    (Sub, "Sub"),
    (Sum, "Sum"),
    (Tanh, "Tanh"),
    (Transpose, "Transpose"),
);

impl OpKind {
    /// Operators that forward their first input unchanged once training is over.
    pub fn is_identity_at_inference(&self) -> bool {
        matches!(self, OpKind::Dropout | OpKind::Identity)
    }

    pub fn is_reshape(&self) -> bool {
        matches!(self, OpKind::Reshape)
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
