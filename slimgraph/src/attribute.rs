//! Decoding of ONNX node attributes into [`Attribute`].

use serde::{Deserialize, Serialize};
use tract_onnx::pb::{AttributeProto, attribute_proto::AttributeType};

use crate::LoadError;

/// A typed attribute value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::From)]
pub enum Attribute {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
}

impl Attribute {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attribute::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Attribute::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Attribute::Ints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Attribute::Floats(v) => Some(v),
            _ => None,
        }
    }
}

impl TryFrom<&AttributeProto> for Attribute {
    type Error = LoadError;

    /// The scalar kinds are recognised by their discriminant since proto3 scalars are
    /// always present; the list kinds are recognised by being non-empty.
    fn try_from(attr: &AttributeProto) -> Result<Self, Self::Error> {
        if attr.r#type == AttributeType::Int as i32 {
            Ok(Attribute::Int(attr.i))
        } else if attr.r#type == AttributeType::Float as i32 {
            Ok(Attribute::Float(attr.f))
        } else if !attr.ints.is_empty() {
            Ok(Attribute::Ints(attr.ints.clone()))
        } else if !attr.floats.is_empty() {
            Ok(Attribute::Floats(attr.floats.clone()))
        } else {
            Err(LoadError::UnsupportedAttributeType {
                name: attr.name.clone(),
                type_code: attr.r#type,
            })
        }
    }
}
