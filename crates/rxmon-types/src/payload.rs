//! Payload values carried by on-next and on-error notifications.

use serde::{Deserialize, Serialize};

use crate::{ObjectId, TypeId};

/// A scalar value the producer was able to capture by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Primitive {
    /// A null reference or an empty value.
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Text(String),
    Bytes(Vec<u8>),
    /// A point in time, in 100ns ticks as reported by the producer.
    Timestamp(i64),
    /// A time span, in 100ns ticks.
    Duration(i64),
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "'{v}'"),
            Self::Text(v) => write!(f, "\"{v}\""),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Timestamp(ticks) => write!(f, "@{ticks}"),
            Self::Duration(ticks) => write!(f, "{ticks} ticks"),
        }
    }
}

/// A value flowing through a subscription.
///
/// Values the producer could not capture by value are described by
/// reference; their type metadata arrives separately as a `TypeDescribed`
/// record and their properties only on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum PayloadValue {
    /// A value captured by value.
    Primitive {
        /// The runtime type of the value.
        type_id: TypeId,
        /// The captured value.
        value: Primitive,
    },
    /// A reference to an object living in the instrumented process.
    ObjectRef {
        /// Producer-assigned object identity.
        object_id: ObjectId,
        /// The object's runtime type.
        type_id: TypeId,
        /// The producer's string rendering of the object.
        representation: String,
        /// Number of items, if the object is a collection.
        #[serde(default)]
        item_count: Option<i32>,
        /// The producer hit an exception while reading the value.
        #[serde(default)]
        is_exception_getting_value: bool,
    },
}

impl PayloadValue {
    /// Returns the runtime type of the value.
    pub fn type_id(&self) -> TypeId {
        match self {
            Self::Primitive { type_id, .. } | Self::ObjectRef { type_id, .. } => *type_id,
        }
    }

    /// Returns the object id when the value is held by reference.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Self::Primitive { .. } => None,
            Self::ObjectRef { object_id, .. } => Some(*object_id),
        }
    }
}

impl std::fmt::Display for PayloadValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive { value, .. } => write!(f, "{value}"),
            Self::ObjectRef { representation, .. } => f.write_str(representation),
        }
    }
}
