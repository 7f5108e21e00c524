use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::representation::Representation;

/// Data object that can present itself in one or more representations.
///
/// Representations are listed most preferred first; the matcher tries them in
/// that order, so an object already materialized in a backend should list
/// that backend's representation before generic ones like `"rows"`.
/// The list may depend on run-time state and is re-read on every dispatch.
pub trait DataObject: Any + Send + Sync + fmt::Debug {
    /// Ordered representations this object can present as.
    fn representations(&self) -> Vec<Representation>;

    /// Upcast used for downcasting to the concrete object type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn DataObject {
    /// Returns the concrete object if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: DataObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Dynamic value passed to and returned from operations.
///
/// Covers the JSON-like scalar and container types plus [`Value::Object`] for
/// backend data objects. Every value knows its own representations (see
/// [`Value::representations`]), so plain values can be dispatched on as
/// well as data objects.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// Ordered sequence of values. As an operand this is a list operand.
    Array(Vec<Value>),
    /// String-keyed record. Uses `BTreeMap` for deterministic ordering.
    Map(BTreeMap<String, Value>),
    /// Backend data object.
    Object(Arc<dyn DataObject>),
}

impl Value {
    /// Wraps a data object.
    #[must_use]
    pub fn object<T: DataObject>(object: T) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Ordered representations of this value, most preferred first.
    ///
    /// Scalars have fixed tags (`Int` is `integer` then `number`). An array
    /// exposes, as list representations, the representations every element
    /// has in common, in the first element's order. An empty array exposes
    /// none, and neither does an array of arrays: there are no list-of-list
    /// representations.
    #[must_use]
    pub fn representations(&self) -> Vec<Representation> {
        match self {
            Self::Null => vec![Representation::new("null")],
            Self::Bool(_) => vec![Representation::new("bool")],
            Self::Int(_) => vec![Representation::new("integer"), Representation::new("number")],
            Self::Float(_) => vec![Representation::new("float"), Representation::new("number")],
            Self::String(_) => vec![Representation::new("text")],
            Self::Bytes(_) => vec![Representation::new("bytes")],
            Self::Map(_) => vec![Representation::new("record")],
            Self::Object(object) => object.representations(),
            Self::Array(items) => common_representations(items)
                .into_iter()
                .filter(|rep| !rep.is_list())
                .map(Representation::into_list)
                .collect(),
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view: integers are widened to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Arc<dyn DataObject>> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Downcasts an `Object` value to its concrete type.
    #[must_use]
    pub fn downcast_ref<T: DataObject>(&self) -> Option<&T> {
        self.as_object().and_then(|object| object.downcast_ref::<T>())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Objects compare by identity; everything else structurally.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Arc<dyn DataObject>> for Value {
    fn from(object: Arc<dyn DataObject>) -> Self {
        Self::Object(object)
    }
}

/// Representations shared by all `values`, in the first value's order.
#[must_use]
pub fn common_representations(values: &[Value]) -> Vec<Representation> {
    let Some((first, rest)) = values.split_first() else {
        return Vec::new();
    };
    let mut common = first.representations();
    for value in rest {
        let theirs = value.representations();
        common.retain(|rep| theirs.contains(rep));
    }
    common
}
