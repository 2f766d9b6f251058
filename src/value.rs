//! Attribute values for entities and document metadata
//!
//! A closed set of scalar and array kinds with exact equality and
//! round-trip-stable serialization, instead of free-form dynamic maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered attribute map used by graph entities and document metadata
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A single attribute value
///
/// Untagged: serializes as the plain JSON scalar/array. Variant order
/// matters for deserialization (bool before int before float before string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<AttrValue>),
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(v: Vec<AttrValue>) -> Self {
        Self::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut attrs = AttrMap::new();
        attrs.insert("lang".into(), "rust".into());
        attrs.insert("count".into(), AttrValue::Int(3));
        attrs.insert("pinned".into(), AttrValue::Bool(true));

        let json = serde_json::to_string(&attrs).unwrap();
        let back: AttrMap = serde_json::from_str(&json).unwrap();
        assert_eq!(attrs, back);
    }

    #[test]
    fn test_untagged_discrimination() {
        let v: AttrValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, AttrValue::Bool(true));
        let v: AttrValue = serde_json::from_str("7").unwrap();
        assert_eq!(v, AttrValue::Int(7));
        let v: AttrValue = serde_json::from_str("7.5").unwrap();
        assert_eq!(v, AttrValue::Float(7.5));
        let v: AttrValue = serde_json::from_str("[\"a\", 1]").unwrap();
        assert_eq!(
            v,
            AttrValue::List(vec![AttrValue::Str("a".into()), AttrValue::Int(1)])
        );
    }
}
