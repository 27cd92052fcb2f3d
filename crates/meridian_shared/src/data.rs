//! # Structured Data
//!
//! `Data` is the dynamically typed value model used by level descriptions,
//! entity templates and the params (textual) world format. `Params` is an
//! ordered string-keyed dictionary of `Data`.
//!
//! ## Void
//!
//! [`Data::Void`] is a real value, not an absence. In a params diff an
//! absent key means "unchanged" while a key holding `Void` means "delete".
//! Void serializes as JSON `null`.
//!
//! ## Serde bridge
//!
//! Any serde type converts to and from `Data` through `serde_json::Value`.
//! This is how component payloads become params and back.

use crate::str_id::StrId;
use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A dynamically typed value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Data {
    /// No value. Means "delete" where a diff is being applied.
    #[default]
    Void,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    String(String),
    /// Ordered list
    Array(Vec<Data>),
    /// Nested dictionary
    Params(Params),
}

impl Data {
    /// True for [`Data::Void`]
    #[inline]
    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Boolean value, if this is one
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer value, if this is one
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value, accepting both integers and floats
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// String value, if this is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Nested dictionary, if this is one
    #[must_use]
    pub const fn as_params(&self) -> Option<&Params> {
        match self {
            Self::Params(v) => Some(v),
            _ => None,
        }
    }

    /// Array, if this is one
    #[must_use]
    pub fn as_array(&self) -> Option<&[Data]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Converts any serializable value into `Data`.
    ///
    /// Unit-like values (`null` in JSON terms) become an empty `Params`, so
    /// that a data-less value is never mistaken for [`Data::Void`].
    ///
    /// # Errors
    ///
    /// Fails if `value` cannot be represented as JSON (e.g. non-string map keys).
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_value(value)?;
        Ok(match json {
            serde_json::Value::Null => Self::Params(Params::new()),
            other => Self::from_json(other),
        })
    }

    /// Converts `Data` into any deserializable value.
    ///
    /// # Errors
    ///
    /// Fails if the shape of the data doesn't match `T`.
    pub fn to_deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match serde_json::from_value(self.to_json()) {
            Ok(value) => Ok(value),
            // Unit-like values were stored as empty params
            Err(err) => match self {
                Self::Params(p) if p.is_empty() => {
                    serde_json::from_value(serde_json::Value::Null).map_err(|_| err)
                }
                _ => Err(err),
            },
        }
    }

    /// Converts into a JSON value. Void becomes `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Void => Value::Null,
            Self::Bool(v) => Value::Bool(*v),
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            Self::String(v) => Value::String(v.clone()),
            Self::Array(v) => Value::Array(v.iter().map(Self::to_json).collect()),
            Self::Params(p) => Value::Object(
                p.iter()
                    .map(|(k, v)| (k.as_str().to_owned(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Converts from a JSON value. `null` becomes Void.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Void,
            Value::Bool(v) => Self::Bool(v),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Params(
                map.into_iter()
                    .map(|(k, v)| (StrId::new(&k), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Field-wise difference of `self` against `base`.
    ///
    /// Returns `None` when equal. Nested params produce only the changed
    /// keys; keys missing from `self` are reported as Void. Any other value
    /// kind is reported whole.
    #[must_use]
    pub fn diff(&self, base: &Self) -> Option<Self> {
        if self == base {
            return None;
        }

        match (self, base) {
            (Self::Params(curr), Self::Params(prev)) => {
                let mut out = Params::new();
                for (key, value) in curr.iter() {
                    match prev.get(*key) {
                        Some(prev_value) => {
                            if let Some(d) = value.diff(prev_value) {
                                out.set(*key, d);
                            }
                        }
                        None => out.set(*key, value.clone()),
                    }
                }
                for (key, _) in prev.iter() {
                    if !curr.contains(*key) {
                        out.set(*key, Self::Void);
                    }
                }
                Some(Self::Params(out))
            }
            _ => Some(self.clone()),
        }
    }

    /// Applies `patch` over `self`, recursing into nested params.
    pub fn merge(&mut self, patch: &Self) {
        match (self, patch) {
            (Self::Params(curr), Self::Params(p)) => {
                for (key, value) in p.iter() {
                    match curr.get_mut(*key) {
                        Some(existing) => existing.merge(value),
                        None => curr.set(*key, value.clone()),
                    }
                }
            }
            (this, _) => *this = patch.clone(),
        }
    }
}

impl From<bool> for Data {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Data {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Data {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Data {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Params> for Data {
    fn from(v: Params) -> Self {
        Self::Params(v)
    }
}

impl From<Vec<Data>> for Data {
    fn from(v: Vec<Data>) -> Self {
        Self::Array(v)
    }
}

/// Ordered dictionary of [`Data`] keyed by [`StrId`].
///
/// Insertion order is preserved; setting an existing key replaces its value
/// in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: Vec<(StrId, Data)>,
}

impl Params {
    /// Creates empty params
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Creates empty params with room for `capacity` entries
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Vec::with_capacity(capacity) }
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value under `key`
    #[must_use]
    pub fn get(&self, key: StrId) -> Option<&Data> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Mutable value under `key`
    pub fn get_mut(&mut self, key: StrId) -> Option<&mut Data> {
        self.entries.iter_mut().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// True if `key` is present (even when its value is Void)
    #[must_use]
    pub fn contains(&self, key: StrId) -> bool {
        self.entries.iter().any(|(k, _)| *k == key)
    }

    /// Sets `key` to `value`, replacing an existing entry in place
    pub fn set(&mut self, key: StrId, value: impl Into<Data>) {
        let value = value.into();
        match self.get_mut(key) {
            Some(existing) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes `key`, returning its value
    pub fn remove(&mut self, key: StrId) -> Option<Data> {
        let pos = self.entries.iter().position(|(k, _)| *k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterates entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&StrId, &Data)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Parses a JSON params document.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or a non-object top level.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Writes a pretty JSON params document.
    ///
    /// # Errors
    ///
    /// Fails only if a value can't be represented in JSON.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl FromIterator<(StrId, Data)> for Params {
    fn from_iter<I: IntoIterator<Item = (StrId, Data)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

impl Serialize for Data {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Void => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Params(p) => p.serialize(serializer),
        }
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k.as_str(), v)?;
        }
        map.end()
    }
}

struct DataVisitor;

impl<'de> Visitor<'de> for DataVisitor {
    type Value = Data;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any params value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Data, E> {
        Ok(Data::Void)
    }

    fn visit_none<E: de::Error>(self) -> Result<Data, E> {
        Ok(Data::Void)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Data, D::Error> {
        Data::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Data, E> {
        Ok(Data::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Data, E> {
        Ok(Data::Int(v))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Data, E> {
        Ok(i64::try_from(v).map_or(Data::Float(v as f64), Data::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Data, E> {
        Ok(Data::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Data, E> {
        Ok(Data::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Data, E> {
        Ok(Data::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Data, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Data::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Data, A::Error> {
        ParamsVisitor.visit_map(map).map(Data::Params)
    }
}

struct ParamsVisitor;

impl<'de> Visitor<'de> for ParamsVisitor {
    type Value = Params;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a params dictionary")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Params, A::Error> {
        let mut params = Params::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, Data>()? {
            params.set(StrId::new(&key), value);
        }
        Ok(params)
    }
}

impl<'de> Deserialize<'de> for Data {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DataVisitor)
    }
}

impl<'de> Deserialize<'de> for Params {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ParamsVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        x: f32,
        name: String,
        tag: Option<u32>,
    }

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Marker;

    fn key(s: &str) -> StrId {
        StrId::new(s)
    }

    #[test]
    fn test_params_set_replaces_in_place() {
        let mut p = Params::new();
        p.set(key("a"), 1_i64);
        p.set(key("b"), 2_i64);
        p.set(key("a"), 3_i64);
        let keys: Vec<_> = p.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(p.get(key("a")), Some(&Data::Int(3)));
    }

    #[test]
    fn test_void_is_null_in_json() {
        let mut p = Params::new();
        p.set(key("__4294967297"), Data::Void);
        let text = p.to_json_string().unwrap();
        assert!(text.contains("null"));

        let back = Params::from_json_str(&text).unwrap();
        assert!(back.contains(key("__4294967297")));
        assert!(back.get(key("__4294967297")).unwrap().is_void());
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let text = r#"{ "z": 1, "a": [true, 2.5, "s"], "m": { "k": null } }"#;
        let p = Params::from_json_str(text).unwrap();
        let keys: Vec<_> = p.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z", "a", "m"]);
        let again = Params::from_json_str(&p.to_json_string().unwrap()).unwrap();
        assert_eq!(p, again);
    }

    #[test]
    fn test_serde_bridge() {
        let s = Sample { x: 1.5, name: "hero".into(), tag: None };
        let data = Data::from_serialize(&s).unwrap();
        let back: Sample = data.to_deserialize().unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn test_unit_value_is_not_void() {
        let data = Data::from_serialize(&Marker).unwrap();
        assert!(!data.is_void());
        let back: Marker = data.to_deserialize().unwrap();
        assert_eq!(back, Marker);
    }

    #[test]
    fn test_diff_and_merge() {
        let base = Data::from_serialize(&Sample { x: 1.0, name: "a".into(), tag: Some(3) }).unwrap();
        let curr = Data::from_serialize(&Sample { x: 2.0, name: "a".into(), tag: Some(3) }).unwrap();

        let diff = curr.diff(&base).unwrap();
        let diff_params = diff.as_params().unwrap();
        assert_eq!(diff_params.len(), 1);
        assert!(diff_params.contains(key("x")));

        let mut rebuilt = base.clone();
        rebuilt.merge(&diff);
        assert_eq!(rebuilt, curr);

        assert!(curr.diff(&curr).is_none());
    }
}
