// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed property records returned by the engine for a single element.
//!
//! Engines report properties as loosely shaped JSON: plain scalars, wrapped
//! values such as `{"type": 1, "value": "Wall-001"}`, lists and nested
//! records. [`PropertyValue`] keeps those shapes apart so callers can ask for
//! `Name.value` without guessing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::types::ElementId;

/// Keys under which engines report the element id.
const ID_KEYS: [&str; 2] = ["id", "expressID"];

/// One property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    /// Engine value wrapper, e.g. `{"type": 1, "value": "Wall-001"}`.
    Wrapped {
        kind: Option<i64>,
        value: Box<PropertyValue>,
    },
    List(Vec<PropertyValue>),
    Map(PropertyBag),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Self {
        PropertyValue::Text(value.into())
    }

    /// Wraps a value the way IFC engines label attributes (`type` 1 = label).
    pub fn label(value: impl Into<String>) -> Self {
        PropertyValue::Wrapped {
            kind: Some(1),
            value: Box::new(PropertyValue::Text(value.into())),
        }
    }

    /// Strips any number of wrapper layers.
    pub fn unwrapped(&self) -> &PropertyValue {
        let mut current = self;
        while let PropertyValue::Wrapped { value, .. } = current {
            current = value;
        }
        current
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.unwrapped() {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.unwrapped() {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyBag> {
        match self.unwrapped() {
            PropertyValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Converts back to the JSON shape the engine uses.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Integer(i) => Value::Number((*i).into()),
            PropertyValue::Real(r) => Number::from_f64(*r).map_or(Value::Null, Value::Number),
            PropertyValue::Text(s) => Value::String(s.clone()),
            PropertyValue::Wrapped { kind, value } => {
                let mut map = Map::new();
                if let Some(kind) = kind {
                    map.insert("type".into(), Value::Number((*kind).into()));
                }
                map.insert("value".into(), value.to_json());
                Value::Object(map)
            }
            PropertyValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            PropertyValue::Map(bag) => bag.to_json(),
        }
    }
}

/// An object is a wrapper when it carries `value` and at most an integer `type`.
fn is_wrapper(map: &Map<String, Value>) -> bool {
    map.contains_key("value")
        && map.len() <= 2
        && map
            .iter()
            .all(|(k, v)| k == "value" || (k == "type" && v.is_i64()))
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Integer(i),
                None => PropertyValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => PropertyValue::Text(s),
            Value::Array(items) => PropertyValue::List(items.into_iter().map(Self::from).collect()),
            Value::Object(mut map) => {
                if is_wrapper(&map) {
                    let kind = map.get("type").and_then(Value::as_i64);
                    let inner = map.remove("value").unwrap_or(Value::Null);
                    PropertyValue::Wrapped {
                        kind,
                        value: Box::new(Self::from(inner)),
                    }
                } else {
                    PropertyValue::Map(PropertyBag::from_json_map(map))
                }
            }
        }
    }
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(PropertyValue::from)
    }
}

/// All properties the engine reported for one element, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(BTreeMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_json_map(map: Map<String, Value>) -> Self {
        PropertyBag(
            map.into_iter()
                .map(|(k, v)| (k, PropertyValue::from(v)))
                .collect(),
        )
    }

    /// Builds a bag from an engine JSON record. Non-object values yield an
    /// empty bag.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_json_map(map),
            _ => Self::default(),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PropertyValue) -> Option<PropertyValue> {
        self.0.insert(key.into(), value)
    }

    pub fn with(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    /// The element id, read from `id` or else `expressID`.
    pub fn id(&self) -> Option<ElementId> {
        ID_KEYS.iter().find_map(|key| {
            self.get(key)
                .and_then(PropertyValue::as_i64)
                .and_then(|id| u32::try_from(id).ok())
                .map(ElementId)
        })
    }

    /// Injects `id` when the bag has none. Returns `true` if it was added.
    pub fn ensure_id(&mut self, id: ElementId) -> bool {
        if self.contains_key("id") {
            return false;
        }
        self.insert("id", PropertyValue::Integer(i64::from(id.0)));
        true
    }

    /// Display name from `Name.value`, ignoring empty strings.
    pub fn name(&self) -> Option<&str> {
        self.get("Name")
            .and_then(PropertyValue::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

impl FromIterator<(String, PropertyValue)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        PropertyBag(iter.into_iter().collect())
    }
}
