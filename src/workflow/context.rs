//! Typed values shared between stages.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use strum_macros::Display;

use crate::models::CropWindow;
use crate::series::ImageSeries;

/// Integral numbers below this are written to JSON as integers.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Kind of a context [Value], declared by handler parameters and outputs
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    /// Accepts any value
    Any,
    Null,
    Bool,
    Number,
    Text,
    List,
    Map,
    Series,
    /// A crop window; lists and maps are converted when the stage runs
    Window,
}

impl ValueKind {
    /// Whether a parameter of this kind accepts a value of kind `other`.
    pub fn accepts(self, other: ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Any, _) | (_, ValueKind::Any) => true,
            (ValueKind::Window, ValueKind::List | ValueKind::Map) => true,
            (expected, found) => expected == found,
        }
    }
}

/// A value in the workflow context
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Series(ImageSeries),
    Window(CropWindow),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
            Value::Series(_) => ValueKind::Series,
            Value::Window(_) => ValueKind::Window,
        }
    }

    /// Convert a JSON literal.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON. Series become a map of their name, template and identifiers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER => {
                serde_json::Value::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Value::Series(series) => serde_json::json!({
                "name": series.name(),
                "template": series.template().as_str(),
                "identifiers": series.identifiers(),
            }),
            Value::Window(window) => serde_json::json!(window),
        }
    }

    /// Follow `path` through nested maps.
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        path.iter().try_fold(self, |value, key| match value {
            Value::Map(map) => map.get(key),
            _ => None,
        })
    }
}

/// Named values produced by stages or supplied up front
#[derive(Clone, Debug, Default)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, returning the previous value.
    pub fn insert(&mut self, name: &str, value: Value) -> Option<Value> {
        self.values.insert(name.to_string(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Resolve `root.path...`.
    pub fn resolve(&self, root: &str, path: &[String]) -> Option<&Value> {
        self.get(root)?.get_path(path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names in the context, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
