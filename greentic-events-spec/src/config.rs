//! Loosely typed subscription configuration.
//!
//! Hosts hand backends a name → value map decoded from JSON. Accessors here
//! are lenient about representation (booleans may arrive as strings,
//! durations as humantime strings or millisecond counts) but strict about
//! content: a present value that cannot be read as the requested type is a
//! configuration error naming the key. Absent keys and JSON `null` read as
//! `None`, unknown keys are never looked at.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigMap(Map<String, Value>);

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for hosts and tests.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Number(value)) => Ok(Some(value.to_string())),
            Some(Value::Bool(value)) => Ok(Some(value.to_string())),
            Some(other) => Err(malformed(key, "a string", other)),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(Value::String(value)) => parse_bool(value)
                .map(Some)
                .ok_or_else(|| malformed(key, "a boolean", &Value::String(value.clone()))),
            Some(Value::Number(value)) => match value.as_u64() {
                Some(0) => Ok(Some(false)),
                Some(1) => Ok(Some(true)),
                _ => Err(malformed(key, "a boolean", &Value::Number(value.clone()))),
            },
            Some(other) => Err(malformed(key, "a boolean", other)),
        }
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(value)) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| malformed(key, "a non-negative integer", &Value::Number(value.clone()))),
            Some(Value::String(value)) => value
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| malformed(key, "a non-negative integer", &Value::String(value.clone()))),
            Some(other) => Err(malformed(key, "a non-negative integer", other)),
        }
    }

    /// Strings go through humantime (`"250ms"`, `"5s"`, `"1m 30s"`); bare
    /// integers are milliseconds.
    pub fn duration(&self, key: &str) -> Result<Option<Duration>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(value)) => value
                .as_u64()
                .map(|ms| Some(Duration::from_millis(ms)))
                .ok_or_else(|| malformed(key, "a duration", &Value::Number(value.clone()))),
            Some(Value::String(value)) => humantime::parse_duration(value.trim())
                .map(Some)
                .map_err(|err| Error::invalid_config(format!("{key}: invalid duration {value:?}: {err}"))),
            Some(other) => Err(malformed(key, "a duration", other)),
        }
    }

    /// Arrays of strings, or a single comma-separated string. Blank entries
    /// are dropped.
    pub fn string_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        let items = match self.get(key) {
            None => return Ok(None),
            Some(Value::String(value)) => value.split(',').map(str::to_string).collect::<Vec<_>>(),
            Some(Value::Array(values)) => values
                .iter()
                .map(|value| match value {
                    Value::String(item) => Ok(item.clone()),
                    other => Err(malformed(key, "a list of strings", other)),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => return Err(malformed(key, "a list of strings", other)),
        };
        Ok(Some(
            items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
        ))
    }
}

impl From<Map<String, Value>> for ConfigMap {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for ConfigMap {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(Error::invalid_config(format!(
                "configuration must be an object, got {}",
                type_name(&other)
            ))),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn malformed(key: &str, expected: &str, got: &Value) -> Error {
    Error::invalid_config(format!("{key}: expected {expected}, got {}", type_name(got)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
