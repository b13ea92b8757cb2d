use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("The incorrect value {field}. {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

const MEMORY_FORMAT: &str = "The necessary format is '600m', '1g', etc.";

/// Typed accessors over one mapping section; `null` counts as absent.
pub(crate) struct Fields<'a> {
    map: &'a Map<String, Value>,
    prefix: &'a str,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>, prefix: &'a str) -> Self {
        Self { map, prefix }
    }

    fn name(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.prefix)
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<String, ValidationError> {
        match self.optional_str(key)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(ValidationError::new(
                self.name(key),
                "A non-empty string value is required",
            )),
        }
    }

    pub(crate) fn optional_str(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(ValidationError::new(
                self.name(key),
                "Enter the value of type str",
            )),
        }
    }

    /// A positive integer.
    pub(crate) fn optional_count(&self, key: &str) -> Result<Option<i64>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) if i > 0 => Ok(Some(i)),
                _ => Err(ValidationError::new(
                    self.name(key),
                    "Enter a positive value of type int",
                )),
            },
            Some(_) => Err(ValidationError::new(
                self.name(key),
                "Enter the value of type int",
            )),
        }
    }

    /// A positive core count that still fits once expressed in millicores.
    pub(crate) fn optional_cores(&self, key: &str) -> Result<Option<i64>, ValidationError> {
        match self.optional_count(key)? {
            Some(cores) if cores.checked_mul(1000).is_none() => Err(ValidationError::new(
                self.name(key),
                "The number of cores is too large",
            )),
            cores => Ok(cores),
        }
    }

    /// A quantity string carrying a unit suffix, such as `600m` or `2g`.
    pub(crate) fn optional_memory(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => match s.chars().last() {
                Some(last) if !last.is_ascii_digit() && s.starts_with(|c: char| c.is_ascii_digit()) => {
                    Ok(Some(s.clone()))
                }
                _ => Err(ValidationError::new(self.name(key), MEMORY_FORMAT)),
            },
            Some(_) => Err(ValidationError::new(self.name(key), MEMORY_FORMAT)),
        }
    }

    pub(crate) fn optional_str_list(
        &self,
        key: &str,
        reason: &str,
    ) -> Result<Option<Vec<String>>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(ValidationError::new(self.name(key), reason)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(ValidationError::new(self.name(key), reason)),
        }
    }

    /// A mapping of scalars, each rendered as text.
    pub(crate) fn optional_scalar_map(
        &self,
        key: &str,
        reason: &str,
    ) -> Result<Option<BTreeMap<String, String>>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    scalar_text(v)
                        .map(|text| (k.clone(), text))
                        .ok_or_else(|| ValidationError::new(format!("{}.{k}", self.name(key)), reason))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Some),
            Some(_) => Err(ValidationError::new(self.name(key), reason)),
        }
    }

    /// Either a list of scalars or a mapping rendered as `--key=value`.
    pub(crate) fn optional_args(&self, key: &str) -> Result<Option<Vec<String>>, ValidationError> {
        const REASON: &str = "Enter the values in the format of the dictionary or list";
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| scalar_text(item).ok_or_else(|| ValidationError::new(self.name(key), REASON)))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| {
                    scalar_text(v)
                        .map(|text| format!("--{k}={text}"))
                        .ok_or_else(|| ValidationError::new(format!("{}.{k}", self.name(key)), REASON))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(ValidationError::new(self.name(key), REASON)),
        }
    }

    /// A nested mapping section; absent sections yield an empty mapping.
    pub(crate) fn optional_section(
        &self,
        key: &str,
    ) -> Result<Option<&'a Map<String, Value>>, ValidationError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(ValidationError::new(
                self.name(key),
                "Enter values in the dictionary format",
            )),
        }
    }

    pub(crate) fn unknown_keys(&self, known: &[&str]) -> Vec<String> {
        self.map
            .keys()
            .filter(|k| !known.contains(&k.as_str()))
            .cloned()
            .collect()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        _ => None,
    }
}
