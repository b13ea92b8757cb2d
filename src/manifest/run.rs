use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::validate::{Fields, ValidationError};

/// Per-run parameters supplied by whoever triggers the job, layered over the job's own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    pub envs: BTreeMap<String, String>,
    pub args: Vec<String>,
}

impl RunContext {
    /// Reads `{ envs: {..}, args: [..] | {..} }`; other keys are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let empty = Map::new();
        let map = match value {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(ValidationError::new(
                    "run",
                    "Enter values in the dictionary format",
                ));
            }
        };
        let fields = Fields::new(map, "run");

        Ok(Self {
            envs: fields
                .optional_scalar_map("envs", "Enter the values in the format of the dictionary")?
                .unwrap_or_default(),
            args: fields.optional_args("args")?.unwrap_or_default(),
        })
    }
}
