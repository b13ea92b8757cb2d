use serde_json::{Map, Value};

use super::ConfigLoadError;

/// A hierarchical configuration document whose root is a mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Parses YAML (JSON being a subset). `origin` names the document in errors.
    pub fn from_yaml(bytes: &[u8], origin: &str) -> Result<Self, ConfigLoadError> {
        let value: Value =
            serde_yaml::from_slice(bytes).map_err(|source| ConfigLoadError::Parse {
                origin: origin.to_string(),
                source,
            })?;
        Self::from_value(value, origin)
    }

    pub fn from_value(value: Value, origin: &str) -> Result<Self, ConfigLoadError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            // An empty file parses as null.
            Value::Null => Ok(Self::default()),
            _ => Err(ConfigLoadError::NotAMapping {
                origin: origin.to_string(),
            }),
        }
    }

    /// Returns a new document with `overrides` deep-merged on top of `self`.
    pub fn merged_with(&self, overrides: &Document) -> Document {
        let mut merged = self.0.clone();
        merge_maps(&mut merged, overrides.0.clone());
        Document(merged)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Merges `overlay` into `base`.
///
/// Mappings merge key by key, recursively. Any other overlay value, sequences
/// included, replaces the base value wholesale.
pub(crate) fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => merge_maps(base_map, overlay_map),
        (base, overlay) => *base = overlay,
    }
}

fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, overlay_value) in overlay {
        match base.get_mut(&key) {
            Some(base_value) => deep_merge(base_value, overlay_value),
            None => {
                base.insert(key, overlay_value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value, "test").unwrap()
    }

    #[test]
    fn test_override_wins_on_conflict() {
        let base = doc(json!({"name": "etl", "driverMemory": "1g", "executorCores": 2}));
        let overrides = doc(json!({"driverMemory": "4g"}));

        let merged = base.merged_with(&overrides);

        assert_eq!(
            merged.into_value(),
            json!({"name": "etl", "driverMemory": "4g", "executorCores": 2})
        );
    }

    #[test]
    fn test_nested_mappings_merge_recursively() {
        let base = doc(json!({"envs": {"A": "1", "B": "2"}, "k8s": {"namespace": "spark"}}));
        let overrides = doc(json!({"envs": {"B": "20", "C": "30"}}));

        let merged = base.merged_with(&overrides);

        assert_eq!(
            merged.into_value(),
            json!({"envs": {"A": "1", "B": "20", "C": "30"}, "k8s": {"namespace": "spark"}})
        );
    }

    #[test]
    fn test_lists_are_replaced_not_concatenated() {
        let base = doc(json!({"packages": ["a:b:1", "c:d:2"]}));
        let overrides = doc(json!({"packages": ["e:f:3"]}));

        let merged = base.merged_with(&overrides);

        assert_eq!(merged.into_value(), json!({"packages": ["e:f:3"]}));
    }

    #[test]
    fn test_scalar_replaces_mapping() {
        let base = doc(json!({"args": {"date": "today"}}));
        let overrides = doc(json!({"args": ["--full"]}));

        assert_eq!(
            base.merged_with(&overrides).into_value(),
            json!({"args": ["--full"]})
        );
    }

    #[test]
    fn test_from_yaml_rejects_non_mapping_root() {
        let err = Document::from_yaml(b"- a\n- b\n", "list.yaml").unwrap_err();
        assert!(matches!(err, ConfigLoadError::NotAMapping { ref origin } if origin == "list.yaml"));
    }

    #[test]
    fn test_from_yaml_empty_is_empty_document() {
        let document = Document::from_yaml(b"", "empty.yaml").unwrap();
        assert!(document.as_map().is_empty());
    }

    #[test]
    fn test_from_yaml_unparsable() {
        let err = Document::from_yaml(b"name: [unterminated", "broken.yaml").unwrap_err();
        assert!(matches!(err, ConfigLoadError::Parse { .. }));
    }
}
