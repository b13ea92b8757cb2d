use std::collections::BTreeMap;

use serde::Deserialize;

use super::raw::ConfigParseError;

/// Key-addressed read access to runtime secrets and settings.
pub trait VariableStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads variables from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvVariableStore;

impl VariableStore for EnvVariableStore {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl VariableStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// A config value given either inline or as a reference into the variable store.
///
/// ```yaml
/// access_key: plain-value
/// secret_key: { from_env: AWS_SECRET_ACCESS_KEY }
/// ```
#[derive(Deserialize, Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
#[serde(untagged)]
pub enum RawSecret {
    Literal(String),
    FromEnv { from_env: String },
}

impl RawSecret {
    pub(crate) fn resolve(
        &self,
        field: &str,
        variables: &dyn VariableStore,
    ) -> Result<String, ConfigParseError> {
        match self {
            RawSecret::Literal(value) => Ok(value.clone()),
            RawSecret::FromEnv { from_env } => {
                variables
                    .get(from_env)
                    .ok_or_else(|| ConfigParseError::UnresolvedVariable {
                        field: field.to_string(),
                        key: from_env.clone(),
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_secret_resolves_from_store() {
        let vars = BTreeMap::from([("S3_KEY".to_string(), "s3cr3t".to_string())]);
        let literal: RawSecret = serde_yaml::from_str("plain").unwrap();
        let referenced: RawSecret = serde_yaml::from_str("{ from_env: S3_KEY }").unwrap();

        assert_eq!(literal.resolve("a", &vars).unwrap(), "plain");
        assert_eq!(referenced.resolve("b", &vars).unwrap(), "s3cr3t");
    }

    #[test]
    fn test_raw_secret_missing_variable() {
        let vars = BTreeMap::new();
        let referenced: RawSecret = serde_yaml::from_str("{ from_env: MISSING }").unwrap();

        let err = referenced.resolve("spark.s3.secret_key", &vars).unwrap_err();
        assert!(matches!(
            err,
            ConfigParseError::UnresolvedVariable { ref field, ref key }
                if field == "spark.s3.secret_key" && key == "MISSING"
        ));
    }
}
