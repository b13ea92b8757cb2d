use std::time::Duration;

use serde::Deserialize;

use super::duration::{deserialize_duration, deserialize_optional_duration};

/// Timing of the SparkApplication status loop.
///
/// `max_wait` is unset by default: the loop keeps polling until the
/// application reaches a terminal state or a shutdown signal arrives.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct PollingConfig {
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_initial_wait"
    )]
    pub initial_wait: Duration,

    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_poll_interval"
    )]
    pub poll_interval: Duration,

    #[serde(deserialize_with = "deserialize_optional_duration", default)]
    pub max_wait: Option<Duration>,

    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_error_wait"
    )]
    pub error_wait: Duration,

    /// Consecutive failed status requests tolerated before giving up
    #[serde(default = "default_max_errors")]
    pub max_errors: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_wait: default_initial_wait(),
            poll_interval: default_poll_interval(),
            max_wait: None,
            error_wait: default_error_wait(),
            max_errors: default_max_errors(),
        }
    }
}

const fn default_initial_wait() -> Duration {
    Duration::from_secs(0)
}
const fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}
const fn default_error_wait() -> Duration {
    Duration::from_secs(2)
}
const fn default_max_errors() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Debug, PartialEq)]
    struct A {
        #[serde(default)]
        config: PollingConfig,
    }

    #[test]
    fn test_polling_config_deserialize_defaults() {
        let yaml_data = r#"
          config:
            poll_interval: 15s
            max_wait: 2h
        "#;

        let a: A = serde_yaml::from_str(yaml_data).unwrap();

        assert_eq!(
            a.config,
            PollingConfig {
                initial_wait: Duration::from_secs(0),
                poll_interval: Duration::from_secs(15),
                max_wait: Some(Duration::from_secs(7200)),
                error_wait: Duration::from_secs(2),
                max_errors: 3,
            }
        );
    }

    #[test]
    fn test_polling_config_deserialize_omitted() {
        let yaml_data = r#"{}"#;

        let a: A = serde_yaml::from_str(yaml_data).unwrap();

        assert_eq!(a.config, PollingConfig::default());
        assert_eq!(a.config.max_wait, None);
    }
}
