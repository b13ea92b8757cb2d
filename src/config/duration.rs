use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Deserializer};

/// Deserializes humanized durations such as `5s`, `500ms` or `10m`.
pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    DurationString::deserialize(deserializer).map(Duration::from)
}

pub(crate) fn deserialize_optional_duration<'de, D>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DurationString>::deserialize(deserializer).map(|d| d.map(Duration::from))
}
