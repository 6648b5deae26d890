// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Enforces a non-empty application list.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::app::AppEntry;

pub(super) fn deserialize_apps<'de, D>(deserializer: D) -> Result<NonEmpty<AppEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<AppEntry> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one app is required"))
}
