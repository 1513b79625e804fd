//! Filter keys and the ordered filter set attached to a query.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Recognized filter names.
///
/// Variant order is the order the engine expects tokens in the `tbs`
/// parameter; `FilterSet` iterates in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    Color,
    ColorType,
    UsageRights,
    Size,
    Type,
    Time,
    AspectRatio,
    Format,
    ExactSize,
    TimeRange,
    Language,
    SafeSearch,
    Site,
}

impl FilterKey {
    pub const ALL: [FilterKey; 13] = [
        FilterKey::Color,
        FilterKey::ColorType,
        FilterKey::UsageRights,
        FilterKey::Size,
        FilterKey::Type,
        FilterKey::Time,
        FilterKey::AspectRatio,
        FilterKey::Format,
        FilterKey::ExactSize,
        FilterKey::TimeRange,
        FilterKey::Language,
        FilterKey::SafeSearch,
        FilterKey::Site,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::Color => "color",
            FilterKey::ColorType => "color_type",
            FilterKey::UsageRights => "usage_rights",
            FilterKey::Size => "size",
            FilterKey::Type => "type",
            FilterKey::Time => "time",
            FilterKey::AspectRatio => "aspect_ratio",
            FilterKey::Format => "format",
            FilterKey::ExactSize => "exact_size",
            FilterKey::TimeRange => "time_range",
            FilterKey::Language => "language",
            FilterKey::SafeSearch => "safe_search",
            FilterKey::Site => "site",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == normalized)
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter options for one query, at most one value per key.
///
/// Values are stored as given; validation happens when the set is encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    entries: BTreeMap<FilterKey, String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: FilterKey, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a value, returning the one it replaced.
    pub fn insert(&mut self, key: FilterKey, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key, value.into())
    }

    /// Set a value by its textual key name, as read from config or CLI.
    pub fn insert_named(&mut self, key: &str, value: impl Into<String>) -> Result<(), FilterError> {
        let parsed =
            FilterKey::from_str(key).ok_or_else(|| FilterError::UnknownFilterKey(key.to_string()))?;
        self.insert(parsed, value);
        Ok(())
    }

    pub fn remove(&mut self, key: FilterKey) -> Option<String> {
        self.entries.remove(&key)
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FilterKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Iterate in engine order.
    pub fn iter(&self) -> impl Iterator<Item = (FilterKey, &str)> {
        self.entries.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
