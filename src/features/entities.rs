use std::{fmt::Display, str::FromStr, sync::Arc};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{format_duration, parse_duration};

/// Identifier of the group features are imported into. Groups are owned by the store.
pub type GroupId = u64;

/// Identifier of a persisted feature.
pub type FeatureId = u64;

/// Data type declared for a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Continuous,
    Duration,
}

impl Display for FeatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureType::Continuous => write!(f, "continuous"),
            FeatureType::Duration => write!(f, "duration"),
        }
    }
}

impl FromStr for FeatureType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(FeatureType::Continuous),
            "duration" => Ok(FeatureType::Duration),
            _ => Err(anyhow!("Unknown feature type {s}")),
        }
    }
}

impl FeatureType {
    /// Parses a raw cell according to this type. Continuous values must be finite numbers,
    /// durations follow [parse_duration].
    pub fn parse_value(self, raw: &str) -> Option<FeatureValue> {
        match self {
            FeatureType::Continuous => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FeatureValue::Continuous),
            FeatureType::Duration => parse_duration(raw).map(FeatureValue::Duration),
        }
    }
}

/// Default value of a feature, typed by its [FeatureType].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureValue {
    Continuous(f64),
    Duration(#[serde(with = "duration_ser")] Duration),
}

impl FeatureValue {
    pub fn feature_type(&self) -> FeatureType {
        match self {
            FeatureValue::Continuous(_) => FeatureType::Continuous,
            FeatureValue::Duration(_) => FeatureType::Duration,
        }
    }
}

impl Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Continuous(v) => write!(f, "{v}"),
            FeatureValue::Duration(v) => write!(f, "{}", format_duration(*v)),
        }
    }
}

mod duration_ser {
    use chrono::Duration;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = i64::deserialize(deserializer)?;
        Ok(Duration::seconds(s))
    }
}

/// One decoded CSV record. It lives only between parsing and staging in a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportRow {
    /// Line of the record in the source, the header being row 1.
    pub row: usize,
    pub name: Arc<str>,
    pub feature_type: FeatureType,
    pub default_value: Option<FeatureValue>,
    pub default_label: Option<String>,
    pub description: Option<String>,
}

/// Feature definition handed to the store. The store decides id, ordering and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeature {
    pub name: Arc<str>,
    pub feature_type: FeatureType,
    pub default_value: Option<FeatureValue>,
    pub default_label: Option<String>,
    pub description: Option<String>,
}

impl From<FeatureImportRow> for NewFeature {
    fn from(
        FeatureImportRow {
            name,
            feature_type,
            default_value,
            default_label,
            description,
            ..
        }: FeatureImportRow,
    ) -> Self {
        NewFeature {
            name,
            feature_type,
            default_value,
            default_label,
            description,
        }
    }
}

/// The struct used for storing features on the disk, one JSON line per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEntity {
    pub id: FeatureId,
    pub group_id: GroupId,
    pub name: Arc<str>,
    pub feature_type: FeatureType,
    #[serde(default)]
    pub default_value: Option<FeatureValue>,
    #[serde(default)]
    pub default_label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub display_index: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}
