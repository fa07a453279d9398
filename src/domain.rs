use std::fmt;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ChartError;
use crate::slot::TimeSlot;
use crate::template::{PathTemplate, SidecarTemplate, UrlTemplate};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SourceId {
    type Err = ChartError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(ChartError::InvalidSourceId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// strftime pattern checked up front; chrono panics when rendering a bad one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormat(String);

impl TimeFormat {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TimeFormat {
    type Err = ChartError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(ChartError::InvalidTimeFormat(value.to_string()));
        }
        if StrftimeItems::new(value).any(|item| matches!(item, Item::Error)) {
            return Err(ChartError::InvalidTimeFormat(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One remote chart feed and how its snapshots are named locally.
#[derive(Debug, Clone)]
pub struct ChartSource {
    pub id: SourceId,
    pub name: String,
    pub url: UrlTemplate,
    pub image: PathTemplate,
    pub sidecar_file: PathTemplate,
    pub time_format: TimeFormat,
    pub interval_secs: u32,
    pub offset_secs: i64,
    pub expected_kib: u32,
    pub sidecar: SidecarTemplate,
    pub realm: Option<String>,
}

/// Everything derived from one slot of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTarget {
    pub slot: TimeSlot,
    pub stamp: String,
    pub url: String,
    pub image: String,
    pub sidecar_file: String,
}

impl ChartSource {
    pub fn target(&self, slot: TimeSlot) -> SlotTarget {
        let stamp = slot.stamp(&self.time_format);
        SlotTarget {
            slot,
            url: self.url.render(&stamp, slot.minute_index()),
            image: self.image.render(&stamp),
            sidecar_file: self.sidecar_file.render(&stamp),
            stamp,
        }
    }

    /// Size assumed for progress scaling when the server declares none.
    pub fn fallback_bytes(&self) -> u64 {
        u64::from(self.expected_kib) * 1024
    }

    pub fn sidecar_text(&self, image_path: &str, slot: TimeSlot) -> String {
        self.sidecar
            .render(image_path, slot.epoch(), &slot.display_time())
    }
}
