use std::collections::BTreeMap;

use chrono::NaiveDate;
use foundation::is_valid_coordinate;
use serde::{Deserialize, Serialize};

use crate::profile::ResultPolicy;

/// A provider result normalized to the shape the overlays work with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoRecord {
    pub id: String,
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GeoRecord {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            latitude,
            longitude,
            starts_on: None,
            description: None,
        }
    }

    pub fn with_start(mut self, starts_on: NaiveDate) -> Self {
        self.starts_on = Some(starts_on);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_valid_coordinates(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }
}

/// Id-keyed result set owned by a single overlay.
///
/// Overlapping fetches that return the same id collapse to one entry.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordSet {
    by_id: BTreeMap<String, GeoRecord>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a fetched batch. Records with unusable coordinates are dropped.
    /// Returns how many records were kept from the batch.
    pub fn apply(&mut self, policy: ResultPolicy, batch: Vec<GeoRecord>) -> usize {
        if policy == ResultPolicy::Replace {
            self.by_id.clear();
        }
        let mut kept = 0;
        for record in batch {
            if !record.has_valid_coordinates() {
                tracing::trace!(id = %record.id, "dropping record without usable coordinates");
                continue;
            }
            self.by_id.insert(record.id.clone(), record);
            kept += 1;
        }
        kept
    }

    pub fn get(&self, id: &str) -> Option<&GeoRecord> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeoRecord> {
        self.by_id.values()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
    }
}
