use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One badge's scan record as the reader writes it under `RFID_Cards/<badge>`.
///
/// The badge id is the record key and is filled in after deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BadgeScanRecord {
    #[serde(skip)]
    pub badge_id: String,
    #[serde(
        rename = "UID",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub uid: Option<String>,
    #[serde(
        rename = "Name",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(
        rename = "Institute",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub institute: Option<String>,
    #[serde(
        rename = "Building",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub building: Option<String>,
    #[serde(
        rename = "Room",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub room: Option<String>,
    #[serde(
        rename = "TimeIn",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_in: Option<String>,
    #[serde(
        rename = "TimeOut",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_out: Option<String>,
}

impl BadgeScanRecord {
    pub fn new(badge_id: impl Into<String>) -> Self {
        Self {
            badge_id: badge_id.into(),
            ..Self::default()
        }
    }

    /// A scan is open between tap-in and tap-out.
    pub fn is_open(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.time_out.is_some()
    }

    /// Checks that a recorded tap-out comes after the tap-in.
    ///
    /// Timestamps that cannot be parsed are not compared.
    pub fn validate(&self) -> Result<()> {
        if let (Some(time_in), Some(time_out)) = (&self.time_in, &self.time_out) {
            if let (Some(start), Some(end)) = (parse_timestamp(time_in), parse_timestamp(time_out)) {
                if end <= start {
                    return Err(anyhow!(
                        "badge {}: TimeOut {time_out} is not later than TimeIn {time_in}",
                        self.badge_id
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Parses the timestamp formats readers are known to write.
///
/// Naive local timestamps are read as UTC; only their ordering matters here.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, LOCAL_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.format(LOCAL_FORMAT).to_string()
}

/// All scan records keyed by badge id.
#[derive(Debug, Clone, Default)]
pub struct ScanIndex {
    records: BTreeMap<String, BadgeScanRecord>,
}

impl ScanIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from a store snapshot of the scans collection.
    ///
    /// Malformed children are skipped rather than failing the whole snapshot.
    pub fn from_snapshot(snapshot: &serde_json::Value) -> Self {
        let mut index = Self::new();
        let Some(children) = snapshot.as_object() else {
            return index;
        };

        for (badge_id, value) in children {
            match serde_json::from_value::<BadgeScanRecord>(value.clone()) {
                Ok(mut record) => {
                    record.badge_id = badge_id.clone();
                    index.insert(record);
                }
                Err(err) => {
                    log::warn!("Skipping malformed scan record {badge_id}: {err}");
                }
            }
        }
        index
    }

    pub fn insert(&mut self, record: BadgeScanRecord) {
        self.records.insert(record.badge_id.clone(), record);
    }

    pub fn get(&self, badge_id: &str) -> Option<&BadgeScanRecord> {
        self.records.get(badge_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BadgeScanRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<BadgeScanRecord> for ScanIndex {
    fn from_iter<I: IntoIterator<Item = BadgeScanRecord>>(iter: I) -> Self {
        let mut index = Self::new();
        for record in iter {
            index.insert(record);
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::RoomStatus, occupancy::resolve_status};
    use serde_json::json;

    #[test]
    fn snapshot_keys_become_badge_ids() {
        let snapshot = json!({
            "14:d3:95:a7": { "Name": "R. Cruz", "TimeIn": "2024-10-05 08:00:00" },
            "aa:bb:cc:dd": { "TimeIn": "2024-10-05 08:00:00", "TimeOut": "2024-10-05 09:30:00" },
        });

        let index = ScanIndex::from_snapshot(&snapshot);

        assert_eq!(index.len(), 2);
        let open = index.get("14:d3:95:a7").unwrap();
        assert_eq!(open.badge_id, "14:d3:95:a7");
        assert_eq!(open.name.as_deref(), Some("R. Cruz"));
        assert!(open.is_open());
        assert!(index.get("aa:bb:cc:dd").unwrap().is_closed());
    }

    #[test]
    fn empty_timestamps_count_as_absent() {
        let snapshot = json!({ "x": { "TimeIn": "2024-10-05 08:00:00", "TimeOut": "" } });

        let index = ScanIndex::from_snapshot(&snapshot);
        let record = index.get("x").unwrap();

        assert!(record.time_out.is_none());
        assert!(record.is_open());
    }

    #[test]
    fn numeric_uid_keeps_open_scan_occupied() {
        let snapshot = json!({ "14:d3:95:a7": { "UID": 2019007, "TimeIn": "2024-10-05 08:00:00" } });

        let index = ScanIndex::from_snapshot(&snapshot);
        let record = index.get("14:d3:95:a7").unwrap();

        assert_eq!(record.uid.as_deref(), Some("2019007"));
        assert_eq!(
            resolve_status(Some("14:d3:95:a7"), &index),
            RoomStatus::Occupied
        );
    }

    #[test]
    fn numeric_timestamps_count_as_present() {
        let snapshot = json!({
            "open": { "TimeIn": 1728115200000u64 },
            "closed": { "TimeIn": 1728115200000u64, "TimeOut": 1728120600000u64 },
            "cleared": { "TimeIn": false, "TimeOut": null },
        });

        let index = ScanIndex::from_snapshot(&snapshot);

        assert_eq!(resolve_status(Some("open"), &index), RoomStatus::Occupied);
        assert_eq!(resolve_status(Some("closed"), &index), RoomStatus::Available);
        assert_eq!(resolve_status(Some("cleared"), &index), RoomStatus::Pending);
        assert_eq!(
            index.get("closed").unwrap().time_out.as_deref(),
            Some("1728120600000")
        );
    }

    #[test]
    fn non_object_children_are_skipped() {
        let snapshot = json!({ "good": { "TimeIn": "2024-10-05 08:00:00" }, "bad": "scanned" });

        let index = ScanIndex::from_snapshot(&snapshot);

        assert_eq!(index.len(), 1);
        assert!(index.get("good").is_some());
    }

    #[test]
    fn non_object_snapshot_is_empty() {
        assert!(ScanIndex::from_snapshot(&serde_json::Value::Null).is_empty());
    }

    #[test]
    fn validate_rejects_tap_out_before_tap_in() {
        let mut record = BadgeScanRecord::new("x");
        record.time_in = Some("2024-10-05 09:00:00".into());
        record.time_out = Some("2024-10-05 08:00:00".into());
        assert!(record.validate().is_err());

        record.time_out = Some("2024-10-05T10:00:00Z".into());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn validate_ignores_unparseable_timestamps() {
        let mut record = BadgeScanRecord::new("x");
        record.time_in = Some("morning".into());
        record.time_out = Some("noon".into());
        assert!(record.validate().is_ok());
    }
}
