use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    models::{format_timestamp, BadgeScanRecord},
    store::{RealtimeStore, StorePath},
};

/// A badge presented to a reader, with whatever profile the reader knows.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeTap {
    pub badge_id: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub institute: Option<String>,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
}

impl BadgeTap {
    pub fn new(badge_id: impl Into<String>) -> Self {
        Self {
            badge_id: badge_id.into(),
            ..Self::default()
        }
    }

    /// Copies the non-blank profile fields onto `record` and into `fields`.
    fn apply_profile(&self, record: &mut BadgeScanRecord, fields: &mut Map<String, Value>) {
        for (key, value, slot) in [
            ("UID", &self.uid, &mut record.uid),
            ("Name", &self.name, &mut record.name),
            ("Institute", &self.institute, &mut record.institute),
            ("Building", &self.building, &mut record.building),
            ("Room", &self.room, &mut record.room),
        ] {
            let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            *slot = Some(value.to_string());
            fields.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "record", rename_all = "camelCase")]
pub enum ScanOutcome {
    /// A new occupancy cycle started.
    TappedIn(BadgeScanRecord),
    /// The open cycle was closed.
    TappedOut(BadgeScanRecord),
}

/// Applies one tap to the badge's scan record.
///
/// With no record, or a closed one, the tap opens a new cycle: `TimeIn` is set
/// to `now` and `TimeOut` is removed. With an open record the tap closes it,
/// provided `now` is later than the recorded `TimeIn`.
pub async fn record_scan<S: RealtimeStore>(
    store: &S,
    scans_path: &str,
    tap: &BadgeTap,
    now: DateTime<Utc>,
) -> Result<ScanOutcome> {
    let record_path = StorePath::parse(scans_path)?
        .child(tap.badge_id.trim())
        .with_context(|| format!("invalid badge id '{}'", tap.badge_id))?
        .to_string();

    let snapshot = store
        .get(&record_path)
        .await
        .with_context(|| format!("failed to read scan record {record_path}"))?;
    let mut record = if snapshot.is_null() {
        BadgeScanRecord::default()
    } else {
        serde_json::from_value::<BadgeScanRecord>(snapshot)
            .with_context(|| format!("scan record {record_path} is malformed"))?
    };
    record.badge_id = tap.badge_id.trim().to_string();

    let stamp = format_timestamp(now);
    let mut fields = Map::new();
    let closing = record.is_open();
    if closing {
        record.time_out = Some(stamp.clone());
        record.validate()?;
        fields.insert("TimeOut".to_string(), Value::String(stamp));
    } else {
        record.time_in = Some(stamp.clone());
        record.time_out = None;
        fields.insert("TimeIn".to_string(), Value::String(stamp));
        fields.insert("TimeOut".to_string(), Value::Null);
    }
    tap.apply_profile(&mut record, &mut fields);

    store
        .update(&record_path, fields)
        .await
        .with_context(|| format!("failed to write scan record {record_path}"))?;

    let outcome = if closing {
        log::info!("Badge {} tapped out", record.badge_id);
        ScanOutcome::TappedOut(record)
    } else {
        log::info!("Badge {} tapped in", record.badge_id);
        ScanOutcome::TappedIn(record)
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    const SCANS: &str = "RFID_Cards";

    fn morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 5, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn first_tap_opens_a_cycle_with_profile() {
        let store = MemoryStore::new();
        let tap = BadgeTap {
            name: Some("R. Cruz".into()),
            institute: Some("ICS".into()),
            room: Some("105".into()),
            ..BadgeTap::new("14:d3:95:a7")
        };

        let outcome = record_scan(&store, SCANS, &tap, morning()).await.unwrap();

        let ScanOutcome::TappedIn(record) = outcome else {
            panic!("expected a tap-in, got {outcome:?}");
        };
        assert!(record.is_open());
        assert_eq!(record.institute.as_deref(), Some("ICS"));
        assert_eq!(
            store.get("RFID_Cards/14:d3:95:a7").await.unwrap(),
            json!({
                "Name": "R. Cruz",
                "Institute": "ICS",
                "Room": "105",
                "TimeIn": "2024-10-05 08:00:00"
            })
        );
    }

    #[tokio::test]
    async fn second_tap_closes_and_third_starts_a_new_cycle() {
        let store = MemoryStore::new();
        let tap = BadgeTap::new("14:d3:95:a7");

        record_scan(&store, SCANS, &tap, morning()).await.unwrap();
        let closed = record_scan(&store, SCANS, &tap, morning() + Duration::minutes(90))
            .await
            .unwrap();
        let ScanOutcome::TappedOut(record) = closed else {
            panic!("expected a tap-out, got {closed:?}");
        };
        assert_eq!(record.time_out.as_deref(), Some("2024-10-05 09:30:00"));

        let reopened = record_scan(&store, SCANS, &tap, morning() + Duration::hours(3))
            .await
            .unwrap();
        assert!(matches!(reopened, ScanOutcome::TappedIn(_)));
        assert_eq!(
            store.get("RFID_Cards/14:d3:95:a7").await.unwrap(),
            json!({ "TimeIn": "2024-10-05 11:00:00" })
        );
    }

    #[tokio::test]
    async fn tap_out_must_follow_tap_in() {
        let store = MemoryStore::with_data(json!({
            "RFID_Cards": { "a1": { "TimeIn": "2024-10-05 08:00:00" } }
        }));

        let result = record_scan(&store, SCANS, &BadgeTap::new("a1"), morning()).await;

        assert!(result.is_err());
        assert_eq!(
            store.get("RFID_Cards/a1").await.unwrap(),
            json!({ "TimeIn": "2024-10-05 08:00:00" })
        );
    }

    #[tokio::test]
    async fn badge_ids_cannot_address_nested_paths() {
        let store = MemoryStore::new();
        assert!(record_scan(&store, SCANS, &BadgeTap::new("a/b"), morning())
            .await
            .is_err());
        assert!(record_scan(&store, SCANS, &BadgeTap::new("  "), morning())
            .await
            .is_err());
    }
}
