use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    models::{BadgeScanRecord, ScanIndex},
    store::RealtimeStore,
};

const UNKNOWN_INSTITUTE_COLOR: &str = "#E0E0E0";

/// Row colour for an institute. Matching is exact; anything else is grey.
pub fn institute_color(institute: Option<&str>) -> &'static str {
    match institute {
        Some("ICS") => "#ffb347",
        Some("ITE") => "#57b9ff",
        Some("IBE") => "#ffed29",
        _ => UNKNOWN_INSTITUTE_COLOR,
    }
}

/// One row of the instructor attendance table.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceLog {
    pub id: String,
    pub uid: Option<String>,
    pub name: Option<String>,
    pub institute: Option<String>,
    pub building: Option<String>,
    pub room: Option<String>,
    pub time_in: Option<String>,
    pub time_out: Option<String>,
    pub color: &'static str,
}

impl From<&BadgeScanRecord> for AttendanceLog {
    fn from(record: &BadgeScanRecord) -> Self {
        Self {
            id: record.badge_id.clone(),
            uid: record.uid.clone(),
            name: record.name.clone(),
            institute: record.institute.clone(),
            building: record.building.clone(),
            room: record.room.clone(),
            time_in: record.time_in.clone(),
            time_out: record.time_out.clone(),
            color: institute_color(record.institute.as_deref()),
        }
    }
}

/// Reads the scans collection once and returns one row per badge, ordered by
/// badge id.
pub async fn list_attendance_logs<S: RealtimeStore>(
    store: &S,
    scans_path: &str,
) -> Result<Vec<AttendanceLog>> {
    let snapshot = store
        .get(scans_path)
        .await
        .with_context(|| format!("failed to read attendance from {scans_path}"))?;

    Ok(ScanIndex::from_snapshot(&snapshot)
        .iter()
        .map(AttendanceLog::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn institutes_map_to_legend_colors() {
        assert_eq!(institute_color(Some("ICS")), "#ffb347");
        assert_eq!(institute_color(Some("ITE")), "#57b9ff");
        assert_eq!(institute_color(Some("IBE")), "#ffed29");
        assert_eq!(institute_color(Some("ics")), "#E0E0E0");
        assert_eq!(institute_color(None), "#E0E0E0");
    }

    #[tokio::test]
    async fn logs_are_ordered_by_badge_and_skip_malformed_records() {
        let store = MemoryStore::with_data(json!({
            "RFID_Cards": {
                "b2:00": {
                    "UID": 20210042,
                    "Name": "L. Reyes",
                    "Institute": "ITE",
                    "Building": "Old",
                    "Room": "201",
                    "TimeIn": "2024-10-05 10:00:00"
                },
                "a1:00": {
                    "UID": "2019-0007",
                    "Name": "R. Cruz",
                    "Institute": "ICS",
                    "Room": "105",
                    "TimeIn": "2024-10-05 08:00:00",
                    "TimeOut": "2024-10-05 09:30:00"
                },
                "zz:99": "not a record"
            }
        }));

        let logs = list_attendance_logs(&store, "RFID_Cards").await.unwrap();

        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, "a1:00");
        assert_eq!(logs[0].color, "#ffb347");
        assert_eq!(logs[0].time_out.as_deref(), Some("2024-10-05 09:30:00"));
        assert_eq!(logs[1].id, "b2:00");
        assert_eq!(logs[1].uid.as_deref(), Some("20210042"));
        assert_eq!(logs[1].color, "#57b9ff");
        assert_eq!(logs[1].time_out, None);
    }

    #[tokio::test]
    async fn missing_collection_yields_no_rows() {
        let store = MemoryStore::new();
        assert!(list_attendance_logs(&store, "RFID_Cards").await.unwrap().is_empty());
    }
}
