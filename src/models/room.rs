use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_string()
}

/// Scheduling fields shown for a room.
///
/// Keys follow the store layout; `Intructor` keeps the spelling the store was
/// populated with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomMetadata {
    #[serde(rename = "Intructor", alias = "Instructor", default = "not_available")]
    pub instructor: String,
    #[serde(rename = "Section", default = "not_available")]
    pub section: String,
    #[serde(rename = "Email", default = "not_available")]
    pub email: String,
    #[serde(rename = "Date", default = "not_available")]
    pub date: String,
    #[serde(rename = "Time", default = "not_available")]
    pub time: String,
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
    /// `TimeOut` of the scan whose closing last cleared this room.
    #[serde(
        rename = "LastReset",
        default,
        deserialize_with = "crate::models::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_reset: Option<String>,
}

impl Default for RoomMetadata {
    fn default() -> Self {
        Self {
            instructor: not_available(),
            section: not_available(),
            email: not_available(),
            date: not_available(),
            time: not_available(),
            time_in: None,
            time_out: None,
            last_reset: None,
        }
    }
}

impl RoomMetadata {
    /// Reads a room node, substituting defaults for anything missing or malformed.
    pub fn from_snapshot(snapshot: &Value) -> Self {
        if snapshot.is_null() {
            return Self::default();
        }
        serde_json::from_value(snapshot.clone()).unwrap_or_else(|err| {
            log::warn!("Room metadata is malformed, using defaults: {err}");
            Self::default()
        })
    }

    /// True once every descriptive field is back to its default and no
    /// timestamps are mirrored on the room.
    pub fn is_cleared(&self) -> bool {
        [
            &self.instructor,
            &self.section,
            &self.email,
            &self.date,
            &self.time,
        ]
        .iter()
        .all(|field| is_placeholder(field))
            && self.time_in.is_none()
            && self.time_out.is_none()
    }

    /// Whether the cycle that closed at `time_out` has already been cleared.
    pub fn was_reset_for(&self, time_out: &str) -> bool {
        self.last_reset.as_deref() == Some(time_out)
    }

    /// The partial update that returns a room node to its cleared state and
    /// records which closed cycle triggered it.
    pub fn reset_fields(cycle_time_out: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        for key in ["Intructor", "Section", "Email", "Date", "Time"] {
            fields.insert(key.to_string(), Value::String(not_available()));
        }
        fields.insert("TimeIn".to_string(), Value::Null);
        fields.insert("TimeOut".to_string(), Value::Null);
        fields.insert(
            "LastReset".to_string(),
            Value::String(cycle_time_out.to_string()),
        );
        fields
    }

    /// Address to contact the instructor, if one is on record.
    pub fn contact_email(&self) -> Option<&str> {
        let email = self.email.trim();
        if is_placeholder(email) || !email.contains('@') {
            None
        } else {
            Some(email)
        }
    }
}

fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == NOT_AVAILABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_room_uses_defaults() {
        let metadata = RoomMetadata::from_snapshot(&Value::Null);
        assert_eq!(metadata, RoomMetadata::default());
        assert!(metadata.is_cleared());
    }

    #[test]
    fn partial_room_fills_missing_fields() {
        let metadata = RoomMetadata::from_snapshot(&json!({
            "Intructor": "Prof. Santos",
            "Section": "BSIT 3A",
        }));

        assert_eq!(metadata.instructor, "Prof. Santos");
        assert_eq!(metadata.section, "BSIT 3A");
        assert_eq!(metadata.email, NOT_AVAILABLE);
        assert!(!metadata.is_cleared());
    }

    #[test]
    fn instructor_alias_is_accepted() {
        let metadata = RoomMetadata::from_snapshot(&json!({ "Instructor": "Prof. Reyes" }));
        assert_eq!(metadata.instructor, "Prof. Reyes");
    }

    #[test]
    fn mirrored_timestamp_blocks_cleared_state() {
        let metadata = RoomMetadata::from_snapshot(&json!({ "TimeOut": "2024-10-05 09:30:00" }));
        assert!(!metadata.is_cleared());
    }

    #[test]
    fn reset_fields_round_trip_to_cleared() {
        let mut node = json!({ "Intructor": "Prof. Santos", "TimeIn": "2024-10-05 08:00:00" });
        let object = node.as_object_mut().unwrap();
        for (key, value) in RoomMetadata::reset_fields("2024-10-05 09:30:00") {
            if value.is_null() {
                object.remove(&key);
            } else {
                object.insert(key, value);
            }
        }

        let metadata = RoomMetadata::from_snapshot(&node);
        assert!(metadata.is_cleared());
        assert!(metadata.was_reset_for("2024-10-05 09:30:00"));
        assert!(!metadata.was_reset_for("2024-10-06 09:30:00"));
    }

    #[test]
    fn contact_email_skips_placeholders() {
        let mut metadata = RoomMetadata::default();
        assert_eq!(metadata.contact_email(), None);

        metadata.email = "santos@school.edu".into();
        assert_eq!(metadata.contact_email(), Some("santos@school.edu"));
    }
}
