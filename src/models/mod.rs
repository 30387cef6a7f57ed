pub mod request;
pub mod room;
pub mod scan;
pub mod status;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub use request::RoomRequest;
pub use room::{RoomMetadata, NOT_AVAILABLE};
pub use scan::{format_timestamp, parse_timestamp, BadgeScanRecord, ScanIndex};
pub use status::RoomStatus;

/// Reads a text field the way badge readers and older clients write it.
///
/// Numbers and `true` are kept as their text; `null`, `false`, blank strings
/// and nested values count as absent.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) if !text.trim().is_empty() => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    })
}
