//! Badge attendance: the read-only log of every badge's latest cycle and the
//! tap-in/tap-out ingestion that feeds it.

pub mod attendance;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod ingest;

pub use attendance::{institute_color, list_attendance_logs, AttendanceLog};
pub use ingest::{record_scan, BadgeTap, ScanOutcome};
