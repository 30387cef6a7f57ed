use chrono::Utc;
use tauri::State;

use crate::{
    logs::{self, AttendanceLog, BadgeTap, ScanOutcome},
    AppState,
};

#[tauri::command]
pub async fn list_attendance_logs(state: State<'_, AppState>) -> Result<Vec<AttendanceLog>, String> {
    let building = state.settings.building();
    logs::list_attendance_logs(&state.db, &building.scans_path)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn record_scan(state: State<'_, AppState>, tap: BadgeTap) -> Result<ScanOutcome, String> {
    let building = state.settings.building();
    logs::record_scan(&state.db, &building.scans_path, &tap, Utc::now())
        .await
        .map_err(|e| format!("{e:#}"))
}
