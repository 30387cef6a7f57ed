use std::collections::BTreeMap;

use chrono::Utc;
use tauri::{AppHandle, Emitter, State};
use tauri_plugin_opener::OpenerExt;

use crate::{
    models::RoomRequest,
    monitor::{BoardSink, RoomBoard, RoomView},
    settings::BuildingConfig,
    AppState,
};

pub const BOARD_EVENT: &str = "room-board-updated";

impl BoardSink for AppHandle {
    fn publish(&self, board: &RoomBoard) {
        if let Err(err) = self.emit(BOARD_EVENT, board) {
            log::error!("Failed to emit {BOARD_EVENT}: {err}");
        }
    }
}

#[tauri::command]
pub fn get_room_board(state: State<'_, AppState>) -> Result<RoomBoard, String> {
    Ok(state.monitor.board())
}

#[tauri::command]
pub fn get_room_detail(state: State<'_, AppState>, room: String) -> Result<RoomView, String> {
    state
        .monitor
        .room(&room)
        .ok_or_else(|| format!("unknown room {room}"))
}

#[tauri::command]
pub async fn request_room(
    state: State<'_, AppState>,
    room: String,
) -> Result<RoomRequest, String> {
    state
        .monitor
        .requestable_room(&room)
        .map_err(|e| e.to_string())?;

    let building = state.settings.building();
    let request = RoomRequest::new(building.name, room, Utc::now());
    state
        .db
        .insert_room_request(&request)
        .await
        .map_err(|e| e.to_string())?;

    log::info!("Room {} requested ({})", request.room, request.id);
    Ok(request)
}

#[tauri::command]
pub async fn list_room_requests(
    state: State<'_, AppState>,
    room: Option<String>,
) -> Result<Vec<RoomRequest>, String> {
    let building = state.settings.building();
    state
        .db
        .list_room_requests(&building.name, room.as_deref())
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn set_room_binding(
    state: State<'_, AppState>,
    room: String,
    badge_id: Option<String>,
) -> Result<BTreeMap<String, String>, String> {
    let BuildingConfig { bindings, .. } = state
        .settings
        .set_binding(&room, badge_id)
        .map_err(|e| e.to_string())?;

    state
        .monitor
        .rebind(bindings.clone())
        .map_err(|e| e.to_string())?;
    Ok(bindings)
}

#[tauri::command]
pub fn email_instructor(
    state: State<'_, AppState>,
    app_handle: AppHandle,
    room: String,
) -> Result<(), String> {
    let view = state
        .monitor
        .room(&room)
        .ok_or_else(|| format!("unknown room {room}"))?;
    let email = view
        .metadata
        .contact_email()
        .ok_or_else(|| format!("no instructor email on record for room {room}"))?;

    app_handle
        .opener()
        .open_url(format!("mailto:{email}"), None::<&str>)
        .map_err(|e| e.to_string())
}
