use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::{
    models::{RoomMetadata, RoomStatus, ScanIndex},
    settings::BuildingConfig,
};

/// One cell of the room grid.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub room: String,
    pub floor: String,
    pub status: RoomStatus,
    pub color: &'static str,
    pub badge_id: Option<String>,
    pub metadata: RoomMetadata,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FloorView {
    pub name: String,
    pub rooms: Vec<RoomView>,
}

/// Everything the building screen renders, recomputed on every feed change.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomBoard {
    pub building: String,
    /// True until the first scan snapshot has arrived.
    pub loading: bool,
    pub floors: Vec<FloorView>,
}

impl RoomBoard {
    /// Board shown before any data arrives: every room `Pending`.
    pub fn loading(config: &BuildingConfig) -> Self {
        let floors = config
            .floors
            .iter()
            .map(|floor| FloorView {
                name: floor.name.clone(),
                rooms: floor
                    .rooms
                    .iter()
                    .map(|room| RoomView {
                        room: room.clone(),
                        floor: floor.name.clone(),
                        status: RoomStatus::Pending,
                        color: RoomStatus::Pending.color(),
                        badge_id: config.badge_for(room).map(str::to_string),
                        metadata: RoomMetadata::default(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            building: config.name.clone(),
            loading: true,
            floors,
        }
    }

    pub fn room(&self, room: &str) -> Option<&RoomView> {
        self.floors
            .iter()
            .flat_map(|floor| floor.rooms.iter())
            .find(|view| view.room == room)
    }
}

pub(crate) enum FeedEvent {
    Scans(Value),
    Rooms(Value),
    Rebind(BTreeMap<String, String>),
}

/// Latest snapshots received from the store.
#[derive(Default)]
pub(crate) struct FeedState {
    pub scans: ScanIndex,
    pub rooms: Value,
    pub scans_loaded: bool,
    pub rooms_loaded: bool,
}

impl FeedState {
    pub fn apply(&mut self, event: FeedEvent, config: &mut BuildingConfig) {
        match event {
            FeedEvent::Scans(snapshot) => {
                self.scans = ScanIndex::from_snapshot(&snapshot);
                self.scans_loaded = true;
            }
            FeedEvent::Rooms(snapshot) => {
                self.rooms = snapshot;
                self.rooms_loaded = true;
            }
            FeedEvent::Rebind(bindings) => {
                config.bindings = bindings;
            }
        }
    }

    /// `None` until the rooms snapshot has arrived; afterwards a missing room
    /// reads as defaults.
    pub fn metadata_for(&self, room: &str) -> Option<RoomMetadata> {
        if !self.rooms_loaded {
            return None;
        }
        let node = self.rooms.get(room).unwrap_or(&Value::Null);
        Some(RoomMetadata::from_snapshot(node))
    }
}
