use anyhow::Result;
use log::{debug, error, info};

use crate::{
    models::{RoomMetadata, RoomStatus, ScanIndex},
    store::{RealtimeStore, StorePath},
};

use super::OccupancyError;

/// Derives a room's status from the scan of the badge bound to it.
///
/// * no binding → `Pending`
/// * `TimeOut` recorded → `Available`
/// * `TimeIn` recorded without `TimeOut` → `Occupied`
/// * no scan → `Pending`
pub fn resolve_status(bound_badge: Option<&str>, scans: &ScanIndex) -> RoomStatus {
    let Some(badge_id) = bound_badge else {
        return RoomStatus::Pending;
    };

    match scans.get(badge_id) {
        Some(record) if record.time_out.is_some() => RoomStatus::Available,
        Some(record) if record.time_in.is_some() => RoomStatus::Occupied,
        _ => RoomStatus::Pending,
    }
}

pub fn require_binding<'a>(room: &str, bound_badge: Option<&'a str>) -> Result<&'a str, OccupancyError> {
    bound_badge.ok_or_else(|| OccupancyError::MissingBinding {
        room: room.to_string(),
    })
}

/// Outcome of evaluating one room: the status always reflects scan data,
/// whatever happened to the reset.
#[derive(Debug)]
pub struct RoomEvaluation {
    pub status: RoomStatus,
    pub reset: Result<bool, OccupancyError>,
}

/// Resolves statuses and clears the metadata of rooms whose scan has closed.
#[derive(Clone)]
pub struct OccupancyResolver<S> {
    store: S,
    rooms_path: StorePath,
}

impl<S: RealtimeStore> OccupancyResolver<S> {
    pub fn new(store: S, rooms_path: &str) -> Result<Self> {
        Ok(Self {
            store,
            rooms_path: StorePath::parse(rooms_path)?,
        })
    }

    pub fn rooms_path(&self) -> &StorePath {
        &self.rooms_path
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolve_status(&self, room: &str, bound_badge: Option<&str>, scans: &ScanIndex) -> RoomStatus {
        if let Err(err) = require_binding(room, bound_badge) {
            debug!("{err}; reporting Pending");
        }
        resolve_status(bound_badge, scans)
    }

    /// Clears the room's metadata once its bound scan has closed.
    ///
    /// Returns `Ok(true)` when a reset was written. The write is skipped when
    /// `current` is already cleared or carries the closing scan's reset
    /// marker, and
    /// repeating it is harmless, so concurrent evaluations of the same closed
    /// scan at most rewrite the same values.
    pub async fn maybe_reset(
        &self,
        room: &str,
        bound_badge: Option<&str>,
        scans: &ScanIndex,
        current: Option<&RoomMetadata>,
    ) -> Result<bool, OccupancyError> {
        let badge_id = match require_binding(room, bound_badge) {
            Ok(badge_id) => badge_id,
            Err(_) => return Ok(false),
        };
        let Some(time_out) = scans.get(badge_id).and_then(|record| record.time_out.as_deref()) else {
            return Ok(false);
        };

        // Nothing to clear, or this closed cycle was already cleared and the
        // room has since been scheduled again.
        if current.is_some_and(|metadata| metadata.is_cleared() || metadata.was_reset_for(time_out)) {
            return Ok(false);
        }

        let path = self
            .rooms_path
            .child(room)
            .map_err(|source| OccupancyError::WriteFailure {
                room: room.to_string(),
                source,
            })?;

        match self
            .store
            .update(&path.to_string(), RoomMetadata::reset_fields(time_out))
            .await
        {
            Ok(()) => {
                info!("Room {room} data cleared.");
                Ok(true)
            }
            Err(source) => {
                error!("Failed to clear data for room {room}: {source:#}");
                Err(OccupancyError::WriteFailure {
                    room: room.to_string(),
                    source,
                })
            }
        }
    }

    /// Status plus the reset decision for one room. Never fails; a reset
    /// error is carried in the evaluation.
    pub async fn evaluate(
        &self,
        room: &str,
        bound_badge: Option<&str>,
        scans: &ScanIndex,
        current: Option<&RoomMetadata>,
    ) -> RoomEvaluation {
        let status = self.resolve_status(room, bound_badge, scans);
        let reset = if status == RoomStatus::Available {
            self.maybe_reset(room, bound_badge, scans, current).await
        } else {
            Ok(false)
        };
        RoomEvaluation { status, reset }
    }
}
