/// Failures the occupancy resolver can report. Neither changes the status
/// computed for a room.
#[derive(Debug, thiserror::Error)]
pub enum OccupancyError {
    /// The room has no badge mapped to it; it resolves to `Pending`.
    #[error("room {room} has no badge binding")]
    MissingBinding { room: String },

    /// The store rejected the metadata reset.
    #[error("failed to reset metadata for room {room}: {source}")]
    WriteFailure {
        room: String,
        #[source]
        source: anyhow::Error,
    },
}
