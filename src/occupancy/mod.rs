pub mod error;
pub mod resolver;

pub use error::OccupancyError;
pub use resolver::{require_binding, resolve_status, OccupancyResolver, RoomEvaluation};
