#[cfg(feature = "desktop")]
pub mod commands;
pub mod controller;
pub mod state;

pub use controller::{BoardSink, RoomMonitor};
pub use state::{FloorView, RoomBoard, RoomView};
