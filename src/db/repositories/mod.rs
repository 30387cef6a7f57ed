pub mod nodes;
pub mod room_requests;
