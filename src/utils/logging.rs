//! Logging macros gated by a per-module `ENABLE_LOGS` constant.
//!
//! The room monitor logs on every feed change; flipping the
//! constant silences it without touching `RUST_LOG`.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//!
//! log_info!("Room {room} data cleared.");
//! ```

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors still honour `ENABLE_LOGS`; failures that must always surface are
/// returned to the caller instead.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
