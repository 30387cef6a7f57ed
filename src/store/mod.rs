//! The real-time key-value store the rest of the app reads from.
//!
//! Records live in a JSON tree addressed by `/`-separated paths
//! (`RFID_Cards/<badge>`, `OB_Rooms_Information/<room>`). Writers send partial
//! updates; readers either fetch once or subscribe and get pushed a fresh
//! snapshot of their path whenever something at, above or below it changes.

pub mod memory;
pub mod path;
pub mod subscriptions;

use std::{future::Future, sync::Arc};

use anyhow::Result;
use serde_json::{Map, Value};

pub use memory::MemoryStore;
pub use path::StorePath;
pub use subscriptions::{SubscriberRegistry, Subscription};

/// Named fields of a partial update. A `null` value deletes the field.
pub type FieldMap = Map<String, Value>;

/// Receives the snapshot of the subscribed path, `Value::Null` when absent.
pub type ChangeCallback = Arc<dyn Fn(&Value) + Send + Sync>;

pub trait RealtimeStore: Send + Sync + 'static {
    /// One-off read of the value at `path`.
    fn get(&self, path: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Registers `on_change`, calls it once with the current snapshot, and
    /// again after every update related to `path` until the returned
    /// [`Subscription`] is dropped.
    fn subscribe(
        &self,
        path: &str,
        on_change: ChangeCallback,
    ) -> impl Future<Output = Result<Subscription>> + Send;

    /// Partial write of named fields at `path`.
    fn update(&self, path: &str, fields: FieldMap) -> impl Future<Output = Result<()>> + Send;
}
