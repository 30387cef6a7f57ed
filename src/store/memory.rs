use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};

use super::{
    path::StorePath,
    subscriptions::{SubscriberRegistry, Subscription},
    ChangeCallback, FieldMap, RealtimeStore,
};

/// JSON tree held in memory, with the same change notifications as the
/// persistent store. Used by tests and as a scratch store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tree: Arc<RwLock<Value>>,
    subscribers: SubscriberRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(root: Value) -> Self {
        Self {
            tree: Arc::new(RwLock::new(root)),
            subscribers: SubscriberRegistry::new(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn read(&self, path: &StorePath) -> Result<Value> {
        let tree = self
            .tree
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let mut node = &*tree;
        for segment in path.segments() {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(Value::Null),
            }
        }
        Ok(node.clone())
    }

    fn apply(&self, path: &StorePath, fields: &FieldMap) -> Result<()> {
        for key in fields.keys() {
            if key.is_empty() || key.contains('/') {
                bail!("invalid field name '{key}' for {path}");
            }
        }

        let mut tree = self
            .tree
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        merge_at(&mut tree, path.segments(), fields);
        Ok(())
    }

    fn notify(&self, changed: &StorePath) {
        for (path, callback) in self.subscribers.affected(changed) {
            match self.read(&path) {
                Ok(snapshot) => callback(&snapshot),
                Err(err) => log::error!("Failed to read {path} for subscriber: {err}"),
            }
        }
    }
}

/// Merges `fields` into the node at `segments`, creating objects on the way
/// down. Returns true when the node ends up empty so the parent can drop it.
fn merge_at(node: &mut Value, segments: &[String], fields: &FieldMap) -> bool {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    let Value::Object(object) = node else {
        return false;
    };

    match segments.split_first() {
        None => {
            for (key, value) in fields {
                if value.is_null() {
                    object.remove(key);
                } else {
                    object.insert(key.clone(), value.clone());
                }
            }
        }
        Some((head, rest)) => {
            let child = object
                .entry(head.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if merge_at(child, rest, fields) {
                object.remove(head);
            }
        }
    }

    object.is_empty()
}

impl RealtimeStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Value> {
        let path = StorePath::parse(path)?;
        self.read(&path)
    }

    async fn subscribe(&self, path: &str, on_change: ChangeCallback) -> Result<Subscription> {
        let path = StorePath::parse(path)?;
        let subscription = self.subscribers.register(path.clone(), on_change.clone());
        let snapshot = self.read(&path)?;
        on_change(&snapshot);
        Ok(subscription)
    }

    async fn update(&self, path: &str, fields: FieldMap) -> Result<()> {
        let path = StorePath::parse(path)?;
        self.apply(&path, &fields)?;
        self.notify(&path);
        Ok(())
    }
}
