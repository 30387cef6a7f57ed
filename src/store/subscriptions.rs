use std::sync::{Arc, Mutex, Weak};

use log::error;

use super::{path::StorePath, ChangeCallback};

struct Subscriber {
    id: u64,
    path: StorePath,
    callback: ChangeCallback,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

/// Tracks `subscribe` registrations for a store.
///
/// Callbacks are handed out by [`SubscriberRegistry::affected`] and invoked by
/// the store after its own locks are released.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: StorePath, callback: ChangeCallback) -> Subscription {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.next_id += 1;
        let id = guard.next_id;
        guard.subscribers.push(Subscriber { id, path, callback });

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribers whose path sees a change made at `changed`.
    pub fn affected(&self, changed: &StorePath) -> Vec<(StorePath, ChangeCallback)> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.path.is_related(changed))
            .map(|subscriber| (subscriber.path.clone(), subscriber.callback.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.subscribers.len(),
            Err(poisoned) => poisoned.into_inner().subscribers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle returned by `subscribe`; the registration lives as long as it does.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<RegistryInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        match registry.lock() {
            Ok(mut guard) => guard.subscribers.retain(|s| s.id != self.id),
            Err(poisoned) => {
                error!("Subscriber registry poisoned while unsubscribing {}", self.id);
                poisoned.into_inner().subscribers.retain(|s| s.id != self.id);
            }
        };
    }
}
