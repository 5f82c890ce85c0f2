//! Post-commit change notifications.
//!
//! Subscribers are invoked strictly after a durable commit, never while
//! the store's serialization boundary or write transaction is held, so a
//! callback may re-enter the cache API freely. Unsubscription is tied to
//! token lifetime: dropping the token removes the subscriber.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use ulid::Ulid;

use crate::core::scope::ScopeKind;

pub type ChangeCallback = dyn Fn(ScopeKind) + Send + Sync;

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    subscribers: HashMap<String, Arc<ChangeCallback>>,
}

impl SubscriberRegistry {
    pub(crate) fn insert(&mut self, callback: Arc<ChangeCallback>) -> String {
        let id = Ulid::new().to_string();
        self.subscribers.insert(id.clone(), callback);
        id
    }

    pub(crate) fn remove(&mut self, id: &str) {
        self.subscribers.remove(id);
    }

    /// Snapshot the current callbacks so they can be invoked after the
    /// registry lock is released.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ChangeCallback>> {
        self.subscribers.values().cloned().collect()
    }
}

/// Handle for one subscription. Dropping it unsubscribes.
pub struct NotificationToken {
    id: String,
    registry: Weak<Mutex<SubscriberRegistry>>,
}

impl NotificationToken {
    pub(crate) fn new(id: String, registry: Weak<Mutex<SubscriberRegistry>>) -> NotificationToken {
        NotificationToken { id, registry }
    }
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().unwrap().remove(&self.id);
        }
    }
}
