//! Change notifications for rendering/UI collaborators.
//!
//! A [`Signal`] is a single-threaded, typed event emitter. Subscribers are
//! registered with [`Signal::connect`] and keyed by a [`SubscriptionId`];
//! emission visits them in registration order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Handle returned by [`Signal::connect`].
pub type SubscriptionId = u64;

/// Name of an observable cell state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateName {
    #[serde(rename = "trusted")]
    Trusted,
    #[serde(rename = "isDirty")]
    IsDirty,
    #[serde(rename = "executionCount")]
    ExecutionCount,
}

impl StateName {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::IsDirty => "isDirty",
            Self::ExecutionCount => "executionCount",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `stateChanged` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub name: StateName,
    pub old_value: Value,
    pub new_value: Value,
}

impl StateChange {
    #[must_use]
    pub fn new(name: StateName, old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self {
            name,
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// Notification emitted by a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "camelCase")]
pub enum CellEvent {
    /// Source text, metadata, outputs, attachments or execution count changed.
    ContentChanged,
    /// A named state changed.
    StateChanged(StateChange),
}

type Subscriber<T> = Box<dyn FnMut(&T)>;

/// Typed event emitter.
pub struct Signal<T> {
    next_id: SubscriptionId,
    subscribers: BTreeMap<SubscriptionId, Subscriber<T>>,
}

impl<T> Signal<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: BTreeMap::new(),
        }
    }

    /// Register a subscriber.
    pub fn connect(&mut self, subscriber: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        self.subscribers.insert(id, Box::new(subscriber));
        id
    }

    /// Unregister a subscriber. Returns `false` if it was not registered.
    pub fn disconnect(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn disconnect_all(&mut self) {
        self.subscribers.clear();
    }

    pub fn emit(&mut self, event: &T) {
        for subscriber in self.subscribers.values_mut() {
            subscriber(event);
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
