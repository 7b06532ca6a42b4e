//! # Server Subscription Registry
//!
//! Entries live in an index-addressed slab. Listener sets are partitioned
//! into per-node sets, per-type (cascading) sets and one shared now bucket;
//! every set holds slab indices.
//!
//! A native watch is armed before the first listener joins a set and
//! disarmed only after the last one leaves. Both happen while the registry
//! lock is held, so arm/disarm calls for one key never reorder.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use super::errors::{SubscriptionError, SubscriptionResult};
use super::record::{RecordTarget, SubscriptionRecord};
use crate::observability::{log_event_with_fields, Event};

/// Boxed future returned by `NativeWatch`
pub type WatchFuture<'a, T> = Pin<Box<dyn Future<Output = SubscriptionResult<T>> + Send + 'a>>;

/// Key of one native watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKey {
    Node(u32),
    Type(u16),
}

impl WatchKey {
    fn describe(&self) -> String {
        match self {
            WatchKey::Node(id) => format!("node:{}", id),
            WatchKey::Type(id) => format!("type:{}", id),
        }
    }
}

/// Nodes and types changed since the previous poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtySet {
    pub nodes: Vec<u32>,
    pub types: Vec<u16>,
}

impl DirtySet {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.types.is_empty()
    }
}

/// Store-side change detection
pub trait NativeWatch: Send + Sync {
    fn arm(&self, key: WatchKey) -> WatchFuture<'_, ()>;

    fn disarm(&self, key: WatchKey) -> WatchFuture<'_, ()>;

    /// Returns and clears the dirty lists
    fn poll_dirty(&self) -> WatchFuture<'_, DirtySet>;
}

/// Notification delivered to a subscription listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fire {
    pub sub_id: u32,
    pub update_id: u64,
}

pub type FireSender = mpsc::UnboundedSender<Fire>;
pub type FireReceiver = mpsc::UnboundedReceiver<Fire>;

#[derive(Debug)]
struct Entry {
    record: SubscriptionRecord,
    sender: FireSender,
    last_fired: u64,
}

impl Entry {
    fn keys(&self) -> Vec<WatchKey> {
        let mut keys = vec![match self.record.target {
            RecordTarget::Node(id) => WatchKey::Node(id),
            RecordTarget::Type(id) => WatchKey::Type(id),
        }];
        for t in &self.record.types {
            let key = WatchKey::Type(*t);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    slab: Vec<Option<Entry>>,
    free: Vec<usize>,
    by_sub: HashMap<u32, usize>,
    listeners: HashMap<WatchKey, HashSet<usize>>,
    now_bucket: HashSet<usize>,
}

impl RegistryState {
    fn insert(&mut self, entry: Entry) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slab[slot] = Some(entry);
                slot
            }
            None => {
                self.slab.push(Some(entry));
                self.slab.len() - 1
            }
        }
    }

    /// Fires every listed slot not yet fired for `update_id`
    fn fire_slots(&mut self, slots: Vec<usize>, update_id: u64) -> usize {
        let mut fired = 0;
        for slot in slots {
            let Some(Some(entry)) = self.slab.get_mut(slot) else {
                continue;
            };
            if entry.last_fired >= update_id {
                continue;
            }
            entry.last_fired = update_id;
            let fire = Fire {
                sub_id: entry.record.sub_id,
                update_id,
            };
            if entry.sender.send(fire).is_ok() {
                fired += 1;
            }
        }
        fired
    }
}

/// Registry of active server-side subscriptions
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    watch: Arc<dyn NativeWatch>,
}

impl SubscriptionRegistry {
    pub fn new(watch: Arc<dyn NativeWatch>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            watch,
        }
    }

    pub fn watch(&self) -> &Arc<dyn NativeWatch> {
        &self.watch
    }

    /// Registers a subscription; arms every watch it is the first listener of
    pub async fn add(&self, record: SubscriptionRecord, sender: FireSender) -> SubscriptionResult<()> {
        let mut state = self.state.lock().await;
        if state.by_sub.contains_key(&record.sub_id) {
            return Err(SubscriptionError::DuplicateSubscription(record.sub_id));
        }

        let sub_id = record.sub_id;
        let has_now = record.has_now();
        let entry = Entry {
            record,
            sender,
            last_fired: 0,
        };
        let keys = entry.keys();

        let mut armed = Vec::new();
        for key in &keys {
            let first = state.listeners.get(key).map(HashSet::is_empty).unwrap_or(true);
            if first {
                if let Err(e) = self.watch.arm(*key).await {
                    for done in armed {
                        let _ = self.watch.disarm(done).await;
                    }
                    return Err(e);
                }
                let key_name = key.describe();
                log_event_with_fields(Event::WatchArmed, &[("key", key_name.as_str())]);
                armed.push(*key);
            }
        }

        let slot = state.insert(entry);
        for key in keys {
            state.listeners.entry(key).or_default().insert(slot);
        }
        if has_now {
            state.now_bucket.insert(slot);
        }
        state.by_sub.insert(sub_id, slot);
        Ok(())
    }

    /// Removes a subscription; disarms every watch it was the last listener of
    pub async fn remove(&self, sub_id: u32) -> SubscriptionResult<()> {
        let mut state = self.state.lock().await;
        let slot = state
            .by_sub
            .remove(&sub_id)
            .ok_or(SubscriptionError::SubscriptionNotFound(sub_id))?;
        let Some(entry) = state.slab.get_mut(slot).and_then(Option::take) else {
            return Err(SubscriptionError::SubscriptionNotFound(sub_id));
        };
        state.free.push(slot);
        state.now_bucket.remove(&slot);

        let mut first_error = None;
        for key in entry.keys() {
            let remaining = match state.listeners.get_mut(&key) {
                Some(set) => {
                    set.remove(&slot);
                    set.len()
                }
                None => continue,
            };
            if remaining == 0 {
                state.listeners.remove(&key);
                let key_name = key.describe();
                match self.watch.disarm(key).await {
                    Ok(()) => log_event_with_fields(Event::WatchDisarmed, &[("key", key_name.as_str())]),
                    Err(e) => {
                        let reason = e.to_string();
                        log_event_with_fields(
                            Event::MarkerCleanupFailed,
                            &[("key", key_name.as_str()), ("reason", reason.as_str())],
                        );
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Fires listeners of the dirty nodes and types
    pub async fn fire_dirty(&self, dirty: &DirtySet, update_id: u64) -> usize {
        let mut state = self.state.lock().await;
        let keys = dirty
            .nodes
            .iter()
            .map(|id| WatchKey::Node(*id))
            .chain(dirty.types.iter().map(|t| WatchKey::Type(*t)));
        let mut slots: Vec<usize> = Vec::new();
        for key in keys {
            if let Some(set) = state.listeners.get(&key) {
                slots.extend(set.iter().copied());
            }
        }
        slots.sort_unstable();
        slots.dedup();
        state.fire_slots(slots, update_id)
    }

    /// Patches every now record with `now_ms` and fires the now bucket
    pub async fn fire_now(&self, now_ms: i64, update_id: u64) -> SubscriptionResult<usize> {
        let mut state = self.state.lock().await;
        let mut slots: Vec<usize> = state.now_bucket.iter().copied().collect();
        slots.sort_unstable();
        for slot in &slots {
            if let Some(Some(entry)) = state.slab.get_mut(*slot) {
                entry.record.patch_now(now_ms)?;
            }
        }
        Ok(state.fire_slots(slots, update_id))
    }

    /// Cached query bytes of a subscription
    pub async fn query(&self, sub_id: u32) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        let slot = *state.by_sub.get(&sub_id)?;
        state
            .slab
            .get(slot)
            .and_then(Option::as_ref)
            .map(|e| e.record.query.clone())
    }

    /// Number of listeners currently on `key`
    pub async fn listener_count(&self, key: WatchKey) -> usize {
        self.state
            .lock()
            .await
            .listeners
            .get(&key)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.by_sub.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
