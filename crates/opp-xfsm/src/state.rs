//! Flow state store
//!
//! Per-flow dynamic state: the XFSM state plus the token-bucket window.
//!
//! # Consistency
//!
//! `get` and `put` are independent operations. Two packets of the same flow
//! classified concurrently may both read the same window and the later `put`
//! wins. Callers that need a per-key read-modify-write use `update`.

use crate::update::Window;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use opp_common::{FlowKey, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Reference bound on concurrently tracked flows
pub const DEFAULT_FLOW_CAPACITY: usize = 256;

/// XFSM state identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub u32);

impl StateId {
    /// State of a flow that has no stored entry
    pub const INITIAL: Self = Self(0);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Stored state of one flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    /// Position in the state machine
    pub state: StateId,
    /// Token-bucket window
    pub window: Window,
}

impl FlowState {
    /// Create new flow state
    #[inline(always)]
    pub const fn new(state: StateId, window: Window) -> Self {
        Self { state, window }
    }
}

/// Key/value store of per-flow state
pub trait FlowStateStore: Send + Sync {
    /// Current state of `key`, if any
    fn get(&self, key: &FlowKey) -> Option<FlowState>;

    /// Overwrite the state of `key`.
    ///
    /// Only fails when `key` is new and the store is at capacity.
    fn put(&self, key: &FlowKey, state: FlowState) -> Result<(), StoreError>;

    /// Read-modify-write of one key.
    ///
    /// `f` sees the current state and returns the state to store, or `None`
    /// to leave the store untouched. The provided body is a plain `get`
    /// followed by `put` and gives no atomicity; implementations that can
    /// lock a single key override it.
    fn update(
        &self,
        key: &FlowKey,
        f: &mut dyn FnMut(Option<FlowState>) -> Option<FlowState>,
    ) -> Result<(), StoreError> {
        match f(self.get(key)) {
            Some(state) => self.put(key, state),
            None => Ok(()),
        }
    }

    /// Number of tracked flows
    fn len(&self) -> usize;

    /// Maximum number of tracked flows
    fn capacity(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sharded in-memory flow state store with a fixed capacity
pub struct FlowStateMap {
    flows: DashMap<FlowKey, FlowState>,
    /// Live entries; kept apart from `flows.len()` so it can be read under a
    /// shard lock
    count: AtomicUsize,
    capacity: usize,
}

impl FlowStateMap {
    /// Create new store holding at most `capacity` flows
    pub fn new(capacity: usize) -> Self {
        Self {
            flows: DashMap::with_capacity(capacity),
            count: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Reserve a slot for a new key
    #[inline]
    fn reserve(&self) -> Result<(), StoreError> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| StoreError::Full {
                capacity: self.capacity,
            })
    }
}

impl Default for FlowStateMap {
    fn default() -> Self {
        Self::new(DEFAULT_FLOW_CAPACITY)
    }
}

impl FlowStateStore for FlowStateMap {
    #[inline]
    fn get(&self, key: &FlowKey) -> Option<FlowState> {
        self.flows.get(key).map(|entry| *entry)
    }

    #[inline]
    fn put(&self, key: &FlowKey, state: FlowState) -> Result<(), StoreError> {
        match self.flows.entry(*key) {
            Entry::Occupied(mut entry) => {
                entry.insert(state);
                Ok(())
            }
            Entry::Vacant(entry) => {
                self.reserve()?;
                entry.insert(state);
                Ok(())
            }
        }
    }

    fn update(
        &self,
        key: &FlowKey,
        f: &mut dyn FnMut(Option<FlowState>) -> Option<FlowState>,
    ) -> Result<(), StoreError> {
        // The entry guard holds the shard lock for the whole closure
        match self.flows.entry(*key) {
            Entry::Occupied(mut entry) => {
                if let Some(state) = f(Some(*entry.get())) {
                    entry.insert(state);
                }
                Ok(())
            }
            Entry::Vacant(entry) => {
                if let Some(state) = f(None) {
                    self.reserve()?;
                    entry.insert(state);
                }
                Ok(())
            }
        }
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
