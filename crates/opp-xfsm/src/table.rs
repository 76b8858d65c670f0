//! XFSM transition table
//!
//! Rules are keyed by `(state, protocol, cond1, cond2)` and carry the next
//! state, the packet action and the window update to run. The table is
//! provisioned before traffic and only read on the packet path, so readers
//! take a lock-free snapshot and writers copy on write.

use crate::condition::Condition;
use crate::state::StateId;
use crate::update::UpdateFunction;
use arc_swap::ArcSwap;
use opp_common::TableError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Reference bound on provisioned rules
pub const DEFAULT_TABLE_CAPACITY: usize = 256;

/// Packet action carried by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum Action {
    /// Discard the packet
    Drop = 0,
    /// Let the packet through
    Forward = 1,
}

impl Action {
    /// Decode an action code
    #[inline]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Drop),
            1 => Some(Self::Forward),
            _ => None,
        }
    }

    /// Action code
    #[inline(always)]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => f.write_str("DROP"),
            Self::Forward => f.write_str("FORWARD"),
        }
    }
}

/// Rule lookup key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionKey {
    /// Current state of the flow
    pub state: StateId,
    /// EtherType of the flow
    pub protocol: u16,
    /// `now >= window.start`
    pub cond1: Condition,
    /// `now <= window.end`
    pub cond2: Condition,
}

impl TransitionKey {
    /// Create new transition key
    pub const fn new(state: StateId, protocol: u16, cond1: Condition, cond2: Condition) -> Self {
        Self {
            state,
            protocol,
            cond1,
            cond2,
        }
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, 0x{:04x}, {}, {})",
            self.state, self.protocol, self.cond1, self.cond2
        )
    }
}

/// Rule value.
///
/// Action and update codes are kept as provisioned and decoded on the
/// packet path, so a leaf written with a code this build does not know is
/// reported instead of being rejected at provisioning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionLeaf {
    /// State the flow moves to
    pub next_state: StateId,
    /// Raw action code
    pub action: u32,
    /// Raw update function code
    pub update_function: u32,
}

impl TransitionLeaf {
    /// Create a leaf from known action and update function
    pub const fn new(next_state: StateId, action: Action, update: UpdateFunction) -> Self {
        Self {
            next_state,
            action: action.code(),
            update_function: update.code(),
        }
    }

    /// Create a leaf from raw codes
    pub const fn from_raw(next_state: StateId, action: u32, update_function: u32) -> Self {
        Self {
            next_state,
            action,
            update_function,
        }
    }

    /// Decoded action, `None` for an unknown code
    #[inline]
    pub const fn decode_action(&self) -> Option<Action> {
        Action::from_code(self.action)
    }

    /// Decoded update function, `None` for an unknown code
    #[inline]
    pub const fn decode_update(&self) -> Option<UpdateFunction> {
        UpdateFunction::from_code(self.update_function)
    }
}

/// Read-mostly store of transition rules
pub trait TransitionTable: Send + Sync {
    /// Rule for `key`, if provisioned
    fn lookup(&self, key: &TransitionKey) -> Option<TransitionLeaf>;

    /// Provision a rule. Not called on the packet path.
    fn put(&self, key: TransitionKey, leaf: TransitionLeaf) -> Result<(), TableError>;

    /// Number of rules
    fn len(&self) -> usize;

    /// Check if empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory transition table with lock-free readers
pub struct XfsmTable {
    /// Current rule set (atomically swappable)
    rules: ArcSwap<HashMap<TransitionKey, TransitionLeaf>>,
    /// Serializes writers
    writer: Mutex<()>,
    capacity: usize,
}

impl XfsmTable {
    /// Create empty table holding at most `capacity` rules
    pub fn new(capacity: usize) -> Self {
        Self {
            rules: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
            capacity,
        }
    }

    /// Maximum number of rules
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of all rules, ordered for stable output
    pub fn entries(&self) -> Vec<(TransitionKey, TransitionLeaf)> {
        let rules = self.rules.load();
        let mut entries: Vec<_> = rules.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(k, _)| (k.state, k.protocol, k.cond1, k.cond2));
        entries
    }
}

impl Default for XfsmTable {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_CAPACITY)
    }
}

impl TransitionTable for XfsmTable {
    #[inline]
    fn lookup(&self, key: &TransitionKey) -> Option<TransitionLeaf> {
        self.rules.load().get(key).copied()
    }

    fn put(&self, key: TransitionKey, leaf: TransitionLeaf) -> Result<(), TableError> {
        let _guard = self.writer.lock();
        let current = self.rules.load();

        if !current.contains_key(&key) && current.len() >= self.capacity {
            return Err(TableError::Full {
                capacity: self.capacity,
            });
        }

        let mut next = HashMap::clone(&current);
        next.insert(key, leaf);
        self.rules.store(Arc::new(next));
        Ok(())
    }

    fn len(&self) -> usize {
        self.rules.load().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opp_common::ETH_P_IP;

    fn key(state: u32) -> TransitionKey {
        TransitionKey::new(StateId(state), ETH_P_IP, Condition::True, Condition::True)
    }

    #[test]
    fn test_put_lookup() {
        let table = XfsmTable::default();
        let leaf = TransitionLeaf::new(StateId(1), Action::Forward, UpdateFunction::Case1);
        table.put(key(0), leaf).unwrap();

        assert_eq!(table.lookup(&key(0)), Some(leaf));
        assert!(table.lookup(&key(1)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_conditions_are_part_of_key() {
        let table = XfsmTable::default();
        let leaf = TransitionLeaf::new(StateId(1), Action::Drop, UpdateFunction::Case3);
        table.put(key(1), leaf).unwrap();

        let other = TransitionKey::new(StateId(1), ETH_P_IP, Condition::False, Condition::True);
        assert!(table.lookup(&other).is_none());
    }

    #[test]
    fn test_capacity() {
        let table = XfsmTable::new(1);
        let leaf = TransitionLeaf::new(StateId(1), Action::Drop, UpdateFunction::Case3);
        table.put(key(0), leaf).unwrap();

        assert_eq!(table.put(key(1), leaf), Err(TableError::Full { capacity: 1 }));
        // replacing an existing rule is fine
        table.put(key(0), TransitionLeaf::new(StateId(0), Action::Forward, UpdateFunction::Case1)).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_leaf_decoding() {
        let leaf = TransitionLeaf::new(StateId(1), Action::Forward, UpdateFunction::Case2);
        assert_eq!(leaf.decode_action(), Some(Action::Forward));
        assert_eq!(leaf.decode_update(), Some(UpdateFunction::Case2));

        let raw = TransitionLeaf::from_raw(StateId(1), 7, 9);
        assert_eq!(raw.decode_action(), None);
        assert_eq!(raw.decode_update(), None);
    }

    #[test]
    fn test_entries_sorted() {
        let table = XfsmTable::default();
        let leaf = TransitionLeaf::new(StateId(1), Action::Forward, UpdateFunction::Case1);
        table.put(key(1), leaf).unwrap();
        table.put(key(0), leaf).unwrap();

        let states: Vec<_> = table.entries().iter().map(|(k, _)| k.state).collect();
        assert_eq!(states, vec![StateId(0), StateId(1)]);
    }

    #[test]
    fn test_concurrent_readers() {
        use std::thread;

        let table = Arc::new(XfsmTable::default());
        let leaf = TransitionLeaf::new(StateId(1), Action::Forward, UpdateFunction::Case1);
        table.put(key(0), leaf).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(table.lookup(&key(0)), Some(leaf));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }
}
