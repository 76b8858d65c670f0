//! Map registry
//!
//! Stores are pinned under stable names so that the provisioning step and
//! every classifier attach to the same live instance. A pinned store lives
//! as long as the registry keeps it, independently of the classifiers that
//! opened it.

use crate::state::FlowStateStore;
use crate::table::TransitionTable;
use opp_common::RegistryError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// A pinned store
#[derive(Clone)]
pub enum PinnedMap {
    /// Flow state store
    FlowState(Arc<dyn FlowStateStore>),
    /// Transition table
    Transition(Arc<dyn TransitionTable>),
}

impl PinnedMap {
    fn kind(&self) -> &'static str {
        match self {
            Self::FlowState(_) => "flow state store",
            Self::Transition(_) => "transition table",
        }
    }
}

/// Name → store registry
#[derive(Default)]
pub struct MapRegistry {
    maps: RwLock<HashMap<String, PinnedMap>>,
}

impl MapRegistry {
    /// Create empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a flow state store under `name`
    pub fn pin_flow_store(
        &self,
        name: &str,
        store: Arc<dyn FlowStateStore>,
    ) -> Result<(), RegistryError> {
        self.pin(name, PinnedMap::FlowState(store))
    }

    /// Pin a transition table under `name`
    pub fn pin_table(&self, name: &str, table: Arc<dyn TransitionTable>) -> Result<(), RegistryError> {
        self.pin(name, PinnedMap::Transition(table))
    }

    /// Attach to the flow state store pinned at `name`
    pub fn open_flow_store(&self, name: &str) -> Result<Arc<dyn FlowStateStore>, RegistryError> {
        match self.open(name)? {
            PinnedMap::FlowState(store) => Ok(store),
            other => Err(RegistryError::KindMismatch {
                name: name.to_string(),
                expected: "flow state store",
                found: other.kind(),
            }),
        }
    }

    /// Attach to the transition table pinned at `name`
    pub fn open_table(&self, name: &str) -> Result<Arc<dyn TransitionTable>, RegistryError> {
        match self.open(name)? {
            PinnedMap::Transition(table) => Ok(table),
            other => Err(RegistryError::KindMismatch {
                name: name.to_string(),
                expected: "transition table",
                found: other.kind(),
            }),
        }
    }

    /// Release `name`; open handles stay valid
    pub fn unpin(&self, name: &str) -> Result<(), RegistryError> {
        self.maps
            .write()
            .remove(name)
            .map(|_| info!(name, "map unpinned"))
            .ok_or_else(|| RegistryError::NotPinned(name.to_string()))
    }

    /// Pinned names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.maps.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn pin(&self, name: &str, map: PinnedMap) -> Result<(), RegistryError> {
        let mut maps = self.maps.write();
        if maps.contains_key(name) {
            return Err(RegistryError::AlreadyPinned(name.to_string()));
        }
        info!(name, kind = map.kind(), "map pinned");
        maps.insert(name.to_string(), map);
        Ok(())
    }

    fn open(&self, name: &str) -> Result<PinnedMap, RegistryError> {
        self.maps
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotPinned(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{STATE_TABLE_NAME, XFSM_TABLE_NAME};
    use crate::state::{FlowState, FlowStateMap, StateId};
    use crate::update::Window;
    use crate::table::XfsmTable;
    use opp_common::{FlowKey, ETH_P_IP};

    #[test]
    fn test_pin_and_open_same_instance() {
        let registry = MapRegistry::new();
        let store = Arc::new(FlowStateMap::default());
        registry.pin_flow_store(STATE_TABLE_NAME, store.clone()).unwrap();

        let opened = registry.open_flow_store(STATE_TABLE_NAME).unwrap();
        let key = FlowKey::new(ETH_P_IP, 1);
        opened.put(&key, FlowState::new(StateId(1), Window::new(0, 1))).unwrap();

        assert!(store.get(&key).is_some());
    }

    #[test]
    fn test_double_pin() {
        let registry = MapRegistry::new();
        registry.pin_table(XFSM_TABLE_NAME, Arc::new(XfsmTable::default())).unwrap();

        assert_eq!(
            registry.pin_table(XFSM_TABLE_NAME, Arc::new(XfsmTable::default())),
            Err(RegistryError::AlreadyPinned(XFSM_TABLE_NAME.into()))
        );
    }

    #[test]
    fn test_open_missing_and_wrong_kind() {
        let registry = MapRegistry::new();
        assert!(matches!(
            registry.open_table("nope"),
            Err(RegistryError::NotPinned(_))
        ));

        registry.pin_table(XFSM_TABLE_NAME, Arc::new(XfsmTable::default())).unwrap();
        assert!(matches!(
            registry.open_flow_store(XFSM_TABLE_NAME),
            Err(RegistryError::KindMismatch { found: "transition table", .. })
        ));
    }

    #[test]
    fn test_unpin_keeps_handles_alive() {
        let registry = MapRegistry::new();
        registry.pin_flow_store(STATE_TABLE_NAME, Arc::new(FlowStateMap::new(4))).unwrap();
        let handle = registry.open_flow_store(STATE_TABLE_NAME).unwrap();

        registry.unpin(STATE_TABLE_NAME).unwrap();
        assert!(registry.names().is_empty());
        assert_eq!(handle.capacity(), 4);
        assert!(registry.unpin(STATE_TABLE_NAME).is_err());
    }
}
