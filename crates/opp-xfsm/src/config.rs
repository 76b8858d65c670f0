//! Classifier Configuration

use crate::classifier::{Consistency, OutcomePolicy};
use crate::state::DEFAULT_FLOW_CAPACITY;
use crate::table::DEFAULT_TABLE_CAPACITY;
use crate::update::TokenBucket;
use opp_common::{OppError, OppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default pin name of the flow state store
pub const STATE_TABLE_NAME: &str = "tc/globals/state_table";
/// Default pin name of the transition table
pub const XFSM_TABLE_NAME: &str = "tc/globals/xfsm_table";

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Token-bucket parameters
    pub bucket: TokenBucket,
    /// Maximum tracked flows
    pub flow_capacity: usize,
    /// Maximum provisioned rules
    pub table_capacity: usize,
    /// Reporting of end-of-parsing and aborts
    pub outcome_policy: OutcomePolicy,
    /// Flow state read-modify-write discipline
    pub consistency: Consistency,
    /// Registry name of the flow state store
    pub state_table_name: String,
    /// Registry name of the transition table
    pub xfsm_table_name: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bucket: TokenBucket::default(),
            flow_capacity: DEFAULT_FLOW_CAPACITY,
            table_capacity: DEFAULT_TABLE_CAPACITY,
            outcome_policy: OutcomePolicy::default(),
            consistency: Consistency::default(),
            state_table_name: STATE_TABLE_NAME.into(),
            xfsm_table_name: XFSM_TABLE_NAME.into(),
        }
    }
}

impl ClassifierConfig {
    /// Load from file and validate
    pub fn load(path: impl AsRef<Path>) -> OppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to file
    pub fn save(&self, path: impl AsRef<Path>) -> OppResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject settings the classifier cannot run with
    pub fn validate(&self) -> OppResult<()> {
        self.bucket.validate()?;
        if self.flow_capacity == 0 {
            return Err(OppError::Config("flow_capacity must be non-zero".into()));
        }
        if self.table_capacity == 0 {
            return Err(OppError::Config("table_capacity must be non-zero".into()));
        }
        if self.state_table_name == self.xfsm_table_name {
            return Err(OppError::Config(format!(
                "state and xfsm tables share the name {}",
                self.state_table_name
            )));
        }
        Ok(())
    }
}
