//! Rule provisioning
//!
//! The transition table is seeded once before traffic. Rules can come from
//! the built-in token-bucket program or from a JSON rule file.

use crate::condition::Condition;
use crate::state::StateId;
use crate::table::{Action, TransitionKey, TransitionLeaf, TransitionTable};
use crate::update::UpdateFunction;
use opp_common::{OppResult, ETH_P_IP};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Token bucket: no packet seen yet
pub const ZERO: StateId = StateId(0);
/// Token bucket: flow is being metered
pub const ONE: StateId = StateId(1);

/// One transition rule in provisioning form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub state: StateId,
    pub protocol: u16,
    pub cond1: Condition,
    pub cond2: Condition,
    pub next_state: StateId,
    pub action: Action,
    pub update: UpdateFunction,
}

impl Rule {
    pub fn key(&self) -> TransitionKey {
        TransitionKey::new(self.state, self.protocol, self.cond1, self.cond2)
    }

    pub fn leaf(&self) -> TransitionLeaf {
        TransitionLeaf::new(self.next_state, self.action, self.update)
    }
}

/// Ordered collection of rules, as stored in a rule file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> OppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> OppResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Pretty JSON
    pub fn to_json(&self) -> OppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Two-color token bucket over IPv4 sources.
///
/// | state | cond1 | cond2 | next | action | update |
/// |-------|-------|-------|------|--------|--------|
/// | ZERO  | true  | true  | ONE  | FORWARD | CASE_1 |
/// | ONE   | true  | false | ONE  | FORWARD | CASE_2 |
/// | ONE   | true  | true  | ONE  | FORWARD | CASE_1 |
/// | ONE   | false | true  | ONE  | DROP    | CASE_3 |
pub fn token_bucket_rules() -> RuleSet {
    let rule = |state, cond1, cond2, action, update| Rule {
        state,
        protocol: ETH_P_IP,
        cond1,
        cond2,
        next_state: ONE,
        action,
        update,
    };

    RuleSet {
        rules: vec![
            rule(ZERO, Condition::True, Condition::True, Action::Forward, UpdateFunction::Case1),
            rule(ONE, Condition::True, Condition::False, Action::Forward, UpdateFunction::Case2),
            rule(ONE, Condition::True, Condition::True, Action::Forward, UpdateFunction::Case1),
            rule(ONE, Condition::False, Condition::True, Action::Drop, UpdateFunction::Case3),
        ],
    }
}

/// Write every rule of `rules` into `table`, returning the number written
pub fn provision<T>(table: &T, rules: &RuleSet) -> OppResult<usize>
where
    T: TransitionTable + ?Sized,
{
    for rule in &rules.rules {
        table.put(rule.key(), rule.leaf())?;
        debug!(key = %rule.key(), next = %rule.next_state, action = %rule.action, "rule provisioned");
    }

    info!(rules = rules.rules.len(), total = table.len(), "transition table provisioned");
    Ok(rules.rules.len())
}
