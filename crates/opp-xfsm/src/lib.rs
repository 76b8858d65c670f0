//! OPP XFSM Classifier
//!
//! Flow-stateful packet classification driven by an extended finite state
//! machine. The machine is a lookup table keyed by the flow's current state
//! and two tri-state conditions; each rule carries the next state, the
//! packet action and a window update. The reference program is a two-color
//! token bucket per IPv4 source.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       CLASSIFIER                              │
//! │                                                               │
//! │  frame ──► FlowKey ──► FlowStateStore.get ──► evaluate(GE/LE) │
//! │                              │                     │          │
//! │                              ▼                     ▼          │
//! │                      default window      TransitionTable      │
//! │                      [now-B, now+R]         .lookup           │
//! │                                                │              │
//! │                                                ▼              │
//! │  Action ◄── FlowStateStore.put ◄── UpdateFunction (CASE_1-3)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! | Property | Value |
//! |----------|-------|
//! | Work per packet | constant, no loops or retries |
//! | Table access | lock-free snapshot |
//! | Flow capacity | 256 by default |
//! | Same-flow updates | relaxed by default, atomic on request |

#![warn(missing_docs)]

pub mod classifier;
pub mod condition;
pub mod config;
pub mod registry;
pub mod rules;
pub mod state;
pub mod stats;
pub mod table;
pub mod update;

pub use classifier::{Classifier, ClassifyError, Consistency, Decision, OutcomePolicy, Verdict};
pub use condition::{evaluate, CondOp, Condition};
pub use config::ClassifierConfig;
pub use registry::MapRegistry;
pub use rules::{provision, token_bucket_rules, Rule, RuleSet};
pub use state::{FlowState, FlowStateMap, FlowStateStore, StateId};
pub use stats::{ClassifierStats, StatsSnapshot};
pub use table::{Action, TransitionKey, TransitionLeaf, TransitionTable, XfsmTable};
pub use update::{TokenBucket, UpdateFunction, Window};
