//! Packet classifier
//!
//! Frame → flow key → flow state → conditions → rule → window update →
//! write-back → action.
//!
//! Every packet goes through the pipeline exactly once, with a fixed number
//! of steps and no retries. Outcomes other than a rule's action are
//! reported as `Decision::EndOfParsing` or a `ClassifyError`, and folded into
//! a caller-visible `Verdict` by the configured `OutcomePolicy`.

use crate::condition::{evaluate, CondOp, Condition};
use crate::config::ClassifierConfig;
use crate::state::{FlowState, FlowStateStore, StateId};
use crate::stats::{ClassifierStats, StatsSnapshot};
use crate::table::{Action, TransitionKey, TransitionLeaf, TransitionTable};
use crate::update::TokenBucket;
use opp_common::{Clock, FlowKey, MonotonicClock, OppResult, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// `TC_ACT_UNSPEC`: let the next classifier decide
pub const TC_ACT_UNSPEC: i32 = -1;
/// `TC_ACT_OK`: pass the packet
pub const TC_ACT_OK: i32 = 0;
/// `TC_ACT_SHOT`: drop the packet
pub const TC_ACT_SHOT: i32 = 2;

/// Internal outcome of a packet that was not aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Action of the matched rule
    Action(Action),
    /// Frame too short or protocol not parsed; nothing was looked up
    EndOfParsing,
}

/// Why classification of a packet was aborted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// A condition evaluated to `Error`
    #[error("condition evaluation failed for flow {flow}")]
    ConditionError {
        /// Flow being classified
        flow: FlowKey,
    },

    /// No rule for the computed key; the table is incomplete
    #[error("no transition for {key} (flow {flow})")]
    TransitionMissing {
        /// Flow being classified
        flow: FlowKey,
        /// Key that missed
        key: TransitionKey,
    },

    /// Rule names an update function outside the fixed set
    #[error("unknown update function {code} in rule {key}")]
    UpdateFunctionUnknown {
        /// Matched rule key
        key: TransitionKey,
        /// Raw update function code
        code: u32,
    },

    /// Rule names an action this build does not know; the flow state was
    /// already written back
    #[error("unknown action {code} in rule {key}")]
    ActionUnknown {
        /// Matched rule key
        key: TransitionKey,
        /// Raw action code
        code: u32,
    },

    /// The flow state store returned without running the transition
    #[error("flow state store skipped the update for flow {flow}")]
    UpdateSkipped {
        /// Flow being classified
        flow: FlowKey,
    },
}

/// How non-action outcomes are reported to the packet layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomePolicy {
    /// End-of-parsing passes through, aborts are unclassified
    #[default]
    Split,
    /// End-of-parsing and aborts share the unclassified verdict
    Merged,
}

/// Read-modify-write discipline for the flow state store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Plain `get` then `put`; same-flow races may lose an update
    #[default]
    Relaxed,
    /// `FlowStateStore::update`, atomic per key where the store supports it
    Atomic,
}

/// Caller-visible result for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Rule action DROP
    Drop,
    /// Rule action FORWARD
    Forward,
    /// Not a packet this classifier handles
    PassThrough,
    /// Classification aborted (or end-of-parsing under `Merged`)
    Unclassified,
}

impl Verdict {
    /// Traffic-control return code
    pub const fn tc_code(self) -> i32 {
        match self {
            Self::Drop => TC_ACT_SHOT,
            Self::Forward | Self::PassThrough => TC_ACT_OK,
            Self::Unclassified => TC_ACT_UNSPEC,
        }
    }
}

impl From<Action> for Verdict {
    fn from(action: Action) -> Self {
        match action {
            Action::Drop => Self::Drop,
            Action::Forward => Self::Forward,
        }
    }
}

/// Result of steps 2-5 for one flow
#[derive(Debug, Clone, Copy)]
struct Transition {
    key: TransitionKey,
    leaf: TransitionLeaf,
    next: FlowState,
}

/// XFSM packet classifier.
///
/// Stores are injected and shared; a classifier never owns their lifetime
/// beyond its `Arc` handles.
pub struct Classifier<S: ?Sized, T: ?Sized> {
    store: Arc<S>,
    table: Arc<T>,
    bucket: TokenBucket,
    policy: OutcomePolicy,
    consistency: Consistency,
    clock: Arc<dyn Clock>,
    stats: ClassifierStats,
}

impl<S, T> Classifier<S, T>
where
    S: FlowStateStore + ?Sized,
    T: TransitionTable + ?Sized,
{
    /// Create classifier with default policy, relaxed consistency and the
    /// process monotonic clock. Fails if `bucket` is out of range.
    pub fn new(store: Arc<S>, table: Arc<T>, bucket: TokenBucket) -> OppResult<Self> {
        bucket.validate()?;
        Ok(Self {
            store,
            table,
            bucket,
            policy: OutcomePolicy::default(),
            consistency: Consistency::default(),
            clock: Arc::new(MonotonicClock::new()),
            stats: ClassifierStats::default(),
        })
    }

    /// Create classifier from configuration
    pub fn from_config(config: &ClassifierConfig, store: Arc<S>, table: Arc<T>) -> OppResult<Self> {
        Ok(Self::new(store, table, config.bucket)?
            .with_policy(config.outcome_policy)
            .with_consistency(config.consistency))
    }

    /// Set outcome policy
    pub fn with_policy(mut self, policy: OutcomePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set consistency
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Set clock used by `classify_now`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Flow state store handle
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Counters so far
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Classify `frame` at the injected clock's current reading
    pub fn classify_now(&self, frame: &[u8]) -> Result<Decision, ClassifyError> {
        self.classify(frame, self.clock.now_ns())
    }

    /// Classify `frame` arriving at `now_ns` and fold the outcome into a
    /// verdict
    pub fn verdict(&self, frame: &[u8], now_ns: u64) -> Verdict {
        match (self.classify(frame, now_ns), self.policy) {
            (Ok(Decision::Action(action)), _) => action.into(),
            (Ok(Decision::EndOfParsing), OutcomePolicy::Split) => Verdict::PassThrough,
            (Ok(Decision::EndOfParsing), OutcomePolicy::Merged) => Verdict::Unclassified,
            (Err(_), _) => Verdict::Unclassified,
        }
    }

    /// Classify `frame` arriving at `now_ns`
    pub fn classify(&self, frame: &[u8], now_ns: u64) -> Result<Decision, ClassifyError> {
        self.stats.packets.inc();

        let flow = match FlowKey::parse(frame) {
            Ok(flow) => flow,
            Err(e) => {
                trace!(error = %e, "end of parsing");
                self.stats.end_of_parsing.inc();
                return Ok(Decision::EndOfParsing);
            }
        };

        let now = i64::try_from(now_ns).unwrap_or(i64::MAX);
        let result = match self.consistency {
            Consistency::Relaxed => self.run_relaxed(&flow, now),
            Consistency::Atomic => self.run_atomic(&flow, now),
        };

        result
            .and_then(|t| self.decode_action(&flow, t))
            .map_err(|e| {
                self.record_abort(&e);
                e
            })
    }

    fn run_relaxed(&self, flow: &FlowKey, now: i64) -> Result<Transition, ClassifyError> {
        let current = self.store.get(flow);
        let t = self.transition(flow, current, now)?;
        self.record_write(flow, self.store.put(flow, t.next));
        Ok(t)
    }

    fn run_atomic(&self, flow: &FlowKey, now: i64) -> Result<Transition, ClassifyError> {
        let mut outcome = None;
        let written = self.store.update(flow, &mut |current| {
            let result = self.transition(flow, current, now);
            let next = result.as_ref().ok().map(|t| t.next);
            outcome = Some(result);
            next
        });

        let t = outcome.ok_or(ClassifyError::UpdateSkipped { flow: *flow })??;
        self.record_write(flow, written);
        Ok(t)
    }

    /// Steps 2-5: state synthesis, conditions, rule lookup, window update
    #[inline]
    fn transition(
        &self,
        flow: &FlowKey,
        current: Option<FlowState>,
        now: i64,
    ) -> Result<Transition, ClassifyError> {
        let current = match current {
            Some(state) => {
                self.stats.flow_hits.inc();
                state
            }
            None => {
                self.stats.flow_misses.inc();
                FlowState::new(StateId::INITIAL, self.bucket.default_window(now))
            }
        };

        let cond1 = evaluate(CondOp::Ge.code(), now, current.window.start);
        let cond2 = evaluate(CondOp::Le.code(), now, current.window.end);
        if cond1 == Condition::Error || cond2 == Condition::Error {
            return Err(ClassifyError::ConditionError { flow: *flow });
        }

        let key = TransitionKey::new(current.state, flow.protocol, cond1, cond2);
        let leaf = self
            .table
            .lookup(&key)
            .ok_or(ClassifyError::TransitionMissing { flow: *flow, key })?;

        let update = leaf
            .decode_update()
            .ok_or(ClassifyError::UpdateFunctionUnknown {
                key,
                code: leaf.update_function,
            })?;

        let window = self.bucket.apply(update, current.window, now);
        trace!(
            %flow,
            state = %current.state,
            %cond1,
            %cond2,
            next = %leaf.next_state,
            ?update,
            "transition"
        );

        Ok(Transition {
            key,
            leaf,
            next: FlowState::new(leaf.next_state, window),
        })
    }

    /// Step 7
    #[inline]
    fn decode_action(&self, flow: &FlowKey, t: Transition) -> Result<Decision, ClassifyError> {
        let action = t.leaf.decode_action().ok_or(ClassifyError::ActionUnknown {
            key: t.key,
            code: t.leaf.action,
        })?;

        match action {
            Action::Drop => self.stats.dropped.inc(),
            Action::Forward => self.stats.forwarded.inc(),
        };
        debug!(%flow, %action, "classified");
        Ok(Decision::Action(action))
    }

    fn record_write(&self, flow: &FlowKey, written: Result<(), StoreError>) {
        if let Err(e) = written {
            self.stats.store_full.inc();
            warn!(%flow, error = %e, "flow state not stored");
        }
    }

    fn record_abort(&self, e: &ClassifyError) {
        match e {
            ClassifyError::ConditionError { .. } => {
                self.stats.condition_errors.inc();
                debug!(error = %e, "classification aborted");
            }
            ClassifyError::TransitionMissing { .. } => {
                self.stats.transitions_missing.inc();
                warn!(error = %e, "transition table incomplete");
            }
            ClassifyError::UpdateFunctionUnknown { .. } => {
                self.stats.updates_unknown.inc();
                debug!(error = %e, "classification aborted");
            }
            ClassifyError::ActionUnknown { .. } => {
                self.stats.actions_unknown.inc();
                debug!(error = %e, "classification aborted");
            }
            ClassifyError::UpdateSkipped { .. } => {
                self.stats.updates_skipped.inc();
                warn!(error = %e, "flow state store misbehaved");
            }
        }
    }
}
