//! Condition evaluation
//!
//! Conditions are encoded as tri-state values so that an invalid operator is
//! visible as `Error` instead of silently reading as `False`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of evaluating one condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Condition {
    /// Operator not recognised
    Error = 0,
    /// Comparison holds
    True = 1,
    /// Comparison does not hold
    False = 2,
    /// Wildcard, reserved: tables have no wildcard matching yet
    Any = 3,
}

impl Condition {
    /// Map a boolean comparison result
    #[inline(always)]
    pub const fn from_bool(holds: bool) -> Self {
        if holds {
            Self::True
        } else {
            Self::False
        }
    }

    /// Wire code used in transition keys
    #[inline(always)]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::True => "true",
            Self::False => "false",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CondOp {
    /// `a == b`
    Eq = 0,
    /// `a != b`
    Ne = 1,
    /// `a < b`
    Lt = 2,
    /// `a <= b`
    Le = 3,
    /// `a > b`
    Gt = 4,
    /// `a >= b`
    Ge = 5,
}

impl CondOp {
    /// Decode an operator code
    #[inline]
    pub const fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Eq),
            1 => Some(Self::Ne),
            2 => Some(Self::Lt),
            3 => Some(Self::Le),
            4 => Some(Self::Gt),
            5 => Some(Self::Ge),
            _ => None,
        }
    }

    /// Operator code
    #[inline(always)]
    pub const fn code(self) -> u64 {
        self as u64
    }

    /// Apply the comparison
    #[inline(always)]
    pub fn holds<T: Ord>(self, a: T, b: T) -> bool {
        match self {
            Self::Eq => a == b,
            Self::Ne => a != b,
            Self::Lt => a < b,
            Self::Le => a <= b,
            Self::Gt => a > b,
            Self::Ge => a >= b,
        }
    }
}

/// Evaluate operator code `op` on `a` and `b`.
///
/// Unknown codes yield `Condition::Error`, never `True` or `False`.
#[inline]
pub fn evaluate<T: Ord>(op: u64, a: T, b: T) -> Condition {
    match CondOp::from_code(op) {
        Some(op) => Condition::from_bool(op.holds(a, b)),
        None => Condition::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_operators() {
        assert_eq!(evaluate(CondOp::Eq.code(), 3u64, 3), Condition::True);
        assert_eq!(evaluate(CondOp::Ne.code(), 3u64, 3), Condition::False);
        assert_eq!(evaluate(CondOp::Lt.code(), 2u64, 3), Condition::True);
        assert_eq!(evaluate(CondOp::Le.code(), 3u64, 3), Condition::True);
        assert_eq!(evaluate(CondOp::Gt.code(), 3u64, 3), Condition::False);
        assert_eq!(evaluate(CondOp::Ge.code(), 3u64, 3), Condition::True);
    }

    #[test]
    fn test_extremes_are_unsigned() {
        assert_eq!(evaluate(CondOp::Gt.code(), u64::MAX, 0), Condition::True);
        assert_eq!(evaluate(CondOp::Lt.code(), 0u64, u64::MAX), Condition::True);
    }

    #[test]
    fn test_unknown_operator() {
        assert_eq!(evaluate(6, 1u64, 1), Condition::Error);
        assert_eq!(evaluate(u64::MAX, 1u64, 2), Condition::Error);
    }

    #[test]
    fn test_signed_window_bounds() {
        // window start below the clock origin still precedes `now`
        assert_eq!(evaluate(CondOp::Ge.code(), 0i64, -4_000_000_000), Condition::True);
    }

    #[test]
    fn test_condition_codes() {
        assert_eq!(Condition::Error.code(), 0);
        assert_eq!(Condition::True.code(), 1);
        assert_eq!(Condition::False.code(), 2);
        assert_eq!(Condition::Any.code(), 3);
    }

    proptest! {
        #[test]
        fn evaluate_matches_u64_comparison(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(evaluate(0, a, b), Condition::from_bool(a == b));
            prop_assert_eq!(evaluate(1, a, b), Condition::from_bool(a != b));
            prop_assert_eq!(evaluate(2, a, b), Condition::from_bool(a < b));
            prop_assert_eq!(evaluate(3, a, b), Condition::from_bool(a <= b));
            prop_assert_eq!(evaluate(4, a, b), Condition::from_bool(a > b));
            prop_assert_eq!(evaluate(5, a, b), Condition::from_bool(a >= b));
        }

        #[test]
        fn unknown_codes_always_error(op in 6u64.., a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(evaluate(op, a, b), Condition::Error);
        }
    }
}
