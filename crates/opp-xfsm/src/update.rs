//! Window update functions
//!
//! The token bucket is kept as a sliding window `[start, end]` of nanosecond
//! timestamps instead of an explicit token count. A packet that lands inside
//! the window consumes one token by sliding the window forward by one refill
//! period; a packet after the window finds the bucket refilled.

use opp_common::{OppError, OppResult};
use serde::{Deserialize, Serialize};

/// Window update selected by a transition leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum UpdateFunction {
    /// Packet hit the window: slide it by one refill period
    Case1 = 0,
    /// Packet hit after the window: re-centre on `now`, full bucket
    Case2 = 1,
    /// Packet hit before the window: leave it unchanged
    Case3 = 2,
}

impl UpdateFunction {
    /// Decode an update function code
    #[inline]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Case1),
            1 => Some(Self::Case2),
            2 => Some(Self::Case3),
            _ => None,
        }
    }

    /// Update function code
    #[inline(always)]
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// Token-bucket window `[start, end]` in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Window {
    /// Earliest instant at which a packet still finds a token
    pub start: i64,
    /// Instant after which the bucket is considered refilled
    pub end: i64,
}

impl Window {
    /// Create new window
    #[inline(always)]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

/// Token-bucket parameters.
///
/// Built through `new` or deserialization, both of which validate, so a
/// `TokenBucket` outside this crate is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BucketParams")]
pub struct TokenBucket {
    /// Bucket capacity `N` in tokens
    pub(crate) tokens: u64,
    /// Nanoseconds per token `R`
    pub(crate) refill_period_ns: u64,
}

/// Unchecked wire form of `TokenBucket`
#[derive(Deserialize)]
struct BucketParams {
    tokens: u64,
    refill_period_ns: u64,
}

impl TryFrom<BucketParams> for TokenBucket {
    type Error = OppError;

    fn try_from(raw: BucketParams) -> OppResult<Self> {
        Self::new(raw.tokens, raw.refill_period_ns)
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self {
            tokens: 5,
            refill_period_ns: 1_000_000_000,
        }
    }
}

impl TokenBucket {
    /// Create validated bucket parameters
    pub fn new(tokens: u64, refill_period_ns: u64) -> OppResult<Self> {
        let bucket = Self {
            tokens,
            refill_period_ns,
        };
        bucket.validate()?;
        Ok(bucket)
    }

    /// Check that `N` and `R` are non-zero and that `B + R` fits in `i64`
    pub fn validate(&self) -> OppResult<()> {
        if self.tokens == 0 {
            return Err(OppError::Config("bucket needs at least one token".into()));
        }
        if self.refill_period_ns == 0 {
            return Err(OppError::Config("refill period must be non-zero".into()));
        }
        self.tokens
            .checked_mul(self.refill_period_ns)
            .filter(|span| *span <= i64::MAX as u64)
            .map(|_| ())
            .ok_or_else(|| {
                OppError::Config(format!(
                    "bucket span {} x {}ns overflows the clock range",
                    self.tokens, self.refill_period_ns
                ))
            })
    }

    /// `R` as a signed duration
    #[inline(always)]
    pub fn refill_ns(&self) -> i64 {
        self.refill_period_ns as i64
    }

    /// Maximum burst budget `B = (N - 1) * R`
    #[inline(always)]
    pub fn burst_ns(&self) -> i64 {
        (self.tokens.saturating_sub(1) as i64).saturating_mul(self.refill_ns())
    }

    /// Window of a flow seen for the first time: a full bucket around `now`
    #[inline]
    pub fn default_window(&self, now: i64) -> Window {
        Window::new(
            now.saturating_sub(self.burst_ns()),
            now.saturating_add(self.refill_ns()),
        )
    }

    /// Apply `update` to `window` for a packet arriving at `now`
    #[inline]
    pub fn apply(&self, update: UpdateFunction, window: Window, now: i64) -> Window {
        match update {
            UpdateFunction::Case1 => Window::new(
                window.start.saturating_add(self.refill_ns()),
                window.end.saturating_add(self.refill_ns()),
            ),
            UpdateFunction::Case2 => self.default_window(now),
            UpdateFunction::Case3 => window,
        }
    }
}
