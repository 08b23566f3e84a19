//! Fixed-rate cadences with remainder drift correction.
//!
//! A cadence fires at most once per frame. When a frame arrives late, the
//! overshoot is carried forward as a remainder and subtracted from the next
//! period, so the long-run firing rate matches the target rate even though
//! frames never line up with period boundaries.
//!
//! ```text
//! due:       elapsed >= period - remainder
//! on fire:   remainder = clamp(elapsed - (period - remainder), 0, period)
//! ```
//!
//! The remainder is kept strictly below one period. After an arbitrarily
//! long stall the cadence fires once, carries almost a full period, fires
//! again on the next frame and then settles; it never bursts.

/// Fraction of a period the remainder may reach. Keeps it in `[0, period)`.
const REMAINDER_CEILING: f64 = 1.0 - 1e-9;

/// Errors raised when constructing a cadence.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// The rate is zero, negative or not finite.
    #[error("cadence {name}: tick rate {rate} must be a positive finite number")]
    InvalidRate {
        /// Cadence name.
        name: &'static str,
        /// The rejected rate.
        rate: f64,
    },
}

/// Outcome of a cadence that fired this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CadenceFire {
    /// Wall-clock milliseconds since the previous fire (0 on the first).
    pub elapsed_ms: f64,
    /// Remainder carried into the next period.
    pub remainder_ms: f64,
}

/// Tick budget state for one independently paced subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct Cadence {
    name: &'static str,
    rate: f64,
    period_ms: f64,
    last_fired_ms: Option<f64>,
    remainder_ms: f64,
    fired: u64,
}

impl Cadence {
    /// Create a cadence ticking `rate` times per second.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidRate`] when `rate` is not a positive
    /// finite number.
    pub fn new(name: &'static str, rate: f64) -> Result<Self, CadenceError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(CadenceError::InvalidRate { name, rate });
        }
        Ok(Self {
            name,
            rate,
            period_ms: 1000.0 / rate,
            last_fired_ms: None,
            remainder_ms: 0.0,
            fired: 0,
        })
    }

    /// Whether the cadence is due at `now_ms`. Does not mutate state.
    pub fn is_due(&self, now_ms: f64) -> bool {
        self.last_fired_ms
            .is_none_or(|last| now_ms - last >= self.period_ms - self.remainder_ms)
    }

    /// Fire if due at `now_ms`.
    pub fn poll(&mut self, now_ms: f64) -> Option<CadenceFire> {
        self.is_due(now_ms).then(|| self.fire(now_ms))
    }

    /// Fire unconditionally at `now_ms`.
    ///
    /// Used when another cadence drags this one along. If the cadence was
    /// not due, the negative overshoot clamps the remainder to zero.
    pub fn fire(&mut self, now_ms: f64) -> CadenceFire {
        let elapsed_ms = self
            .last_fired_ms
            .map_or(0.0, |last| (now_ms - last).max(0.0));

        self.remainder_ms = if self.last_fired_ms.is_some() {
            let excess = elapsed_ms - (self.period_ms - self.remainder_ms);
            excess.clamp(0.0, self.period_ms * REMAINDER_CEILING)
        } else {
            0.0
        };
        self.last_fired_ms = Some(now_ms);
        self.fired = self.fired.saturating_add(1);

        CadenceFire {
            elapsed_ms,
            remainder_ms: self.remainder_ms,
        }
    }

    /// Forget firing history, keeping the rate.
    pub const fn reset(&mut self) {
        self.last_fired_ms = None;
        self.remainder_ms = 0.0;
    }

    /// Cadence name, used in logs.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Target rate in ticks per second.
    pub const fn rate(&self) -> f64 {
        self.rate
    }

    /// Period in milliseconds.
    pub const fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// Remainder carried into the current period.
    pub const fn remainder_ms(&self) -> f64 {
        self.remainder_ms
    }

    /// Wall-clock time of the last fire.
    pub const fn last_fired_ms(&self) -> Option<f64> {
        self.last_fired_ms
    }

    /// Total number of fires.
    pub const fn fired(&self) -> u64 {
        self.fired
    }
}
