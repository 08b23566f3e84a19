//! Physics seam.
//!
//! Only the cadence at which physics runs belongs to the scheduler; the
//! simulation math lives behind [`Physics`].

/// A physics engine driven by the scheduler.
pub trait Physics: Send {
    /// Step the simulation by `elapsed_ms` of wall-clock time since the
    /// previous physics tick. Called at most once per frame.
    fn update(&mut self, elapsed_ms: f64);
}

/// Physics that only counts its steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NullPhysics {
    steps: u64,
    simulated_ms: f64,
}

impl NullPhysics {
    /// Create a counter at zero.
    pub const fn new() -> Self {
        Self {
            steps: 0,
            simulated_ms: 0.0,
        }
    }

    /// Number of steps taken.
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Sum of every step's elapsed time.
    pub const fn simulated_ms(&self) -> f64 {
        self.simulated_ms
    }
}

impl Physics for NullPhysics {
    fn update(&mut self, elapsed_ms: f64) {
        self.steps = self.steps.saturating_add(1);
        self.simulated_ms += elapsed_ms;
    }
}
