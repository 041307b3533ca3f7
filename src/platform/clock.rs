//! Time sources for the telemetry core.
//!
//! Metric timings use a monotonic millisecond reading (the same domain the
//! browser's `performance.now()` reports in), while error records and reports
//! carry wall-clock timestamps.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Supplies monotonic milliseconds and wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary, fixed origin. Never decreases.
    fn now_ms(&self) -> f64;

    /// Current wall-clock time.
    fn wall_time(&self) -> DateTime<Utc>;
}

pub type ClockHandle = Arc<dyn Clock>;

/// Clock backed by the platform's monotonic timer.
pub struct SystemClock {
    #[cfg(not(target_arch = "wasm32"))]
    origin: std::time::Instant,
    #[cfg(target_arch = "wasm32")]
    origin_ms: f64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            origin: std::time::Instant::now(),
            #[cfg(target_arch = "wasm32")]
            origin_ms: wasm_now_ms(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SystemClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemClock").finish_non_exhaustive()
    }
}

impl Clock for SystemClock {
    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> f64 {
        (wasm_now_ms() - self.origin_ms).max(0.0)
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
fn wasm_now_ms() -> f64 {
    web_sys::window()
        .and_then(|window| window.performance())
        .map(|performance| performance.now())
        .unwrap_or_else(|| Utc::now().timestamp_millis() as f64)
}

#[cfg(all(target_arch = "wasm32", not(feature = "wasm-web")))]
fn wasm_now_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

/// Clock that only moves when told to. Both readings advance together.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

struct ManualState {
    now_ms: f64,
    wall: DateTime<Utc>,
}

impl ManualClock {
    pub fn new(wall: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState { now_ms: 0.0, wall })),
        }
    }

    /// Moves both readings forward by `ms` milliseconds. Negative values are ignored.
    pub fn advance_ms(&self, ms: f64) {
        if !(ms > 0.0) {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now_ms += ms;
        state.wall += chrono::Duration::microseconds((ms * 1000.0) as i64);
    }

    pub fn advance(&self, duration: Duration) {
        self.advance_ms(duration.as_secs_f64() * 1000.0);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now_ms", &self.now_ms())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .now_ms
    }

    fn wall_time(&self) -> DateTime<Utc> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).wall
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::default();
        let wall = clock.wall_time();
        clock.advance_ms(300.0);
        assert_eq!(clock.now_ms(), 300.0);
        assert_eq!((clock.wall_time() - wall).num_milliseconds(), 300);
    }

    #[test]
    fn manual_clock_ignores_negative_steps() {
        let clock = ManualClock::default();
        clock.advance_ms(-5.0);
        clock.advance_ms(f64::NAN);
        assert_eq!(clock.now_ms(), 0.0);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(second >= first);
    }
}
