use std::sync::Arc;

use crate::performance::{Performance, PerformanceSettings};
use crate::platform::{ClockHandle, ManualClock, PageContext};

/// Builds a context driven by a [`ManualClock`], so durations in tests are
/// exactly what the test advances.
///
/// The page context is fixed to keep reports deterministic across hosts.
pub fn manual_performance(settings: PerformanceSettings) -> (Performance, ManualClock) {
    let clock = ManualClock::default();
    let handle: ClockHandle = Arc::new(clock.clone());
    let performance = Performance::builder(
        settings.with_page(PageContext::new("https://certs.test/", "webperf-test")),
    )
    .with_clock(handle)
    .build()
    .expect("valid test settings");
    (performance, clock)
}
