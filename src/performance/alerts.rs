use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::performance::constants::MEMORY_WARNING_RATIO;
use crate::performance::report::ReportGenerator;
use crate::performance::score::Grade;
use crate::performance::settings::SlowThresholds;
use crate::platform::runtime;

/// Heap usage sample in bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryUsage {
    pub used: f64,
    pub limit: f64,
}

impl MemoryUsage {
    /// `used / limit`, or `None` when the limit is unknown.
    pub fn ratio(&self) -> Option<f64> {
        (self.limit > 0.0).then(|| self.used / self.limit)
    }
}

/// Source of heap usage samples. Hosts without one simply skip the memory
/// check.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> Option<MemoryUsage>;
}

/// Outcome of one alert pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertReport {
    /// Metrics above the alert threshold but not the critical one.
    pub slow: Vec<String>,
    pub critical: Vec<String>,
    pub grade: Grade,
}

impl AlertReport {
    pub fn is_quiet(&self) -> bool {
        self.slow.is_empty() && self.critical.is_empty() && !degraded(self.grade)
    }
}

fn degraded(grade: Grade) -> bool {
    matches!(grade, Grade::D | Grade::F)
}

/// Local threshold checks. Findings go to the log and nowhere else.
pub struct AlertMonitor {
    reports: ReportGenerator,
    thresholds: SlowThresholds,
    memory: Option<Arc<dyn MemoryProbe>>,
    running: AtomicBool,
    generation: AtomicU64,
}

impl fmt::Debug for AlertMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertMonitor")
            .field("thresholds", &self.thresholds)
            .field("memory_probe", &self.memory.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

impl AlertMonitor {
    pub fn new(
        reports: ReportGenerator,
        thresholds: SlowThresholds,
        memory: Option<Arc<dyn MemoryProbe>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            reports,
            thresholds,
            memory,
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        })
    }

    pub fn check_once(&self) -> AlertReport {
        let mut slow = Vec::new();
        let mut critical = Vec::new();
        for metric in self.reports.aggregator().slow_metrics(self.thresholds.alert) {
            let duration = metric.duration.unwrap_or_default();
            if duration > self.thresholds.critical {
                log::error!(
                    "critical performance issue: {} took {duration:.0}ms",
                    metric.name
                );
                critical.push(metric.name);
            } else {
                log::warn!("slow operation: {} took {duration:.0}ms", metric.name);
                slow.push(metric.name);
            }
        }

        let score = self.reports.performance_score();
        let grade = Grade::from_score(score);
        if degraded(grade) {
            log::warn!("performance grade dropped to {grade} (score {score})");
        }
        AlertReport {
            slow,
            critical,
            grade,
        }
    }

    /// Samples the memory probe, warning above 90 % heap usage. Returns the
    /// usage ratio when one could be measured.
    pub fn check_memory(&self) -> Option<f64> {
        let usage = self.memory.as_ref()?.sample()?;
        let ratio = usage.ratio()?;
        if ratio > MEMORY_WARNING_RATIO {
            log::warn!(
                "high memory usage: {:.1}% of the heap limit ({:.0} of {:.0} bytes)",
                ratio * 100.0,
                usage.used,
                usage.limit
            );
        }
        Some(ratio)
    }

    /// Starts the alert loop and, with a probe, the memory loop.
    pub fn start(self: &Arc<Self>, alert_check: Duration, memory_check: Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let this = Arc::clone(self);
        runtime::spawn_detached(async move {
            runtime::every(
                alert_check,
                || this.is_current(generation),
                || {
                    this.check_once();
                    async {}
                },
            )
            .await;
        });

        if self.memory.is_some() {
            let this = Arc::clone(self);
            runtime::spawn_detached(async move {
                runtime::every(
                    memory_check,
                    || this.is_current(generation),
                    || {
                        this.check_memory();
                        async {}
                    },
                )
                .await;
            });
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod wasm {
    use wasm_bindgen::JsValue;

    use super::{MemoryProbe, MemoryUsage};

    /// Reads the non-standard `performance.memory` object where the browser
    /// exposes it.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BrowserMemoryProbe;

    impl MemoryProbe for BrowserMemoryProbe {
        fn sample(&self) -> Option<MemoryUsage> {
            let performance = web_sys::window()?.performance()?;
            let memory = js_sys::Reflect::get(&performance, &JsValue::from_str("memory")).ok()?;
            if memory.is_undefined() || memory.is_null() {
                return None;
            }
            let read = |field: &str| {
                js_sys::Reflect::get(&memory, &JsValue::from_str(field))
                    .ok()
                    .and_then(|value| value.as_f64())
            };
            Some(MemoryUsage {
                used: read("usedJSHeapSize")?,
                limit: read("jsHeapSizeLimit")?,
            })
        }
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use wasm::BrowserMemoryProbe;
