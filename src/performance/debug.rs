use std::sync::Arc;

use crate::performance::api::{HealthSnapshot, Performance};
use crate::performance::error::PerformanceResult;
use crate::performance::store::MetricStore;

/// Development-only inspection surface over a [`Performance`] context.
///
/// Obtained through [`Performance::debug_handle`], which returns `None`
/// outside the development environment.
#[derive(Clone, Debug)]
pub struct DebugHandle {
    performance: Performance,
}

impl DebugHandle {
    pub(crate) fn new(performance: Performance) -> Self {
        Self { performance }
    }

    pub fn performance(&self) -> &Performance {
        &self.performance
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        self.performance.store()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.performance.health()
    }

    pub fn export_data(&self) -> PerformanceResult<String> {
        self.performance.export_data()
    }

    /// Clears metrics and errors. Vitals describe the page load and stay.
    pub fn clear_data(&self) {
        self.performance.clear();
        self.performance.clear_errors();
        log::debug!("performance data cleared");
    }

    /// Logs the current health and every metric at info level.
    pub fn log_stats(&self) {
        let health = self.health();
        log::info!(
            "performance: score {} ({}), {} metrics, {} slow, {} errors ({} recent)",
            health.score,
            health.grade,
            health.metric_count,
            health.slow_metric_count,
            health.error_count,
            health.recent_error_count
        );
        let vitals = health.web_vitals;
        log::info!(
            "web vitals: FCP {:?} LCP {:?} FID {:?} CLS {:?} TTFB {:?}",
            vitals.fcp,
            vitals.lcp,
            vitals.fid,
            vitals.cls,
            vitals.ttfb
        );
        for metric in self.performance.metrics() {
            match metric.duration {
                Some(duration) => log::info!("  {}: {duration:.1}ms", metric.name),
                None => log::info!("  {}: in flight", metric.name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::performance::instrumentation::{LargestContentfulPaintEntry, PerformanceEntry};
    use crate::performance::metric::MetricKind;
    use crate::performance::settings::PerformanceSettings;
    use crate::test_support::manual_performance;

    #[test]
    fn clear_data_keeps_vitals() {
        let (performance, clock) = manual_performance(PerformanceSettings::default());
        let debug = performance.debug_handle().unwrap();

        performance.start_timing("image_seal.png", Some(MetricKind::image()));
        clock.advance_ms(30.0);
        performance.end_timing("image_seal.png", None);
        performance.record_error("upload failed");
        performance.ingest(&PerformanceEntry::LargestContentfulPaint(
            LargestContentfulPaintEntry { start_time: 1800.0 },
        ));
        debug.log_stats();
        assert_eq!(debug.health().metric_count, 1);

        debug.clear_data();
        let health = debug.health();
        assert_eq!(health.metric_count, 0);
        assert_eq!(health.error_count, 0);
        assert_eq!(health.web_vitals.lcp, Some(1800.0));
        assert!(debug.store().is_empty());
    }

    #[test]
    fn export_matches_context() {
        let (performance, _) = manual_performance(PerformanceSettings::default());
        let debug = performance.debug_handle().unwrap();
        performance.start_timing("route_/verify", None);
        assert_eq!(debug.export_data().unwrap(), performance.export_data().unwrap());
    }
}
