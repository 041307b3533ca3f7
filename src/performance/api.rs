use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::performance::alerts::{AlertMonitor, MemoryProbe};
use crate::performance::constants::RECENT_ERROR_WINDOW;
use crate::performance::debug::DebugHandle;
use crate::performance::error::PerformanceResult;
use crate::performance::error_log::ErrorLog;
use crate::performance::instrumentation::{ObservationAdapter, ObservationSource, PerformanceEntry};
use crate::performance::metric::{Metric, MetricKind};
use crate::performance::recorder::{TimingHandle, TimingRecorder};
use crate::performance::report::{ExportDocument, Report, ReportGenerator};
use crate::performance::score::Grade;
use crate::performance::settings::PerformanceSettings;
use crate::performance::store::MetricStore;
use crate::performance::summary::{Summary, SummaryAggregator};
use crate::performance::transport::{HttpReportSink, ReportSink, ReportTransport};
use crate::performance::vitals::{VitalsCollector, WebVitals};
use crate::platform::clock::{ClockHandle, SystemClock};

/// Snapshot of overall page health.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub score: u8,
    pub grade: Grade,
    pub metric_count: usize,
    /// Metrics above the dashboard threshold.
    pub slow_metric_count: usize,
    pub error_count: usize,
    pub recent_error_count: usize,
    pub web_vitals: WebVitals,
}

/// The telemetry context of one page.
///
/// Build it once, hand out clones (they share state), and call
/// [`Performance::shutdown`] when the page goes away. Nothing here is a
/// process-wide singleton: two contexts never see each other's metrics.
#[derive(Clone)]
pub struct Performance {
    inner: Arc<PerformanceInner>,
}

struct PerformanceInner {
    settings: PerformanceSettings,
    clock: ClockHandle,
    store: Arc<MetricStore>,
    vitals: Arc<VitalsCollector>,
    recorder: TimingRecorder,
    adapter: ObservationAdapter,
    errors: ErrorLog,
    reports: ReportGenerator,
    transport: Arc<ReportTransport>,
    alerts: Arc<AlertMonitor>,
    shut_down: AtomicBool,
    #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
    browser_listeners:
        std::sync::Mutex<Option<crate::performance::error_log::BrowserErrorListeners>>,
}

impl fmt::Debug for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Performance")
            .field("environment", &self.inner.settings.environment)
            .field("endpoint", &self.inner.settings.endpoint)
            .field("metrics", &self.inner.store.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Assembles a [`Performance`] context, optionally with a custom clock,
/// report sink or memory probe.
pub struct PerformanceBuilder {
    settings: PerformanceSettings,
    clock: Option<ClockHandle>,
    sink: Option<Arc<dyn ReportSink>>,
    memory_probe: Option<Arc<dyn MemoryProbe>>,
}

impl PerformanceBuilder {
    pub fn with_clock(mut self, clock: ClockHandle) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.memory_probe = Some(probe);
        self
    }

    pub fn build(self) -> PerformanceResult<Performance> {
        let settings = self.settings;
        settings.validate()?;

        let clock: ClockHandle = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new()) as ClockHandle);
        let sink: Arc<dyn ReportSink> = match self.sink {
            Some(sink) => sink,
            None => Arc::new(HttpReportSink::new(settings.request_timeout)?),
        };
        let memory_probe = self.memory_probe.or_else(default_memory_probe);

        let store = Arc::new(MetricStore::new());
        let vitals = Arc::new(VitalsCollector::new());
        let errors = ErrorLog::new(Arc::clone(&clock));
        let reports = ReportGenerator::new(
            SummaryAggregator::new(Arc::clone(&store)),
            Arc::clone(&vitals),
            errors.clone(),
            settings.page.clone(),
            Arc::clone(&clock),
        );
        let transport = ReportTransport::new(reports.clone(), sink, settings.endpoint.clone());
        let alerts = AlertMonitor::new(reports.clone(), settings.thresholds, memory_probe);

        Ok(Performance {
            inner: Arc::new(PerformanceInner {
                recorder: TimingRecorder::new(Arc::clone(&store), Arc::clone(&clock)),
                adapter: ObservationAdapter::new(Arc::clone(&store), Arc::clone(&vitals)),
                settings,
                clock,
                store,
                vitals,
                errors,
                reports,
                transport,
                alerts,
                shut_down: AtomicBool::new(false),
                #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
                browser_listeners: std::sync::Mutex::new(None),
            }),
        })
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
fn default_memory_probe() -> Option<Arc<dyn MemoryProbe>> {
    Some(Arc::new(crate::performance::alerts::BrowserMemoryProbe))
}

#[cfg(not(all(feature = "wasm-web", target_arch = "wasm32")))]
fn default_memory_probe() -> Option<Arc<dyn MemoryProbe>> {
    None
}

impl Performance {
    /// Builds a context with the system clock and HTTP delivery. Background
    /// tasks are not started; see [`Performance::start`].
    pub fn new(settings: PerformanceSettings) -> PerformanceResult<Self> {
        Self::builder(settings).build()
    }

    pub fn builder(settings: PerformanceSettings) -> PerformanceBuilder {
        PerformanceBuilder {
            settings,
            clock: None,
            sink: None,
            memory_probe: None,
        }
    }

    pub fn settings(&self) -> &PerformanceSettings {
        &self.inner.settings
    }

    pub fn clock(&self) -> &ClockHandle {
        &self.inner.clock
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.inner.store
    }

    /// Category helpers (`start_component_load`, `end_api_call`, ...) live on
    /// the recorder.
    pub fn recorder(&self) -> &TimingRecorder {
        &self.inner.recorder
    }

    pub fn adapter(&self) -> &ObservationAdapter {
        &self.inner.adapter
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.inner.errors
    }

    pub fn reports(&self) -> &ReportGenerator {
        &self.inner.reports
    }

    pub fn transport(&self) -> &Arc<ReportTransport> {
        &self.inner.transport
    }

    pub fn alerts(&self) -> &Arc<AlertMonitor> {
        &self.inner.alerts
    }

    pub fn start_timing(&self, name: &str, metadata: Option<MetricKind>) {
        self.inner.recorder.start_timing(name, metadata);
    }

    pub fn end_timing(&self, name: &str, extra: Option<MetricKind>) {
        self.inner.recorder.end_timing(name, extra);
    }

    pub fn begin(&self, name: &str, metadata: Option<MetricKind>) -> TimingHandle {
        self.inner.recorder.begin(name, metadata)
    }

    /// Returns `false` when a source is already attached.
    pub fn attach_source(&self, source: &dyn ObservationSource) -> bool {
        self.inner.adapter.attach(source)
    }

    pub fn ingest(&self, entry: &PerformanceEntry) {
        self.inner.adapter.ingest(entry);
    }

    /// Attaches the browser's `PerformanceObserver` and listens for uncaught
    /// errors and unhandled rejections on the window.
    #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
    pub fn observe_browser(&self) -> PerformanceResult<()> {
        use crate::performance::error_log::BrowserErrorListeners;
        use crate::performance::instrumentation::BrowserObservationSource;

        if !self.attach_source(&BrowserObservationSource::new()) {
            return Ok(());
        }
        let listeners = BrowserErrorListeners::install(&self.inner.errors)?;
        *self
            .inner
            .browser_listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(listeners);
        Ok(())
    }

    /// Records panics in the error log. The previous hook still runs.
    pub fn capture_panics(&self) {
        self.inner.errors.install_panic_hook();
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.inner.errors.record_error(message);
    }

    pub fn clear_errors(&self) {
        self.inner.errors.clear_errors();
    }

    /// Drops every metric. Vitals and errors are kept.
    pub fn clear(&self) {
        self.inner.recorder.clear();
    }

    pub fn metric(&self, name: &str) -> Option<Metric> {
        self.inner.store.get(name)
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.inner.store.metrics()
    }

    pub fn metrics_by_type(&self, metric_type: &str) -> Vec<Metric> {
        self.inner.reports.aggregator().metrics_by_type(metric_type)
    }

    pub fn slow_metrics(&self, threshold_ms: f64) -> Vec<Metric> {
        self.inner.reports.aggregator().slow_metrics(threshold_ms)
    }

    /// Slow metrics for a dashboard listing, using the configured dashboard
    /// threshold.
    pub fn dashboard_slow_metrics(&self) -> Vec<Metric> {
        self.slow_metrics(self.inner.settings.thresholds.dashboard)
    }

    pub fn summary(&self) -> Summary {
        self.inner.reports.aggregator().summary()
    }

    pub fn web_vitals(&self) -> WebVitals {
        self.inner.vitals.web_vitals()
    }

    pub fn performance_score(&self) -> u8 {
        self.inner.reports.performance_score()
    }

    pub fn performance_grade(&self) -> Grade {
        self.inner.reports.performance_grade()
    }

    pub fn generate_report(&self) -> Report {
        self.inner.reports.generate_report()
    }

    pub fn export_data(&self) -> PerformanceResult<String> {
        self.inner.reports.export_data()
    }

    /// Replaces the stored metrics with those of an exported document and
    /// returns how many were loaded.
    pub fn import_data(&self, raw: &str) -> PerformanceResult<usize> {
        let document = ExportDocument::from_json(raw)?;
        let count = document.metrics.len();
        self.inner.store.restore(document.metrics);
        log::debug!("imported {count} metrics from export of {}", document.timestamp);
        Ok(count)
    }

    /// Best-effort delivery of the current report. See
    /// [`ReportTransport::send_report`].
    pub async fn send_report(&self, endpoint: Option<&str>) -> bool {
        self.inner.transport.send_report(endpoint).await
    }

    pub fn health(&self) -> HealthSnapshot {
        let score = self.performance_score();
        HealthSnapshot {
            score,
            grade: Grade::from_score(score),
            metric_count: self.inner.store.len(),
            slow_metric_count: self.dashboard_slow_metrics().len(),
            error_count: self.inner.errors.len(),
            recent_error_count: self.inner.errors.recent_count(RECENT_ERROR_WINDOW),
            web_vitals: self.web_vitals(),
        }
    }

    /// Starts the background loops: the alert check always, periodic
    /// reporting only in production with an endpoint.
    pub fn start(&self) {
        if self.is_shut_down() {
            log::debug!("performance context already shut down; not starting");
            return;
        }
        let settings = &self.inner.settings;
        self.inner
            .alerts
            .start(settings.intervals.alert_check, settings.intervals.memory_check);
        if settings.reporting_enabled() {
            self.inner.transport.start_schedule(settings.report_interval);
        }
    }

    /// Disconnects observers, stops error capture and background loops, then
    /// fires one last report without waiting for it. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.adapter.disconnect();
        self.inner.errors.deactivate();
        self.inner.alerts.stop();
        self.inner.transport.stop();
        #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
        {
            self.inner
                .browser_listeners
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
        }
        self.inner.transport.send_on_teardown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Inspection surface for development builds; `None` elsewhere.
    pub fn debug_handle(&self) -> Option<DebugHandle> {
        self.inner
            .settings
            .is_development()
            .then(|| DebugHandle::new(self.clone()))
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::performance::instrumentation::{ManualObservationSource, PaintEntry};
    use crate::performance::settings::Environment;
    use crate::platform::clock::ManualClock;
    use crate::platform::environment::PageContext;
    use crate::test_support::manual_performance;

    #[test]
    fn invalid_settings_are_rejected() {
        let err = Performance::new(PerformanceSettings::default().with_endpoint("::"))
            .unwrap_err();
        assert_eq!(err.code_str(), "performance/invalid-argument");
    }

    #[test]
    fn clones_share_state() {
        let (performance, clock) = manual_performance(PerformanceSettings::default());
        let other = performance.clone();
        performance.start_timing("upload", None);
        clock.advance_ms(40.0);
        other.end_timing("upload", None);
        assert_eq!(performance.metric("upload").unwrap().duration, Some(40.0));
    }

    #[test]
    fn separate_contexts_are_isolated() {
        let (first, _) = manual_performance(PerformanceSettings::default());
        let (second, _) = manual_performance(PerformanceSettings::default());
        first.start_timing("only-here", None);
        assert!(second.metrics().is_empty());
    }

    #[test]
    fn health_reflects_state() {
        let (performance, clock) = manual_performance(PerformanceSettings::default());
        performance.start_timing("bundle_admin", Some(MetricKind::bundle()));
        clock.advance_ms(1200.0);
        performance.end_timing("bundle_admin", None);
        performance.record_error("render failed");

        let health = performance.health();
        assert_eq!(health.metric_count, 1);
        assert_eq!(health.slow_metric_count, 1);
        assert_eq!(health.error_count, 1);
        assert_eq!(health.recent_error_count, 1);
        assert_eq!(health.score, 100 - 10 - 5);
        assert_eq!(health.grade, Grade::B);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["slowMetricCount"], 1);
        assert_eq!(json["grade"], "B");
    }

    #[test]
    fn import_restores_exported_metrics() {
        let (source, clock) = manual_performance(PerformanceSettings::default());
        source.start_timing("component_Form", Some(MetricKind::component()));
        clock.advance_ms(80.0);
        source.end_timing("component_Form", None);
        let raw = source.export_data().unwrap();

        let (target, _) = manual_performance(PerformanceSettings::default());
        target.start_timing("stale", None);
        assert_eq!(target.import_data(&raw).unwrap(), 1);
        assert_eq!(target.metrics(), source.metrics());
        assert!(target.import_data("not json").is_err());
    }

    #[test]
    fn shutdown_disconnects_and_stops_capture() {
        let (performance, _) = manual_performance(PerformanceSettings::default());
        let source = ManualObservationSource::new();
        performance.attach_source(&source);
        assert!(source.subscriber_count() > 0);

        performance.shutdown();
        performance.shutdown();
        assert!(performance.is_shut_down());
        assert_eq!(source.subscriber_count(), 0);

        source.emit(PerformanceEntry::Paint(PaintEntry {
            name: "first-contentful-paint".into(),
            start_time: 900.0,
        }));
        assert_eq!(performance.web_vitals().fcp, None);

        performance.record_error("after teardown");
        assert!(performance.errors().is_empty());
    }

    #[test]
    fn debug_handle_only_in_development() {
        let clock: ClockHandle = Arc::new(ManualClock::default());
        let build = |environment: Environment| {
            Performance::builder(
                PerformanceSettings::default()
                    .with_environment(environment)
                    .with_page(PageContext::new("https://certs.test/", "test-agent")),
            )
            .with_clock(Arc::clone(&clock))
            .build()
            .unwrap()
        };
        assert!(build(Environment::Development).debug_handle().is_some());
        assert!(build(Environment::Production).debug_handle().is_none());
        assert!(build(Environment::Test).debug_handle().is_none());
    }
}
