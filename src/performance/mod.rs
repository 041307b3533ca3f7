//! Page performance telemetry.
//!
//! A [`Performance`] context owns the metric store, the vitals, the error log
//! and the report machinery. Timings come from the [`TimingRecorder`] and from
//! an [`ObservationSource`] attached through the [`ObservationAdapter`];
//! everything else is derived from them on demand.

mod alerts;
mod api;
mod constants;
mod debug;
mod error;
mod error_log;
mod instrumentation;
mod metric;
mod recorder;
mod report;
mod score;
mod settings;
mod store;
mod summary;
mod transport;
mod vitals;

#[doc(inline)]
pub use api::{HealthSnapshot, Performance, PerformanceBuilder};

#[doc(inline)]
pub use alerts::{AlertMonitor, AlertReport, MemoryProbe, MemoryUsage};

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
#[doc(inline)]
pub use alerts::BrowserMemoryProbe;

#[doc(inline)]
pub use constants::{
    ALERT_SLOW_THRESHOLD_MS, API_KEY_PREFIX, BUNDLE_KEY_PREFIX, COMPONENT_KEY_PREFIX,
    CRITICAL_SLOW_THRESHOLD_MS, DASHBOARD_SLOW_THRESHOLD_MS, IMAGE_KEY_PREFIX,
    MANUAL_SOURCE_BUFFER_LIMIT, NAVIGATION_METRIC_KEY, REPORT_SLOW_THRESHOLD_MS, RESOURCE_KEY_PREFIX, ROUTE_KEY_PREFIX,
};

#[doc(inline)]
pub use debug::DebugHandle;

#[doc(inline)]
pub use error::{
    internal_error, invalid_argument, network_error, unsupported, PerformanceError,
    PerformanceErrorCode, PerformanceResult,
};

#[doc(inline)]
pub use error_log::{ErrorLog, ErrorRecord, ErrorSource};

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
#[doc(inline)]
pub use error_log::BrowserErrorListeners;

#[doc(inline)]
pub use instrumentation::{
    EntryCallback, EntryKind, FirstInputEntry, LargestContentfulPaintEntry, LayoutShiftEntry,
    ManualObservationSource, NavigationEntry, ObservationAdapter, ObservationSource, PaintEntry,
    PerformanceEntry, ResourceEntry, Subscription,
};

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
#[doc(inline)]
pub use instrumentation::BrowserObservationSource;

#[doc(inline)]
pub use metric::{Metric, MetricKind};

#[doc(inline)]
pub use recorder::{TimingHandle, TimingRecorder};

#[doc(inline)]
pub use report::{CustomMetrics, ExportDocument, Report, ReportGenerator, SlowResource};

#[doc(inline)]
pub use score::{performance_grade, performance_score, Grade, ScoreInputs};

#[doc(inline)]
pub use settings::{Environment, PerformanceSettings, PollingIntervals, SlowThresholds};

#[doc(inline)]
pub use store::MetricStore;

#[doc(inline)]
pub use summary::{average_duration, CategorySummary, Summary, SummaryAggregator};

#[doc(inline)]
pub use transport::{DeliveryStats, HttpReportSink, ReportSink, ReportTransport};

#[doc(inline)]
pub use vitals::{VitalsCollector, WebVitals};
