use std::time::Duration;

/// Store key of the single page navigation metric.
pub const NAVIGATION_METRIC_KEY: &str = "navigation";
pub const RESOURCE_KEY_PREFIX: &str = "resource_";
pub const COMPONENT_KEY_PREFIX: &str = "component";
pub const IMAGE_KEY_PREFIX: &str = "image";
pub const BUNDLE_KEY_PREFIX: &str = "bundle";
pub const API_KEY_PREFIX: &str = "api";
pub const ROUTE_KEY_PREFIX: &str = "route";

/// Entries a manual observation source keeps for replay, matching the
/// browser's default resource timing buffer.
pub const MANUAL_SOURCE_BUFFER_LIMIT: usize = 250;

pub const FIRST_PAINT: &str = "first-paint";
pub const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

/// Slow-metric threshold used when building reports.
pub const REPORT_SLOW_THRESHOLD_MS: f64 = 500.0;
/// Slow-metric threshold used by dashboards listing slow operations.
pub const DASHBOARD_SLOW_THRESHOLD_MS: f64 = 1000.0;
/// Metrics above this are logged as warnings by the alert check.
pub const ALERT_SLOW_THRESHOLD_MS: f64 = 2000.0;
/// Metrics above this are logged as errors by the alert check.
pub const CRITICAL_SLOW_THRESHOLD_MS: f64 = 5000.0;

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_METRIC_REFRESH_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_DASHBOARD_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_ALERT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors younger than this count against the score.
pub const RECENT_ERROR_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Heap usage ratio above which the memory check warns.
pub const MEMORY_WARNING_RATIO: f64 = 0.9;
