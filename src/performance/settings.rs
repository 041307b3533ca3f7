use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::performance::constants::{
    ALERT_SLOW_THRESHOLD_MS, CRITICAL_SLOW_THRESHOLD_MS, DASHBOARD_SLOW_THRESHOLD_MS,
    DEFAULT_ALERT_CHECK_INTERVAL, DEFAULT_DASHBOARD_REFRESH_INTERVAL,
    DEFAULT_MEMORY_CHECK_INTERVAL, DEFAULT_METRIC_REFRESH_INTERVAL, DEFAULT_REPORT_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT, REPORT_SLOW_THRESHOLD_MS,
};
use crate::performance::error::{invalid_argument, PerformanceError, PerformanceResult};
use crate::platform::environment::{self, PageContext};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = PerformanceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(invalid_argument(format!("unknown environment `{other}`"))),
        }
    }
}

/// Duration thresholds in milliseconds. Each comparison is strict.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SlowThresholds {
    pub report: f64,
    pub dashboard: f64,
    pub alert: f64,
    pub critical: f64,
}

impl Default for SlowThresholds {
    fn default() -> Self {
        Self {
            report: REPORT_SLOW_THRESHOLD_MS,
            dashboard: DASHBOARD_SLOW_THRESHOLD_MS,
            alert: ALERT_SLOW_THRESHOLD_MS,
            critical: CRITICAL_SLOW_THRESHOLD_MS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollingIntervals {
    /// How often a live metrics view should refresh.
    pub metric_refresh: Duration,
    /// How often a dashboard should refresh.
    pub dashboard_refresh: Duration,
    pub alert_check: Duration,
    pub memory_check: Duration,
}

impl Default for PollingIntervals {
    fn default() -> Self {
        Self {
            metric_refresh: DEFAULT_METRIC_REFRESH_INTERVAL,
            dashboard_refresh: DEFAULT_DASHBOARD_REFRESH_INTERVAL,
            alert_check: DEFAULT_ALERT_CHECK_INTERVAL,
            memory_check: DEFAULT_MEMORY_CHECK_INTERVAL,
        }
    }
}

/// Configuration of a [`Performance`](crate::performance::Performance) context.
///
/// Periodic reporting only runs in [`Environment::Production`] with an
/// endpoint configured; the debug surface only exists in
/// [`Environment::Development`].
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceSettings {
    pub endpoint: Option<String>,
    pub environment: Environment,
    pub report_interval: Duration,
    pub thresholds: SlowThresholds,
    pub intervals: PollingIntervals,
    pub request_timeout: Duration,
    pub page: PageContext,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            environment: Environment::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
            thresholds: SlowThresholds::default(),
            intervals: PollingIntervals::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page: PageContext::detect(),
        }
    }
}

impl PerformanceSettings {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn without_endpoint(mut self) -> Self {
        self.endpoint = None;
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn with_thresholds(mut self, thresholds: SlowThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_intervals(mut self, intervals: PollingIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_page(mut self, page: PageContext) -> Self {
        self.page = page;
        self
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Whether the periodic report schedule should run.
    pub fn reporting_enabled(&self) -> bool {
        self.is_production() && self.endpoint.is_some()
    }

    pub fn validate(&self) -> PerformanceResult<()> {
        if let Some(endpoint) = &self.endpoint {
            let url = Url::parse(endpoint)
                .map_err(|err| invalid_argument(format!("invalid endpoint `{endpoint}`: {err}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid_argument(format!(
                    "endpoint `{endpoint}` must use http or https"
                )));
            }
        }
        if self.report_interval.is_zero() {
            return Err(invalid_argument("report interval must be non-zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid_argument("request timeout must be non-zero"));
        }
        let intervals = &self.intervals;
        for (name, interval) in [
            ("metric refresh", intervals.metric_refresh),
            ("dashboard refresh", intervals.dashboard_refresh),
            ("alert check", intervals.alert_check),
            ("memory check", intervals.memory_check),
        ] {
            if interval.is_zero() {
                return Err(invalid_argument(format!("{name} interval must be non-zero")));
            }
        }
        let thresholds = &self.thresholds;
        for (name, value) in [
            ("report", thresholds.report),
            ("dashboard", thresholds.dashboard),
            ("alert", thresholds.alert),
            ("critical", thresholds.critical),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid_argument(format!(
                    "{name} threshold must be a non-negative number, got {value}"
                )));
            }
        }
        if thresholds.alert > thresholds.critical {
            return Err(invalid_argument(
                "alert threshold must not exceed the critical threshold",
            ));
        }
        Ok(())
    }

    /// Defaults overridden by `WEBPERF_ENDPOINT`, `WEBPERF_ENV`,
    /// `WEBPERF_REPORT_INTERVAL_SECS` and `WEBPERF_DISABLE_TRANSPORT`, or the
    /// matching keys of `__WEBPERF_DEFAULTS__`.
    pub fn from_env() -> PerformanceResult<Self> {
        Self::from_lookup(environment::setting)
    }

    fn from_lookup<F>(lookup: F) -> PerformanceResult<Self>
    where
        F: Fn(&str, &str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(endpoint) = lookup("WEBPERF_ENDPOINT", "endpoint") {
            settings.endpoint = Some(endpoint);
        }
        if let Some(environment) = lookup("WEBPERF_ENV", "environment") {
            settings.environment = environment.parse()?;
        }
        if let Some(secs) = lookup("WEBPERF_REPORT_INTERVAL_SECS", "reportIntervalSecs") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                invalid_argument(format!("report interval `{secs}` is not a number of seconds"))
            })?;
            settings.report_interval = Duration::from_secs(secs);
        }
        if lookup("WEBPERF_DISABLE_TRANSPORT", "disableTransport")
            .is_some_and(|flag| !matches!(flag.trim(), "0" | "false"))
        {
            log::debug!("report transport disabled by configuration");
            settings.endpoint = None;
        }
        settings.validate()?;
        Ok(settings)
    }
}
