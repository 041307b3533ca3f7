use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::performance::constants::{RECENT_ERROR_WINDOW, REPORT_SLOW_THRESHOLD_MS};
use crate::performance::error::{internal_error, invalid_argument, PerformanceResult};
use crate::performance::error_log::{ErrorLog, ErrorRecord};
use crate::performance::metric::Metric;
use crate::performance::score::{performance_score, Grade, ScoreInputs};
use crate::performance::summary::{average_duration, Summary, SummaryAggregator};
use crate::performance::vitals::{VitalsCollector, WebVitals};
use crate::platform::clock::ClockHandle;
use crate::platform::environment::PageContext;

/// Average durations per tracked operation family, 0 when nothing matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMetrics {
    pub bundle_load_time: f64,
    pub component_load_time: f64,
    pub image_load_time: f64,
    pub api_response_time: f64,
    pub route_change_time: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlowResource {
    pub name: String,
    pub duration: f64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,
}

impl SlowResource {
    fn from_metric(metric: &Metric) -> Self {
        Self {
            name: metric.name.clone(),
            duration: metric.duration.unwrap_or_default(),
            metric_type: metric.metric_type().map(str::to_string),
        }
    }
}

/// Point-in-time snapshot sent to the reporting endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub user_agent: String,
    pub web_vitals: WebVitals,
    pub custom_metrics: CustomMetrics,
    pub slow_resources: Vec<SlowResource>,
    pub errors: Vec<ErrorRecord>,
}

/// Document offered for local download.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub metrics: Vec<Metric>,
    pub summary: Summary,
}

impl ExportDocument {
    pub fn to_json(&self) -> PerformanceResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| internal_error(format!("failed to serialize export: {err}")))
    }

    pub fn from_json(raw: &str) -> PerformanceResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| invalid_argument(format!("not a performance export: {err}")))
    }
}

/// Assembles reports from the live telemetry state. Every method is a pure
/// read and may be called as often as needed.
#[derive(Clone)]
pub struct ReportGenerator {
    aggregator: SummaryAggregator,
    vitals: Arc<VitalsCollector>,
    errors: ErrorLog,
    page: PageContext,
    clock: ClockHandle,
}

impl fmt::Debug for ReportGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportGenerator")
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

impl ReportGenerator {
    pub fn new(
        aggregator: SummaryAggregator,
        vitals: Arc<VitalsCollector>,
        errors: ErrorLog,
        page: PageContext,
        clock: ClockHandle,
    ) -> Self {
        Self {
            aggregator,
            vitals,
            errors,
            page,
            clock,
        }
    }

    pub fn custom_metrics(&self) -> CustomMetrics {
        let summary = self.aggregator.summary();
        CustomMetrics {
            bundle_load_time: summary.bundles.average_load_time,
            component_load_time: summary.components.average_load_time,
            image_load_time: summary.images.average_load_time,
            api_response_time: self.tagged_average("api"),
            route_change_time: self.tagged_average("navigation"),
        }
    }

    // Only the metadata tag counts here, unlike `metrics_by_type`.
    fn tagged_average(&self, metric_type: &str) -> f64 {
        let tagged: Vec<Metric> = self
            .aggregator
            .metrics_by_type(metric_type)
            .into_iter()
            .filter(|metric| metric.metric_type() == Some(metric_type))
            .collect();
        average_duration(&tagged)
    }

    pub fn score_inputs(&self) -> ScoreInputs {
        ScoreInputs {
            vitals: self.vitals.web_vitals(),
            custom: self.custom_metrics(),
            recent_errors: self.errors.recent_count(RECENT_ERROR_WINDOW),
        }
    }

    pub fn performance_score(&self) -> u8 {
        performance_score(&self.score_inputs())
    }

    pub fn performance_grade(&self) -> Grade {
        Grade::from_score(self.performance_score())
    }

    pub fn generate_report(&self) -> Report {
        Report {
            timestamp: self.clock.wall_time(),
            url: self.page.url.clone(),
            user_agent: self.page.user_agent.clone(),
            web_vitals: self.vitals.web_vitals(),
            custom_metrics: self.custom_metrics(),
            slow_resources: self
                .aggregator
                .slow_metrics(REPORT_SLOW_THRESHOLD_MS)
                .iter()
                .map(SlowResource::from_metric)
                .collect(),
            errors: self.errors.errors(),
        }
    }

    pub fn export_document(&self) -> ExportDocument {
        ExportDocument {
            timestamp: self.clock.wall_time(),
            user_agent: self.page.user_agent.clone(),
            metrics: self.aggregator.metrics(),
            summary: self.aggregator.summary(),
        }
    }

    pub fn export_data(&self) -> PerformanceResult<String> {
        self.export_document().to_json()
    }

    pub fn aggregator(&self) -> &SummaryAggregator {
        &self.aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::metric::MetricKind;
    use crate::performance::store::MetricStore;
    use crate::platform::clock::ManualClock;

    struct Fixture {
        store: Arc<MetricStore>,
        vitals: Arc<VitalsCollector>,
        errors: ErrorLog,
        generator: ReportGenerator,
    }

    fn fixture() -> Fixture {
        let clock: ClockHandle = Arc::new(ManualClock::default());
        let store = Arc::new(MetricStore::new());
        let vitals = Arc::new(VitalsCollector::new());
        let errors = ErrorLog::new(Arc::clone(&clock));
        let generator = ReportGenerator::new(
            SummaryAggregator::new(Arc::clone(&store)),
            Arc::clone(&vitals),
            errors.clone(),
            PageContext::new("https://certs.test/verify", "test-agent"),
            clock,
        );
        Fixture {
            store,
            vitals,
            errors,
            generator,
        }
    }

    #[test]
    fn custom_metrics_average_each_family() {
        let f = fixture();
        f.store.insert(Metric::completed("api_/a", 0.0, 200.0, Some(MetricKind::api("GET"))));
        f.store.insert(Metric::completed("api_/b", 0.0, 400.0, Some(MetricKind::api("GET"))));
        f.store.insert(Metric::completed("api_untagged", 0.0, 9000.0, None));
        f.store.insert(Metric::completed("route_/verify", 0.0, 120.0, Some(MetricKind::route())));
        f.store.insert(Metric::completed("bundle_main", 0.0, 700.0, Some(MetricKind::bundle())));

        let custom = f.generator.custom_metrics();
        assert_eq!(custom.api_response_time, 300.0);
        assert_eq!(custom.route_change_time, 120.0);
        assert_eq!(custom.bundle_load_time, 700.0);
        assert_eq!(custom.component_load_time, 0.0);
        assert_eq!(custom.image_load_time, 0.0);
    }

    #[test]
    fn report_collects_slow_resources_and_errors() {
        let f = fixture();
        f.vitals.set_lcp(2100.0);
        f.store.insert(Metric::completed("image_hero.png", 0.0, 650.0, Some(MetricKind::image())));
        f.store.insert(Metric::completed("image_icon.png", 0.0, 40.0, Some(MetricKind::image())));
        f.errors.record_error("signature check failed");

        let report = f.generator.generate_report();
        assert_eq!(report.url, "https://certs.test/verify");
        assert_eq!(report.web_vitals.lcp, Some(2100.0));
        assert_eq!(
            report.slow_resources,
            vec![SlowResource {
                name: "image_hero.png".into(),
                duration: 650.0,
                metric_type: Some("image".into()),
            }]
        );
        assert_eq!(report.errors.len(), 1);

        f.errors.clear_errors();
        assert!(f.generator.generate_report().errors.is_empty());
    }

    #[test]
    fn report_json_uses_wire_names() {
        let f = fixture();
        f.vitals.set_fcp_once(800.0);
        let value = serde_json::to_value(f.generator.generate_report()).unwrap();
        assert_eq!(value["userAgent"], "test-agent");
        assert_eq!(value["webVitals"]["FCP"], 800.0);
        assert_eq!(value["customMetrics"]["apiResponseTime"], 0.0);
        assert!(value["slowResources"].as_array().unwrap().is_empty());
    }

    #[test]
    fn export_round_trips_metrics() {
        let f = fixture();
        f.store.insert(Metric::completed(
            "component_Dashboard",
            12.25,
            301.5,
            Some(MetricKind::Component { success: Some(true) }),
        ));
        f.store.insert(Metric::started("bundle_admin", 40.0, Some(MetricKind::bundle())));
        f.store.insert(Metric::completed(
            "resource_/lazy/chart.js",
            3.0,
            0.1 + 0.2,
            Some(MetricKind::Resource {
                initiator_type: "script".into(),
                size: 0,
                cached: true,
            }),
        ));

        let raw = f.generator.export_data().unwrap();
        let parsed = ExportDocument::from_json(&raw).unwrap();
        assert_eq!(parsed.metrics, f.store.metrics());
        assert_eq!(parsed.summary.components.count, 1);
        assert_eq!(parsed.user_agent, "test-agent");
    }

    #[test]
    fn malformed_export_is_invalid_argument() {
        let err = ExportDocument::from_json("{\"metrics\": 3}").unwrap_err();
        assert_eq!(err.code_str(), "performance/invalid-argument");
    }
}
