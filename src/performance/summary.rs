use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::performance::constants::{
    BUNDLE_KEY_PREFIX, COMPONENT_KEY_PREFIX, IMAGE_KEY_PREFIX, NAVIGATION_METRIC_KEY,
};
use crate::performance::metric::Metric;
use crate::performance::store::MetricStore;

/// Count, mean duration and slowest entry of one metric category.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub count: usize,
    pub average_load_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slowest: Option<Metric>,
}

impl CategorySummary {
    pub fn from_metrics(metrics: &[Metric]) -> Self {
        Self {
            count: metrics.len(),
            average_load_time: average_duration(metrics),
            slowest: slowest(metrics).cloned(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub components: CategorySummary,
    pub images: CategorySummary,
    pub bundles: CategorySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Metric>,
}

/// Read-only views derived from a [`MetricStore`].
#[derive(Clone, Debug)]
pub struct SummaryAggregator {
    store: Arc<MetricStore>,
}

impl SummaryAggregator {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self { store }
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.store.metrics()
    }

    /// Metrics tagged with `metric_type`, or whose name is prefixed with
    /// `"<metric_type>_"`.
    pub fn metrics_by_type(&self, metric_type: &str) -> Vec<Metric> {
        let prefix = format!("{metric_type}_");
        self.store.filter(|metric| {
            metric.metric_type() == Some(metric_type) || metric.name.starts_with(&prefix)
        })
    }

    pub fn summary(&self) -> Summary {
        Summary {
            components: CategorySummary::from_metrics(&self.metrics_by_type(COMPONENT_KEY_PREFIX)),
            images: CategorySummary::from_metrics(&self.metrics_by_type(IMAGE_KEY_PREFIX)),
            bundles: CategorySummary::from_metrics(&self.metrics_by_type(BUNDLE_KEY_PREFIX)),
            navigation: self.store.get(NAVIGATION_METRIC_KEY),
        }
    }

    /// Every metric whose duration is strictly above `threshold_ms`.
    ///
    /// Call sites pick their own threshold: reports use 500 ms, dashboards
    /// 1000 ms, the alert check 2000 ms and 5000 ms.
    pub fn slow_metrics(&self, threshold_ms: f64) -> Vec<Metric> {
        self.store
            .filter(|metric| metric.duration.is_some_and(|duration| duration > threshold_ms))
    }
}

/// Mean duration over the completed metrics in `metrics`; 0 when none completed.
pub fn average_duration(metrics: &[Metric]) -> f64 {
    let durations: Vec<f64> = metrics.iter().filter_map(|metric| metric.duration).collect();
    if durations.is_empty() {
        return 0.0;
    }
    durations.iter().sum::<f64>() / durations.len() as f64
}

fn slowest(metrics: &[Metric]) -> Option<&Metric> {
    metrics
        .iter()
        .filter(|metric| metric.duration.is_some())
        .max_by(|a, b| a.duration.unwrap_or(0.0).total_cmp(&b.duration.unwrap_or(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::metric::MetricKind;

    fn store_with(metrics: Vec<Metric>) -> Arc<MetricStore> {
        let store = Arc::new(MetricStore::new());
        for metric in metrics {
            store.insert(metric);
        }
        store
    }

    #[test]
    fn by_type_matches_tag_or_prefix() {
        let store = store_with(vec![
            Metric::completed("component_Header", 0.0, 10.0, Some(MetricKind::component())),
            Metric::completed("component_Untagged", 0.0, 10.0, None),
            Metric::completed("hero", 0.0, 10.0, Some(MetricKind::component())),
            Metric::completed("componentless", 0.0, 10.0, None),
        ]);
        let aggregator = SummaryAggregator::new(store);
        let names: Vec<_> = aggregator
            .metrics_by_type("component")
            .into_iter()
            .map(|metric| metric.name)
            .collect();
        assert_eq!(names, vec!["component_Header", "component_Untagged", "hero"]);
    }

    #[test]
    fn summary_ignores_in_flight_metrics_for_average() {
        let store = store_with(vec![
            Metric::completed("image_a.png", 0.0, 100.0, Some(MetricKind::image())),
            Metric::completed("image_b.png", 0.0, 300.0, Some(MetricKind::image())),
            Metric::started("image_c.png", 0.0, Some(MetricKind::image())),
        ]);
        let summary = SummaryAggregator::new(store).summary();
        assert_eq!(summary.images.count, 3);
        assert_eq!(summary.images.average_load_time, 200.0);
        assert_eq!(summary.images.slowest.unwrap().name, "image_b.png");
        assert_eq!(summary.components, CategorySummary::default());
        assert!(summary.navigation.is_none());
    }

    #[test]
    fn in_flight_only_category_has_no_slowest() {
        let store = store_with(vec![Metric::started(
            "bundle_admin",
            0.0,
            Some(MetricKind::bundle()),
        )]);
        let summary = SummaryAggregator::new(store).summary();
        assert_eq!(summary.bundles.count, 1);
        assert_eq!(summary.bundles.average_load_time, 0.0);
        assert!(summary.bundles.slowest.is_none());
    }

    #[test]
    fn slow_metrics_threshold_is_strict() {
        let store = store_with(vec![
            Metric::completed("a", 0.0, 500.0, None),
            Metric::completed("b", 0.0, 500.5, None),
            Metric::started("c", 0.0, None),
        ]);
        let aggregator = SummaryAggregator::new(store);
        let slow: Vec<_> = aggregator
            .slow_metrics(500.0)
            .into_iter()
            .map(|metric| metric.name)
            .collect();
        assert_eq!(slow, vec!["b"]);
        assert_eq!(aggregator.slow_metrics(0.0).len(), 2);
    }
}
