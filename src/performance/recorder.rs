use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::performance::constants::{
    API_KEY_PREFIX, BUNDLE_KEY_PREFIX, COMPONENT_KEY_PREFIX, IMAGE_KEY_PREFIX, ROUTE_KEY_PREFIX,
};
use crate::performance::metric::{Metric, MetricKind};
use crate::performance::store::MetricStore;
use crate::platform::clock::ClockHandle;

/// Start/end API over a [`MetricStore`].
///
/// Nothing here returns an error or suspends: misuse such as ending an unknown
/// timing is tolerated and logged at debug level.
#[derive(Clone)]
pub struct TimingRecorder {
    store: Arc<MetricStore>,
    clock: ClockHandle,
    sequence: Arc<AtomicU64>,
}

impl fmt::Debug for TimingRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingRecorder")
            .field("metrics", &self.store.len())
            .finish()
    }
}

impl TimingRecorder {
    pub fn new(store: Arc<MetricStore>, clock: ClockHandle) -> Self {
        Self {
            store,
            clock,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn now(&self) -> f64 {
        self.clock.now_ms()
    }

    /// Starts (or restarts) the timing called `name`.
    ///
    /// Restarting a timing that has not ended yet discards its start time; use
    /// [`TimingRecorder::begin`] when overlapping operations share a name.
    pub fn start_timing(&self, name: &str, metadata: Option<MetricKind>) {
        let metric = Metric::started(name, self.now(), metadata);
        if let Some(previous) = self.store.insert(metric) {
            if !previous.is_complete() {
                log::warn!(
                    "timing `{name}` restarted while still in flight; earlier start discarded"
                );
            }
        }
    }

    /// Ends the timing called `name`, merging `extra` into its metadata.
    pub fn end_timing(&self, name: &str, extra: Option<MetricKind>) {
        if !self.store.complete(name, self.now(), extra) {
            log::debug!("ignoring end of unknown timing `{name}`");
        }
    }

    /// Starts a timing under an instance-unique key derived from `name`.
    pub fn begin(&self, name: &str, metadata: Option<MetricKind>) -> TimingHandle {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = format!("{name}#{seq}");
        self.start_timing(&key, metadata);
        TimingHandle {
            recorder: self.clone(),
            key,
        }
    }

    pub fn start_component_load(&self, component: &str) {
        self.start_timing(
            &category_key(COMPONENT_KEY_PREFIX, component),
            Some(MetricKind::component()),
        );
    }

    pub fn end_component_load(&self, component: &str, success: bool) {
        self.end_timing(
            &category_key(COMPONENT_KEY_PREFIX, component),
            Some(MetricKind::Component {
                success: Some(success),
            }),
        );
    }

    pub fn start_image_load(&self, src: &str) {
        self.start_timing(&category_key(IMAGE_KEY_PREFIX, src), Some(MetricKind::image()));
    }

    pub fn end_image_load(&self, src: &str, success: bool) {
        self.end_timing(
            &category_key(IMAGE_KEY_PREFIX, src),
            Some(MetricKind::Image {
                success: Some(success),
                size: None,
            }),
        );
    }

    pub fn start_bundle_load(&self, bundle: &str) {
        self.start_timing(&category_key(BUNDLE_KEY_PREFIX, bundle), Some(MetricKind::bundle()));
    }

    pub fn end_bundle_load(&self, bundle: &str, success: bool) {
        self.end_timing(
            &category_key(BUNDLE_KEY_PREFIX, bundle),
            Some(MetricKind::Bundle {
                success: Some(success),
                size: None,
            }),
        );
    }

    pub fn start_api_call(&self, endpoint: &str, method: &str) {
        self.start_timing(&category_key(API_KEY_PREFIX, endpoint), Some(MetricKind::api(method)));
    }

    /// Ends an API call timing. Statuses below 400 count as success.
    pub fn end_api_call(&self, endpoint: &str, status: u16) {
        self.end_timing(
            &category_key(API_KEY_PREFIX, endpoint),
            Some(MetricKind::Api {
                method: None,
                status: Some(status),
                success: Some((200..400).contains(&status)),
            }),
        );
    }

    pub fn start_route_change(&self, route: &str) {
        self.start_timing(&category_key(ROUTE_KEY_PREFIX, route), Some(MetricKind::route()));
    }

    pub fn end_route_change(&self, route: &str) {
        self.end_timing(&category_key(ROUTE_KEY_PREFIX, route), None);
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}

fn category_key(category: &str, identifier: &str) -> String {
    format!("{category}_{identifier}")
}

/// A timing started with [`TimingRecorder::begin`].
///
/// Dropping the handle without calling [`TimingHandle::end`] leaves the metric
/// in flight.
#[derive(Debug)]
pub struct TimingHandle {
    recorder: TimingRecorder,
    key: String,
}

impl TimingHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn end(self, extra: Option<MetricKind>) {
        self.recorder.end_timing(&self.key, extra);
    }
}
