use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::performance::constants::{
    FIRST_CONTENTFUL_PAINT, FIRST_PAINT, MANUAL_SOURCE_BUFFER_LIMIT, NAVIGATION_METRIC_KEY,
    RESOURCE_KEY_PREFIX,
};
use crate::performance::error::{unsupported, PerformanceResult};
use crate::performance::metric::{Metric, MetricKind};
use crate::performance::store::MetricStore;
use crate::performance::vitals::VitalsCollector;

/// Entry kinds the platform timing facility can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Navigation,
    Paint,
    LargestContentfulPaint,
    FirstInput,
    LayoutShift,
    Resource,
}

impl EntryKind {
    /// Attach order: paints come first so the navigation metric can pick them up.
    pub const ALL: [EntryKind; 6] = [
        EntryKind::Paint,
        EntryKind::Navigation,
        EntryKind::LargestContentfulPaint,
        EntryKind::FirstInput,
        EntryKind::LayoutShift,
        EntryKind::Resource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Navigation => "navigation",
            EntryKind::Paint => "paint",
            EntryKind::LargestContentfulPaint => "largest-contentful-paint",
            EntryKind::FirstInput => "first-input",
            EntryKind::LayoutShift => "layout-shift",
            EntryKind::Resource => "resource",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        EntryKind::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavigationEntry {
    pub name: String,
    pub start_time: f64,
    pub duration: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub dom_content_loaded_event_start: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PaintEntry {
    pub name: String,
    pub start_time: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LargestContentfulPaintEntry {
    pub start_time: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FirstInputEntry {
    pub name: String,
    pub start_time: f64,
    pub processing_start: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutShiftEntry {
    pub start_time: f64,
    pub value: f64,
    pub had_recent_input: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceEntry {
    pub name: String,
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub transfer_size: u64,
}

/// One observation pushed by the platform timing facility.
#[derive(Clone, Debug, PartialEq)]
pub enum PerformanceEntry {
    Navigation(NavigationEntry),
    Paint(PaintEntry),
    LargestContentfulPaint(LargestContentfulPaintEntry),
    FirstInput(FirstInputEntry),
    LayoutShift(LayoutShiftEntry),
    Resource(ResourceEntry),
}

impl PerformanceEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            PerformanceEntry::Navigation(_) => EntryKind::Navigation,
            PerformanceEntry::Paint(_) => EntryKind::Paint,
            PerformanceEntry::LargestContentfulPaint(_) => EntryKind::LargestContentfulPaint,
            PerformanceEntry::FirstInput(_) => EntryKind::FirstInput,
            PerformanceEntry::LayoutShift(_) => EntryKind::LayoutShift,
            PerformanceEntry::Resource(_) => EntryKind::Resource,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub type EntryCallback = Arc<dyn Fn(&PerformanceEntry) + Send + Sync + 'static>;
#[cfg(target_arch = "wasm32")]
pub type EntryCallback = Arc<dyn Fn(&PerformanceEntry) + 'static>;

#[cfg(not(target_arch = "wasm32"))]
type Teardown = Box<dyn FnOnce() + Send + 'static>;
#[cfg(target_arch = "wasm32")]
type Teardown = Box<dyn FnOnce() + 'static>;

/// Registration returned by [`ObservationSource::register`]. Disconnects on drop.
pub struct Subscription {
    teardown: Option<Teardown>,
}

impl Subscription {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn disconnect(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.teardown.is_some())
            .finish()
    }
}

/// The narrow interface to a platform timing facility.
pub trait ObservationSource {
    /// Subscribes `callback` to every future entry of `kind`. Fails with
    /// `performance/unsupported` when the platform cannot observe that kind.
    fn register(&self, kind: EntryKind, callback: EntryCallback) -> PerformanceResult<Subscription>;

    /// Entries of `kind` the platform recorded before anyone subscribed.
    fn buffered(&self, _kind: EntryKind) -> Vec<PerformanceEntry> {
        Vec::new()
    }
}

/// Turns platform observations into metrics and vitals.
#[derive(Clone)]
pub struct ObservationAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    store: Arc<MetricStore>,
    vitals: Arc<VitalsCollector>,
    paints: Mutex<PaintTimings>,
    subscriptions: Mutex<Vec<Subscription>>,
    unsupported: Mutex<HashSet<EntryKind>>,
    attached: AtomicBool,
    replayed: AtomicBool,
}

#[derive(Clone, Copy, Debug, Default)]
struct PaintTimings {
    first_paint: Option<f64>,
    first_contentful_paint: Option<f64>,
}

impl fmt::Debug for ObservationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationAdapter")
            .field("subscriptions", &lock(&self.inner.subscriptions).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ObservationAdapter {
    pub fn new(store: Arc<MetricStore>, vitals: Arc<VitalsCollector>) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                store,
                vitals,
                paints: Mutex::new(PaintTimings::default()),
                subscriptions: Mutex::new(Vec::new()),
                unsupported: Mutex::new(HashSet::new()),
                attached: AtomicBool::new(false),
                replayed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribes to every entry kind `source` offers.
    ///
    /// Kinds the source cannot observe are logged and skipped; the matching
    /// vital or metric simply stays unset. Returns `false` without touching
    /// anything while an earlier attach is still connected. Buffered entries
    /// are replayed on the first attach only, so re-attaching after
    /// [`ObservationAdapter::disconnect`] never counts them twice.
    pub fn attach(&self, source: &dyn ObservationSource) -> bool {
        if self.inner.attached.swap(true, Ordering::SeqCst) {
            log::warn!("performance observation already attached; ignoring second attach");
            return false;
        }
        let replay = !self.inner.replayed.swap(true, Ordering::SeqCst);
        for kind in EntryKind::ALL {
            if replay {
                for entry in source.buffered(kind) {
                    self.ingest(&entry);
                }
            }
            let weak = Arc::downgrade(&self.inner);
            let callback: EntryCallback = Arc::new(move |entry: &PerformanceEntry| {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.ingest(entry);
                }
            });
            match source.register(kind, callback) {
                Ok(subscription) => lock(&self.inner.subscriptions).push(subscription),
                Err(err) => {
                    log::warn!("performance observation for `{kind}` unavailable: {err}");
                    lock(&self.inner.unsupported).insert(kind);
                }
            }
        }
        true
    }

    /// Records one entry. Safe to call directly, with or without a source.
    pub fn ingest(&self, entry: &PerformanceEntry) {
        self.inner.ingest(entry);
    }

    /// Drops every subscription made by [`ObservationAdapter::attach`].
    pub fn disconnect(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.inner.subscriptions));
        for subscription in subscriptions {
            subscription.disconnect();
        }
        self.inner.attached.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.inner.subscriptions).len()
    }

    /// Entry kinds whose registration failed.
    pub fn unsupported_kinds(&self) -> Vec<EntryKind> {
        let unsupported = lock(&self.inner.unsupported);
        EntryKind::ALL
            .into_iter()
            .filter(|kind| unsupported.contains(kind))
            .collect()
    }
}

impl AdapterInner {
    fn ingest(&self, entry: &PerformanceEntry) {
        match entry {
            PerformanceEntry::Resource(resource) => self.record_resource(resource),
            PerformanceEntry::Navigation(navigation) => self.record_navigation(navigation),
            PerformanceEntry::Paint(paint) => self.record_paint(paint),
            PerformanceEntry::LargestContentfulPaint(lcp) => self.vitals.set_lcp(lcp.start_time),
            PerformanceEntry::FirstInput(input) => {
                self.vitals
                    .set_fid_once(input.processing_start - input.start_time);
            }
            PerformanceEntry::LayoutShift(shift) => {
                if !shift.had_recent_input {
                    self.vitals.add_layout_shift(shift.value);
                }
            }
        }
    }

    fn record_resource(&self, resource: &ResourceEntry) {
        if !is_lazy_resource(resource) {
            return;
        }
        self.store.insert(Metric::completed(
            format!("{RESOURCE_KEY_PREFIX}{}", resource.name),
            resource.start_time,
            resource.duration,
            Some(MetricKind::Resource {
                initiator_type: resource.initiator_type.clone(),
                size: resource.transfer_size,
                cached: resource.transfer_size == 0,
            }),
        ));
    }

    fn record_navigation(&self, navigation: &NavigationEntry) {
        let paints = *lock(&self.paints);
        self.store.insert(Metric::completed(
            NAVIGATION_METRIC_KEY,
            navigation.start_time,
            navigation.load_event_end - navigation.start_time,
            Some(MetricKind::Navigation {
                dom_content_loaded: Some(
                    navigation.dom_content_loaded_event_end
                        - navigation.dom_content_loaded_event_start,
                ),
                first_paint: paints.first_paint,
                first_contentful_paint: paints.first_contentful_paint,
            }),
        ));
        if navigation.response_start > 0.0 && navigation.response_start >= navigation.request_start
        {
            self.vitals
                .set_ttfb_once(navigation.response_start - navigation.request_start);
        }
    }

    fn record_paint(&self, paint: &PaintEntry) {
        let mut paints = lock(&self.paints);
        match paint.name.as_str() {
            FIRST_PAINT => {
                paints.first_paint.get_or_insert(paint.start_time);
            }
            FIRST_CONTENTFUL_PAINT => {
                paints.first_contentful_paint.get_or_insert(paint.start_time);
                drop(paints);
                self.vitals.set_fcp_once(paint.start_time);
            }
            other => log::debug!("ignoring paint entry `{other}`"),
        }
    }
}

/// Only code-split chunks, explicitly lazy assets and images are worth a metric.
fn is_lazy_resource(resource: &ResourceEntry) -> bool {
    resource.name.contains("lazy")
        || resource.name.contains("chunk")
        || resource.initiator_type == "img"
}

/// In-process [`ObservationSource`] that fans entries out to subscribers.
///
/// Native hosts feed it with whatever timing data they have; tests use it to
/// drive the adapter. The most recent entries are kept and replayed as
/// buffered entries, up to [`MANUAL_SOURCE_BUFFER_LIMIT`] of them.
#[derive(Clone, Default)]
pub struct ManualObservationSource {
    inner: Arc<ManualSourceInner>,
}

#[derive(Default)]
struct ManualSourceInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, EntryKind, EntryCallback)>>,
    buffer: Mutex<VecDeque<PerformanceEntry>>,
    unsupported: Mutex<HashSet<EntryKind>>,
}

impl fmt::Debug for ManualObservationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualObservationSource")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ManualObservationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes registration for `kinds` fail, as on a platform lacking them.
    pub fn with_unsupported(self, kinds: &[EntryKind]) -> Self {
        lock(&self.inner.unsupported).extend(kinds.iter().copied());
        self
    }

    /// Delivers `entry` to current subscribers of its kind and buffers it.
    pub fn emit(&self, entry: PerformanceEntry) {
        let kind = entry.kind();
        let callbacks: Vec<EntryCallback> = lock(&self.inner.subscribers)
            .iter()
            .filter(|(_, subscribed, _)| *subscribed == kind)
            .map(|(_, _, callback)| Arc::clone(callback))
            .collect();
        {
            let mut buffer = lock(&self.inner.buffer);
            if buffer.len() == MANUAL_SOURCE_BUFFER_LIMIT {
                buffer.pop_front();
            }
            buffer.push_back(entry.clone());
        }
        for callback in callbacks {
            callback(&entry);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }

    pub fn buffered_len(&self) -> usize {
        lock(&self.inner.buffer).len()
    }
}

impl ObservationSource for ManualObservationSource {
    fn register(
        &self,
        kind: EntryKind,
        callback: EntryCallback,
    ) -> PerformanceResult<Subscription> {
        if lock(&self.inner.unsupported).contains(&kind) {
            return Err(unsupported(format!("entry type `{kind}` is not supported")));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.subscribers).push((id, kind, callback));
        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.subscribers).retain(|(existing, _, _)| *existing != id);
            }
        }))
    }

    fn buffered(&self, kind: EntryKind) -> Vec<PerformanceEntry> {
        lock(&self.inner.buffer)
            .iter()
            .filter(|entry| entry.kind() == kind)
            .cloned()
            .collect()
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod wasm {
    use std::sync::Arc;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::JsValue;
    use web_sys::{PerformanceObserver, PerformanceObserverEntryList, PerformanceObserverInit};

    use super::{
        EntryCallback, EntryKind, FirstInputEntry, LargestContentfulPaintEntry, LayoutShiftEntry,
        NavigationEntry, ObservationSource, PaintEntry, PerformanceEntry, ResourceEntry,
        Subscription,
    };
    use crate::performance::error::{internal_error, unsupported, PerformanceResult};

    /// [`ObservationSource`] backed by the browser's `PerformanceObserver`.
    #[derive(Debug, Default)]
    pub struct BrowserObservationSource;

    impl BrowserObservationSource {
        pub fn new() -> Self {
            Self
        }
    }

    impl ObservationSource for BrowserObservationSource {
        fn register(
            &self,
            kind: EntryKind,
            callback: EntryCallback,
        ) -> PerformanceResult<Subscription> {
            if !is_supported(kind) {
                return Err(unsupported(format!("entry type `{kind}` is not supported")));
            }
            let handler = Arc::clone(&callback);
            let closure = Closure::wrap(Box::new(
                move |list: PerformanceObserverEntryList, _: JsValue| {
                    let entries = list.get_entries();
                    for idx in 0..entries.length() {
                        let raw = entries.get(idx);
                        if raw.is_undefined() || raw.is_null() {
                            continue;
                        }
                        if let Some(entry) = convert(kind, &raw) {
                            handler(&entry);
                        }
                    }
                },
            )
                as Box<dyn FnMut(PerformanceObserverEntryList, JsValue)>);

            let observer = PerformanceObserver::new(closure.as_ref().unchecked_ref())
                .map_err(|err| internal_error(format!("observer init: {err:?}")))?;
            let types = js_sys::Array::new();
            types.push(&JsValue::from_str(kind.as_str()));
            let types_value: JsValue = types.into();
            let init = PerformanceObserverInit::new(&types_value);
            observer.observe(&init);

            Ok(Subscription::new(move || {
                observer.disconnect();
                drop(closure);
            }))
        }

        fn buffered(&self, kind: EntryKind) -> Vec<PerformanceEntry> {
            let Some(performance) = web_sys::window().and_then(|window| window.performance())
            else {
                return Vec::new();
            };
            let entries = performance.get_entries_by_type(kind.as_str());
            (0..entries.length())
                .filter_map(|idx| convert(kind, &entries.get(idx)))
                .collect()
        }
    }

    fn is_supported(kind: EntryKind) -> bool {
        let global = js_sys::global();
        let Ok(constructor) =
            js_sys::Reflect::get(&global, &JsValue::from_str("PerformanceObserver"))
        else {
            return false;
        };
        if constructor.is_undefined() {
            return false;
        }
        match js_sys::Reflect::get(&constructor, &JsValue::from_str("supportedEntryTypes")) {
            Ok(types) if js_sys::Array::is_array(&types) => js_sys::Array::from(&types)
                .includes(&JsValue::from_str(kind.as_str()), 0),
            _ => true,
        }
    }

    fn number(raw: &JsValue, field: &str) -> f64 {
        js_sys::Reflect::get(raw, &JsValue::from_str(field))
            .ok()
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0)
    }

    fn text(raw: &JsValue, field: &str) -> String {
        js_sys::Reflect::get(raw, &JsValue::from_str(field))
            .ok()
            .and_then(|value| value.as_string())
            .unwrap_or_default()
    }

    fn flag(raw: &JsValue, field: &str) -> bool {
        js_sys::Reflect::get(raw, &JsValue::from_str(field))
            .ok()
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    fn convert(kind: EntryKind, raw: &JsValue) -> Option<PerformanceEntry> {
        if raw.is_undefined() || raw.is_null() {
            return None;
        }
        let entry = match kind {
            EntryKind::Navigation => PerformanceEntry::Navigation(NavigationEntry {
                name: text(raw, "name"),
                start_time: number(raw, "startTime"),
                duration: number(raw, "duration"),
                request_start: number(raw, "requestStart"),
                response_start: number(raw, "responseStart"),
                dom_content_loaded_event_start: number(raw, "domContentLoadedEventStart"),
                dom_content_loaded_event_end: number(raw, "domContentLoadedEventEnd"),
                load_event_end: number(raw, "loadEventEnd"),
            }),
            EntryKind::Paint => PerformanceEntry::Paint(PaintEntry {
                name: text(raw, "name"),
                start_time: number(raw, "startTime"),
            }),
            EntryKind::LargestContentfulPaint => {
                PerformanceEntry::LargestContentfulPaint(LargestContentfulPaintEntry {
                    start_time: number(raw, "startTime"),
                })
            }
            EntryKind::FirstInput => PerformanceEntry::FirstInput(FirstInputEntry {
                name: text(raw, "name"),
                start_time: number(raw, "startTime"),
                processing_start: number(raw, "processingStart"),
            }),
            EntryKind::LayoutShift => PerformanceEntry::LayoutShift(LayoutShiftEntry {
                start_time: number(raw, "startTime"),
                value: number(raw, "value"),
                had_recent_input: flag(raw, "hadRecentInput"),
            }),
            EntryKind::Resource => {
                let name = text(raw, "name");
                if name.is_empty() || name.starts_with("data:") {
                    return None;
                }
                PerformanceEntry::Resource(ResourceEntry {
                    name,
                    initiator_type: text(raw, "initiatorType"),
                    start_time: number(raw, "startTime"),
                    duration: number(raw, "duration"),
                    transfer_size: number(raw, "transferSize").max(0.0) as u64,
                })
            }
        };
        Some(entry)
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use wasm::BrowserObservationSource;
