use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_lock::Mutex;
use async_trait::async_trait;

use crate::performance::error::{internal_error, network_error, PerformanceResult};
use crate::performance::report::{Report, ReportGenerator};
use crate::platform::runtime;

/// Where reports go. The default is [`HttpReportSink`].
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, endpoint: &str, report: &Report) -> PerformanceResult<()>;
}

/// POSTs the report as JSON. Any 2xx status counts as delivered.
pub struct HttpReportSink {
    client: reqwest::Client,
}

impl HttpReportSink {
    pub fn new(timeout: Duration) -> PerformanceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn build_client(timeout: Duration) -> PerformanceResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))
}

#[cfg(target_arch = "wasm32")]
fn build_client(_timeout: Duration) -> PerformanceResult<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|err| internal_error(format!("failed to build HTTP client: {err}")))
}

impl fmt::Debug for HttpReportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpReportSink").finish_non_exhaustive()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl ReportSink for HttpReportSink {
    async fn deliver(&self, endpoint: &str, report: &Report) -> PerformanceResult<()> {
        let response = self
            .client
            .post(endpoint)
            .json(report)
            .send()
            .await
            .map_err(|err| network_error(format!("failed to send report: {err}")))?;
        if !response.status().is_success() {
            return Err(network_error(format!(
                "report endpoint responded with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u64,
    pub failed: u64,
}

/// Best-effort report delivery.
///
/// Failures are logged and dropped; there are no retries and no queue. The
/// periodic schedule and the teardown send are detached tasks the caller
/// never waits on.
pub struct ReportTransport {
    reports: ReportGenerator,
    sink: Arc<dyn ReportSink>,
    endpoint: Option<String>,
    send_lock: Mutex<()>,
    running: AtomicBool,
    generation: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl fmt::Debug for ReportTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportTransport")
            .field("endpoint", &self.endpoint)
            .field("running", &self.is_running())
            .field("stats", &self.delivery_stats())
            .finish()
    }
}

impl ReportTransport {
    pub fn new(
        reports: ReportGenerator,
        sink: Arc<dyn ReportSink>,
        endpoint: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            reports,
            sink,
            endpoint,
            send_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Sends the current report to `endpoint`, or to the configured endpoint
    /// when `None`. Returns whether the endpoint acknowledged it; never fails.
    pub async fn send_report(&self, endpoint: Option<&str>) -> bool {
        let Some(endpoint) = endpoint.or(self.endpoint.as_deref()) else {
            log::debug!("no report endpoint configured; skipping send");
            return false;
        };
        let _guard = self.send_lock.lock().await;
        let report = self.reports.generate_report();
        match self.sink.deliver(endpoint, &report).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                log::warn!("performance report delivery to {endpoint} failed: {err}");
                self.failed.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Starts sending a report every `interval`. Does nothing without an
    /// endpoint or when already running.
    pub fn start_schedule(self: &Arc<Self>, interval: Duration) {
        if self.endpoint.is_none() {
            log::debug!("periodic reporting disabled: no endpoint configured");
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.load(Ordering::SeqCst);
        let this = Arc::clone(self);
        runtime::spawn_detached(async move {
            runtime::every(
                interval,
                || this.is_current(generation),
                || {
                    let this = Arc::clone(&this);
                    async move {
                        this.send_report(None).await;
                    }
                },
            )
            .await;
        });
    }

    /// Stops the periodic schedule at its next tick. A send already in flight
    /// is not interrupted.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A loop started before the last `stop` stays stale after a restart.
    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Fires one last report without waiting for it. Delivery is not
    /// guaranteed: the process may exit before the request completes.
    pub fn send_on_teardown(self: &Arc<Self>) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };

        #[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
        {
            if send_beacon(&endpoint, &self.reports.generate_report()) {
                return;
            }
        }

        let this = Arc::clone(self);
        runtime::spawn_detached(async move {
            this.send_report(Some(&endpoint)).await;
        });
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        DeliveryStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Queues the report with `navigator.sendBeacon`, which survives page unload.
#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
fn send_beacon(endpoint: &str, report: &Report) -> bool {
    let Ok(body) = serde_json::to_string(report) else {
        return false;
    };
    web_sys::window()
        .and_then(|window| {
            window
                .navigator()
                .send_beacon_with_opt_str(endpoint, Some(&body))
                .ok()
        })
        .unwrap_or(false)
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::performance::error_log::ErrorLog;
    use crate::performance::store::MetricStore;
    use crate::performance::summary::SummaryAggregator;
    use crate::performance::vitals::VitalsCollector;
    use crate::platform::clock::{ClockHandle, ManualClock};
    use crate::platform::environment::PageContext;
    use crate::test_support::start_mock_server;
    use httpmock::Method::POST;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingSink {
        delivered: StdMutex<Vec<(String, Report)>>,
    }

    #[async_trait]
    impl ReportSink for RecordingSink {
        async fn deliver(&self, endpoint: &str, report: &Report) -> PerformanceResult<()> {
            self.delivered
                .lock()
                .unwrap()
                .push((endpoint.to_string(), report.clone()));
            Ok(())
        }
    }

    fn generator(vitals: Arc<VitalsCollector>) -> ReportGenerator {
        let clock: ClockHandle = Arc::new(ManualClock::default());
        ReportGenerator::new(
            SummaryAggregator::new(Arc::new(MetricStore::new())),
            vitals,
            ErrorLog::new(Arc::clone(&clock)),
            PageContext::new("https://certs.test/", "test-agent"),
            clock,
        )
    }

    fn http_transport(endpoint: Option<String>) -> (Arc<ReportTransport>, Arc<VitalsCollector>) {
        let vitals = Arc::new(VitalsCollector::new());
        let sink = Arc::new(HttpReportSink::new(Duration::from_secs(2)).unwrap());
        (
            ReportTransport::new(generator(Arc::clone(&vitals)), sink, endpoint),
            vitals,
        )
    }

    #[tokio::test(flavor = "current_thread")]
    async fn posts_report_as_json() {
        let server = start_mock_server().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/telemetry")
                    .header("content-type", "application/json")
                    .json_body_partial(
                        json!({ "url": "https://certs.test/", "webVitals": { "TTFB": 120.0 } })
                            .to_string(),
                    );
                then.status(204);
            })
            .await;

        let (transport, vitals) = http_transport(Some(server.url("/telemetry")));
        vitals.set_ttfb_once(120.0);

        assert!(transport.send_report(None).await);
        mock.assert_async().await;
        assert_eq!(transport.delivery_stats(), DeliveryStats { sent: 1, failed: 0 });
    }

    #[tokio::test(flavor = "current_thread")]
    async fn server_errors_are_swallowed() {
        let server = start_mock_server().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/telemetry");
                then.status(503);
            })
            .await;

        let (transport, _) = http_transport(None);
        assert!(!transport.send_report(Some(&server.url("/telemetry"))).await);
        mock.assert_async().await;
        assert_eq!(transport.delivery_stats().failed, 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unreachable_endpoint_is_swallowed() {
        let (transport, _) = http_transport(Some("http://127.0.0.1:9/telemetry".into()));
        assert!(!transport.send_report(None).await);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn without_endpoint_nothing_is_sent() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ReportTransport::new(
            generator(Arc::new(VitalsCollector::new())),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            None,
        );
        assert!(!transport.send_report(None).await);
        transport.start_schedule(Duration::from_millis(1));
        transport.send_on_teardown();
        sleep(Duration::from_millis(20)).await;
        assert!(!transport.is_running());
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn schedule_sends_until_stopped() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ReportTransport::new(
            generator(Arc::new(VitalsCollector::new())),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            Some("https://collect.test/perf".into()),
        );
        transport.start_schedule(Duration::from_millis(10));
        sleep(Duration::from_millis(55)).await;
        transport.stop();
        let sent = sink.delivered.lock().unwrap().len();
        assert!(sent >= 2, "expected periodic sends, got {sent}");

        sleep(Duration::from_millis(40)).await;
        assert!(sink.delivered.lock().unwrap().len() <= sent + 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn restart_leaves_a_single_schedule() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ReportTransport::new(
            generator(Arc::new(VitalsCollector::new())),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            Some("https://collect.test/perf".into()),
        );
        transport.start_schedule(Duration::from_millis(100));
        sleep(Duration::from_millis(50)).await;
        transport.stop();
        transport.start_schedule(Duration::from_millis(100));
        assert!(transport.is_running());

        // The first loop wakes at 100ms and must exit without sending.
        sleep(Duration::from_millis(75)).await;
        assert!(sink.delivered.lock().unwrap().is_empty());

        // The restarted loop fires once at 150ms.
        sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        transport.stop();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn teardown_send_is_detached() {
        let sink = Arc::new(RecordingSink::default());
        let transport = ReportTransport::new(
            generator(Arc::new(VitalsCollector::new())),
            Arc::clone(&sink) as Arc<dyn ReportSink>,
            Some("https://collect.test/perf".into()),
        );
        transport.send_on_teardown();
        assert!(sink.delivered.lock().unwrap().is_empty());

        sleep(Duration::from_millis(10)).await;
        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "https://collect.test/perf");
    }
}
