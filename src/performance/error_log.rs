use std::fmt::{self, Display};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::clock::ClockHandle;

/// How a failure reached the log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorSource {
    /// A panic caught by the chained panic hook.
    Panic,
    /// A background task or promise that failed with nobody awaiting it.
    Rejection,
    /// Reported explicitly by the host.
    #[default]
    Reported,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: ErrorSource,
}

/// Append-only log of host application failures.
///
/// The log observes failures, it never handles them: a panic still reaches
/// the previously installed hook. There is no size cap; call
/// [`ErrorLog::clear_errors`] to reset it.
#[derive(Clone)]
pub struct ErrorLog {
    inner: Arc<ErrorLogInner>,
}

struct ErrorLogInner {
    clock: ClockHandle,
    records: Mutex<Vec<ErrorRecord>>,
    active: AtomicBool,
    hook_installed: AtomicBool,
}

impl fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorLog")
            .field("errors", &self.len())
            .field("active", &self.is_active())
            .finish()
    }
}

impl ErrorLog {
    pub fn new(clock: ClockHandle) -> Self {
        Self {
            inner: Arc::new(ErrorLogInner {
                clock,
                records: Mutex::new(Vec::new()),
                active: AtomicBool::new(true),
                hook_installed: AtomicBool::new(false),
            }),
        }
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.inner.push(message.into(), ErrorSource::Reported);
    }

    pub fn record_rejection(&self, reason: impl Display) {
        self.inner.push(reason.to_string(), ErrorSource::Rejection);
    }

    /// Awaits `task`, recording an `Err` as a rejection. The error is consumed:
    /// the caller gets `None`.
    pub async fn observe_task<F, T, E>(&self, task: F) -> Option<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match task.await {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_rejection(&err);
                None
            }
        }
    }

    /// Chains a panic hook that records every panic message while this log is
    /// active. Installing twice is a no-op.
    pub fn install_panic_hook(&self) {
        if self.inner.hook_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(inner) = weak.upgrade() {
                let payload = info.payload();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|text| text.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic with non-string payload".to_string());
                let message = match info.location() {
                    Some(location) => format!("{message} at {location}"),
                    None => message,
                };
                inner.push_from_hook(message);
            }
            previous(info);
        }));
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.inner.records().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of errors recorded within `window` of now.
    pub fn recent_count(&self, window: Duration) -> usize {
        let now = self.inner.clock.wall_time();
        let cutoff = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| now.checked_sub_signed(window));
        self.inner
            .records()
            .iter()
            .filter(|record| cutoff.map_or(true, |cutoff| record.timestamp >= cutoff))
            .count()
    }

    pub fn clear_errors(&self) {
        self.inner.records().clear();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Stops capturing. Installed hooks stay chained but record nothing.
    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
    }
}

impl ErrorLogInner {
    fn records(&self) -> MutexGuard<'_, Vec<ErrorRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, message: String, source: ErrorSource) -> ErrorRecord {
        ErrorRecord {
            message,
            timestamp: self.clock.wall_time(),
            source,
        }
    }

    fn push(&self, message: String, source: ErrorSource) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let record = self.record(message, source);
        self.records().push(record);
    }

    // The panic may have happened while the log itself was locked; never wait.
    fn push_from_hook(&self, message: String) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let record = self.record(message, ErrorSource::Panic);
        match self.records.try_lock() {
            Ok(mut records) => records.push(record),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().push(record),
            Err(TryLockError::WouldBlock) => {}
        }
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod wasm {
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::JsValue;
    use web_sys::{ErrorEvent, Event, PromiseRejectionEvent, Window};

    use super::{ErrorLog, ErrorSource};
    use crate::performance::error::{internal_error, PerformanceResult};

    /// Window `error` / `unhandledrejection` listeners feeding an [`ErrorLog`].
    /// Removed on drop.
    pub struct BrowserErrorListeners {
        window: Window,
        on_error: Closure<dyn FnMut(Event)>,
        on_rejection: Closure<dyn FnMut(Event)>,
    }

    impl BrowserErrorListeners {
        pub fn install(log: &ErrorLog) -> PerformanceResult<Self> {
            let window = web_sys::window().ok_or_else(|| internal_error("window unavailable"))?;

            let error_log = log.clone();
            let on_error = Closure::wrap(Box::new(move |event: Event| {
                let message = event
                    .dyn_ref::<ErrorEvent>()
                    .map(|event| event.message())
                    .unwrap_or_else(|| "uncaught error".to_string());
                error_log.inner.push(message, ErrorSource::Panic);
            }) as Box<dyn FnMut(Event)>);

            let rejection_log = log.clone();
            let on_rejection = Closure::wrap(Box::new(move |event: Event| {
                let reason = event
                    .dyn_ref::<PromiseRejectionEvent>()
                    .map(|event| describe(&event.reason()))
                    .unwrap_or_else(|| "unhandled rejection".to_string());
                rejection_log.inner.push(reason, ErrorSource::Rejection);
            }) as Box<dyn FnMut(Event)>);

            window
                .add_event_listener_with_callback("error", on_error.as_ref().unchecked_ref())
                .map_err(|err| internal_error(format!("error listener: {err:?}")))?;
            window
                .add_event_listener_with_callback(
                    "unhandledrejection",
                    on_rejection.as_ref().unchecked_ref(),
                )
                .map_err(|err| internal_error(format!("rejection listener: {err:?}")))?;

            Ok(Self {
                window,
                on_error,
                on_rejection,
            })
        }
    }

    impl Drop for BrowserErrorListeners {
        fn drop(&mut self) {
            let _ = self.window.remove_event_listener_with_callback(
                "error",
                self.on_error.as_ref().unchecked_ref(),
            );
            let _ = self.window.remove_event_listener_with_callback(
                "unhandledrejection",
                self.on_rejection.as_ref().unchecked_ref(),
            );
        }
    }

    fn describe(reason: &JsValue) -> String {
        if let Some(text) = reason.as_string() {
            return text;
        }
        js_sys::Reflect::get(reason, &JsValue::from_str("message"))
            .ok()
            .and_then(|message| message.as_string())
            .unwrap_or_else(|| format!("{reason:?}"))
    }
}

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
pub use wasm::BrowserErrorListeners;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::clock::ManualClock;

    fn log() -> (ErrorLog, ManualClock) {
        let clock = ManualClock::default();
        (ErrorLog::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn recent_count_respects_window() {
        let (log, clock) = log();
        log.record_error("first");
        clock.advance(Duration::from_secs(4 * 60));
        log.record_error("second");
        clock.advance(Duration::from_secs(90));

        assert_eq!(log.len(), 2);
        assert_eq!(log.recent_count(Duration::from_secs(5 * 60)), 1);
        assert_eq!(log.recent_count(Duration::from_secs(60 * 60)), 2);
    }

    #[test]
    fn clear_and_deactivate() {
        let (log, _clock) = log();
        log.record_error("boom");
        log.clear_errors();
        assert!(log.is_empty());

        log.deactivate();
        log.record_error("ignored");
        assert!(log.is_empty());
    }

    #[test]
    fn panic_hook_records_and_chains() {
        let (log, _clock) = log();
        log.install_panic_hook();
        log.install_panic_hook();

        let result = std::panic::catch_unwind(|| {
            panic!("certificate render failed");
        });
        assert!(result.is_err());

        let panics: Vec<_> = log
            .errors()
            .into_iter()
            .filter(|record| record.source == ErrorSource::Panic)
            .collect();
        assert!(panics
            .iter()
            .any(|record| record.message.starts_with("certificate render failed")));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[tokio::test(flavor = "current_thread")]
    async fn observe_task_records_failures() {
        let (log, _clock) = log();
        let ok = log.observe_task(async { Ok::<_, String>(7) }).await;
        let failed = log
            .observe_task(async { Err::<u8, _>("upload rejected".to_string()) })
            .await;

        assert_eq!(ok, Some(7));
        assert_eq!(failed, None);
        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source, ErrorSource::Rejection);
        assert_eq!(errors[0].message, "upload rejected");
    }
}
