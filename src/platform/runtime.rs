use std::future::Future;
use std::time::Duration;

/// Spawns a background task the caller never awaits.
///
/// Telemetry work (report delivery, periodic checks) goes through here so the
/// instrumentation hot path never blocks on it.
#[cfg(target_arch = "wasm32")]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Spawns a background task the caller never awaits.
///
/// Uses the ambient tokio runtime when there is one, otherwise a lazily built
/// single-worker runtime owned by this module. If that runtime cannot be built
/// the task is dropped and a warning logged; the host keeps running.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    use std::sync::LazyLock;
    use tokio::runtime::{Builder, Handle, Runtime};

    static BACKGROUND_RUNTIME: LazyLock<Option<Runtime>> = LazyLock::new(|| {
        let built = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("webperf-background")
            .enable_all()
            .build();
        match built {
            Ok(runtime) => Some(runtime),
            Err(err) => {
                log::warn!("failed to build background runtime for telemetry tasks: {err}");
                None
            }
        }
    });

    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
    } else if let Some(runtime) = BACKGROUND_RUNTIME.as_ref() {
        let _ = runtime.spawn(future);
    }
}

/// Asynchronously waits for the provided duration in a platform-compatible way.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }

    sleep_impl(duration).await;
}

#[cfg(target_arch = "wasm32")]
async fn sleep_impl(duration: Duration) {
    use gloo_timers::future::sleep;
    sleep(duration).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn sleep_impl(duration: Duration) {
    use tokio::time::sleep;
    sleep(duration).await;
}

/// Runs `task` every `period` until `keep_running` returns false.
///
/// The check happens after each sleep, so a stopped loop exits at its next
/// tick instead of interrupting work already in progress.
pub async fn every<C, T, Fut>(period: Duration, mut keep_running: C, mut task: T)
where
    C: FnMut() -> bool,
    T: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if period.is_zero() {
        log::debug!("refusing to schedule a periodic task with a zero period");
        return;
    }
    loop {
        sleep(period).await;
        if !keep_running() {
            break;
        }
        task().await;
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(flavor = "current_thread")]
    async fn every_stops_when_condition_turns_false() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        every(
            Duration::from_millis(1),
            || counter.load(Ordering::SeqCst) < 3,
            || {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            },
        )
        .await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn zero_period_never_runs() {
        let runs = AtomicUsize::new(0);
        every(Duration::ZERO, || true, || {
            runs.fetch_add(1, Ordering::SeqCst);
            async {}
        })
        .await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
