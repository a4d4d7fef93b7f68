// ============================================================================
// hmr-runner - Async effects
//
// Coroutine-based reactive effects have no equivalent in a cooperative but
// non-reflective runtime, so this maps them onto a supervised task owning a
// dirty-notification channel: a synchronous probe re-runs on every
// dependency change and wakes the task, which runs the async body and
// coalesces any notifications that arrive while it's still running.
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::primitives::effect::{effect_sync, DisposeFn};

/// Registers `tracked` as a synchronous dependency probe (call `.get()` on
/// whatever signals the async body reads) and spawns a task that runs
/// `body()` every time one of those dependencies changes. Notifications
/// that arrive while `body()` is still running coalesce into a single
/// re-run once it completes, rather than queuing one run per change.
pub fn async_effect<T, F>(tracked: T, body: F) -> DisposeFn
where
    T: Fn() + 'static,
    F: Fn() -> Pin<Box<dyn Future<Output = ()>>> + 'static,
{
    let notify = Rc::new(Notify::new());
    let notify_for_probe = notify.clone();

    let stop_probe = effect_sync(move || {
        tracked();
        notify_for_probe.notify_one();
    });

    let notify_for_task = notify;
    let task = tokio::task::spawn_local(async move {
        loop {
            notify_for_task.notified().await;
            body().await;
            // `Notify::notify_one` stores at most a single permit, so any
            // probe re-runs that happened while `body()` was still awaiting
            // collapse into the one permit consumed by the next iteration
            // rather than queuing a re-run per change.
        }
    });

    Box::new(move || {
        stop_probe();
        task.abort();
    })
}

/// `async_derived` composes the same tracked/body split, writing the
/// computed value into `target` instead of running a bare side effect.
pub fn async_derived<Val, T, F>(target: Arc<tokio::sync::Mutex<Val>>, tracked: T, compute: F) -> DisposeFn
where
    Val: Send + 'static,
    T: Fn() + 'static,
    F: Fn() -> Pin<Box<dyn Future<Output = Val>>> + 'static,
{
    async_effect(tracked, move || {
        let target = target.clone();
        let value = compute();
        Box::pin(async move {
            let computed = value.await;
            *target.lock().await = computed;
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::signal::signal;
    use std::cell::Cell;

    #[tokio::test(flavor = "current_thread")]
    async fn async_effect_reruns_on_dependency_change() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let count = signal(0);
                let runs = Rc::new(Cell::new(0));

                let count_for_probe = count.clone();
                let runs_for_body = runs.clone();
                let _dispose = async_effect(
                    move || {
                        count_for_probe.get();
                    },
                    move || {
                        let runs = runs_for_body.clone();
                        Box::pin(async move {
                            runs.set(runs.get() + 1);
                        })
                    },
                );

                tokio::task::yield_now().await;
                assert!(runs.get() >= 1);

                count.set(1);
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                assert!(runs.get() >= 2);
            })
            .await;
    }
}
