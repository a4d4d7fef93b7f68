// ============================================================================
// hmr-runner - Server lifecycle supervisor (C5)
//
// Runs the user's server in a supervised task, coordinating shutdown of the
// outgoing generation with startup of the next. A generation's `serve()`
// future runs concurrently with the filesystem watcher: `run()` races it
// against incoming batches via `tokio::select!` so a code/tracked/extra hit
// can call `request_exit()` on the live generation and await its shutdown
// before the next one starts, rather than only ever noticing a change once
// `serve()` has already returned on its own.
// ============================================================================

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::error::HmrError;
use crate::reload::{HmrConfig, HmrHooks, Reloader};
use crate::refresh::{self, ReloadHub};
use crate::registry::ModuleRegistry;
use crate::watch::{PathEventBatch, PathWatcher, WatchConfig};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A running server generation's `should_exit` flag and shutdown contract.
pub trait AppServer: Send {
    /// Runs until shutdown is requested (via [`request_exit`](Self::request_exit)
    /// or the server's own termination condition), then returns.
    fn serve(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;

    /// Sets the writable `should_exit` flag.
    fn request_exit(&self);
}

/// A server generation whose `serve()` future is already running in its own
/// task. `handle` is a clone of the server object made before that move, so
/// `request_exit()` can still be called on it — a live reference alongside
/// the owned `Box<Self>` the spawned task consumed.
struct RunningGeneration<S> {
    id: u64,
    handle: S,
    task: JoinHandle<anyhow::Result<()>>,
}

type LoadApp<A> = Box<dyn Fn() -> anyhow::Result<A> + Send>;
type MakeServer<A, S> = Box<dyn Fn(&A) -> anyhow::Result<S> + Send>;

/// Drives the reload-then-restart loop: waits for the reloader to settle,
/// honors the restart cooldown, builds a fresh server from the current
/// application object, and serializes generations one at a time.
pub struct ServerSupervisor<A, S: AppServer + Clone + 'static> {
    load_app: LoadApp<A>,
    make_server: MakeServer<A, S>,
    hooks: HmrHooks,
    reloader: Reloader,
    generation_counter: AtomicU64,
    last_start: Option<Instant>,
    refresh_hub: Option<ReloadHub>,
}

impl<A, S: AppServer + Clone + 'static> ServerSupervisor<A, S> {
    pub fn new(load_app: LoadApp<A>, make_server: MakeServer<A, S>, hooks: HmrHooks, config: HmrConfig, cwd: PathBuf) -> Self {
        let refresh_hub = if config.refresh { Some(ReloadHub::new()) } else { None };
        Self {
            load_app,
            make_server,
            hooks,
            reloader: Reloader::new(config, cwd),
            generation_counter: AtomicU64::new(0),
            last_start: None,
            refresh_hub,
        }
    }

    /// Honor the restart cooldown, build a fresh server from `app`, and
    /// spawn its `serve()` future onto its own task, returning immediately
    /// with a handle that can request its exit and be awaited for its
    /// outcome. The caller is responsible for eventually passing the
    /// returned generation's `task` result to [`Self::finish_generation`].
    async fn start_generation(&mut self, app: &A) -> Result<RunningGeneration<S>, HmrError> {
        self.honor_cooldown().await;

        let generation_id = self.generation_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let server = (self.make_server)(app).map_err(HmrError::Server)?;
        self.hooks.call_on_server_created();
        let handle = server.clone();

        tracing::info!(generation = generation_id, "starting server generation");
        self.last_start = Some(Instant::now());
        let task = tokio::spawn(Box::new(server).serve());

        Ok(RunningGeneration { id: generation_id, handle, task })
    }

    /// Report a generation's outcome once its `serve()` task has completed
    /// (naturally, or after `request_exit()` was called on its handle).
    fn finish_generation(&self, id: u64, result: Result<anyhow::Result<()>, tokio::task::JoinError>) -> Result<(), HmrError> {
        self.hooks.call_on_server_stopped();
        match result {
            Ok(Ok(())) => {
                tracing::info!(generation = id, "server generation stopped cleanly");
                Ok(())
            }
            Ok(Err(err)) => {
                tracing::error!(generation = id, error = %err, "server generation failed");
                Err(HmrError::Server(err))
            }
            Err(join_err) => {
                tracing::error!(generation = id, error = %join_err, "server generation task panicked");
                Err(HmrError::Server(anyhow::anyhow!(join_err)))
            }
        }
    }

    /// Run one full reload-then-serve cycle to completion, with no watcher
    /// racing it. Used by the disable-watching escape hatch, which only
    /// ever runs a single generation.
    pub async fn run_generation_to_completion(&mut self, app: &A) -> Result<(), HmrError> {
        let generation = self.start_generation(app).await?;
        let result = generation.task.await;
        self.finish_generation(generation.id, result)
    }

    async fn honor_cooldown(&self) {
        let cooldown = Duration::from_millis(self.reloader.config().restart_cooldown_ms);
        if cooldown.is_zero() {
            return;
        }
        if let Some(last_start) = self.last_start {
            let elapsed = last_start.elapsed();
            if elapsed < cooldown {
                tokio::time::sleep(cooldown - elapsed).await;
            }
        }
    }

    /// Produce a fresh application object, running the full reload-effect
    /// sequence from spec §4.4: before_reload, `load_app()`, after_reload.
    pub fn reload_app(&mut self) -> Result<A, HmrError> {
        self.hooks.call_before_reload();
        let result = (self.load_app)();
        self.hooks.call_after_reload();
        result.map_err(HmrError::UserCode)
    }

    pub fn reloader_mut(&mut self) -> &mut Reloader {
        &mut self.reloader
    }

    pub fn hooks(&self) -> &HmrHooks {
        &self.hooks
    }

    pub fn refresh_hub(&self) -> Option<&ReloadHub> {
        self.refresh_hub.as_ref()
    }
}

/// Classify one batch against the current registry, invalidate every
/// registry-tracked hit, and fold the result into the reloader. Returns
/// whether the reloader now has pending reload info (a code/tracked/extra
/// hit outside the asset-only bypass), shared by both the "racing a live
/// generation" and "waiting after one exited" loops in [`run`].
fn process_batch<A, S: AppServer + Clone + 'static>(
    supervisor: &mut ServerSupervisor<A, S>,
    registry: &ModuleRegistry,
    batch: &PathEventBatch,
) -> bool {
    supervisor.hooks().call_on_change_detected();
    let classification = supervisor.reloader_mut().classify(batch, registry);
    for path in classification.code_hits.iter().chain(classification.tracked_hits.iter()) {
        registry.invalidate(path);
    }
    if supervisor.reloader_mut().on_batch(classification).is_some() {
        if let Some(hub) = supervisor.refresh_hub() {
            hub.broadcast();
        }
    }
    supervisor.reloader_mut().has_pending()
}

/// Top-level run loop: starts the filesystem watcher, races each server
/// generation's `serve()` future against incoming batches, and drives
/// restarts until a shutdown signal (ctrl-c) ends the process.
///
/// Returns the process exit code per §6: `0` clean shutdown, `130` interrupt.
pub async fn run<A, S: AppServer + Clone + 'static>(
    mut supervisor: ServerSupervisor<A, S>,
    watch_roots: Vec<PathBuf>,
    registry: ModuleRegistry,
) -> Result<i32, HmrError> {
    let watch_config = WatchConfig::with_env_defaults(
        watch_roots,
        Some(supervisor.reloader_mut().config().watch_debounce_ms),
        Some(supervisor.reloader_mut().config().watch_step_ms),
    );
    let (watcher, mut batches) = PathWatcher::start(watch_config)?;

    let refresh_server = if let Some(hub) = supervisor.refresh_hub().cloned() {
        let host = supervisor.reloader_mut().config().refresh_host.clone();
        let port = supervisor.reloader_mut().config().refresh_port;
        let router = refresh::router(hub, refresh::DEFAULT_REFRESH_PATH);
        let listener = tokio::net::TcpListener::bind((host.as_str(), port))
            .await
            .map_err(HmrError::Io)?;
        tracing::info!(%host, port, "browser-refresh endpoint listening");
        Some(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(error = %err, "browser-refresh endpoint stopped");
            }
        }))
    } else {
        None
    };

    let mut app = supervisor.reload_app()?;
    let interrupted = Arc::new(AtomicBool::new(false));

    'outer: loop {
        let mut generation = supervisor.start_generation(&app).await?;

        // Race the live generation against the watcher: a code/tracked/extra
        // hit requests its exit and awaits the finish before the next
        // `reload_app()`, per the effect body ordering in spec §4.4(i).
        let reload_ready = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    interrupted.store(true, Ordering::SeqCst);
                    generation.handle.request_exit();
                    let result = generation.task.await;
                    supervisor.finish_generation(generation.id, result)?;
                    break false;
                }
                result = &mut generation.task => {
                    supervisor.finish_generation(generation.id, result)?;
                    break false;
                }
                maybe_batch = batches.recv() => {
                    let Some(batch) = maybe_batch else {
                        return Err(HmrError::Watcher("watcher terminated".to_string()));
                    };
                    if process_batch(&mut supervisor, &registry, &batch) {
                        generation.handle.request_exit();
                        let result = generation.task.await;
                        supervisor.finish_generation(generation.id, result)?;
                        break true;
                    }
                }
            }
        };

        if interrupted.load(Ordering::SeqCst) {
            break 'outer;
        }

        if reload_ready {
            supervisor.reloader_mut().drain_reload_info();
            app = supervisor.reload_app()?;
            continue 'outer;
        }

        // The generation exited on its own, with no pending reload yet;
        // wait for the next batch that actually produces one before
        // starting a fresh generation.
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    interrupted.store(true, Ordering::SeqCst);
                    break;
                }
                maybe_batch = batches.recv() => {
                    let Some(batch) = maybe_batch else {
                        return Err(HmrError::Watcher("watcher terminated".to_string()));
                    };
                    if process_batch(&mut supervisor, &registry, &batch) {
                        supervisor.reloader_mut().drain_reload_info();
                        app = supervisor.reload_app()?;
                        break;
                    }
                }
            }
        }

        if interrupted.load(Ordering::SeqCst) {
            break 'outer;
        }
    }

    watcher.stop().await;
    if let Some(handle) = refresh_server {
        handle.abort();
    }
    Ok(if interrupted.load(Ordering::SeqCst) { 130 } else { 0 })
}
