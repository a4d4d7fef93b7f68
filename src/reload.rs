// ============================================================================
// hmr-runner - Reload coordinator (C4)
//
// Classifies a debounced filesystem batch into code / tracked-file /
// extra-watch / asset hits, decides refresh-vs-restart, and merges reload
// info across coalesced events until a reload cycle consumes it.
// ============================================================================

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::glob::{is_glob, Glob, Literal};
use crate::registry::ModuleRegistry;
use crate::watch::PathEventBatch;

pub const REASON_CODE: &str = "code";
pub const REASON_TRACKED_FILE: &str = "tracked-file";
pub const REASON_EXTRA_WATCH_FILE: &str = "extra-watch-file";
pub const REASON_ASSET_REFRESH: &str = "asset-refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReloadReason {
    Code,
    TrackedFile,
    ExtraWatchFile,
    AssetRefresh,
}

impl ReloadReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadReason::Code => REASON_CODE,
            ReloadReason::TrackedFile => REASON_TRACKED_FILE,
            ReloadReason::ExtraWatchFile => REASON_EXTRA_WATCH_FILE,
            ReloadReason::AssetRefresh => REASON_ASSET_REFRESH,
        }
    }
}

/// `{files, reasons}` describing one reload cycle, merged across multiple
/// rapid events until a cycle consumes it via [`Reloader::drain_reload_info`].
#[derive(Debug, Clone, Default)]
pub struct ReloadInfo {
    pub files: HashSet<PathBuf>,
    pub reasons: HashSet<ReloadReason>,
}

impl ReloadInfo {
    fn merge(&mut self, other: ReloadInfo) {
        self.files.extend(other.files);
        self.reasons.extend(other.reasons);
    }
}

/// A compiled include/exclude matcher, covering both the reload-include
/// roots and the asset-refresh glob/literal spec.
#[derive(Debug, Clone, Default)]
pub struct PathSpec {
    globs: Vec<Glob>,
    literals: Vec<Literal>,
}

impl PathSpec {
    pub fn compile(entries: &[String], cwd: &Path) -> Self {
        let mut globs = Vec::new();
        let mut literals = Vec::new();
        for entry in entries {
            if is_glob(entry) {
                globs.push(Glob::compile(entry));
            } else {
                let path = if Path::new(entry).is_absolute() { PathBuf::from(entry) } else { cwd.join(entry) };
                let is_dir_root = entry.ends_with('/') || entry.ends_with('\\') || Path::new(entry).extension().is_none();
                literals.push(if is_dir_root { Literal::DirRoot(path) } else { Literal::File(path) });
            }
        }
        Self { globs, literals }
    }

    pub fn matches(&self, path: &Path, cwd: &Path) -> bool {
        self.globs.iter().any(|g| g.matches(path, cwd)) || self.literals.iter().any(|l| l.matches(path))
    }
}

/// The compiled asset-refresh spec: include minus exclude, never matching a
/// source-code–suffixed path.
#[derive(Debug, Clone)]
pub struct AssetSpec {
    include: PathSpec,
    exclude: PathSpec,
    code_suffixes: Vec<String>,
}

impl AssetSpec {
    pub fn compile(include: &[String], exclude: &[String], code_suffixes: Vec<String>, cwd: &Path) -> Self {
        Self {
            include: PathSpec::compile(include, cwd),
            exclude: PathSpec::compile(exclude, cwd),
            code_suffixes,
        }
    }

    pub fn matches(&self, path: &Path, cwd: &Path) -> bool {
        if self.is_code_path(path) {
            return false;
        }
        self.include.matches(path, cwd) && !self.exclude.matches(path, cwd)
    }

    /// True if `path` carries one of the configured code suffixes (the
    /// compiled-library/source suffixes the registry tracks for re-execution
    /// rather than plain data/template reads).
    pub fn is_code_path(&self, path: &Path) -> bool {
        self.code_suffixes.iter().any(|s| path.to_string_lossy().ends_with(s.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub code_hits: HashSet<PathBuf>,
    pub tracked_hits: HashSet<PathBuf>,
    pub extra_hits: HashSet<PathBuf>,
    pub asset_hits: HashSet<PathBuf>,
    pub force_restart_hits: HashSet<PathBuf>,
}

impl Classification {
    /// Only asset hits, and nothing in the force-restart set: the §4.4
    /// refresh-only bypass. A path can be both an asset match and an
    /// extra-watch/tracked-file hit at once (e.g. a static file that also
    /// sits under an extra-watch root); the decision subtracts that overlap
    /// before checking for anything left that would force a restart,
    /// mirroring `restart_tracked_hits = tracked_hits - asset_hits` /
    /// `restart_extra_hits = (extra_hits - asset_hits) | force_restart_hits`.
    pub fn is_asset_only(&self) -> bool {
        if self.asset_hits.is_empty() || !self.code_hits.is_empty() {
            return false;
        }
        let restart_tracked_hits = self.tracked_hits.difference(&self.asset_hits).next().is_some();
        let restart_extra_hits = self
            .extra_hits
            .difference(&self.asset_hits)
            .chain(self.force_restart_hits.iter())
            .next()
            .is_some();
        !restart_tracked_hits && !restart_extra_hits
    }

    pub fn is_empty(&self) -> bool {
        self.code_hits.is_empty()
            && self.tracked_hits.is_empty()
            && self.extra_hits.is_empty()
            && self.asset_hits.is_empty()
    }
}

/// Runtime configuration for one reload coordinator instance.
pub struct HmrConfig {
    pub reload_include: Vec<PathBuf>,
    pub reload_exclude: Vec<PathBuf>,
    pub asset_include: Vec<String>,
    pub asset_exclude: Vec<String>,
    pub extra_watch_files: Vec<PathBuf>,
    pub force_restart_files: Vec<PathBuf>,
    pub refresh: bool,
    pub clear: bool,
    pub log_reload_events: bool,
    pub watch_debounce_ms: u64,
    pub watch_step_ms: u64,
    pub restart_cooldown_ms: u64,
    pub code_suffixes: Vec<String>,
    /// Host/port for the standalone browser-refresh endpoint, bound
    /// separately from the user's own server since the supervisor only
    /// holds an opaque [`crate::supervisor::AppServer`] it cannot inject
    /// middleware into.
    pub refresh_host: String,
    pub refresh_port: u16,
}

impl Default for HmrConfig {
    fn default() -> Self {
        Self {
            reload_include: Vec::new(),
            reload_exclude: Vec::new(),
            asset_include: Vec::new(),
            asset_exclude: Vec::new(),
            extra_watch_files: Vec::new(),
            force_restart_files: Vec::new(),
            refresh: false,
            clear: false,
            log_reload_events: true,
            watch_debounce_ms: 300,
            watch_step_ms: 50,
            restart_cooldown_ms: 0,
            code_suffixes: vec![".py".to_string()],
            refresh_host: "127.0.0.1".to_string(),
            refresh_port: 8001,
        }
    }
}

type Hook = Box<dyn Fn() -> anyhow::Result<()>>;

/// Optional lifecycle callbacks. Each is wrapped individually so one hook's
/// failure never blocks the others from running.
#[derive(Default)]
pub struct HmrHooks {
    pub on_change_detected: Option<Hook>,
    pub before_shutdown: Option<Hook>,
    pub after_shutdown: Option<Hook>,
    pub before_reload: Option<Hook>,
    pub after_reload: Option<Hook>,
    pub on_server_created: Option<Hook>,
    pub on_server_stopped: Option<Hook>,
}

impl HmrHooks {
    fn call(name: &'static str, hook: &Option<Hook>) {
        if let Some(hook) = hook {
            if let Err(err) = hook() {
                tracing::error!(hook = name, error = %err, "hook failed");
            }
        }
    }

    pub fn call_on_change_detected(&self) {
        Self::call("on_change_detected", &self.on_change_detected);
    }
    pub fn call_before_shutdown(&self) {
        Self::call("before_shutdown", &self.before_shutdown);
    }
    pub fn call_after_shutdown(&self) {
        Self::call("after_shutdown", &self.after_shutdown);
    }
    pub fn call_before_reload(&self) {
        Self::call("before_reload", &self.before_reload);
    }
    pub fn call_after_reload(&self) {
        Self::call("after_reload", &self.after_reload);
    }
    pub fn call_on_server_created(&self) {
        Self::call("on_server_created", &self.on_server_created);
    }
    pub fn call_on_server_stopped(&self) {
        Self::call("on_server_stopped", &self.on_server_stopped);
    }
}

/// Drives the classify/merge half of the reload cycle. The effect that
/// actually re-runs `load_app()` lives in the supervisor, which calls
/// [`Reloader::drain_reload_info`] once it is ready to start a cycle.
pub struct Reloader {
    config: HmrConfig,
    asset_spec: AssetSpec,
    cwd: PathBuf,
    pending: Option<ReloadInfo>,
}

impl Reloader {
    pub fn new(config: HmrConfig, cwd: PathBuf) -> Self {
        let asset_spec = AssetSpec::compile(&config.asset_include, &config.asset_exclude, config.code_suffixes.clone(), &cwd);
        Self { config, asset_spec, cwd, pending: None }
    }

    /// `code_hits` are registry paths carrying a code suffix (the dylib or
    /// other compiled/source units the registry re-executes on reload);
    /// `tracked_hits` are everything else the registry has an active
    /// subscriber for — non-code files read through the reactive signal
    /// graph (the fs-signal index in spec terms), which only need their
    /// dependents invalidated, not a full module re-execution.
    pub fn classify(&self, batch: &PathEventBatch, registry: &ModuleRegistry) -> Classification {
        let tracked: HashSet<PathBuf> = registry.tracked_paths().into_iter().collect();
        let mut classification = Classification::default();

        for path in &batch.paths {
            if tracked.contains(path) {
                if self.asset_spec.is_code_path(path) {
                    classification.code_hits.insert(path.clone());
                } else {
                    classification.tracked_hits.insert(path.clone());
                }
            }
            if self.config.extra_watch_files.contains(path) {
                classification.extra_hits.insert(path.clone());
                if self.config.force_restart_files.contains(path) {
                    classification.force_restart_hits.insert(path.clone());
                }
            }
            if self.asset_spec.matches(path, &self.cwd) {
                classification.asset_hits.insert(path.clone());
            }
        }
        classification
    }

    /// Feed one batch's classification in. Returns `Some(reasons)` if this
    /// batch alone should trigger an immediate refresh callback (the
    /// asset-only bypass); otherwise folds the hits into `pending` and
    /// returns `None`.
    pub fn on_batch(&mut self, classification: Classification) -> Option<()> {
        if classification.is_empty() {
            return None;
        }
        if classification.is_asset_only() {
            if self.config.log_reload_events {
                tracing::info!(count = classification.asset_hits.len(), "asset change, refreshing browsers");
            }
            return Some(());
        }

        let mut info = ReloadInfo::default();
        info.files.extend(classification.code_hits.iter().cloned());
        if !classification.code_hits.is_empty() {
            info.reasons.insert(ReloadReason::Code);
        }
        info.files.extend(classification.tracked_hits.iter().cloned());
        if !classification.tracked_hits.is_empty() {
            info.reasons.insert(ReloadReason::TrackedFile);
        }
        info.files.extend(classification.extra_hits.iter().cloned());
        if !classification.extra_hits.is_empty() {
            info.reasons.insert(ReloadReason::ExtraWatchFile);
        }
        // Per the design note in the upstream behavior this mirrors: a
        // mixed batch restarts rather than also emitting a refresh signal,
        // since the new generation serves fresh HTML anyway.

        match &mut self.pending {
            Some(existing) => existing.merge(info),
            None => self.pending = Some(info),
        }
        None
    }

    /// Consume and clear the merged reload info for the cycle about to run.
    pub fn drain_reload_info(&mut self) -> Option<ReloadInfo> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn config(&self) -> &HmrConfig {
        &self.config
    }
}
