// ============================================================================
// hmr-runner - CLI argument surface
// ============================================================================

use std::path::PathBuf;

use clap::Parser;

use crate::error::HmrError;
use crate::reload::HmrConfig;
use crate::slug::Slug;

/// Hot module replacement runner for long-running application servers.
#[derive(Debug, Parser)]
#[command(name = "hmr-runner", version, about)]
pub struct Args {
    /// `module:attr` or `path:attr` naming the application object.
    pub slug: String,

    /// Extra root to watch and make reactive (repeatable).
    #[arg(long = "reload-include", value_name = "PATH")]
    pub reload_include: Vec<PathBuf>,

    /// Root to exclude from reactive watching (repeatable).
    #[arg(long = "reload-exclude", value_name = "PATH")]
    pub reload_exclude: Vec<PathBuf>,

    /// Glob or literal path that triggers a browser refresh (repeatable).
    #[arg(long = "asset-include", value_name = "PATTERN")]
    pub asset_include: Vec<String>,

    /// Glob or literal path excluded from the asset-refresh set (repeatable).
    #[arg(long = "asset-exclude", value_name = "PATTERN")]
    pub asset_exclude: Vec<String>,

    /// Milliseconds to wait after the first event before cutting a batch.
    #[arg(long = "watch-debounce-ms", value_name = "N")]
    pub watch_debounce_ms: Option<u64>,

    /// Milliseconds to keep draining a burst before cutting a batch.
    #[arg(long = "watch-step-ms", value_name = "N")]
    pub watch_step_ms: Option<u64>,

    /// Minimum milliseconds between the start of consecutive generations.
    #[arg(long = "restart-cooldown-ms", value_name = "N", default_value_t = 0)]
    pub restart_cooldown_ms: u64,

    /// Host to bind the server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the server to.
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// `.env` file to load, diff, and restore across reloads.
    #[arg(long = "env-file", value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// Enable the browser-refresh endpoint and HTML injection.
    #[arg(long)]
    pub refresh: bool,

    /// Port for the standalone browser-refresh endpoint (defaults to `port + 1`).
    #[arg(long = "refresh-port", value_name = "PORT")]
    pub refresh_port: Option<u16>,

    /// Clear the terminal before each reload.
    #[arg(long)]
    pub clear: bool,

    /// Log level for the tracing subscriber.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn parse_slug(&self) -> Result<Slug, HmrError> {
        Slug::parse(&self.slug)
    }

    pub fn to_hmr_config(&self, cwd: &std::path::Path) -> HmrConfig {
        let env_paths = self.env_file.iter().cloned().collect::<Vec<_>>();
        HmrConfig {
            reload_include: if self.reload_include.is_empty() { vec![cwd.to_path_buf()] } else { self.reload_include.clone() },
            reload_exclude: self.reload_exclude.clone(),
            asset_include: self.asset_include.clone(),
            asset_exclude: self.asset_exclude.clone(),
            extra_watch_files: env_paths.clone(),
            force_restart_files: env_paths,
            refresh: self.refresh,
            clear: self.clear,
            log_reload_events: true,
            watch_debounce_ms: self.watch_debounce_ms.unwrap_or(300),
            watch_step_ms: self.watch_step_ms.unwrap_or(50),
            restart_cooldown_ms: self.restart_cooldown_ms,
            code_suffixes: vec![".so".to_string(), ".dylib".to_string(), ".dll".to_string()],
            refresh_host: self.host.clone(),
            refresh_port: self.refresh_port.unwrap_or(self.port + 1),
        }
    }
}
