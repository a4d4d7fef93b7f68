// ============================================================================
// hmr-runner - CLI entry point
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hmr_runner::app_loader::DylibAppLoader;
use hmr_runner::cli::Args;
use hmr_runner::env_file::EnvFile;
use hmr_runner::error::HmrError;
use hmr_runner::reload::HmrHooks;
use hmr_runner::registry::ModuleRegistry;
use hmr_runner::supervisor::{self, ServerSupervisor};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(args).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(HmrError::UserCode(source)) => {
            tracing::error!(error = %hmr_runner::error::render_user_error(&source), "application factory failed");
            ExitCode::from(1)
        }
        Err(err) => {
            tracing::error!(error = %err, "hmr-runner exited with an error");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(args: Args) -> Result<i32, HmrError> {
    let cwd = std::env::current_dir()?;
    let slug = args.parse_slug()?;
    let config = args.to_hmr_config(&cwd);

    let mut env_file = EnvFile::new(args.env_file.clone());
    env_file.reload()?;

    let dylib_path = slug.path.clone().ok_or_else(|| {
        HmrError::Config(format!("slug '{}' must be a path:attr form naming a compiled library to load", args.slug))
    })?;
    let loader = std::sync::Arc::new(DylibAppLoader::open(&dylib_path, &slug.attr)?);

    // The `.env` path is deliberately not tracked here: it is already wired
    // into `HmrConfig::extra_watch_files`/`force_restart_files` (see
    // `Args::to_hmr_config`), which classifies it as an extra-watch/
    // force-restart hit. Tracking it through the same registry as the
    // dylib would make it a code hit too, via `Reloader::classify`.
    let registry = ModuleRegistry::new();
    registry.track(&dylib_path);

    let load_app = {
        let loader = loader.clone();
        Box::new(move || loader.load_app().map_err(anyhow_err))
    };
    let make_server = {
        let loader = loader.clone();
        Box::new(move |app: &hmr_runner::app_loader::AppHandle| loader.make_server(app).map_err(anyhow_err))
    };

    let mut supervisor = ServerSupervisor::new(load_app, make_server, HmrHooks::default(), config, cwd.clone());

    if std::env::var("HMR_RUNNER_DISABLE").as_deref() == Ok("1") {
        tracing::info!("HMR_RUNNER_DISABLE=1 set, running one generation with no watcher");
        let app = supervisor.reload_app()?;
        supervisor.run_generation_to_completion(&app).await?;
        return Ok(0);
    }

    let watch_roots: Vec<PathBuf> = if args.reload_include.is_empty() { vec![cwd] } else { args.reload_include.clone() };

    supervisor::run(supervisor, watch_roots, registry).await
}

fn anyhow_err(err: HmrError) -> anyhow::Error {
    anyhow::anyhow!(err)
}
