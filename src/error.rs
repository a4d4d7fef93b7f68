// ============================================================================
// hmr-runner - Error Handling
// Typed errors for the reload pipeline, matching the five error kinds
// described for the system: user-code, server, hook, watcher, config.
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the reload pipeline.
///
/// Hook errors are logged and swallowed where they occur (they must not
/// abort a reload cycle) so this variant exists mainly for tests and for
/// callers that want to observe a hook failure without silencing it.
#[derive(Debug, Error)]
pub enum HmrError {
    /// `load_app()` raised while producing a fresh application object.
    #[error("application factory failed: {0}")]
    UserCode(#[source] anyhow::Error),

    /// The server object's `serve()` returned an error.
    #[error("server error: {0}")]
    Server(#[source] anyhow::Error),

    /// A hook callback (`on_change_detected`, `before_reload`, ...) raised.
    #[error("hook '{hook}' failed: {source}")]
    Hook {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The filesystem watcher terminated unexpectedly.
    #[error("watcher error: {0}")]
    Watcher(String),

    /// Bad CLI input: invalid slug, missing module, invalid numeric option.
    #[error("config error: {0}")]
    Config(String),

    #[error("path does not exist: {0}")]
    MissingPath(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Logs a user-code error (from `load_app()`) as a chain of causes, without
/// ever printing a frame from this crate's own source. A raw
/// `std::backtrace::Backtrace` captured inside this crate would include this
/// crate's own call frames before reaching the user's; since stable Rust has
/// no API to filter captured frames by origin, the chain of error messages
/// (each `anyhow::Error::source()`/context layer) is what gets surfaced
/// instead — it never contains frames at all, internal or otherwise.
pub fn render_user_error(err: &anyhow::Error) -> String {
    let mut out = err.to_string();
    for cause in err.chain().skip(1) {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
    }
    out
}

impl HmrError {
    /// Process exit code for this error, per the CLI contract: `1` for any
    /// failure that prevents startup or is irrecoverable at the top level.
    /// Exit code `130` (interrupt) is not an error path — it's the ordinary
    /// return value of a clean ctrl-c shutdown, handled in `supervisor::run`.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, HmrError>;
