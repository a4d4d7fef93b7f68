// ============================================================================
// hmr-runner - Dynamic application loader
//
// The concrete network server is explicitly a pluggable boundary (a
// "factory" in the component contract), not part of the core reloader.
// This loader is the systems-language stand-in for "re-execute user
// imports": it opens a compiled shared library fresh on every reload and
// resolves a small, fixed C ABI from it rather than interpreting source.
// ============================================================================

use std::ffi::{c_int, c_void, CString};
use std::path::Path;
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::error::HmrError;
use crate::supervisor::{AppServer, BoxFuture};

/// An opaque handle to the application object produced by the library's
/// load symbol. Ownership and teardown are the library's responsibility;
/// this crate only ever hands the pointer back to the same library.
pub struct AppHandle(*mut c_void);

// SAFETY: the pointer is opaque to this crate and only ever dereferenced by
// the owning library, which is required to be thread-safe for its exported
// entry points (documented contract, not enforced by the type system).
unsafe impl Send for AppHandle {}

type LoadAppFn = unsafe extern "C" fn() -> *mut c_void;
type MakeServerFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;
type ServeFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type RequestExitFn = unsafe extern "C" fn(*mut c_void);
type FreeServerFn = unsafe extern "C" fn(*mut c_void);

/// Holds the library open for the lifetime of one reload cycle's app
/// object, resolving `<attr>_load_app` / `<attr>_make_server` from it.
pub struct DylibAppLoader {
    library: Arc<Library>,
    attr: String,
}

impl DylibAppLoader {
    /// Opens `path` and checks the load symbol resolves, failing fast with
    /// a config error rather than deferring to the first reload attempt.
    pub fn open(path: &Path, attr: &str) -> Result<Self, HmrError> {
        if !path.exists() {
            return Err(HmrError::MissingPath(path.to_path_buf()));
        }
        // SAFETY: loading arbitrary user-supplied shared libraries is
        // inherently unsafe; the caller is trusted to point at a library
        // built against this crate's documented ABI.
        let library = unsafe { Library::new(path) }.map_err(|e| HmrError::Config(format!("failed to load {}: {e}", path.display())))?;
        let loader = Self { library: Arc::new(library), attr: attr.to_string() };
        loader.symbol::<LoadAppFn>("load_app")?;
        Ok(loader)
    }

    pub fn load_app(&self) -> Result<AppHandle, HmrError> {
        let load = self.symbol::<LoadAppFn>("load_app")?;
        // SAFETY: symbol signature is checked against the documented ABI by
        // `symbol`'s type parameter; the call itself crosses into
        // unverified user code.
        let ptr = unsafe { load() };
        if ptr.is_null() {
            return Err(HmrError::UserCode(anyhow::anyhow!("{}: load_app returned null", self.attr)));
        }
        Ok(AppHandle(ptr))
    }

    pub fn make_server(&self, app: &AppHandle) -> Result<DylibServer, HmrError> {
        let make = self.symbol::<MakeServerFn>("make_server")?;
        // SAFETY: see `load_app`.
        let ptr = unsafe { make(app.0) };
        if ptr.is_null() {
            return Err(HmrError::Server(anyhow::anyhow!("{}: make_server returned null", self.attr)));
        }
        Ok(DylibServer {
            _library: self.library.clone(),
            ptr,
            serve: self.symbol::<ServeFn>("serve")?,
            request_exit: self.symbol::<RequestExitFn>("request_exit")?,
            free_server: self.symbol::<FreeServerFn>("free_server")?,
        })
    }

    /// Copies the raw function pointer out of the library, rather than
    /// keeping the borrowed `Symbol` around — callers hold an `Arc<Library>`
    /// clone instead so the library can't unload while the pointer is live.
    fn symbol<T: Copy>(&self, name: &str) -> Result<T, HmrError> {
        let symbol_name = CString::new(format!("{}_{name}", self.attr)).expect("symbol names never contain NUL");
        // SAFETY: symbol type is declared by the caller to match this
        // crate's documented ABI; a mismatch is a contract violation in the
        // loaded library, not something the type system can check here.
        let symbol: Symbol<T> = unsafe { self.library.get(symbol_name.as_bytes_with_nul()) }
            .map_err(|e| HmrError::Config(format!("missing symbol {symbol_name:?}: {e}")))?;
        Ok(*symbol)
    }
}

/// A server generation backed by the dynamically loaded library. `serve()`
/// runs the blocking FFI call on a blocking-pool thread and polls for exit
/// through the library's own `request_exit`-observing loop.
///
/// `Clone` duplicates the raw pointer and function pointers (all `Copy`) and
/// bumps the `Arc<Library>` refcount; it does not duplicate the underlying
/// library-side object. The supervisor clones a generation's `DylibServer`
/// before moving the original into `serve()`, keeping the clone only to call
/// `request_exit()` — the library's documented ABI requires `request_exit`
/// be safe to call concurrently with `serve()` for exactly this reason.
#[derive(Clone)]
pub struct DylibServer {
    _library: Arc<Library>,
    ptr: *mut c_void,
    serve: ServeFn,
    request_exit: RequestExitFn,
    free_server: FreeServerFn,
}

// SAFETY: the raw pointer and function pointers cross into `serve()`'s
// blocking-pool thread and may be read concurrently by a cloned handle's
// `request_exit()`; the loaded library's ABI contract requires that be safe.
unsafe impl Send for DylibServer {}

impl AppServer for DylibServer {
    fn serve(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let this = *self;
            let ptr = this.ptr as usize;
            let serve = this.serve;
            let free_server = this.free_server;
            let code = tokio::task::spawn_blocking(move || {
                // SAFETY: ptr was produced by this library's make_server and
                // is not touched elsewhere while serve() runs.
                let result = unsafe { serve(ptr as *mut c_void) };
                unsafe { free_server(ptr as *mut c_void) };
                result
            })
            .await?;
            if code == 0 {
                Ok(())
            } else {
                Err(anyhow::anyhow!("serve() exited with code {code}"))
            }
        })
    }

    fn request_exit(&self) {
        // SAFETY: see struct-level note.
        unsafe { (self.request_exit)(self.ptr) };
    }
}
