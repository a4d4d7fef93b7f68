// ============================================================================
// hmr-runner - Reactive module registry
//
// Attribute-level reactivity requires intercepting a dynamic interpreter's
// attribute access, which this crate does not control. Dependency tracking
// here is therefore per-module (really: per watched source path) rather
// than per-attribute: touching any attribute of a module counts as reading
// the whole module, and invalidating a module dirties every reader of it.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::primitives::signal::{signal, Signal};

/// One watched source file, represented as a version counter. Reading it
/// (via [`ModuleRegistry::track`]) registers a dependency on the file the
/// same way reading a teacher `Signal` would; bumping it (via
/// [`ModuleRegistry::invalidate`]) dirties every reader.
#[derive(Clone)]
struct ReactiveModule {
    version: Signal<u64>,
    /// Re-entrancy guard: set while this module's reload is in flight, so a
    /// circular import touching itself again doesn't recurse forever.
    loading: Rc<RefCell<bool>>,
}

impl ReactiveModule {
    fn new() -> Self {
        Self { version: signal(0), loading: Rc::new(RefCell::new(false)) }
    }
}

/// Path-keyed index of [`ReactiveModule`]s, the module-granularity stand-in
/// for the original's per-attribute signal namespace.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Rc<RefCell<HashMap<PathBuf, ReactiveModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read dependency on `path`, creating its tracking entry if
    /// this is the first time the path has been seen. Call from within a
    /// `derived`/`effect` body to make that reaction re-run when `path`
    /// changes.
    pub fn track(&self, path: &Path) {
        let module = self.entry(path);
        module.version.get();
    }

    /// Mark `path` changed, dirtying every reaction that has tracked it.
    pub fn invalidate(&self, path: &Path) {
        let module = self.entry(path);
        module.version.update(|v| *v += 1);
    }

    /// True while `path`'s reload is in progress — used to detect a module
    /// re-entering its own load during a circular import chain.
    pub fn is_loading(&self, path: &Path) -> bool {
        self.modules.borrow().get(path).map(|m| *m.loading.borrow()).unwrap_or(false)
    }

    /// Run `f` with `path` marked as loading, clearing the flag afterward
    /// even if `f` panics.
    pub fn with_loading_guard<R>(&self, path: &Path, f: impl FnOnce() -> R) -> R {
        let module = self.entry(path);
        *module.loading.borrow_mut() = true;
        let _guard = LoadingGuard(module.loading.clone());
        f()
    }

    /// All paths currently tracked, for diagnostics and for deciding which
    /// files are "tracked" vs merely "seen but unread" per the classification
    /// rules in the reload coordinator.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.modules.borrow().keys().cloned().collect()
    }

    fn entry(&self, path: &Path) -> ReactiveModule {
        let mut modules = self.modules.borrow_mut();
        modules.entry(path.to_path_buf()).or_insert_with(ReactiveModule::new).clone()
    }
}

struct LoadingGuard(Rc<RefCell<bool>>);

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        *self.0.borrow_mut() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::effect::effect_sync;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn tracking_an_untouched_path_creates_an_entry() {
        let registry = ModuleRegistry::new();
        assert!(registry.tracked_paths().is_empty());
        registry.track(Path::new("/proj/app.py"));
        assert_eq!(registry.tracked_paths().len(), 1);
    }

    #[test]
    fn invalidate_reruns_tracking_effects() {
        let registry = ModuleRegistry::new();
        let path = PathBuf::from("/proj/app.py");
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let registry_clone = registry.clone();
        let path_clone = path.clone();
        let _stop = effect_sync(move || {
            registry_clone.track(&path_clone);
            runs_clone.set(runs_clone.get() + 1);
        });

        assert_eq!(runs.get(), 1);
        registry.invalidate(&path);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn loading_guard_clears_after_use() {
        let registry = ModuleRegistry::new();
        let path = PathBuf::from("/proj/app.py");
        assert!(!registry.is_loading(&path));
        registry.with_loading_guard(&path, || {
            assert!(registry.is_loading(&path));
        });
        assert!(!registry.is_loading(&path));
    }

    #[test]
    fn loading_guard_clears_even_on_panic() {
        let registry = ModuleRegistry::new();
        let path = PathBuf::from("/proj/app.py");
        let registry_clone = registry.clone();
        let path_clone = path.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry_clone.with_loading_guard(&path_clone, || panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(!registry.is_loading(&path));
    }
}
