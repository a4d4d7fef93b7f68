// ============================================================================
// hmr-runner - Primitives Module
// Core reactive primitives: signal, derived, effect, scope. `repeater`
// stays alongside them because `reactivity::tracking`'s dirty-propagation
// algorithm special-cases its flag bit inline; nothing in this crate
// constructs a repeater, but the branch is part of the kept-verbatim C1
// algorithm rather than the ergonomic surface trimmed elsewhere.
// ============================================================================

pub mod derived;
pub mod effect;
pub mod repeater;
pub mod scope;
pub mod signal;

// Re-export for convenience
pub use derived::{derived, derived_with_equals, Derived, DerivedInner};
pub use effect::{
    destroy_effect, update_effect, CleanupFn, DisposeFn, Effect, EffectFn, EffectInner,
};
pub use scope::{
    effect_scope, get_current_scope, on_scope_dispose, register_effect_with_scope, EffectScope,
    ScopeCleanupFn,
};
pub use signal::{signal, signal_with_equals, source, Signal, SourceOptions};
