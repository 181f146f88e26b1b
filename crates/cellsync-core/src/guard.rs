//! Reentrancy guard for loop-free synchronization.
//!
//! Every write the engine performs on one side raises a change event on that
//! side, which would normally be mirrored back. The guard marks the window in
//! which such echoes must be dropped.
//!
//! The guard is an explicit token owned by one engine (one per cell/shared
//! document pair) and threaded through handler calls via [`with_guard`]. It
//! does not block anything itself: guarded handlers on the *receiving* side
//! check [`ReentrancyGuard::is_held`] and return early.

/// In-sync flag plus suppression bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReentrancyGuard {
    depth: u32,
    entered: u64,
    suppressed: u64,
}

impl ReentrancyGuard {
    /// A released guard.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            depth: 0,
            entered: 0,
            suppressed: 0,
        }
    }

    /// `true` while some guarded action is running.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        self.depth > 0
    }

    /// Nesting depth of guarded actions currently running.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Number of outermost guarded sections entered so far.
    #[must_use]
    pub const fn entered(&self) -> u64 {
        self.entered
    }

    /// Number of events dropped because the guard was held.
    #[must_use]
    pub const fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Record that a receiving handler dropped an event.
    pub fn note_suppressed(&mut self) {
        self.suppressed = self.suppressed.saturating_add(1);
    }

    fn acquire(&mut self) {
        if self.depth == 0 {
            self.entered = self.entered.saturating_add(1);
        }
        self.depth = self.depth.saturating_add(1);
    }

    fn release(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Anything that owns a [`ReentrancyGuard`].
pub trait Guarded {
    fn guard_mut(&mut self) -> &mut ReentrancyGuard;
}

impl Guarded for ReentrancyGuard {
    fn guard_mut(&mut self) -> &mut ReentrancyGuard {
        self
    }
}

/// One level of a held guard. Dropping it releases that level, so an unwind
/// out of the action leaves the guard as it found it.
struct GuardScope<'a, S: Guarded + ?Sized> {
    state: &'a mut S,
}

impl<'a, S: Guarded + ?Sized> GuardScope<'a, S> {
    fn enter(state: &'a mut S) -> Self {
        state.guard_mut().acquire();
        Self { state }
    }
}

impl<S: Guarded + ?Sized> Drop for GuardScope<'_, S> {
    fn drop(&mut self) {
        self.state.guard_mut().release();
    }
}

/// Run `action` with the guard of `state` held.
///
/// Nested calls still run their action; the flag is released only when the
/// outermost call exits, whether it returns (including an `Err`) or unwinds.
pub fn with_guard<S, R>(state: &mut S, action: impl FnOnce(&mut S) -> R) -> R
where
    S: Guarded + ?Sized,
{
    let mut scope = GuardScope::enter(state);
    action(&mut *scope.state)
}
