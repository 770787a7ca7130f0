#![warn(clippy::pedantic)]
#![warn(missing_docs)]
//! Convenient, full-featured reactive cells for Rust.
//!
//! This crate is the ergonomic, typed public API built on top of the subscription and
//! dependency-capture primitives in [`bloom_runtime`].
//!
//! The core abstraction is a *cell*: a value that knows its own observers and can be read
//! inside a computation whose own dependency set is then tracked implicitly. [`StoredCell`]
//! holds a value written from outside the graph; [`ComputedCell`] derives one from other
//! cells; [`Trigger`] adapts the engine to host code wanting a coarse "something I read
//! changed" callback instead of a typed value; [`AttachmentPoint`] and
//! [`MutableAttachmentPoint`] are indirection cells whose target can be swapped at runtime;
//! [`ArrayCell`] wraps an ordered sequence with range-replace change events;
//! [`ExternalSourceCell`] bridges in a host-defined external change source.
//!
//! # Reentrancy
//!
//! [`Handle::observe`] converts a self-triggering observer (one whose body writes a cell it
//! transitively depends on) into bounded iteration rather than unbounded recursion — see its
//! documentation for the exact rule.
//!
//! # Concurrency
//!
//! Every cell may be read, written, and subscribed to from multiple threads; each cell's
//! internal state is behind one [`parking_lot::Mutex`]. The dependency-capture [`Context`] is
//! strictly thread-local: an evaluation's captured dependency set is only ever attributable
//! to the thread that ran it.

// These are `pub mod` (rather than private `mod` re-exporting select items) purely so that
// the `*Inner` types backing the `Handle<I>` type aliases below are reachable from outside
// the crate; callers are expected to go through the aliases and free functions, not these
// modules directly, which remain a seldom-used escape hatch rather than the primary API.
pub mod array;
pub mod attachment;
pub mod cell;
pub mod computed;
pub mod external;
pub mod stored;
pub mod trigger;

pub use array::{ArrayCell, Replacement};
pub use attachment::{AttachmentPoint, MutableAttachmentPoint};
pub use bloom_runtime::{Context, Lifetime};
pub use cell::{AnyCell, BoolGaugeInner, CellInner, Handle, MutableAnyCell};
pub use computed::ComputedCell;
pub use external::{ExternalSourceCell, ExternalValueSource};
pub use stored::{IdentityEq, StoredCell};
pub use trigger::Trigger;

/// Creates a [`StoredCell`] using value-equality change detection — the common case, and the
/// realization of this engine's capability-dispatched `create(value)` for `T: PartialEq`. For
/// reference-identity or always-notify semantics use [`StoredCell::new_identity`] or
/// [`StoredCell::new_opaque`] directly.
pub fn create<T: Clone + Send + Sync + PartialEq + 'static>(value: T) -> StoredCell<T> {
	StoredCell::new(value)
}

/// Creates an [`ArrayCell`] from an initial sequence of elements.
pub fn create_array<T: Clone + Send + Sync + 'static>(initial: Vec<T>) -> ArrayCell<T> {
	ArrayCell::new(initial)
}

/// Creates a [`ComputedCell`] whose value is derived by `compute`, a pure function of
/// whichever cells it reads. Dependencies are discovered implicitly and re-diffed on every
/// recomputation.
pub fn computed<T: Clone + Send + Sync + 'static>(
	compute: impl Fn() -> T + Send + Sync + 'static,
) -> ComputedCell<T> {
	ComputedCell::new(compute)
}

/// Creates an immutable [`AttachmentPoint`], initially attached to a private cell holding
/// `default_value`, that can later be re-targeted with [`AttachmentPoint::attach_to`].
pub fn attachment<T: Clone + Send + Sync + PartialEq + 'static>(
	default_value: T,
) -> AttachmentPoint<T> {
	AttachmentPoint::new(default_value)
}

/// Creates a mutable [`MutableAttachmentPoint`] initially attached to `default_cell`; writes
/// through the attachment forward to whichever mutable target is currently attached.
pub fn attachment_mutable<T: Clone + Send + Sync + 'static>(
	default_cell: StoredCell<T>,
) -> MutableAttachmentPoint<T> {
	MutableAttachmentPoint::new(default_cell)
}

/// Builds a [`Trigger`] around `action` and immediately subscribes `on_update` to its
/// coalesced "update-needed" signal. Returns the trigger — call [`Trigger::invoke`] to run
/// the action now — and the [`Lifetime`] of the `on_update` subscription.
pub fn trigger(
	action: impl FnMut() + Send + 'static,
	on_update: impl FnMut() + Send + 'static,
) -> (Trigger, Lifetime) {
	trigger::build(action, on_update)
}

/// Creates an [`ExternalSourceCell`] bound to `key` on `source`.
pub fn external_binding<S: ExternalValueSource>(
	source: &std::sync::Arc<S>,
	key: S::Key,
) -> ExternalSourceCell<S> {
	external::build(source, key)
}
