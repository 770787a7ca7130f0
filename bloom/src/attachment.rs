//! [`AttachmentPoint`] and [`MutableAttachmentPoint`]: indirection cells whose target can be
//! swapped at runtime, forwarding reads (and, for the mutable variant, writes) to whichever
//! cell is currently attached.

use std::any::Any;
use std::sync::{Arc, Weak};

use bloom_runtime::{Lifetime, Notifiable};
use parking_lot::Mutex;

use crate::cell::{AnyCell, CellInner, Core, Handle, MutableAnyCell};
use crate::stored::StoredCell;

struct AttachedState<T> {
	inner: Arc<dyn AnyCell<T>>,
	subscription: Lifetime,
	mutable: Option<Arc<dyn MutableAnyCell<T>>>,
}

/// Backing state for [`AttachmentPoint`]/[`MutableAttachmentPoint`]. Exposed only so the
/// public aliases are nameable; not constructible outside this crate.
#[doc(hidden)]
pub struct AttachmentPointInner<T> {
	core: Core<T>,
	attached: Mutex<AttachedState<T>>,
	weak_self: Weak<AttachmentPointInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> CellInner for AttachmentPointInner<T> {
	type Value = T;

	fn core(&self) -> &Core<T> {
		&self.core
	}

	fn weak_self(&self) -> Weak<Self> {
		self.weak_self.clone()
	}

	fn compute_value(&self) -> T {
		self.attached.lock().inner.read_value()
	}
}

impl<T: Clone + Send + Sync + 'static> AttachmentPointInner<T> {
	fn build(
		inner: Arc<dyn AnyCell<T>>,
		mutable: Option<Arc<dyn MutableAnyCell<T>>>,
	) -> Arc<Self> {
		Arc::new_cyclic(|weak| {
			let weak_notifiable: Weak<dyn Notifiable> = weak.clone();
			let subscription = inner.when_changed_notify(weak_notifiable);
			AttachmentPointInner {
				core: Core::new(),
				attached: Mutex::new(AttachedState {
					inner,
					subscription,
					mutable,
				}),
				weak_self: weak.clone(),
			}
		})
	}

	/// Cancels the subscription to the previously-attached cell, installs the new one,
	/// resubscribes, and fires `mark_as_changed` so downstream observers recompute against
	/// the new target's current value.
	fn attach_to(&self, inner: Arc<dyn AnyCell<T>>, mutable: Option<Arc<dyn MutableAnyCell<T>>>) {
		let weak_notifiable: Weak<dyn Notifiable> = self.weak_self.clone();
		let subscription = inner.when_changed_notify(weak_notifiable);
		let mut guard = self.attached.lock();
		let old = std::mem::replace(
			&mut *guard,
			AttachedState {
				inner,
				subscription,
				mutable,
			},
		);
		drop(guard);
		old.subscription.done();
		Notifiable::mark_as_changed(self);
	}

	fn write(&self, value: T) {
		let mutable = self
			.attached
			.lock()
			.mutable
			.clone()
			.unwrap_or_else(|| panic!("write on an AttachmentPoint not attached to a mutable target"));
		mutable.write_value(value);
	}
}

impl<T: Clone + Send + Sync + 'static> MutableAnyCell<T> for AttachmentPointInner<T> {
	fn write_value(&self, value: T) {
		self.write(value);
	}
}

/// Walks the chain of attachment points starting at `start`, following each one's currently
/// attached target, to see whether it ever reaches `target`. Stops (returning `false`) as soon
/// as the chain reaches a cell that isn't itself an attachment point, since only attachment
/// points can be retargeted and so only they can close a cycle. Also stops (treating it as a
/// cycle) if it revisits a node, which should be unreachable given `attach_to` refuses to
/// install a cycle in the first place, but avoids turning a bug here into an infinite loop.
fn chain_would_cycle<T: Clone + Send + Sync + 'static>(
	start: &Arc<dyn AnyCell<T>>,
	target: &Weak<AttachmentPointInner<T>>,
) -> bool {
	let mut current = Arc::clone(start);
	let mut visited = Vec::new();
	loop {
		let ptr = Arc::as_ptr(&current) as *const ();
		if visited.contains(&ptr) {
			return true;
		}
		visited.push(ptr);

		let any_ref: &dyn Any = &*current;
		let Some(point) = any_ref.downcast_ref::<AttachmentPointInner<T>>() else {
			return false;
		};
		if point.weak_self.ptr_eq(target) {
			return true;
		}
		let next = point.attached.lock().inner.clone();
		current = next;
	}
}

/// An indirection cell forwarding reads to whichever cell is currently attached.
pub type AttachmentPoint<T> = Handle<AttachmentPointInner<T>>;

impl<T: Clone + Send + Sync + PartialEq + 'static> Handle<AttachmentPointInner<T>> {
	pub(crate) fn new(default_value: T) -> Self {
		let default_cell = StoredCell::new(default_value);
		let any: Arc<dyn AnyCell<T>> = Arc::clone(&default_cell.0);
		Handle::from_arc(AttachmentPointInner::build(any, None))
	}
}

impl<T: Clone + Send + Sync + 'static> Handle<AttachmentPointInner<T>> {
	/// Re-targets this attachment point at `cell`, an arbitrary readable cell of the same
	/// value type.
	///
	/// # Panics
	///
	/// Panics if `cell` is this same attachment point, or is an attachment point that
	/// (transitively, through its own current target) attaches back to this one — installing
	/// either would close a cycle that `read`/`compute_value` could never terminate out of.
	pub fn attach_to<I: CellInner<Value = T>>(&self, cell: &Handle<I>) {
		let any: Arc<dyn AnyCell<T>> = Arc::clone(&cell.0);
		let target = Arc::downgrade(&self.0);
		assert!(
			!chain_would_cycle(&any, &target),
			"attach_to would create a cycle through attachment chains"
		);
		self.0.attach_to(any, None);
	}
}

/// An indirection cell that also forwards writes to whichever mutable cell is currently
/// attached.
#[derive(Clone)]
pub struct MutableAttachmentPoint<T: Clone + Send + Sync + 'static>(
	Handle<AttachmentPointInner<T>>,
);

impl<T: Clone + Send + Sync + 'static> MutableAttachmentPoint<T> {
	pub(crate) fn new(default_cell: StoredCell<T>) -> Self {
		let any: Arc<dyn AnyCell<T>> = Arc::clone(&default_cell.0);
		let mutable: Arc<dyn MutableAnyCell<T>> = Arc::clone(&default_cell.0);
		MutableAttachmentPoint(Handle::from_arc(AttachmentPointInner::build(
			any,
			Some(mutable),
		)))
	}

	/// Writes `value` through to the currently-attached mutable target, using that target's
	/// own change-detection policy.
	pub fn write(&self, value: T) {
		self.0 .0.write(value);
	}

	/// Re-targets this attachment point at `cell`, another mutable cell of the same value
	/// type (a [`StoredCell`] or another [`MutableAttachmentPoint`], via its inner handle).
	///
	/// # Panics
	///
	/// Panics if `cell` is this same attachment point, or is an attachment point that
	/// (transitively, through its own current target) attaches back to this one — installing
	/// either would close a cycle that `read`/`compute_value` could never terminate out of.
	pub fn attach_to<I>(&self, cell: &Handle<I>)
	where
		I: CellInner<Value = T> + MutableAnyCell<T>,
	{
		let any: Arc<dyn AnyCell<T>> = Arc::clone(&cell.0);
		let mutable: Arc<dyn MutableAnyCell<T>> = Arc::clone(&cell.0);
		let target = Arc::downgrade(&self.0 .0);
		assert!(
			!chain_would_cycle(&any, &target),
			"attach_to would create a cycle through attachment chains"
		);
		self.0 .0.attach_to(any, Some(mutable));
	}
}

impl<T: Clone + Send + Sync + 'static> std::ops::Deref for MutableAttachmentPoint<T> {
	type Target = Handle<AttachmentPointInner<T>>;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::computed::ComputedInner;

	#[test]
	fn reads_default_value_until_attached() {
		let point = AttachmentPoint::<i32>::new(7);
		assert_eq!(point.read(), 7);
	}

	#[test]
	fn attach_to_switches_target_and_propagates_updates() {
		let point = AttachmentPoint::<i32>::new(0);
		let c = StoredCell::new(5);
		point.attach_to(&c);
		assert_eq!(point.read(), 5);
		c.write(9);
		assert_eq!(point.read(), 9);
	}

	#[test]
	fn attach_to_accepts_computed_cells_too() {
		let a = StoredCell::new(1);
		let point = AttachmentPoint::<i32>::new(0);
		let computed = {
			let a = a.clone();
			Handle::<ComputedInner<i32>>::new(move || a.read() * 10)
		};
		point.attach_to(&computed);
		assert_eq!(point.read(), 10);
		a.write(2);
		assert_eq!(point.read(), 20);
	}

	#[test]
	fn mutable_attachment_forwards_writes() {
		let backing = StoredCell::new(1);
		let point = MutableAttachmentPoint::new(backing.clone());
		point.write(42);
		assert_eq!(backing.read(), 42);
		assert_eq!(point.read(), 42);
	}

	#[test]
	#[should_panic(expected = "cycle")]
	fn attach_to_self_panics_instead_of_deadlocking() {
		let point = AttachmentPoint::<i32>::new(0);
		point.attach_to(&point);
	}

	#[test]
	#[should_panic(expected = "cycle")]
	fn attach_to_panics_on_a_two_point_cycle() {
		let a = AttachmentPoint::<i32>::new(0);
		let b = AttachmentPoint::<i32>::new(0);
		a.attach_to(&b);
		b.attach_to(&a); // would close a -> b -> a
	}

	#[test]
	fn attach_to_a_longer_non_cyclic_chain_still_works() {
		let c = StoredCell::new(1);
		let a = AttachmentPoint::<i32>::new(0);
		let b = AttachmentPoint::<i32>::new(0);
		b.attach_to(&c);
		a.attach_to(&b);
		assert_eq!(a.read(), 1);
		c.write(2);
		assert_eq!(a.read(), 2);
	}

	#[test]
	#[should_panic(expected = "cycle")]
	fn mutable_attach_to_self_panics_instead_of_deadlocking() {
		let backing = StoredCell::new(0);
		let point = MutableAttachmentPoint::new(backing);
		point.attach_to(&point);
	}
}
