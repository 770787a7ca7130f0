//! [`StoredCell`]: a value supplied from outside the dependency graph, with a
//! change-detection policy chosen at construction time.

use std::sync::{Arc, Weak};

use crate::cell::{CellInner, Core, Handle, MutableAnyCell};

type ChangePredicate<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Backing state for a [`StoredCell`]. Exposed only so `StoredCell<T>` (an alias for
/// `Handle<StoredInner<T>>`) is nameable; not constructible outside this crate.
#[doc(hidden)]
pub struct StoredInner<T> {
	core: Core<T>,
	changed: ChangePredicate<T>,
	weak_self: Weak<StoredInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> StoredInner<T> {
	fn build(value: T, changed: ChangePredicate<T>) -> Handle<Self> {
		let arc = Arc::new_cyclic(|weak| StoredInner {
			core: Core::new_with_value(value),
			changed,
			weak_self: weak.clone(),
		});
		Handle::from_arc(arc)
	}
}

impl<T: Clone + Send + Sync + 'static> CellInner for StoredInner<T> {
	type Value = T;

	fn core(&self) -> &Core<T> {
		&self.core
	}

	fn weak_self(&self) -> Weak<Self> {
		self.weak_self.clone()
	}

	fn compute_value(&self) -> T {
		unreachable!("compute_value invoked on a StoredCell: its cache is always present")
	}
}

/// A cell holding a value supplied from outside the dependency graph. Reads are cached;
/// writes run the configured change-detection policy before firing observers.
pub type StoredCell<T> = Handle<StoredInner<T>>;

/// Reference-identity comparison, for the `StoredCell::new_identity` construction policy.
/// Implemented for `Arc<T>` by comparing pointer identity, not pointee equality.
pub trait IdentityEq {
	/// Whether `self` and `other` are the *same* instance, not merely an equal one.
	fn same_identity(&self, other: &Self) -> bool;
}

impl<T: ?Sized> IdentityEq for Arc<T> {
	fn same_identity(&self, other: &Self) -> bool {
		Arc::ptr_eq(self, other)
	}
}

impl<T: Clone + Send + Sync + PartialEq + 'static> Handle<StoredInner<T>> {
	/// A [`StoredCell`] using value-equality change detection: a write only fires observers
	/// when the new value compares unequal to the previous one.
	pub fn new(value: T) -> Self {
		StoredInner::build(value, Box::new(|old: &T, new: &T| old != new))
	}
}

impl<T: Clone + Send + Sync + IdentityEq + 'static> Handle<StoredInner<T>> {
	/// A [`StoredCell`] using reference-identity change detection: a write only fires
	/// observers when the new value is a genuinely different instance from the previous one.
	pub fn new_identity(value: T) -> Self {
		StoredInner::build(value, Box::new(|old: &T, new: &T| !old.same_identity(new)))
	}
}

impl<T: Clone + Send + Sync + 'static> Handle<StoredInner<T>> {
	/// A [`StoredCell`] that always fires observers on write, regardless of whether the new
	/// value is distinguishable from the old one. For opaque types with no meaningful
	/// equality or identity.
	pub fn new_opaque(value: T) -> Self {
		StoredInner::build(value, Box::new(|_, _| true))
	}

	/// Writes `new_value` unconditionally, then fires observers iff the configured
	/// change-detection policy reports the value as changed (a first write always counts).
	pub fn write(&self, new_value: T) {
		let core = self.0.core();
		let mut state = core.state.lock();
		let changed = match &state.cached {
			Some(old) => (self.0.changed)(old, &new_value),
			None => true,
		};
		state.cached = Some(new_value);
		drop(state);
		if changed {
			core.observers.fire_all();
		}
	}
}

impl<T: Clone + Send + Sync + 'static> MutableAnyCell<T> for StoredInner<T> {
	fn write_value(&self, value: T) {
		let strong = self
			.weak_self
			.upgrade()
			.expect("cell written to after being dropped");
		Handle::from_arc(strong).write(value);
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use super::*;

	#[test]
	fn write_then_read_round_trips() {
		let cell = StoredCell::new(1);
		assert_eq!(cell.read(), 1);
		cell.write(2);
		assert_eq!(cell.read(), 2);
	}

	#[test]
	fn equality_policy_skips_notify_for_equal_values() {
		let cell = StoredCell::new(1);
		let count = Arc::new(AtomicUsize::new(0));
		let _lt = {
			let count = Arc::clone(&count);
			cell.when_changed(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		cell.write(1); // same value: no notification
		assert_eq!(count.load(Ordering::SeqCst), 0);
		cell.write(2);
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn opaque_policy_always_notifies() {
		let cell = StoredCell::new_opaque(1);
		let count = Arc::new(AtomicUsize::new(0));
		let _lt = {
			let count = Arc::clone(&count);
			cell.when_changed(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		cell.write(1);
		cell.write(1);
		assert_eq!(count.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn identity_policy_compares_pointers_not_contents() {
		let a = Arc::new(String::from("hi"));
		let b = Arc::new(String::from("hi")); // equal contents, different instance
		let cell = StoredCell::new_identity(Arc::clone(&a));
		let count = Arc::new(AtomicUsize::new(0));
		let _lt = {
			let count = Arc::clone(&count);
			cell.when_changed(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		cell.write(Arc::clone(&a)); // same instance: no notification
		assert_eq!(count.load(Ordering::SeqCst), 0);
		cell.write(b); // different instance: notifies, even though contents are equal
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}
}
