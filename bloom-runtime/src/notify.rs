//! The two capability interfaces that wire observers to sources, and the weakly-held
//! collection that sources use to keep track of their observers.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::lifetime::Lifetime;

/// Anything that accepts a "mark as changed" signal.
pub trait Notifiable: Send + Sync {
	/// Tells this observer that something it (transitively) depends on may have changed.
	///
	/// Implementations are expected to be idempotent while already in a "changed, not yet
	/// refreshed" state: repeated calls before the next read/refresh must not cause repeated
	/// downstream fanout.
	fn mark_as_changed(&self);
}

/// Anything that can notify observers that it has changed.
pub trait Changeable: Send + Sync {
	/// Weakly subscribes `target` to this source. Returns a [`Lifetime`] that, when `done`,
	/// removes the subscription again.
	fn when_changed_notify(&self, target: Weak<dyn Notifiable>) -> Lifetime;
}

struct Entry {
	id: u64,
	target: Weak<dyn Notifiable>,
}

struct Inner {
	next_id: u64,
	entries: Vec<Entry>,
}

/// A weakly-held, order-agnostic collection of [`Notifiable`] observers with lazy compaction.
///
/// Observers are held weakly: a target that has otherwise been dropped is skipped during
/// fanout and tombstoned rather than causing an error.
pub struct NotificationSet {
	inner: Mutex<Inner>,
}

impl Default for NotificationSet {
	fn default() -> Self {
		Self::new()
	}
}

impl NotificationSet {
	/// An empty set with no observers.
	pub fn new() -> Self {
		NotificationSet {
			inner: Mutex::new(Inner {
				next_id: 0,
				entries: Vec::new(),
			}),
		}
	}

	/// Registers `target`. Returns a stable id (for later [`NotificationSet::remove`]) and
	/// whether this addition transitioned the set from "no live observers" to "at least one".
	pub fn push(&self, target: Weak<dyn Notifiable>) -> (u64, bool) {
		let mut inner = self.inner.lock();
		let was_live = inner.entries.iter().any(|e| e.target.upgrade().is_some());
		let id = inner.next_id;
		inner.next_id += 1;
		inner.entries.push(Entry { id, target });
		(id, !was_live)
	}

	/// Removes the entry previously returned by [`NotificationSet::push`]. Returns whether
	/// this removal transitioned the set from "at least one live observer" to "none".
	pub fn remove(&self, id: u64) -> bool {
		let mut inner = self.inner.lock();
		inner.entries.retain(|e| e.id != id);
		!inner.entries.iter().any(|e| e.target.upgrade().is_some())
	}

	/// Calls [`Notifiable::mark_as_changed`] on every currently-live observer, over a
	/// snapshot taken under the lock: observers added during a fire do not run in the same
	/// pass. Dead entries encountered along the way are compacted away opportunistically.
	pub fn fire_all(&self) {
		let snapshot: Vec<Entry> = {
			let inner = self.inner.lock();
			inner
				.entries
				.iter()
				.map(|e| Entry {
					id: e.id,
					target: e.target.clone(),
				})
				.collect()
		};
		let mut dead = Vec::new();
		for entry in snapshot {
			match entry.target.upgrade() {
				Some(strong) => strong.mark_as_changed(),
				None => dead.push(entry.id),
			}
		}
		if !dead.is_empty() {
			let mut inner = self.inner.lock();
			inner.entries.retain(|e| !dead.contains(&e.id));
		}
	}

	/// Drops tombstoned (already-dead) entries without firing anything.
	pub fn compact_if_needed(&self) {
		let mut inner = self.inner.lock();
		inner.entries.retain(|e| e.target.upgrade().is_some());
	}

	/// Whether at least one observer is currently live.
	pub fn any_live(&self) -> bool {
		self.inner
			.lock()
			.entries
			.iter()
			.any(|e| e.target.upgrade().is_some())
	}
}

/// Wraps a plain `FnMut()` closure as a [`Notifiable`], for callers that don't need the
/// changed cell's value (just the fact that *something* changed).
pub struct ClosureNotifiable(Mutex<Box<dyn FnMut() + Send>>);

impl ClosureNotifiable {
	/// Wraps `f` as a reference-counted [`Notifiable`].
	pub fn new(f: impl FnMut() + Send + 'static) -> Arc<Self> {
		Arc::new(ClosureNotifiable(Mutex::new(Box::new(f))))
	}
}

impl Notifiable for ClosureNotifiable {
	fn mark_as_changed(&self) {
		(self.0.lock())();
	}
}
