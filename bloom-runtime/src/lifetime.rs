//! [`Lifetime`]: the disposable subscription token every observer registration returns.

use std::any::Any;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

/// Subscriptions that are [`forever`](`Lifetime::forever`)d still need to keep their
/// keep-alive payload around for the remainder of the process. There is no owner left to
/// hold onto it at that point (that's the whole idea of "forever"), so it is parked here
/// instead of being dropped.
static FOREVER: Lazy<Mutex<Vec<Box<dyn Any + Send>>>> = Lazy::new(|| Mutex::new(Vec::new()));

enum State {
	/// A single subscription: an optional release (unsubscribe) action and an optional
	/// payload that must be kept alive for as long as this lifetime is active.
	Leaf {
		release: Option<Box<dyn FnOnce() + Send>>,
		keep_alive: Option<Box<dyn Any + Send>>,
	},
	/// A flattened set of child lifetimes. Never contains another `Composite` directly;
	/// [`Lifetime::combine`] flattens on construction.
	Composite(Vec<Lifetime>),
	Done,
	Pinned,
}

impl Default for State {
	fn default() -> Self {
		State::Done
	}
}

/// A scoped subscription token.
///
/// # Logic
///
/// - `active`: the subscription is live; dropping the [`Lifetime`] runs [`Lifetime::done`].
/// - `done`: the release callback has run exactly once (or never existed). Idempotent.
/// - `pinned`: [`Lifetime::forever`] was called; the release callback is suppressed
///   permanently, including on drop.
///
/// [`Lifetime`] intentionally isn't [`Clone`]: it is a unique capability to end one
/// subscription, not a shared handle to it. [`Lifetime::combine`] composes several by value.
#[must_use = "subscriptions are cancelled when this lifetime is dropped; call `.forever()` to keep them alive instead"]
pub struct Lifetime(State);

impl Lifetime {
	/// A [`Lifetime`] that is already [`done`](`Lifetime::done`). Useful as a placeholder
	/// before a cell has subscribed to anything.
	pub fn inert() -> Self {
		Lifetime(State::Done)
	}

	/// Constructs a single-subscription [`Lifetime`] from a release action and, optionally,
	/// a payload that must outlive the subscription (typically the [`Arc`](`std::sync::Arc`)
	/// of an observer adapter that only the [`NotificationSet`](`crate::notify::NotificationSet`)
	/// otherwise holds weakly).
	pub fn leaf(release: impl FnOnce() + Send + 'static) -> Self {
		Lifetime(State::Leaf {
			release: Some(Box::new(release)),
			keep_alive: None,
		})
	}

	/// Attaches a keep-alive payload to this lifetime without changing its release behaviour.
	pub fn with_keep_alive(self, keep_alive: impl Any + Send + 'static) -> Self {
		match self.0 {
			State::Leaf {
				release,
				keep_alive: None,
			} => Lifetime(State::Leaf {
				release,
				keep_alive: Some(Box::new(keep_alive)),
			}),
			other => Lifetime::combine([
				Lifetime(other),
				Lifetime(State::Leaf {
					release: None,
					keep_alive: Some(Box::new(keep_alive)),
				}),
			]),
		}
	}

	/// Combines several lifetimes into one composite. Nested composites are flattened, so
	/// `combine([combine([a, b]), c])` is the same as `combine([a, b, c])`.
	pub fn combine(children: impl IntoIterator<Item = Lifetime>) -> Self {
		let mut flat = Vec::new();
		for child in children {
			match child.0 {
				State::Composite(mut nested) => flat.append(&mut nested),
				State::Done => {}
				leaf_or_pinned => flat.push(Lifetime(leaf_or_pinned)),
			}
		}
		Lifetime(State::Composite(flat))
	}

	/// Returns a composite lifetime that ends both `self` and `other` when `done`.
	pub fn live_as_long_as(self, other: Lifetime) -> Lifetime {
		Lifetime::combine([self, other])
	}

	/// Idempotently transitions `active -> done`, running the release callback (and those of
	/// any composed children) at most once. A no-op on an already-`done` or `pinned` lifetime.
	pub fn done(&mut self) {
		match std::mem::take(&mut self.0) {
			State::Leaf {
				release,
				keep_alive,
			} => {
				if let Some(release) = release {
					release();
				}
				drop(keep_alive);
				self.0 = State::Done;
			}
			State::Composite(children) => {
				for mut child in children {
					child.done();
				}
				self.0 = State::Done;
			}
			pinned @ State::Pinned => self.0 = pinned,
			State::Done => self.0 = State::Done,
		}
	}

	/// Transitions `active -> pinned`: the subscription (and any keep-alive payload it
	/// carries) survives for the remainder of the process, and the release callback will
	/// never run, even when this [`Lifetime`] is later dropped.
	pub fn forever(&mut self) {
		match std::mem::take(&mut self.0) {
			State::Leaf {
				release,
				keep_alive,
			} => {
				// The release (unsubscribe) action is simply never invoked; only the
				// keep-alive payload needs somewhere to live for the rest of the process.
				drop(release);
				if let Some(keep_alive) = keep_alive {
					FOREVER.lock().push(keep_alive);
				}
				self.0 = State::Pinned;
			}
			State::Composite(children) => {
				for mut child in children {
					child.forever();
				}
				self.0 = State::Pinned;
			}
			State::Done => self.0 = State::Done,
			State::Pinned => self.0 = State::Pinned,
		}
	}
}

impl Drop for Lifetime {
	fn drop(&mut self) {
		self.done();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::{
		atomic::{AtomicUsize, Ordering},
		Arc,
	};

	use super::Lifetime;

	#[test]
	fn done_runs_release_once() {
		let count = Arc::new(AtomicUsize::new(0));
		let mut lt = {
			let count = count.clone();
			Lifetime::leaf(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		lt.done();
		lt.done();
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn drop_runs_release() {
		let count = Arc::new(AtomicUsize::new(0));
		{
			let count = count.clone();
			let _lt = Lifetime::leaf(move || {
				count.fetch_add(1, Ordering::SeqCst);
			});
		}
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn forever_suppresses_release() {
		let count = Arc::new(AtomicUsize::new(0));
		let mut lt = {
			let count = count.clone();
			Lifetime::leaf(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		lt.forever();
		drop(lt);
		assert_eq!(count.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn combine_runs_all_children() {
		let count = Arc::new(AtomicUsize::new(0));
		let a = {
			let count = count.clone();
			Lifetime::leaf(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		let b = {
			let count = count.clone();
			Lifetime::leaf(move || {
				count.fetch_add(1, Ordering::SeqCst);
			})
		};
		let mut combined = Lifetime::combine([a, b]);
		combined.done();
		assert_eq!(count.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn keep_alive_survives_until_done() {
		let dropped = Arc::new(AtomicUsize::new(0));
		struct MarkOnDrop(Arc<AtomicUsize>);
		impl Drop for MarkOnDrop {
			fn drop(&mut self) {
				self.0.fetch_add(1, Ordering::SeqCst);
			}
		}
		let mut lt = Lifetime::leaf(|| {}).with_keep_alive(MarkOnDrop(dropped.clone()));
		assert_eq!(dropped.load(Ordering::SeqCst), 0);
		lt.done();
		assert_eq!(dropped.load(Ordering::SeqCst), 1);
	}
}
