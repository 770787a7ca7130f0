//! [`ComputedCell`]: a value derived by a pure function of other cells, with
//! implicitly-tracked, auto-diffed dependencies.

use std::sync::{Arc, Weak};

use bloom_runtime::{Changeable, Context, Lifetime, Notifiable};
use parking_lot::Mutex;

use crate::cell::{CellInner, Core, Handle};

struct DependencySnapshot {
	deps: Vec<Arc<dyn Changeable>>,
	subscription: Lifetime,
}

/// Backing state for a [`ComputedCell`]. Exposed only so `ComputedCell<T>` (an alias for
/// `Handle<ComputedInner<T>>`) is nameable; not constructible outside this crate.
#[doc(hidden)]
pub struct ComputedInner<T> {
	core: Core<T>,
	compute: Box<dyn Fn() -> T + Send + Sync>,
	deps: Mutex<Option<DependencySnapshot>>,
	weak_self: Weak<ComputedInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> CellInner for ComputedInner<T> {
	type Value = T;

	fn core(&self) -> &Core<T> {
		&self.core
	}

	fn weak_self(&self) -> Weak<Self> {
		self.weak_self.clone()
	}

	/// Runs `compute` inside a fresh capture frame, diffs the resulting dependency set
	/// against the one from last time, and rewires subscriptions only when they differ.
	///
	/// The rewire itself resets the frame's observed dependency list *before* dropping the
	/// old subscription: dropping may run code (an observer-count transition on some upstream
	/// cell) that reads cells of its own, and those reads must not leak into this cell's new
	/// dependency set.
	fn compute_value(&self) -> T {
		let expected = self
			.deps
			.lock()
			.as_ref()
			.map(|snapshot| snapshot.deps.clone());

		let (result, new_deps, differ) = Context::with_new_context(|| {
			if let Some(expected) = expected {
				Context::set_expected_dependencies(expected);
			}
			let result = (self.compute)();
			let differ = Context::dependencies_differ();
			(result, Context::current_dependencies(), differ)
		});

		if differ {
			let weak_self: Weak<dyn Notifiable> = self.weak_self.clone();
			let subscriptions = new_deps
				.iter()
				.map(|dep| dep.when_changed_notify(weak_self.clone()))
				.collect::<Vec<_>>();
			let new_subscription = Lifetime::combine(subscriptions);

			let mut deps = self.deps.lock();
			let old_snapshot = deps.take();
			Context::reset_dependencies();
			*deps = Some(DependencySnapshot {
				deps: new_deps,
				subscription: new_subscription,
			});
			drop(deps);
			if let Some(mut old_snapshot) = old_snapshot {
				old_snapshot.subscription.done();
			}
		}

		result
	}

	/// Eagerly releases upstream subscriptions once nothing observes this cell any more; the
	/// next `resolve()` rebuilds them from scratch.
	fn done_observing(&self) {
		if let Some(mut old_snapshot) = self.deps.lock().take() {
			old_snapshot.subscription.done();
		}
		self.core.state.lock().cached = None;
	}
}

/// A cell whose value is derived by a pure function of other cells, read during `compute`.
pub type ComputedCell<T> = Handle<ComputedInner<T>>;

impl<T: Clone + Send + Sync + 'static> Handle<ComputedInner<T>> {
	pub(crate) fn new(compute: impl Fn() -> T + Send + Sync + 'static) -> Self {
		let arc = Arc::new_cyclic(|weak| ComputedInner {
			core: Core::new(),
			compute: Box::new(compute),
			deps: Mutex::new(None),
			weak_self: weak.clone(),
		});
		Handle::from_arc(arc)
	}
}
