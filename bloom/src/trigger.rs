//! [`Trigger`]: an action whose dependencies, when invalidated, fire a single coalesced
//! "update-needed" callback — the adapter between this engine and host code that wants a
//! coarse "something changed, re-run me" signal rather than a typed cell.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Weak,
};

use bloom_runtime::{Changeable, Context, ClosureNotifiable, Lifetime, Notifiable, NotificationSet};
use parking_lot::Mutex;

struct DependencySnapshot {
	deps: Vec<Arc<dyn Changeable>>,
	subscription: Lifetime,
}

struct TriggerInner {
	action: Mutex<Box<dyn FnMut() + Send>>,
	deps: Mutex<Option<DependencySnapshot>>,
	pending_update: AtomicBool,
	downstream: NotificationSet,
	weak_self: Weak<TriggerInner>,
}

impl TriggerInner {
	/// Runs `action` inside a fresh capture frame and rewires dependency subscriptions using
	/// the same diff-then-reset-before-drop protocol as [`ComputedCell`](crate::ComputedCell).
	///
	/// `pending_update` is cleared *before* the action runs, so that any write the action
	/// itself triggers (or any write racing in concurrently) schedules a fresh update rather
	/// than being swallowed by this invocation's own bookkeeping.
	fn perform_action(&self) {
		self.pending_update.store(false, Ordering::Release);

		let expected = self
			.deps
			.lock()
			.as_ref()
			.map(|snapshot| snapshot.deps.clone());

		let (new_deps, differ) = Context::with_new_context(|| {
			if let Some(expected) = expected {
				Context::set_expected_dependencies(expected);
			}
			(self.action.lock())();
			(Context::current_dependencies(), Context::dependencies_differ())
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
	}

	fn when_changed_notify(&self, target: Weak<dyn Notifiable>) -> Lifetime {
		let (id, _became_live) = self.downstream.push(target);
		let weak_self = self.weak_self.clone();
		Lifetime::leaf(move || {
			if let Some(this) = weak_self.upgrade() {
				this.downstream.remove(id);
			}
		})
	}
}

impl Notifiable for TriggerInner {
	/// Coalesces a storm of upstream writes into one downstream fanout: if an update is
	/// already pending, a further invalidation is dropped rather than fanned out again.
	fn mark_as_changed(&self) {
		if !self.pending_update.swap(true, Ordering::AcqRel) {
			self.downstream.fire_all();
		}
	}
}

/// A coarse "re-run me when anything I last read changes" handle. Call [`Trigger::invoke`]
/// to run the action now (capturing a fresh dependency set); subscribe to
/// [`Trigger::when_changed`] to learn, once per invalidation batch, that the action should be
/// invoked again.
#[derive(Clone)]
pub struct Trigger(Arc<TriggerInner>);

impl Trigger {
	/// Runs the action now, inside a fresh dependency-capture frame, and rewires
	/// subscriptions if the dependency set changed since the last invocation.
	pub fn invoke(&self) {
		self.0.perform_action();
	}

	/// Subscribes a plain closure to this trigger's coalesced "update-needed" signal.
	pub fn when_changed(&self, f: impl FnMut() + Send + 'static) -> Lifetime {
		let notifiable = ClosureNotifiable::new(f);
		let weak: Weak<dyn Notifiable> = Arc::downgrade(&notifiable);
		self.0
			.when_changed_notify(weak)
			.with_keep_alive(notifiable)
	}
}

pub(crate) fn build(
	action: impl FnMut() + Send + 'static,
	on_update: impl FnMut() + Send + 'static,
) -> (Trigger, Lifetime) {
	let inner = Arc::new_cyclic(|weak| TriggerInner {
		action: Mutex::new(Box::new(action)),
		deps: Mutex::new(None),
		pending_update: AtomicBool::new(false),
		downstream: NotificationSet::new(),
		weak_self: weak.clone(),
	});
	let trigger = Trigger(inner);
	let lifetime = trigger.when_changed(on_update);
	(trigger, lifetime)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

	use super::*;
	use crate::stored::StoredCell;

	#[test]
	fn coalesces_multiple_invalidations_between_invocations() {
		let b = StoredCell::new(1);
		let read_value = Arc::new(AtomicI32::new(0));
		let update_count = Arc::new(AtomicUsize::new(0));

		let (trigger, lifetime) = {
			let b = b.clone();
			let read_value = Arc::clone(&read_value);
			let update_count = Arc::clone(&update_count);
			build(
				move || read_value.store(b.read(), Ordering::SeqCst),
				move || {
					update_count.fetch_add(1, Ordering::SeqCst);
				},
			)
		};

		b.write(2); // no dependency subscribed yet: no update
		assert_eq!(update_count.load(Ordering::SeqCst), 0);

		trigger.invoke();
		assert_eq!(read_value.load(Ordering::SeqCst), 2);
		assert_eq!(update_count.load(Ordering::SeqCst), 0);

		b.write(3);
		b.write(4);
		assert_eq!(update_count.load(Ordering::SeqCst), 1);

		trigger.invoke();
		assert_eq!(read_value.load(Ordering::SeqCst), 4);
		b.write(5);
		assert_eq!(update_count.load(Ordering::SeqCst), 2);

		let mut lifetime = lifetime;
		lifetime.done();
		b.write(6);
		assert_eq!(update_count.load(Ordering::SeqCst), 2);
	}
}
