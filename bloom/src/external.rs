//! [`ExternalSourceCell`]: a computed-like cell backed by an external, host-defined change
//! source rather than by other cells in this graph.

use std::sync::{Arc, Weak};

use bloom_runtime::Notifiable;
use parking_lot::Mutex;

use crate::cell::{CellInner, Core, Handle};

/// The only interface this engine requires from an external key-value source: read a value
/// by key, and subscribe/unsubscribe a change callback for that key.
pub trait ExternalValueSource: Send + Sync + 'static {
	/// The value type this source produces.
	type Value: Clone + Send + Sync + 'static;
	/// The key type identifying a particular observable value within this source.
	type Key: Clone + Send + Sync + 'static;
	/// An opaque token identifying one live subscription, returned by `subscribe` and
	/// consumed by `unsubscribe`.
	type Subscription: Send + 'static;

	/// Reads the current value for `key`.
	fn read(&self, key: &Self::Key) -> Self::Value;

	/// Registers `on_change` to be called whenever the value for `key` may have changed.
	fn subscribe(&self, key: &Self::Key, on_change: Box<dyn FnMut() + Send>) -> Self::Subscription;

	/// Deregisters a subscription previously returned by `subscribe`.
	fn unsubscribe(&self, subscription: Self::Subscription);
}

/// Backing state for an [`ExternalSourceCell`]. Exposed only so the public alias is
/// nameable; not constructible outside this crate.
#[doc(hidden)]
pub struct ExternalSourceCellInner<S: ExternalValueSource> {
	core: Core<S::Value>,
	key: S::Key,
	weak_source: Weak<S>,
	// Held only while observed: some sources misbehave if deregistration is skipped, so the
	// strong reference — and with it, the obligation to call `unsubscribe` — exists only
	// between `begin_observing` and `done_observing`.
	held_strong: Mutex<Option<Arc<S>>>,
	live_subscription: Mutex<Option<S::Subscription>>,
	weak_self: Weak<ExternalSourceCellInner<S>>,
}

impl<S: ExternalValueSource> CellInner for ExternalSourceCellInner<S> {
	type Value = S::Value;

	fn core(&self) -> &Core<S::Value> {
		&self.core
	}

	fn weak_self(&self) -> Weak<Self> {
		self.weak_self.clone()
	}

	fn compute_value(&self) -> S::Value {
		let source = self
			.weak_source
			.upgrade()
			.expect("external source dropped while its cell is still reachable");
		source.read(&self.key)
	}

	/// While unobserved there is no change callback keeping the cache honest, so every pull
	/// must go back to the source.
	fn needs_update(&self) -> bool {
		!self.core.observers.any_live()
	}

	fn begin_observing(&self) {
		let Some(source) = self.weak_source.upgrade() else {
			return;
		};
		*self.held_strong.lock() = Some(Arc::clone(&source));
		let weak_self = self.weak_self.clone();
		let callback: Box<dyn FnMut() + Send> = Box::new(move || {
			if let Some(this) = weak_self.upgrade() {
				Notifiable::mark_as_changed(&*this);
			}
		});
		let token = source.subscribe(&self.key, callback);
		*self.live_subscription.lock() = Some(token);
	}

	fn done_observing(&self) {
		let source = self.held_strong.lock().take();
		let token = self.live_subscription.lock().take();
		if let (Some(source), Some(token)) = (source, token) {
			let unsubscribed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
				source.unsubscribe(token);
			}));
			if unsubscribed.is_err() {
				#[cfg(debug_assertions)]
				eprintln!("bloom: ExternalValueSource::unsubscribe panicked; ignoring");
			}
		}
	}
}

/// A cell whose value is pulled from an external, host-defined source and refreshed by
/// callback while observed.
pub type ExternalSourceCell<S> = Handle<ExternalSourceCellInner<S>>;

pub(crate) fn build<S: ExternalValueSource>(
	source: &Arc<S>,
	key: S::Key,
) -> ExternalSourceCell<S> {
	let arc = Arc::new_cyclic(|weak| ExternalSourceCellInner {
		core: Core::new(),
		key,
		weak_source: Arc::downgrade(source),
		held_strong: Mutex::new(None),
		live_subscription: Mutex::new(None),
		weak_self: weak.clone(),
	});
	Handle::from_arc(arc)
}
