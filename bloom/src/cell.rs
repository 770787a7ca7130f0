//! The shared cell machinery: cached value + observer list + `is_bound` gauge, and the
//! generic [`Handle`] that every concrete cell kind is built from.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Weak,
};

use bloom_runtime::{Changeable, ClosureNotifiable, Context, Lifetime, Notifiable};
use parking_lot::Mutex;

pub(crate) struct CoreState<V> {
	pub(crate) cached: Option<V>,
}

/// Cached value, observer list and lazily-constructed `is_bound` gauge shared by every cell
/// kind. Not constructible outside this crate; see [`CellInner::core`].
#[doc(hidden)]
pub struct Core<V> {
	pub(crate) state: Mutex<CoreState<V>>,
	pub(crate) observers: bloom_runtime::NotificationSet,
	is_bound: Mutex<Option<Handle<BoolGaugeInner>>>,
}

impl<V: Clone + Send + Sync + 'static> Core<V> {
	pub(crate) fn new() -> Self {
		Core {
			state: Mutex::new(CoreState { cached: None }),
			observers: bloom_runtime::NotificationSet::new(),
			is_bound: Mutex::new(None),
		}
	}

	pub(crate) fn new_with_value(value: V) -> Self {
		Core {
			state: Mutex::new(CoreState { cached: Some(value) }),
			observers: bloom_runtime::NotificationSet::new(),
			is_bound: Mutex::new(None),
		}
	}

	fn set_bound(&self, bound: bool) {
		if let Some(gauge) = &*self.is_bound.lock() {
			gauge.0.set(bound);
		}
	}
}

/// Behaviour hooks a concrete cell kind provides; everything else (caching, observer
/// bookkeeping, reentrancy-safe `observe`) is shared through [`Handle`].
///
/// Every implementor must store its own `Weak<Self>`, produced by `Arc::new_cyclic` at
/// construction time, so that read/subscribe paths can recover an owned `Arc` from `&self`.
pub trait CellInner: Send + Sync + 'static {
	/// The type this cell holds.
	type Value: Clone + Send + Sync + 'static;

	/// The shared cache/observer state.
	fn core(&self) -> &Core<Self::Value>;

	/// This cell's own weak handle, as captured during construction.
	fn weak_self(&self) -> Weak<Self>
	where
		Self: Sized;

	/// Computes a fresh value. Must be pure with respect to whatever other cells it reads
	/// (reads made here are captured as this cell's dependency set, for cell kinds that have
	/// one).
	fn compute_value(&self) -> Self::Value;

	/// Whether a present cache entry must still be treated as stale. Cells that are always
	/// correct once cached (the default) never need this; [`ExternalSourceCell`](crate::ExternalSourceCell)
	/// overrides it to stay fresh for pull-based reads while unobserved.
	fn needs_update(&self) -> bool {
		false
	}

	/// Runs when the observer count transitions from zero to one.
	fn begin_observing(&self) {}

	/// Runs when the observer count transitions from one to zero.
	fn done_observing(&self) {}
}

fn read_cell<I: CellInner>(this: &I) -> I::Value {
	let strong = this
		.weak_self()
		.upgrade()
		.expect("cell read after being dropped");
	Context::add_dependency(strong);
	{
		let state = this.core().state.lock();
		if let Some(cached) = &state.cached {
			if !this.needs_update() {
				return cached.clone();
			}
		}
	}
	let value = this.compute_value();
	this.core().state.lock().cached = Some(value.clone());
	value
}

fn rebind_cell<I: CellInner>(this: &I) -> I::Value {
	let strong = this
		.weak_self()
		.upgrade()
		.expect("cell rebind after being dropped");
	Context::add_dependency(strong);
	let value = this.compute_value();
	this.core().state.lock().cached = Some(value.clone());
	value
}

impl<I: CellInner> Notifiable for I {
	fn mark_as_changed(&self) {
		let mut state = self.core().state.lock();
		if state.cached.take().is_some() {
			drop(state);
			self.core().observers.fire_all();
		}
	}
}

impl<I: CellInner> Changeable for I {
	fn when_changed_notify(&self, target: Weak<dyn Notifiable>) -> Lifetime {
		let core = self.core();
		let (id, became_bound) = core.observers.push(target);
		if became_bound {
			self.begin_observing();
			core.set_bound(true);
		}
		let weak_self = self.weak_self();
		Lifetime::leaf(move || {
			if let Some(this) = weak_self.upgrade() {
				let became_unbound = this.core().observers.remove(id);
				if became_unbound {
					this.done_observing();
					this.core().set_bound(false);
				}
			}
		})
	}
}

/// A type-erased read-only handle to any cell holding a `T`, used where the concrete cell
/// kind behind an indirection (an [`AttachmentPoint`](crate::AttachmentPoint)) is not known.
///
/// `Any` is a supertrait (automatically satisfied, since every [`CellInner`] is `'static`) so
/// that [`AttachmentPoint::attach_to`](crate::AttachmentPoint) can downcast a chain of
/// attachment points to check for cycles before installing a new target.
pub trait AnyCell<T>: Changeable + Notifiable + Send + Sync + std::any::Any {
	/// Reads the current value, registering a dependency in the active capture frame if any.
	fn read_value(&self) -> T;
}

impl<I: CellInner> AnyCell<I::Value> for I {
	fn read_value(&self) -> I::Value {
		read_cell(self)
	}
}

/// An [`AnyCell`] that additionally accepts writes, forwarded to whatever concrete mutable
/// cell (a [`StoredCell`](crate::StoredCell) or another mutable attachment) sits behind it.
pub trait MutableAnyCell<T>: AnyCell<T> {
	/// Writes a new value through to the underlying mutable cell.
	fn write_value(&self, value: T);
}

/// A generic owning handle shared by every public cell type in this crate. `Handle<I>` is
/// the realization of "`Cell<T>`" for `T = I::Value`: every operation the base cell exposes
/// (read, rebind, subscribe, observe, `is_bound`) is implemented once here rather than once
/// per cell kind.
#[doc(hidden)]
pub struct Handle<I: CellInner>(pub(crate) Arc<I>);

impl<I: CellInner> Clone for Handle<I> {
	fn clone(&self) -> Self {
		Handle(Arc::clone(&self.0))
	}
}

impl<I: CellInner> Handle<I> {
	pub(crate) fn from_arc(inner: Arc<I>) -> Self {
		Handle(inner)
	}

	/// Returns the cached value, recomputing it first if it is absent or stale. Registers a
	/// dependency on this cell in the currently active capture frame, if any.
	pub fn read(&self) -> I::Value {
		read_cell(&self.0)
	}

	/// Unconditionally recomputes the value and overwrites the cache, regardless of whether
	/// the existing cache entry would otherwise have been considered fresh.
	pub fn rebind(&self) -> I::Value {
		rebind_cell(&self.0)
	}

	/// Drops the cached value (if any) and fires every observer. A no-op if the cache was
	/// already absent.
	pub fn mark_as_changed(&self) {
		Notifiable::mark_as_changed(&*self.0);
	}

	/// Weakly subscribes `target`; the returned [`Lifetime`], once `done`, removes it again.
	pub fn when_changed_notify(&self, target: Weak<dyn Notifiable>) -> Lifetime {
		Changeable::when_changed_notify(&*self.0, target)
	}

	/// Subscribes a plain closure that doesn't need the changed value, just the notification.
	pub fn when_changed(&self, f: impl FnMut() + Send + 'static) -> Lifetime {
		let notifiable = ClosureNotifiable::new(f);
		let weak: Weak<dyn Notifiable> = Arc::downgrade(&notifiable);
		self.when_changed_notify(weak).with_keep_alive(notifiable)
	}

	/// Subscribes `f` and immediately evaluates it once against the current value.
	///
	/// If `f`, while running, causes itself to be re-fired (because it writes a cell this
	/// handle transitively depends on), that recursive fire is coalesced: a "run again" flag
	/// is set and the outer invocation loops instead of recursing, so a self-stabilising
	/// observer terminates on a bounded stack rather than overflowing it.
	pub fn observe(&self, f: impl FnMut(I::Value) + Send + 'static) -> Lifetime {
		let observer = Arc::new(Observer {
			handle: self.clone(),
			closure: Mutex::new(Box::new(f)),
			running: AtomicBool::new(false),
			pending: AtomicBool::new(false),
		});
		let weak: Weak<dyn Notifiable> = Arc::downgrade(&observer);
		let lifetime = self
			.when_changed_notify(weak)
			.with_keep_alive(Arc::clone(&observer));
		observer.fire();
		lifetime
	}

	/// The lazily-constructed gauge exposing whether this cell currently has any live
	/// observer. Constructed on first call; later calls return the same underlying cell.
	pub fn is_bound(&self) -> Handle<BoolGaugeInner> {
		let core = self.0.core();
		let mut guard = core.is_bound.lock();
		if guard.is_none() {
			let current = core.observers.any_live();
			*guard = Some(BoolGaugeInner::new(current));
		}
		guard.as_ref().expect("just inserted").clone()
	}
}

type ObserveClosure<V> = Box<dyn FnMut(V) + Send>;

struct Observer<I: CellInner> {
	handle: Handle<I>,
	closure: Mutex<ObserveClosure<I::Value>>,
	running: AtomicBool,
	pending: AtomicBool,
}

impl<I: CellInner> Observer<I> {
	fn fire(&self) {
		if self.running.swap(true, Ordering::AcqRel) {
			// Reentrant: the closure currently running (somewhere up this same call stack)
			// caused this fire. Record that another pass is owed and return without recursing.
			self.pending.store(true, Ordering::Release);
			return;
		}
		loop {
			self.pending.store(false, Ordering::Release);
			let value = self.handle.read();
			(self.closure.lock())(value);
			if !self.pending.load(Ordering::Acquire) {
				break;
			}
		}
		self.running.store(false, Ordering::Release);
	}
}

impl<I: CellInner> Notifiable for Observer<I> {
	fn mark_as_changed(&self) {
		self.fire();
	}
}

/// The internal cell kind backing every `is_bound` gauge. Exposed only so that
/// [`Handle::is_bound`]'s return type is nameable; not constructible outside this crate.
#[doc(hidden)]
pub struct BoolGaugeInner {
	core: Core<bool>,
	weak_self: Weak<BoolGaugeInner>,
}

impl BoolGaugeInner {
	fn new(initial: bool) -> Handle<Self> {
		let arc = Arc::new_cyclic(|weak| BoolGaugeInner {
			core: Core::new_with_value(initial),
			weak_self: weak.clone(),
		});
		Handle::from_arc(arc)
	}

	fn set(&self, value: bool) {
		let mut state = self.core.state.lock();
		if state.cached != Some(value) {
			state.cached = Some(value);
			drop(state);
			self.core.observers.fire_all();
		}
	}
}

impl CellInner for BoolGaugeInner {
	type Value = bool;

	fn core(&self) -> &Core<bool> {
		&self.core
	}

	fn weak_self(&self) -> Weak<Self> {
		self.weak_self.clone()
	}

	fn compute_value(&self) -> bool {
		unreachable!("compute_value invoked on an is_bound gauge")
	}
}
