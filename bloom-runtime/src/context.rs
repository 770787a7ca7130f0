//! The per-thread dependency-capture context.
//!
//! Reading a cell inside [`Context::with_new_context`] registers that cell, exactly once,
//! as a dependency of the innermost active frame. This is the "ambient state" that lets
//! dependency tracking stay implicit: nothing about a `computed` closure's signature needs
//! to mention which cells it reads.

use std::{cell::RefCell, sync::Arc};

use crate::notify::Changeable;

#[derive(Default)]
struct Frame {
	dependencies: Vec<Arc<dyn Changeable>>,
	expected: Option<Vec<Arc<dyn Changeable>>>,
}

thread_local! {
	static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Namespace for the thread-local dependency-capture stack. Zero-sized; all operations are
/// associated functions operating on the calling thread's stack.
pub struct Context;

impl Context {
	/// Pushes a fresh frame, runs `body`, and pops the frame again — even if `body` panics,
	/// so that a panicking computation never leaves a stale frame contaminating whatever
	/// evaluation resumes on this thread afterwards.
	pub fn with_new_context<R>(body: impl FnOnce() -> R) -> R {
		STACK.with(|stack| stack.borrow_mut().push(Frame::default()));
		let _pop_on_return_or_unwind = scopeguard::guard((), |()| {
			STACK.with(|stack| {
				stack.borrow_mut().pop();
			});
		});
		body()
	}

	/// Appends `dependency` to the topmost frame, if any is active. Deduplicates by
	/// pointer identity so that reading the same cell twice in one evaluation only records
	/// it once, per the Context invariant.
	pub fn add_dependency(dependency: Arc<dyn Changeable>) {
		STACK.with(|stack| {
			let mut stack = stack.borrow_mut();
			if let Some(frame) = stack.last_mut() {
				if !frame
					.dependencies
					.iter()
					.any(|existing| Arc::ptr_eq(existing, &dependency))
				{
					frame.dependencies.push(dependency);
				}
			}
		});
	}

	/// Attaches a prior run's dependency set to the topmost frame, for later comparison via
	/// [`Context::dependencies_differ`]. Has no effect if no frame is active.
	pub fn set_expected_dependencies(expected: Vec<Arc<dyn Changeable>>) {
		STACK.with(|stack| {
			if let Some(frame) = stack.borrow_mut().last_mut() {
				frame.expected = Some(expected);
			}
		});
	}

	/// True iff there is no active frame, no expected set was attached, or the expected set
	/// differs from what has been observed so far — by length or by (order-sensitive)
	/// pointer identity.
	pub fn dependencies_differ() -> bool {
		STACK.with(|stack| {
			let stack = stack.borrow();
			match stack.last() {
				None => true,
				Some(frame) => match &frame.expected {
					None => true,
					Some(expected) => {
						expected.len() != frame.dependencies.len()
							|| !expected
								.iter()
								.zip(frame.dependencies.iter())
								.all(|(a, b)| Arc::ptr_eq(a, b))
					}
				},
			}
		})
	}

	/// Clears the topmost frame's observed dependency list, without touching its expected
	/// set. Used before dropping a superseded subscription set, so that any dependency
	/// registrations caused by that drop don't leak into this frame's new dependency set.
	pub fn reset_dependencies() {
		STACK.with(|stack| {
			if let Some(frame) = stack.borrow_mut().last_mut() {
				frame.dependencies.clear();
			}
		});
	}

	/// A snapshot of the topmost frame's currently-observed dependency set.
	pub fn current_dependencies() -> Vec<Arc<dyn Changeable>> {
		STACK.with(|stack| {
			stack
				.borrow()
				.last()
				.map(|frame| frame.dependencies.clone())
				.unwrap_or_default()
		})
	}

	/// Runs `body` with a frame pushed that discards everything recorded in it, i.e. outside
	/// of any outer dependency recording. Used for callbacks (like `begin_observing`
	/// side-effects) that must not accidentally bind themselves into whatever computation
	/// happens to be running on this thread right now.
	pub fn run_detached<R>(body: impl FnOnce() -> R) -> R {
		Context::with_new_context(body)
	}
}
