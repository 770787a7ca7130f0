//! [`ArrayCell`]: a [`StoredCell`] wrapping an ordered sequence, with range-replace events
//! reported through a lazily-created `last_replacement` cell.

use std::ops::{Deref, Range};

use parking_lot::Mutex;

use crate::stored::StoredCell;

/// Describes one range-replacement performed on an [`ArrayCell`]: the half-open index range
/// that was spliced, the elements that previously occupied it, and the elements that now do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replacement<T> {
	/// The half-open index range that was spliced.
	pub range: Range<usize>,
	/// The elements previously occupying `range`.
	pub replaced_elements: Vec<T>,
	/// The elements now occupying that position (which may be a different length).
	pub new_elements: Vec<T>,
}

/// A cell wrapping an ordered sequence. Whole-value writes behave like a [`StoredCell`];
/// range replacements splice in place and record a [`Replacement`] descriptor.
///
/// Writes always notify observers, matching this engine's conservative default: scalar
/// derived reads (`first`, `last`, `count`) fire on *any* write, not only ones that change
/// that particular scalar.
pub struct ArrayCell<T: Clone + Send + Sync + 'static> {
	values: StoredCell<Vec<T>>,
	last_replacement: Mutex<Option<StoredCell<Option<Replacement<T>>>>>,
}

impl<T: Clone + Send + Sync + 'static> ArrayCell<T> {
	pub(crate) fn new(initial: Vec<T>) -> Self {
		ArrayCell {
			values: StoredCell::new_opaque(initial),
			last_replacement: Mutex::new(None),
		}
	}

	/// The full current sequence. Registers a dependency on this cell.
	pub fn read(&self) -> Vec<T> {
		self.values.read()
	}

	/// Number of elements currently in the sequence.
	pub fn count(&self) -> usize {
		self.values.read().len()
	}

	/// The first element, if any.
	pub fn first(&self) -> Option<T> {
		self.values.read().into_iter().next()
	}

	/// The last element, if any.
	pub fn last(&self) -> Option<T> {
		self.values.read().into_iter().next_back()
	}

	/// The element at `index`, if in bounds.
	pub fn get(&self, index: usize) -> Option<T> {
		self.values.read().get(index).cloned()
	}

	/// The index of the first element satisfying `predicate`, if any.
	pub fn index_of(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
		self.values.read().iter().position(|v| predicate(v))
	}

	/// Replaces the whole sequence, exactly like writing a [`StoredCell`].
	pub fn write(&self, new_values: Vec<T>) {
		self.values.write(new_values);
	}

	/// Splices `new_elements` into `range`, firing observers and recording the replacement
	/// descriptor (if [`ArrayCell::last_replacement`] has been constructed).
	pub fn replace_range(&self, range: Range<usize>, new_elements: Vec<T>) {
		let mut current = self.values.read();
		let replaced_elements: Vec<T> = current.splice(range.clone(), new_elements.clone()).collect();
		self.values.write(current);
		self.record_replacement(Replacement {
			range,
			replaced_elements,
			new_elements,
		});
	}

	/// Inserts `value` at `at`, shorthand for a single-element `replace_range(at..at, …)`.
	pub fn insert(&self, value: T, at: usize) {
		self.replace_range(at..at, vec![value]);
	}

	/// Removes the elements in `range`, shorthand for `replace_range(range, vec![])`.
	pub fn remove_range(&self, range: Range<usize>) {
		self.replace_range(range, Vec::new());
	}

	/// The lazily-constructed cell reporting the most recent [`Replacement`]. `None` until
	/// the first range replacement happens after this is first observed.
	pub fn last_replacement(&self) -> StoredCell<Option<Replacement<T>>> {
		let mut guard = self.last_replacement.lock();
		guard
			.get_or_insert_with(|| StoredCell::new_opaque(None))
			.clone()
	}

	fn record_replacement(&self, replacement: Replacement<T>) {
		if let Some(cell) = &*self.last_replacement.lock() {
			cell.write(Some(replacement));
		}
	}
}

// Forwards the base `Cell` operations (`when_changed`, `observe`, `mark_as_changed`,
// `is_bound`, `when_changed_notify`) to the cell backing the whole sequence, so subscribing to
// an `ArrayCell` directly sees both whole-value writes and range replacements.
impl<T: Clone + Send + Sync + 'static> Deref for ArrayCell<T> {
	type Target = StoredCell<Vec<T>>;

	fn deref(&self) -> &Self::Target {
		&self.values
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn whole_value_write_replaces_contents() {
		let arr = ArrayCell::new(vec![1, 2, 3]);
		assert_eq!(arr.read(), vec![1, 2, 3]);
		arr.write(vec![4, 5]);
		assert_eq!(arr.read(), vec![4, 5]);
		assert_eq!(arr.count(), 2);
	}

	#[test]
	fn range_replacement_reports_descriptor_and_notifies_twice() {
		let arr = ArrayCell::new(vec![1]);
		let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
		let last_replacement = arr.last_replacement();
		let _lt = {
			let seen = std::sync::Arc::clone(&seen);
			last_replacement.observe(move |v| seen.lock().push(v))
		};

		arr.insert(0, 0);

		assert_eq!(arr.read(), vec![0, 1]);
		assert_eq!(
			seen.lock().last().unwrap(),
			&Some(Replacement {
				range: 0..0,
				replaced_elements: vec![],
				new_elements: vec![0],
			})
		);
		assert_eq!(seen.lock().len(), 2); // initial `None` + the one change
	}

	#[test]
	fn base_cell_operations_forward_to_the_whole_sequence() {
		let arr = ArrayCell::new(vec![1]);
		assert!(!arr.is_bound().read());
		let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
		let _lt = {
			let seen = std::sync::Arc::clone(&seen);
			arr.when_changed(move || {
				seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			})
		};
		assert!(arr.is_bound().read());
		arr.insert(0, 0); // a range replacement, not just a whole-value write
		assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
		arr.mark_as_changed();
		assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 2);
	}

	#[test]
	fn first_last_count_track_the_current_sequence() {
		let arr = ArrayCell::new(vec![1, 2, 3]);
		assert_eq!(arr.first(), Some(1));
		assert_eq!(arr.last(), Some(3));
		assert_eq!(arr.count(), 3);
		assert_eq!(arr.index_of(|v| *v == 2), Some(1));
	}
}
