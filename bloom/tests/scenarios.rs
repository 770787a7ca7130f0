//! Literal end-to-end scenarios, one test per numbered scenario plus the surrounding
//! invariants and laws.

use std::sync::{
	atomic::{AtomicI32, AtomicUsize, Ordering},
	Arc,
};

use bloom::{attachment, computed, create, create_array, trigger};

#[test]
fn scenario_1_simple_binding() {
	let b = create(1);
	assert_eq!(b.read(), 1);
	b.write(2);
	assert_eq!(b.read(), 2);
}

#[test]
fn scenario_2_computed_dependency_change() {
	let a = create(1);
	let b = create(2);
	let c = {
		let (a, b) = (a.clone(), b.clone());
		computed(move || if a.read() == 0 { b.read() } else { a.read() })
	};
	assert_eq!(c.read(), 1);
	a.write(3);
	assert_eq!(c.read(), 3);
	a.write(0);
	assert_eq!(c.read(), 2);
	b.write(4);
	assert_eq!(c.read(), 4);
	a.write(5);
	assert_eq!(c.read(), 5);
	b.write(6); // b is no longer a dependency of c
	assert_eq!(c.read(), 5);
}

#[test]
fn scenario_3_observer_iterative_self_stabilisation() {
	let b = create(1);
	let mut lifetime = {
		let b = b.clone();
		b.observe(move |v| {
			if v < 5 {
				b.write(v + 1);
			}
		})
	};
	lifetime.forever(); // `.pin()` in the specification
	assert_eq!(b.read(), 5);
	b.write(0);
	assert_eq!(b.read(), 5); // the observer must not stack-overflow getting back here
}

#[test]
fn scenario_4_trigger_coalescing() {
	let b = create(1);
	let read_value = Arc::new(AtomicI32::new(0));
	let update_count = Arc::new(AtomicUsize::new(0));

	let (coarse_trigger, mut lifetime) = {
		let b = b.clone();
		let read_value = Arc::clone(&read_value);
		let update_count = Arc::clone(&update_count);
		trigger(
			move || read_value.store(b.read(), Ordering::SeqCst),
			move || {
				update_count.fetch_add(1, Ordering::SeqCst);
			},
		)
	};

	b.write(2);
	assert_eq!(update_count.load(Ordering::SeqCst), 0);

	coarse_trigger.invoke();
	assert_eq!(read_value.load(Ordering::SeqCst), 2);
	assert_eq!(update_count.load(Ordering::SeqCst), 0);

	b.write(3);
	b.write(4);
	assert_eq!(update_count.load(Ordering::SeqCst), 1);

	coarse_trigger.invoke();
	assert_eq!(read_value.load(Ordering::SeqCst), 4);
	b.write(5);
	assert_eq!(update_count.load(Ordering::SeqCst), 2);

	lifetime.done();
	b.write(6);
	assert_eq!(update_count.load(Ordering::SeqCst), 2);
}

#[test]
fn scenario_5_array_range_replacement() {
	let arr = create_array(vec![1]);
	let last_replacement = arr.last_replacement();
	let calls = Arc::new(AtomicUsize::new(0));
	let _lt = {
		let calls = Arc::clone(&calls);
		last_replacement.observe(move |_| {
			calls.fetch_add(1, Ordering::SeqCst);
		})
	};

	arr.insert(0, 0);

	assert_eq!(arr.read(), vec![0, 1]);
	let replacement = last_replacement.read().expect("a replacement happened");
	assert_eq!(replacement.range, 0..0);
	assert_eq!(replacement.replaced_elements, Vec::<i32>::new());
	assert_eq!(replacement.new_elements, vec![0]);
	assert_eq!(calls.load(Ordering::SeqCst), 2); // initial `None` + the one change
}

#[test]
fn scenario_6_computed_release() {
	let a = create(1);
	let is_bound;
	{
		let c = {
			let a = a.clone();
			computed(move || a.read() + 1)
		};
		is_bound = a.is_bound();
		let fired = Arc::new(AtomicUsize::new(0));
		let _lt = {
			let fired = Arc::clone(&fired);
			c.when_changed(move || {
				fired.fetch_add(1, Ordering::SeqCst);
			})
		};
		a.write(10);
		assert_eq!(fired.load(Ordering::SeqCst), 1);
		assert!(is_bound.read());
		// `c` and its subscription drop at the end of this scope.
	}
	a.write(20); // no observer left to fire, no resources retained
	assert!(!is_bound.read());
}

#[test]
fn law_observe_stops_firing_after_lifetime_done() {
	let b = create(1);
	let seen = Arc::new(AtomicUsize::new(0));
	let mut lifetime = {
		let seen = Arc::clone(&seen);
		b.observe(move |_| {
			seen.fetch_add(1, Ordering::SeqCst);
		})
	};
	assert_eq!(seen.load(Ordering::SeqCst), 1); // fires once immediately
	b.write(2);
	assert_eq!(seen.load(Ordering::SeqCst), 2);
	lifetime.done();
	b.write(3);
	assert_eq!(seen.load(Ordering::SeqCst), 2); // no further firings
}

#[test]
fn law_composite_lifetime_runs_every_child() {
	use bloom::Lifetime;

	let a = create(1);
	let b = create(2);
	let a_fired = Arc::new(AtomicUsize::new(0));
	let b_fired = Arc::new(AtomicUsize::new(0));

	let lt_a = {
		let a_fired = Arc::clone(&a_fired);
		a.when_changed(move || {
			a_fired.fetch_add(1, Ordering::SeqCst);
		})
	};
	let lt_b = {
		let b_fired = Arc::clone(&b_fired);
		b.when_changed(move || {
			b_fired.fetch_add(1, Ordering::SeqCst);
		})
	};

	let mut combined = Lifetime::combine([lt_a, lt_b]);
	combined.done();

	a.write(5);
	b.write(6);
	assert_eq!(a_fired.load(Ordering::SeqCst), 0);
	assert_eq!(b_fired.load(Ordering::SeqCst), 0);
}

#[test]
fn law_attachment_reads_through_to_current_target() {
	let c = create(10);
	let point = attachment(0);
	assert_eq!(point.read(), 0);
	point.attach_to(&c);
	assert_eq!(point.read(), 10);
	c.write(11);
	assert_eq!(point.read(), 11);
}

#[test]
fn invariant_computed_cache_hit_skips_recompute() {
	let a = create(1);
	let calls = Arc::new(AtomicUsize::new(0));
	let c = {
		let a = a.clone();
		let calls = Arc::clone(&calls);
		computed(move || {
			calls.fetch_add(1, Ordering::SeqCst);
			a.read()
		})
	};
	c.read();
	c.read();
	c.read();
	assert_eq!(calls.load(Ordering::SeqCst), 1);
}
