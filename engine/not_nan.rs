use std::{
	cmp::Ordering,
	hash::{Hash, Hasher},
};

/// A `NotNan` is an `f64` that is not `NaN`. Missing values are encoded as `NaN`, so every present value, including the infinities, is a `NotNan`. Because `NaN` is excluded, `NotNan` has a total order and can be used as a key in a `BTreeMap` to sort the distinct values of a numeric attribute.
#[derive(Clone, Copy, Debug)]
pub struct NotNan(f64);

impl NotNan {
	/// Wrap `value`, or return `None` if it is `NaN`.
	pub fn new(value: f64) -> Option<Self> {
		if value.is_nan() {
			None
		} else {
			Some(Self(value))
		}
	}

	pub fn get(self) -> f64 {
		self.0
	}
}

impl PartialEq for NotNan {
	fn eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}
}

impl Eq for NotNan {}

impl PartialOrd for NotNan {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for NotNan {
	fn cmp(&self, other: &Self) -> Ordering {
		// Neither side is NaN so the comparison is always defined.
		self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
	}
}

impl Hash for NotNan {
	fn hash<H: Hasher>(&self, state: &mut H) {
		// 0.0 and -0.0 compare equal so they must hash equal too.
		let value = if self.0 == 0.0 { 0.0f64 } else { self.0 };
		value.to_bits().hash(state);
	}
}

/// Return the split value separating two adjacent distinct values `lower < upper`. The split must satisfy `lower <= split < upper` and must never be `+inf`, which terminates every split array. This is the midpoint when it is representable, and otherwise the closest value at or above `lower` that still separates the two.
pub fn split_between(lower: f64, upper: f64) -> f64 {
	// Halving first cannot overflow.
	let midpoint = lower / 2.0 + upper / 2.0;
	if midpoint.is_finite() && lower <= midpoint && midpoint < upper {
		midpoint
	} else if lower == f64::NEG_INFINITY && f64::MIN < upper {
		f64::MIN
	} else {
		lower
	}
}

#[test]
fn test_not_nan_rejects_only_nan() {
	assert!(NotNan::new(f64::NAN).is_none());
	assert_eq!(NotNan::new(f64::INFINITY).map(NotNan::get), Some(f64::INFINITY));
	assert_eq!(NotNan::new(1.5).map(NotNan::get), Some(1.5));
}

#[test]
fn test_not_nan_sorts_in_a_btree_map() {
	let mut values = std::collections::BTreeMap::new();
	for value in &[3.0, -1.0, f64::INFINITY, 2.0, -1.0, f64::NEG_INFINITY, 0.0, -0.0] {
		*values.entry(NotNan::new(*value).unwrap()).or_insert(0) += 1;
	}
	let keys: Vec<f64> = values.keys().map(|key| key.get()).collect();
	assert_eq!(
		keys,
		vec![f64::NEG_INFINITY, -1.0, 0.0, 2.0, 3.0, f64::INFINITY]
	);
	assert_eq!(values[&NotNan::new(-1.0).unwrap()], 2);
	assert_eq!(values[&NotNan::new(0.0).unwrap()], 2);
}

#[test]
fn test_split_between() {
	assert_eq!(split_between(2.0, 3.0), 2.5);
	assert_eq!(split_between(-1.7e308, 1.7e308), 0.0);
	assert_eq!(split_between(f64::MAX / 2.0, f64::MAX), f64::MAX * 0.75);
	assert_eq!(split_between(4.0, f64::INFINITY), 4.0);
	assert_eq!(split_between(f64::NEG_INFINITY, -4.0), f64::MIN);
	assert_eq!(split_between(f64::NEG_INFINITY, f64::MIN), f64::NEG_INFINITY);
	assert_eq!(split_between(f64::NEG_INFINITY, f64::INFINITY), f64::MIN);
	// Adjacent floats have no value strictly between them.
	let next = f64::from_bits(1.0f64.to_bits() + 1);
	let split = split_between(1.0, next);
	assert!(1.0 <= split && split < next);
}
