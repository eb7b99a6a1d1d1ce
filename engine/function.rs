/*!
Piecewise constant functions of one attribute, the artifacts the splitters produce and the boosting loop accumulates.

A function has a strictly increasing array of splits that ends in `+inf`, and one prediction per split. Segment `i` is the half open interval `(splits[i - 1], splits[i]]`, so the last segment is unbounded above and the first is unbounded below. Rows whose attribute is missing get `prediction_on_missing`.
*/

use crate::error::{Error, Result};
use itertools::Itertools;
use std::{cmp::Ordering, convert::TryFrom};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawFunction1D")]
pub struct Function1D {
	pub attribute: usize,
	#[serde(serialize_with = "splits_serde::serialize")]
	pub splits: Vec<f64>,
	pub predictions: Vec<f64>,
	pub prediction_on_missing: f64,
}

/// Deserialized functions go through `Function1D::new` so a stored function cannot break the split invariants.
#[derive(serde::Deserialize)]
struct RawFunction1D {
	attribute: usize,
	#[serde(deserialize_with = "splits_serde::deserialize")]
	splits: Vec<f64>,
	predictions: Vec<f64>,
	prediction_on_missing: f64,
}

impl TryFrom<RawFunction1D> for Function1D {
	type Error = Error;
	fn try_from(raw: RawFunction1D) -> Result<Self> {
		Self::new(
			raw.attribute,
			raw.splits,
			raw.predictions,
			raw.prediction_on_missing,
		)
	}
}

impl Function1D {
	/// Create a function, checking that the splits are strictly increasing, end in `+inf`, and that there is one prediction per split.
	pub fn new(
		attribute: usize,
		splits: Vec<f64>,
		predictions: Vec<f64>,
		prediction_on_missing: f64,
	) -> Result<Self> {
		validate_splits(&splits)?;
		if predictions.len() != splits.len() {
			return Err(Error::InvalidFunction(format!(
				"{} predictions for {} splits",
				predictions.len(),
				splits.len()
			)));
		}
		Ok(Self {
			attribute,
			splits,
			predictions,
			prediction_on_missing,
		})
	}

	/// The function that is 0 everywhere.
	pub fn zero(attribute: usize) -> Self {
		Self::constant(attribute, 0.0, 0.0)
	}

	/// The function with a single segment.
	pub fn constant(attribute: usize, prediction: f64, prediction_on_missing: f64) -> Self {
		Self {
			attribute,
			splits: vec![f64::INFINITY],
			predictions: vec![prediction],
			prediction_on_missing,
		}
	}

	pub fn n_segments(&self) -> usize {
		self.splits.len()
	}

	/// Return the index of the segment containing `value`, the index of the first split `>= value`. `value` must not be `NaN`.
	pub fn segment_index(&self, value: f64) -> usize {
		segment_index(&self.splits, value)
	}

	pub fn evaluate(&self, value: f64) -> f64 {
		if value.is_nan() {
			self.prediction_on_missing
		} else {
			self.predictions[self.segment_index(value)]
		}
	}

	/// Add two functions of the same attribute. The result is split at the union of both functions' splits, and both functions are evaluated at every split of the union, since the two may be segmented differently.
	pub fn add(&self, other: &Function1D) -> Result<Function1D> {
		check_attribute(self.attribute, other.attribute)?;
		let splits: Vec<f64> = itertools::merge(self.splits.iter(), other.splits.iter())
			.cloned()
			.dedup()
			.collect();
		let predictions = splits
			.iter()
			.map(|split| self.evaluate(*split) + other.evaluate(*split))
			.collect();
		Ok(Function1D {
			attribute: self.attribute,
			splits,
			predictions,
			prediction_on_missing: self.prediction_on_missing + other.prediction_on_missing,
		})
	}

	/// Scale every prediction by `factor`.
	pub fn multiply(&mut self, factor: f64) {
		for prediction in self.predictions.iter_mut() {
			*prediction *= factor;
		}
		self.prediction_on_missing *= factor;
	}

	pub fn scaled(&self, factor: f64) -> Function1D {
		let mut function = self.clone();
		function.multiply(factor);
		function
	}

	/// Fold an ensemble of functions over the same attribute into one function equal to their sum.
	pub fn compress(functions: &[Function1D]) -> Result<Function1D> {
		let first = functions.first().ok_or(Error::EmptyEnsemble)?;
		for function in functions.iter() {
			check_attribute(first.attribute, function.attribute)?;
		}
		let splits: Vec<f64> = functions
			.iter()
			.map(|function| function.splits.iter().cloned())
			.kmerge()
			.dedup()
			.collect();
		let predictions = splits
			.iter()
			.map(|split| {
				functions
					.iter()
					.map(|function| function.evaluate(*split))
					.sum()
			})
			.collect();
		let prediction_on_missing = functions
			.iter()
			.map(|function| function.prediction_on_missing)
			.sum();
		Ok(Function1D {
			attribute: first.attribute,
			splits,
			predictions,
			prediction_on_missing,
		})
	}

	/// Fold the functions trained on `n_bags` bagging replicates into their average.
	pub fn compress_bagged(functions: &[Function1D], n_bags: usize) -> Result<Function1D> {
		if n_bags == 0 {
			return Err(Error::InvalidOptions("n_bags must be positive".to_owned()));
		}
		let mut function = Self::compress(functions)?;
		function.multiply(1.0 / n_bags as f64);
		Ok(function)
	}

	/// Evaluate the function at every state of a discrete attribute with `n_states` states. The result is indexed by state.
	pub fn to_lookup_table(&self, n_states: usize) -> Vec<f64> {
		(0..n_states)
			.map(|state| self.evaluate(state as f64))
			.collect()
	}
}

pub(crate) fn segment_index(splits: &[f64], value: f64) -> usize {
	let index = match splits
		.binary_search_by(|split| split.partial_cmp(&value).unwrap_or(Ordering::Less))
	{
		Ok(index) => index,
		Err(index) => index,
	};
	index.min(splits.len() - 1)
}

pub(crate) fn validate_splits(splits: &[f64]) -> Result<()> {
	match splits.last() {
		Some(last) if *last == f64::INFINITY => {}
		_ => {
			return Err(Error::InvalidFunction(
				"splits must end with +inf".to_owned(),
			))
		}
	}
	if splits.iter().any(|split| split.is_nan()) {
		return Err(Error::InvalidFunction("splits must not be NaN".to_owned()));
	}
	if splits.iter().tuple_windows().any(|(a, b)| a >= b) {
		return Err(Error::InvalidFunction(
			"splits must be strictly increasing".to_owned(),
		));
	}
	Ok(())
}

fn check_attribute(left: usize, right: usize) -> Result<()> {
	if left == right {
		Ok(())
	} else {
		Err(Error::AttributeMismatch {
			left: vec![left],
			right: vec![right],
		})
	}
}

/// JSON has no infinity, so split arrays are serialized without their terminal `+inf` and it is restored on deserialization.
pub(crate) mod splits_serde {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	pub fn serialize<S: Serializer>(splits: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
		let finite = match splits.split_last() {
			Some((last, rest)) if *last == f64::INFINITY => rest,
			_ => splits,
		};
		finite.serialize(serializer)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
		let mut splits = Vec::<f64>::deserialize(deserializer)?;
		splits.push(f64::INFINITY);
		Ok(splits)
	}
}

#[cfg(test)]
fn assert_functions_close(a: &Function1D, b: &Function1D) {
	assert_eq!(a.attribute, b.attribute);
	assert_eq!(a.splits, b.splits);
	for (a, b) in a.predictions.iter().zip(b.predictions.iter()) {
		assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
	}
	assert!((a.prediction_on_missing - b.prediction_on_missing).abs() < 1e-9);
}

#[cfg(test)]
fn step_function() -> Function1D {
	Function1D::new(
		3,
		vec![1.5, 4.0, f64::INFINITY],
		vec![-1.0, 2.0, 0.5],
		0.25,
	)
	.unwrap()
}

#[test]
fn test_evaluate_uses_half_open_segments() {
	let function = step_function();
	assert_eq!(function.evaluate(f64::NEG_INFINITY), -1.0);
	assert_eq!(function.evaluate(1.5), -1.0);
	assert_eq!(function.evaluate(1.6), 2.0);
	assert_eq!(function.evaluate(4.0), 2.0);
	assert_eq!(function.evaluate(100.0), 0.5);
	assert_eq!(function.evaluate(f64::INFINITY), 0.5);
	assert_eq!(function.evaluate(f64::NAN), 0.25);
}

#[test]
fn test_new_rejects_broken_invariants() {
	assert!(Function1D::new(0, vec![1.0, 2.0], vec![0.0, 0.0], 0.0).is_err());
	assert!(Function1D::new(0, vec![2.0, 1.0, f64::INFINITY], vec![0.0; 3], 0.0).is_err());
	assert!(Function1D::new(0, vec![1.0, f64::INFINITY], vec![0.0], 0.0).is_err());
	assert!(Function1D::new(0, vec![], vec![], 0.0).is_err());
}

#[test]
fn test_add_zero_is_identity() {
	let function = step_function();
	let sum = function.add(&Function1D::zero(3)).unwrap();
	assert_eq!(sum, function);
}

#[test]
fn test_add_merges_split_sets() {
	let f = step_function();
	let g = Function1D::new(3, vec![2.0, 4.0, f64::INFINITY], vec![10.0, 20.0, 30.0], 1.0).unwrap();
	let fg = f.add(&g).unwrap();
	let gf = g.add(&f).unwrap();
	assert_eq!(fg.splits, vec![1.5, 2.0, 4.0, f64::INFINITY]);
	assert_eq!(fg.predictions, vec![9.0, 12.0, 22.0, 30.5]);
	assert_eq!(fg.prediction_on_missing, 1.25);
	assert_functions_close(&fg, &gf);
	for x in &[-3.0, 1.5, 1.7, 2.0, 3.0, 4.0, 9.0] {
		assert!((fg.evaluate(*x) - f.evaluate(*x) - g.evaluate(*x)).abs() < 1e-12);
	}
}

#[test]
fn test_add_rejects_different_attributes() {
	let result = step_function().add(&Function1D::zero(4));
	assert!(matches!(result, Err(Error::AttributeMismatch { .. })));
}

#[test]
fn test_compress_bagged_copies_is_identity() {
	let function = step_function();
	let copies = vec![function.clone(); 7];
	let compressed = Function1D::compress_bagged(&copies, 7).unwrap();
	assert_functions_close(&compressed, &function);
}

#[test]
fn test_compress_sums_ensemble() {
	let f = step_function();
	let g = Function1D::new(3, vec![0.0, f64::INFINITY], vec![1.0, -1.0], 0.0).unwrap();
	let h = Function1D::constant(3, 2.0, 2.0);
	let compressed = Function1D::compress(&[f.clone(), g.clone(), h.clone()]).unwrap();
	assert_eq!(compressed.splits, vec![0.0, 1.5, 4.0, f64::INFINITY]);
	let pairwise = f.add(&g).unwrap().add(&h).unwrap();
	assert_functions_close(&compressed, &pairwise);
	assert!(matches!(
		Function1D::compress(&[]),
		Err(Error::EmptyEnsemble)
	));
}

#[test]
fn test_to_lookup_table() {
	let function =
		Function1D::new(0, vec![0.5, 2.5, f64::INFINITY], vec![1.0, 2.0, 3.0], 0.0).unwrap();
	assert_eq!(function.to_lookup_table(5), vec![1.0, 2.0, 2.0, 3.0, 3.0]);
}

#[test]
fn test_json_round_trip_restores_infinite_split() {
	let function = step_function();
	let json = serde_json::to_string(&function).unwrap();
	assert_eq!(
		json,
		r#"{"attribute":3,"splits":[1.5,4.0],"predictions":[-1.0,2.0,0.5],"prediction_on_missing":0.25}"#
	);
	let parsed: Function1D = serde_json::from_str(&json).unwrap();
	assert_eq!(parsed, function);
}

#[test]
fn test_deserialize_rejects_broken_invariants() {
	let json = r#"{"attribute":0,"splits":[1.0],"predictions":[1.0],"prediction_on_missing":0.0}"#;
	let result = serde_json::from_str::<Function1D>(json);
	assert!(result.is_err());
	let json = r#"{"attribute":0,"splits":[2.0,1.0],"predictions":[1.0,2.0,3.0],"prediction_on_missing":0.0}"#;
	assert!(serde_json::from_str::<Function1D>(json).is_err());
	let json = r#"{"attribute":0,"splits":[1.0],"predictions":[1.0,2.0],"prediction_on_missing":0.0}"#;
	let parsed = serde_json::from_str::<Function1D>(json).unwrap();
	assert_eq!(parsed.splits, vec![1.0, f64::INFINITY]);
}
