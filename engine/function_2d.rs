/*!
Piecewise constant functions of a pair of attributes. The domain is a grid: `splits1` segments attribute 1 the same way a [`Function1D`](../function/struct.Function1D.html) does, `splits2` segments attribute 2, and `predictions[[i, j]]` is the value on the cell in segment `i` of attribute 1 and segment `j` of attribute 2.

When exactly one of the attributes is missing, the function falls back to a one dimensional lookup along the other attribute, and when both are missing to a single scalar.
*/

use crate::{
	error::{Error, Result},
	function::{segment_index, splits_serde, validate_splits},
};
use itertools::Itertools;
use ndarray::prelude::*;
use std::convert::TryFrom;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawFunction2D")]
pub struct Function2D {
	pub attributes: (usize, usize),
	#[serde(serialize_with = "splits_serde::serialize")]
	pub splits1: Vec<f64>,
	#[serde(serialize_with = "splits_serde::serialize")]
	pub splits2: Vec<f64>,
	/// (splits1.len(), splits2.len())
	pub predictions: Array2<f64>,
	/// The predictions when attribute 1 is missing, by segment of attribute 2.
	pub predictions_on_missing1: Vec<f64>,
	/// The predictions when attribute 2 is missing, by segment of attribute 1.
	pub predictions_on_missing2: Vec<f64>,
	pub prediction_on_missing_both: f64,
}

#[derive(serde::Deserialize)]
struct RawFunction2D {
	attributes: (usize, usize),
	#[serde(deserialize_with = "splits_serde::deserialize")]
	splits1: Vec<f64>,
	#[serde(deserialize_with = "splits_serde::deserialize")]
	splits2: Vec<f64>,
	predictions: Array2<f64>,
	predictions_on_missing1: Vec<f64>,
	predictions_on_missing2: Vec<f64>,
	prediction_on_missing_both: f64,
}

impl TryFrom<RawFunction2D> for Function2D {
	type Error = Error;
	fn try_from(raw: RawFunction2D) -> Result<Self> {
		Self::new(
			raw.attributes,
			raw.splits1,
			raw.splits2,
			raw.predictions,
			raw.predictions_on_missing1,
			raw.predictions_on_missing2,
			raw.prediction_on_missing_both,
		)
	}
}

impl Function2D {
	pub fn new(
		attributes: (usize, usize),
		splits1: Vec<f64>,
		splits2: Vec<f64>,
		predictions: Array2<f64>,
		predictions_on_missing1: Vec<f64>,
		predictions_on_missing2: Vec<f64>,
		prediction_on_missing_both: f64,
	) -> Result<Self> {
		validate_splits(&splits1)?;
		validate_splits(&splits2)?;
		if predictions.dim() != (splits1.len(), splits2.len()) {
			return Err(Error::InvalidFunction(format!(
				"predictions have shape {:?} but the splits require ({}, {})",
				predictions.dim(),
				splits1.len(),
				splits2.len()
			)));
		}
		if predictions_on_missing1.len() != splits2.len()
			|| predictions_on_missing2.len() != splits1.len()
		{
			return Err(Error::InvalidFunction(
				"missing value predictions do not match the splits".to_owned(),
			));
		}
		Ok(Self {
			attributes,
			splits1,
			splits2,
			predictions,
			predictions_on_missing1,
			predictions_on_missing2,
			prediction_on_missing_both,
		})
	}

	/// The function that is 0 everywhere, with a single cell.
	pub fn zero(attributes: (usize, usize)) -> Self {
		Self {
			attributes,
			splits1: vec![f64::INFINITY],
			splits2: vec![f64::INFINITY],
			predictions: Array::zeros((1, 1)),
			predictions_on_missing1: vec![0.0],
			predictions_on_missing2: vec![0.0],
			prediction_on_missing_both: 0.0,
		}
	}

	pub fn evaluate(&self, value1: f64, value2: f64) -> f64 {
		match (value1.is_nan(), value2.is_nan()) {
			(false, false) => {
				let i = segment_index(&self.splits1, value1);
				let j = segment_index(&self.splits2, value2);
				self.predictions[[i, j]]
			}
			(true, false) => self.predictions_on_missing1[segment_index(&self.splits2, value2)],
			(false, true) => self.predictions_on_missing2[segment_index(&self.splits1, value1)],
			(true, true) => self.prediction_on_missing_both,
		}
	}

	/// Add two functions of the same attribute pair on the union of their grids.
	pub fn add(&self, other: &Function2D) -> Result<Function2D> {
		Self::compress(&[self.clone(), other.clone()])
	}

	pub fn multiply(&mut self, factor: f64) {
		self.predictions *= factor;
		for prediction in self
			.predictions_on_missing1
			.iter_mut()
			.chain(self.predictions_on_missing2.iter_mut())
		{
			*prediction *= factor;
		}
		self.prediction_on_missing_both *= factor;
	}

	/// Fold an ensemble of functions over the same attribute pair into one function equal to their sum. The grid of the result is the union of all the grids.
	pub fn compress(functions: &[Function2D]) -> Result<Function2D> {
		let first = functions.first().ok_or(Error::EmptyEnsemble)?;
		for function in functions.iter() {
			if function.attributes != first.attributes {
				return Err(Error::AttributeMismatch {
					left: vec![first.attributes.0, first.attributes.1],
					right: vec![function.attributes.0, function.attributes.1],
				});
			}
		}
		let splits1 = union_splits(functions.iter().map(|function| &function.splits1));
		let splits2 = union_splits(functions.iter().map(|function| &function.splits2));
		let sum = |value1: f64, value2: f64| -> f64 {
			functions
				.iter()
				.map(|function| function.evaluate(value1, value2))
				.sum()
		};
		let predictions = Array::from_shape_fn((splits1.len(), splits2.len()), |(i, j)| {
			sum(splits1[i], splits2[j])
		});
		let predictions_on_missing1 = splits2.iter().map(|split| sum(f64::NAN, *split)).collect();
		let predictions_on_missing2 = splits1.iter().map(|split| sum(*split, f64::NAN)).collect();
		let prediction_on_missing_both = sum(f64::NAN, f64::NAN);
		Ok(Function2D {
			attributes: first.attributes,
			splits1,
			splits2,
			predictions,
			predictions_on_missing1,
			predictions_on_missing2,
			prediction_on_missing_both,
		})
	}

	/// Fold the functions trained on `n_bags` bagging replicates into their average.
	pub fn compress_bagged(functions: &[Function2D], n_bags: usize) -> Result<Function2D> {
		if n_bags == 0 {
			return Err(Error::InvalidOptions("n_bags must be positive".to_owned()));
		}
		let mut function = Self::compress(functions)?;
		function.multiply(1.0 / n_bags as f64);
		Ok(function)
	}

	/// Evaluate the function at every pair of states of two discrete attributes. The result has shape `(n_states1, n_states2)`.
	pub fn to_lookup_table(&self, n_states1: usize, n_states2: usize) -> Array2<f64> {
		Array::from_shape_fn((n_states1, n_states2), |(i, j)| {
			self.evaluate(i as f64, j as f64)
		})
	}
}

fn union_splits<'a>(splits: impl Iterator<Item = &'a Vec<f64>>) -> Vec<f64> {
	splits
		.map(|splits| splits.iter().cloned())
		.kmerge()
		.dedup()
		.collect()
}

#[cfg(test)]
fn checkerboard() -> Function2D {
	Function2D::new(
		(1, 2),
		vec![0.5, f64::INFINITY],
		vec![1.5, f64::INFINITY],
		arr2(&[[1.0, 2.0], [3.0, 4.0]]),
		vec![-1.0, -2.0],
		vec![-3.0, -4.0],
		9.0,
	)
	.unwrap()
}

#[test]
fn test_evaluate_2d() {
	let function = checkerboard();
	assert_eq!(function.evaluate(0.0, 0.0), 1.0);
	assert_eq!(function.evaluate(0.0, 2.0), 2.0);
	assert_eq!(function.evaluate(1.0, 1.5), 3.0);
	assert_eq!(function.evaluate(1.0, 7.0), 4.0);
	assert_eq!(function.evaluate(f64::NAN, 7.0), -2.0);
	assert_eq!(function.evaluate(0.25, f64::NAN), -3.0);
	assert_eq!(function.evaluate(f64::NAN, f64::NAN), 9.0);
}

#[test]
fn test_add_2d_zero_is_identity() {
	let function = checkerboard();
	assert_eq!(function.add(&Function2D::zero((1, 2))).unwrap(), function);
}

#[test]
fn test_add_2d_is_commutative_on_the_union_grid() {
	let f = checkerboard();
	let g = Function2D::new(
		(1, 2),
		vec![1.5, f64::INFINITY],
		vec![0.5, 1.5, f64::INFINITY],
		arr2(&[[10.0, 20.0, 30.0], [40.0, 50.0, 60.0]]),
		vec![1.0, 1.0, 1.0],
		vec![2.0, 2.0],
		1.0,
	)
	.unwrap();
	let fg = f.add(&g).unwrap();
	let gf = g.add(&f).unwrap();
	assert_eq!(fg, gf);
	assert_eq!(fg.splits1, vec![0.5, 1.5, f64::INFINITY]);
	assert_eq!(fg.splits2, vec![0.5, 1.5, f64::INFINITY]);
	for x in &[0.0, 1.0, 2.0, f64::NAN] {
		for y in &[0.0, 1.0, 2.0, f64::NAN] {
			let expected = f.evaluate(*x, *y) + g.evaluate(*x, *y);
			assert!((fg.evaluate(*x, *y) - expected).abs() < 1e-12);
		}
	}
}

#[test]
fn test_add_2d_rejects_different_attributes() {
	let result = checkerboard().add(&Function2D::zero((2, 1)));
	assert!(matches!(result, Err(Error::AttributeMismatch { .. })));
}

#[test]
fn test_compress_2d_bagged_copies_is_identity() {
	let function = checkerboard();
	let compressed = Function2D::compress_bagged(&vec![function.clone(); 3], 3).unwrap();
	for (a, b) in compressed.predictions.iter().zip(function.predictions.iter()) {
		assert!((a - b).abs() < 1e-12);
	}
	assert!((compressed.prediction_on_missing_both - 9.0).abs() < 1e-12);
}

#[test]
fn test_lookup_table_2d() {
	let function = checkerboard();
	assert_eq!(
		function.to_lookup_table(2, 3),
		arr2(&[[1.0, 1.0, 2.0], [3.0, 3.0, 4.0]])
	);
}

#[test]
fn test_deserialize_2d_checks_missing_value_predictions() {
	let function = checkerboard();
	let mut json = serde_json::to_value(&function).unwrap();
	let parsed: Function2D = serde_json::from_value(json.clone()).unwrap();
	assert_eq!(parsed, function);
	json["predictions_on_missing1"] = serde_json::json!([0.0]);
	assert!(serde_json::from_value::<Function2D>(json).is_err());
}
