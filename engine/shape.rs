/*!
These are the entry points a boosting loop calls once per round: fit the residuals of one attribute with the interval splitter, of a pair of attributes with the quadrant splitter, or of one attribute averaged over a subbagging sequence.
*/

use crate::{
	dataset::{AttributeKind, Dataset},
	error::{check_len, Error, Result},
	function::Function1D,
	function_2d::Function2D,
	histogram::{BinLayout, Histogram},
	interval::{build_function, IntervalOptions},
	line_search::line_search,
	quadrant,
	subag::SubagSequence,
};
use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

/// Fit `residuals` with a piecewise constant function of `attribute`.
pub fn build_interval<D, R>(
	dataset: &D,
	attribute: usize,
	residuals: &[f64],
	options: &IntervalOptions,
	rng: &mut R,
) -> Result<Function1D>
where
	D: Dataset + ?Sized,
	R: Rng + ?Sized,
{
	check_len("residuals", dataset.n_rows(), residuals.len())?;
	let values = dataset.column(attribute);
	let weights = dataset.weights();
	let histogram = match dataset.attribute(attribute).kind {
		AttributeKind::Numeric => Histogram::from_values(&values, residuals, &weights)?,
		AttributeKind::Binned { n_bins } => {
			Histogram::from_states(n_bins, &values, residuals, &weights)?
		}
		AttributeKind::Nominal { cardinality } => {
			Histogram::from_states(cardinality, &values, residuals, &weights)?
		}
	};
	let mut function = build_function(attribute, &histogram, options, rng)?;
	if options.line_search {
		line_search(&mut function, &values, residuals, &weights)?;
	}
	Ok(function)
}

/// Fit `residuals` with a quadrant function of two discrete attributes.
pub fn build_quadrant<D>(
	dataset: &D,
	attribute1: usize,
	attribute2: usize,
	residuals: &[f64],
) -> Result<Function2D>
where
	D: Dataset + ?Sized,
{
	check_len("residuals", dataset.n_rows(), residuals.len())?;
	let n_states1 = discrete_states(dataset, attribute1)?;
	let n_states2 = discrete_states(dataset, attribute2)?;
	quadrant::build(
		(attribute1, attribute2),
		n_states1,
		n_states2,
		&dataset.column(attribute1),
		&dataset.column(attribute2),
		residuals,
		&dataset.weights(),
	)
}

/// Fit one function of `attribute` per sample of `sequence` and return their average. Histograms are derived incrementally along the sequence.
pub fn build_subagged_interval<D, R>(
	dataset: &D,
	attribute: usize,
	residuals: &[f64],
	sequence: &SubagSequence,
	options: &IntervalOptions,
	rng: &mut R,
) -> Result<Function1D>
where
	D: Dataset + ?Sized,
	R: Rng + ?Sized,
{
	let n_rows = dataset.n_rows();
	check_len("residuals", n_rows, residuals.len())?;
	let max_row = sequence
		.samples
		.iter()
		.filter_map(|sample| sample.rows().last())
		.max();
	if let Some(row) = max_row {
		if *row >= n_rows {
			return Err(Error::InvalidOptions(format!(
				"row {} is out of range for a dataset with {} rows",
				row, n_rows
			)));
		}
	}
	let values = dataset.column(attribute);
	let weights = dataset.weights();
	let kind = dataset.attribute(attribute).kind;
	let layout = match kind {
		AttributeKind::Numeric => BinLayout::numeric(&values),
		AttributeKind::Binned { n_bins } => BinLayout::discrete(n_bins, &values)?,
		AttributeKind::Nominal { cardinality } => BinLayout::discrete(cardinality, &values)?,
	};
	let mut functions = Vec::with_capacity(sequence.n_samples());
	sequence.for_each_histogram(&layout, residuals, &weights, |index, histogram| {
		let trimmed;
		let histogram = if kind == AttributeKind::Numeric {
			trimmed = histogram.without_empty_bins();
			&trimmed
		} else {
			histogram
		};
		let mut function = build_function(attribute, histogram, options, rng)?;
		if options.line_search {
			let rows = sequence.samples[index].rows();
			let sample_values: Vec<f64> = rows.iter().map(|row| values[*row]).collect();
			let sample_residuals: Vec<f64> = rows.iter().map(|row| residuals[*row]).collect();
			let sample_weights: Vec<f64> = rows.iter().map(|row| weights[*row]).collect();
			line_search(
				&mut function,
				&sample_values,
				&sample_residuals,
				&sample_weights,
			)?;
		}
		functions.push(function);
		Ok(())
	})?;
	Function1D::compress_bagged(&functions, sequence.n_samples())
}

/// Fit one function per attribute in parallel. The function of attribute `i` is built with its own generator seeded with `seed + i`, so the result does not depend on scheduling.
pub fn build_intervals_parallel<D>(
	dataset: &D,
	attributes: &[usize],
	residuals: &[f64],
	options: &IntervalOptions,
	seed: u64,
) -> Result<Vec<Function1D>>
where
	D: Dataset + Sync + ?Sized,
{
	attributes
		.par_iter()
		.map(|attribute| {
			let mut rng =
				Xoshiro256Plus::seed_from_u64(seed.wrapping_add(attribute.to_u64().unwrap()));
			build_interval(dataset, *attribute, residuals, options, &mut rng)
		})
		.collect()
}

fn discrete_states<D>(dataset: &D, attribute: usize) -> Result<usize>
where
	D: Dataset + ?Sized,
{
	let kind = dataset.attribute(attribute).kind;
	kind.n_states().ok_or(Error::UnsupportedAttribute {
		attribute,
		kind: kind.name(),
	})
}

#[cfg(test)]
use crate::{
	dataset::{Attribute, Instances},
	interval::IntervalLimit,
	subag::Sample,
};

#[cfg(test)]
fn dataset() -> (Instances, Vec<f64>) {
	let n_rows = 12;
	let attributes = vec![
		Attribute {
			name: "age".to_owned(),
			kind: AttributeKind::Numeric,
		},
		Attribute {
			name: "bucket".to_owned(),
			kind: AttributeKind::Binned { n_bins: 3 },
		},
		Attribute {
			name: "color".to_owned(),
			kind: AttributeKind::Nominal { cardinality: 2 },
		},
	];
	let columns = vec![
		(0..n_rows).map(|row| row as f64).collect(),
		(0..n_rows).map(|row| (row % 3) as f64).collect(),
		(0..n_rows).map(|row| (row / 6) as f64).collect(),
	];
	let residuals: Vec<f64> = (0..n_rows)
		.map(|row| if row < 6 { -1.0 } else { 2.0 })
		.collect();
	let instances = Instances::new(attributes, columns, residuals.clone(), None).unwrap();
	(instances, residuals)
}

#[cfg(test)]
fn two_intervals() -> IntervalOptions {
	IntervalOptions {
		limit: IntervalLimit::MaxIntervals(2),
		..IntervalOptions::default()
	}
}

#[test]
fn test_build_interval_numeric() {
	let (dataset, residuals) = dataset();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let function = build_interval(&dataset, 0, &residuals, &two_intervals(), &mut rng).unwrap();
	assert_eq!(function.splits, vec![5.5, f64::INFINITY]);
	assert_eq!(function.predictions, vec![-1.0, 2.0]);
}

#[test]
fn test_build_interval_discrete() {
	let (dataset, residuals) = dataset();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let function = build_interval(&dataset, 2, &residuals, &two_intervals(), &mut rng).unwrap();
	assert_eq!(function.to_lookup_table(2), vec![-1.0, 2.0]);
}

#[test]
fn test_build_interval_checks_residuals() {
	let (dataset, _) = dataset();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let result = build_interval(&dataset, 0, &[0.0; 3], &two_intervals(), &mut rng);
	assert!(matches!(result, Err(Error::LengthMismatch { .. })));
}

#[test]
fn test_build_quadrant() {
	let (dataset, residuals) = dataset();
	let function = build_quadrant(&dataset, 1, 2, &residuals).unwrap();
	let table = function.to_lookup_table(3, 2);
	for state in 0..3 {
		assert!((table[[state, 0]] + 1.0).abs() < 1e-12);
		assert!((table[[state, 1]] - 2.0).abs() < 1e-12);
	}
}

#[test]
fn test_build_quadrant_rejects_numeric_attributes() {
	let (dataset, residuals) = dataset();
	let result = build_quadrant(&dataset, 0, 1, &residuals);
	assert!(matches!(
		result,
		Err(Error::UnsupportedAttribute {
			attribute: 0,
			kind: "numeric"
		})
	));
}

#[test]
fn test_subagged_interval_over_full_samples_matches_single_fit() {
	let (dataset, residuals) = dataset();
	let samples = vec![Sample::new((0..12).collect()); 3];
	let sequence = SubagSequence::from_samples(samples).unwrap();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let bagged =
		build_subagged_interval(&dataset, 0, &residuals, &sequence, &two_intervals(), &mut rng)
			.unwrap();
	let single = build_interval(&dataset, 0, &residuals, &two_intervals(), &mut rng).unwrap();
	assert_eq!(bagged.splits, single.splits);
	for (a, b) in bagged.predictions.iter().zip(single.predictions.iter()) {
		assert!((a - b).abs() < 1e-12);
	}
}

#[test]
fn test_subagged_interval_averages_subsamples() {
	let (dataset, residuals) = dataset();
	let mut rng = Xoshiro256Plus::seed_from_u64(9);
	let sequence = SubagSequence::build(12, 8, 4, &mut rng).unwrap();
	let bagged =
		build_subagged_interval(&dataset, 1, &residuals, &sequence, &two_intervals(), &mut rng)
			.unwrap();
	// Every bagged function predicts within the range of the residuals.
	for state in 0..3 {
		let prediction = bagged.evaluate(state as f64);
		assert!(prediction >= -1.0 - 1e-12 && prediction <= 2.0 + 1e-12);
	}
	let out_of_range = SubagSequence::from_samples(vec![Sample::new(vec![3, 12])]).unwrap();
	assert!(build_subagged_interval(
		&dataset,
		1,
		&residuals,
		&out_of_range,
		&two_intervals(),
		&mut rng
	)
	.is_err());
}

#[test]
fn test_line_search_replaces_predictions_with_newton_steps() {
	let (dataset, _) = dataset();
	let residuals: Vec<f64> = (0..12)
		.map(|row| if row < 6 { 0.5 } else { -0.25 })
		.collect();
	let options = IntervalOptions {
		line_search: true,
		..two_intervals()
	};
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let function = build_interval(&dataset, 0, &residuals, &options, &mut rng).unwrap();
	assert_eq!(function.splits, vec![5.5, f64::INFINITY]);
	// 3.0 / 1.5 and -1.5 / 1.125.
	assert!((function.predictions[0] - 2.0).abs() < 1e-12);
	assert!((function.predictions[1] + 4.0 / 3.0).abs() < 1e-12);
	assert_eq!(function.prediction_on_missing, 0.0);
}

#[test]
fn test_subagged_line_search_uses_only_sample_rows() {
	let (dataset, _) = dataset();
	let residuals: Vec<f64> = (0..12)
		.map(|row| if row < 6 { 0.5 } else { -0.25 })
		.collect();
	let options = IntervalOptions {
		line_search: true,
		..two_intervals()
	};
	let sequence = SubagSequence::from_samples(vec![Sample::new(vec![0, 1, 6])]).unwrap();
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let function =
		build_subagged_interval(&dataset, 0, &residuals, &sequence, &options, &mut rng).unwrap();
	assert_eq!(function.splits, vec![3.5, f64::INFINITY]);
	// Rows 0 and 1 give 1.0 / 0.5. Row 6 alone gives -0.25 / 0.1875. Rows 4 through 11 would give -0.5 / 1.625.
	assert!((function.predictions[0] - 2.0).abs() < 1e-12);
	assert!((function.predictions[1] + 4.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_parallel_build_matches_sequential() {
	let (dataset, residuals) = dataset();
	let options = IntervalOptions::default();
	let parallel = build_intervals_parallel(&dataset, &[0, 1, 2], &residuals, &options, 7).unwrap();
	for (attribute, function) in parallel.iter().enumerate() {
		let mut rng = Xoshiro256Plus::seed_from_u64(7 + attribute as u64);
		let sequential = build_interval(&dataset, attribute, &residuals, &options, &mut rng).unwrap();
		assert_eq!(function, &sequential);
	}
}
