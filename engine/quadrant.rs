/*!
The quadrant splitter models the interaction between two discrete attributes with a single level of four way partitioning.

One attribute, the primary, is cut once. Each side of the primary cut is then cut independently along the other attribute, the companion, so the two sides may choose different companion cuts. Both choices of primary attribute are searched and the one with the lower residual sum of squares wins.
*/

use crate::{
	cumulative::{Quadrant, QuadrantTable},
	error::Result,
	function::segment_index,
	function_2d::Function2D,
	histogram::{gain, Histogram2D, SufficientStats},
};
use itertools::Itertools;
use ndarray::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimaryAxis {
	First,
	Second,
}

/// The best four way partition found for one choice of primary attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadrantCut {
	pub primary_axis: PrimaryAxis,
	/// The last state on the lower side of the primary cut.
	pub primary: usize,
	/// The last state below the companion cut on the lower side of the primary cut.
	pub lower: usize,
	/// The last state below the companion cut on the upper side of the primary cut.
	pub upper: usize,
	/// The means of the four regions, ordered (primary lower, companion lower), (primary lower, companion upper), (primary upper, companion lower), (primary upper, companion upper).
	pub predictions: [f64; 4],
	/// The residual sum of squares minus the constant `sum(w * y^2)`.
	pub rss: f64,
}

/// Build the interaction function of two discrete attributes with `n_states1` and `n_states2` states.
pub fn build(
	attributes: (usize, usize),
	n_states1: usize,
	n_states2: usize,
	values1: &[f64],
	values2: &[f64],
	targets: &[f64],
	weights: &[f64],
) -> Result<Function2D> {
	let histogram =
		Histogram2D::from_states(n_states1, n_states2, values1, values2, targets, weights)?;
	Ok(build_from_histogram(attributes, &histogram))
}

pub fn build_from_histogram(attributes: (usize, usize), histogram: &Histogram2D) -> Function2D {
	if histogram.n_states1() <= 1 || histogram.n_states2() <= 1 {
		return Function2D::zero(attributes);
	}
	let table = QuadrantTable::from_histogram(histogram);
	let best = match (
		find_best_cut(&table, PrimaryAxis::First),
		find_best_cut(&table, PrimaryAxis::Second),
	) {
		(Some(first), Some(second)) => {
			if second.rss < first.rss {
				second
			} else {
				first
			}
		}
		(Some(cut), None) | (None, Some(cut)) => cut,
		(None, None) => return Function2D::zero(attributes),
	};
	log::debug!(
		"attributes {:?}: primary axis {:?} cut at {}, companions {} and {}, rss {}",
		attributes,
		best.primary_axis,
		best.primary,
		best.lower,
		best.upper,
		best.rss
	);
	function_from_cut(attributes, histogram, &best)
}

/// Search every primary cut along `primary_axis`, pairing each with the best companion cut on either side.
pub fn find_best_cut(table: &QuadrantTable, primary_axis: PrimaryAxis) -> Option<QuadrantCut> {
	let n_primary = match primary_axis {
		PrimaryAxis::First => table.n_states1(),
		PrimaryAxis::Second => table.n_states2(),
	};
	let mut best: Option<QuadrantCut> = None;
	for primary in 0..n_primary.saturating_sub(1) {
		let (lower, lower_below, lower_above) =
			match best_companion(table, primary_axis, primary, Side::Lower) {
				Some(companion) => companion,
				None => continue,
			};
		let (upper, upper_below, upper_above) =
			match best_companion(table, primary_axis, primary, Side::Upper) {
				Some(companion) => companion,
				None => continue,
			};
		let regions = [lower_below, lower_above, upper_below, upper_above];
		let mut predictions = [0.0; 4];
		for (prediction, stats) in predictions.iter_mut().zip(regions.iter()) {
			*prediction = stats.mean();
		}
		let rss = regions
			.iter()
			.zip(predictions.iter())
			.map(|(stats, prediction)| {
				stats.weight * prediction * prediction - 2.0 * prediction * stats.sum
			})
			.sum();
		let is_better = match &best {
			Some(best) => rss < best.rss,
			None => true,
		};
		if is_better {
			best = Some(QuadrantCut {
				primary_axis,
				primary,
				lower,
				upper,
				predictions,
				rss,
			});
		}
	}
	best
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
	Lower,
	Upper,
}

/// Find the companion cut that best splits one side of a primary cut. Returns the companion cut and the statistics of the regions below and above it.
fn best_companion(
	table: &QuadrantTable,
	primary_axis: PrimaryAxis,
	primary: usize,
	side: Side,
) -> Option<(usize, SufficientStats, SufficientStats)> {
	let (n_companion, below, above) = match (primary_axis, side) {
		(PrimaryAxis::First, Side::Lower) => (
			table.n_states2(),
			Quadrant::LowerLower,
			Quadrant::LowerUpper,
		),
		(PrimaryAxis::First, Side::Upper) => (
			table.n_states2(),
			Quadrant::UpperLower,
			Quadrant::UpperUpper,
		),
		(PrimaryAxis::Second, Side::Lower) => (
			table.n_states1(),
			Quadrant::LowerLower,
			Quadrant::UpperLower,
		),
		(PrimaryAxis::Second, Side::Upper) => (
			table.n_states1(),
			Quadrant::LowerUpper,
			Quadrant::UpperUpper,
		),
	};
	let lookup = |companion: usize, quadrant: Quadrant| match primary_axis {
		PrimaryAxis::First => table.quadrant(primary, companion, quadrant),
		PrimaryAxis::Second => table.quadrant(companion, primary, quadrant),
	};
	let mut best: Option<(f64, usize, SufficientStats, SufficientStats)> = None;
	for companion in 0..n_companion.saturating_sub(1) {
		let below_stats = lookup(companion, below);
		let above_stats = lookup(companion, above);
		let loss = -gain(below_stats.sum, below_stats.weight)
			- gain(above_stats.sum, above_stats.weight);
		let is_better = match &best {
			Some((best_loss, ..)) => loss < *best_loss,
			None => true,
		};
		if is_better {
			best = Some((loss, companion, below_stats, above_stats));
		}
	}
	best.map(|(_, companion, below, above)| (companion, below, above))
}

/// Lay out a quadrant cut on the grid of a `Function2D`. The primary attribute gets one split. The companion attribute gets the union of the two companion cuts, which is a single split when they coincide.
fn function_from_cut(
	attributes: (usize, usize),
	histogram: &Histogram2D,
	cut: &QuadrantCut,
) -> Function2D {
	let primary_splits = vec![cut.primary as f64, f64::INFINITY];
	let mut companion_splits: Vec<f64> = vec![cut.lower, cut.upper]
		.into_iter()
		.sorted()
		.dedup()
		.map(|state| state as f64)
		.collect();
	companion_splits.push(f64::INFINITY);
	// The prediction for the cell on side `side` of the primary cut whose companion segment ends at `companion_split`.
	let region = |side: usize, companion_split: f64| -> f64 {
		let companion = if side == 0 { cut.lower } else { cut.upper };
		let above = if companion_split <= companion as f64 {
			0
		} else {
			1
		};
		cut.predictions[side * 2 + above]
	};
	let (splits1, splits2, predictions) = match cut.primary_axis {
		PrimaryAxis::First => {
			let predictions = Array::from_shape_fn((2, companion_splits.len()), |(i, j)| {
				region(i, companion_splits[j])
			});
			(primary_splits, companion_splits, predictions)
		}
		PrimaryAxis::Second => {
			let predictions = Array::from_shape_fn((companion_splits.len(), 2), |(i, j)| {
				region(j, companion_splits[i])
			});
			(companion_splits, primary_splits, predictions)
		}
	};
	let predictions_on_missing1 = segment_means(&histogram.missing1, &splits2);
	let predictions_on_missing2 = segment_means(&histogram.missing2, &splits1);
	Function2D {
		attributes,
		splits1,
		splits2,
		predictions,
		predictions_on_missing1,
		predictions_on_missing2,
		prediction_on_missing_both: histogram.missing_both.mean(),
	}
}

/// Group per state statistics by the segment of `splits` each state falls in and return the mean of each segment.
fn segment_means(stats: &[SufficientStats], splits: &[f64]) -> Vec<f64> {
	let mut segments = vec![SufficientStats::default(); splits.len()];
	for (state, entry) in stats.iter().enumerate() {
		segments[segment_index(splits, state as f64)] += *entry;
	}
	segments.iter().map(SufficientStats::mean).collect()
}

#[cfg(test)]
use itertools::izip;

#[cfg(test)]
fn grid_rows(grid: &[&[f64]]) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
	let mut values1 = Vec::new();
	let mut values2 = Vec::new();
	let mut targets = Vec::new();
	for (i, row) in grid.iter().enumerate() {
		for (j, target) in row.iter().enumerate() {
			values1.push(i as f64);
			values2.push(j as f64);
			targets.push(*target);
		}
	}
	(values1, values2, targets)
}

#[test]
fn test_single_state_has_no_interaction() {
	let function = build((0, 1), 1, 3, &[0.0, 0.0], &[1.0, 2.0], &[5.0, 7.0], &[1.0, 1.0]).unwrap();
	assert_eq!(function, Function2D::zero((0, 1)));
}

#[test]
fn test_xor_collapses_coinciding_companions() {
	let (values1, values2, targets) = grid_rows(&[&[1.0, -1.0], &[-1.0, 1.0]]);
	let weights = vec![1.0; targets.len()];
	let function = build((0, 1), 2, 2, &values1, &values2, &targets, &weights).unwrap();
	assert_eq!(function.splits1, vec![0.0, f64::INFINITY]);
	assert_eq!(function.splits2, vec![0.0, f64::INFINITY]);
	assert_eq!(function.predictions, arr2(&[[1.0, -1.0], [-1.0, 1.0]]));
}

#[test]
fn test_companion_cuts_differ_per_side() {
	let (values1, values2, targets) = grid_rows(&[&[0.0, 10.0, 10.0], &[0.0, 0.0, 10.0]]);
	let weights = vec![1.0; targets.len()];
	let function = build((3, 4), 2, 3, &values1, &values2, &targets, &weights).unwrap();
	assert_eq!(function.splits1, vec![0.0, f64::INFINITY]);
	assert_eq!(function.splits2, vec![0.0, 1.0, f64::INFINITY]);
	assert_eq!(
		function.to_lookup_table(2, 3),
		arr2(&[[0.0, 10.0, 10.0], [0.0, 0.0, 10.0]])
	);
}

#[test]
fn test_second_axis_wins_when_it_fits_better() {
	// The transpose of the grid above, so only cutting attribute 2 first gives a perfect fit.
	let (values1, values2, targets) = grid_rows(&[&[0.0, 0.0], &[10.0, 0.0], &[10.0, 10.0]]);
	let weights = vec![1.0; targets.len()];
	let function = build((0, 1), 3, 2, &values1, &values2, &targets, &weights).unwrap();
	assert_eq!(function.splits2, vec![0.0, f64::INFINITY]);
	assert_eq!(function.splits1, vec![0.0, 1.0, f64::INFINITY]);
	assert_eq!(
		function.to_lookup_table(3, 2),
		arr2(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]])
	);
}

#[test]
fn test_empty_quadrants_predict_zero() {
	let values1 = [0.0, 0.0, 1.0, 1.0];
	let values2 = [0.0, 0.0, 1.0, 1.0];
	let targets = [2.0, 4.0, 6.0, 8.0];
	let function = build((0, 1), 2, 2, &values1, &values2, &targets, &[1.0; 4]).unwrap();
	assert_eq!(function.predictions, arr2(&[[3.0, 0.0], [0.0, 7.0]]));
}

#[test]
fn test_missing_value_channels() {
	let values1 = [0.0, 1.0, f64::NAN, f64::NAN, f64::NAN, 1.0, f64::NAN];
	let values2 = [0.0, 1.0, 0.0, 1.0, 1.0, f64::NAN, f64::NAN];
	let targets = [1.0, 2.0, 3.0, 4.0, 6.0, 7.0, 8.0];
	let function = build((0, 1), 2, 2, &values1, &values2, &targets, &[1.0; 7]).unwrap();
	assert_eq!(function.splits2, vec![0.0, f64::INFINITY]);
	assert_eq!(function.predictions_on_missing1, vec![3.0, 5.0]);
	assert_eq!(function.predictions_on_missing2, vec![0.0, 7.0]);
	assert_eq!(function.prediction_on_missing_both, 8.0);
	assert_eq!(function.evaluate(f64::NAN, 1.0), 5.0);
}

#[test]
fn test_quadrant_cut_is_optimal() {
	let n1 = 4;
	let n2 = 3;
	let mut values1 = Vec::new();
	let mut values2 = Vec::new();
	let mut targets = Vec::new();
	for k in 0..60 {
		let a = (k * 7) % n1;
		let b = (k * 5 + k / 4) % n2;
		values1.push(a as f64);
		values2.push(b as f64);
		targets.push(((k * 37) % 11) as f64 + if a >= 2 && b >= 1 { 6.0 } else { 0.0 });
	}
	let weights = vec![1.0; targets.len()];
	let function = build((0, 1), n1, n2, &values1, &values2, &targets, &weights).unwrap();
	let rss_of = |predict: &dyn Fn(usize, usize) -> f64| -> f64 {
		izip!(&values1, &values2, &targets)
			.map(|(a, b, y)| (y - predict(*a as usize, *b as usize)).powi(2))
			.sum()
	};
	let actual = rss_of(&|a, b| function.evaluate(a as f64, b as f64));
	// Brute force every primary cut and pair of companion cuts in both orientations.
	let mut best = f64::INFINITY;
	for transpose in &[false, true] {
		let (n_primary, n_companion) = if *transpose { (n2, n1) } else { (n1, n2) };
		for p in 0..n_primary - 1 {
			for lo in 0..n_companion - 1 {
				for up in 0..n_companion - 1 {
					let region = |a: usize, b: usize| {
						let (x, y) = if *transpose { (b, a) } else { (a, b) };
						let side = if x <= p { 0 } else { 1 };
						let companion = if side == 0 { lo } else { up };
						side * 2 + if y <= companion { 0 } else { 1 }
					};
					let mut stats = [SufficientStats::default(); 4];
					for (a, b, y) in izip!(&values1, &values2, &targets) {
						stats[region(*a as usize, *b as usize)].add(*y, 1.0);
					}
					let rss = rss_of(&|a, b| stats[region(a, b)].mean());
					best = best.min(rss);
				}
			}
		}
	}
	assert!((actual - best).abs() < 1e-6, "{} != {}", actual, best);
}
