/*!
Prefix sums over histograms. A [`CumulativeHistogram`](struct.CumulativeHistogram.html) answers "what are the statistics left of cut `i`" in constant time, and a [`QuadrantTable`](struct.QuadrantTable.html) answers the same question for the four quadrants induced by cutting two attributes at once.
*/

use crate::histogram::{Histogram, Histogram2D, SufficientStats};
use ndarray::prelude::*;

/// Inclusive prefix sums over the bins of a histogram: `sum[i]` is the sum over bins `0..=i`.
#[derive(Clone, Debug, PartialEq)]
pub struct CumulativeHistogram {
	pub sum: Vec<f64>,
	pub weight: Vec<f64>,
}

impl CumulativeHistogram {
	pub fn new(histogram: &Histogram) -> Self {
		Self::from_stats(
			&histogram
				.bins
				.iter()
				.map(|bin| bin.stats())
				.collect::<Vec<_>>(),
		)
	}

	pub fn from_stats(stats: &[SufficientStats]) -> Self {
		let mut sum = Vec::with_capacity(stats.len());
		let mut weight = Vec::with_capacity(stats.len());
		let mut running = SufficientStats::default();
		for entry in stats {
			running += *entry;
			sum.push(running.sum);
			weight.push(running.weight);
		}
		Self { sum, weight }
	}

	pub fn len(&self) -> usize {
		self.sum.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sum.is_empty()
	}

	/// The statistics over bins `0..=index`.
	pub fn up_to(&self, index: usize) -> SufficientStats {
		SufficientStats::new(self.sum[index], self.weight[index])
	}

	/// The statistics over bins `start..end`.
	pub fn range(&self, start: usize, end: usize) -> SufficientStats {
		if end <= start {
			return SufficientStats::default();
		}
		let upper = self.up_to(end - 1);
		match start.checked_sub(1) {
			Some(before) => upper - self.up_to(before),
			None => upper,
		}
	}

	pub fn total(&self) -> SufficientStats {
		match self.len().checked_sub(1) {
			Some(last) => self.up_to(last),
			None => SufficientStats::default(),
		}
	}
}

/// The four quadrants induced by cutting attribute 1 after state `i` and attribute 2 after state `j`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quadrant {
	/// `a1 <= i` and `a2 <= j`
	LowerLower = 0,
	/// `a1 <= i` and `a2 > j`
	LowerUpper = 1,
	/// `a1 > i` and `a2 <= j`
	UpperLower = 2,
	/// `a1 > i` and `a2 > j`
	UpperUpper = 3,
}

impl Quadrant {
	pub const ALL: [Quadrant; 4] = [
		Quadrant::LowerLower,
		Quadrant::LowerUpper,
		Quadrant::UpperLower,
		Quadrant::UpperUpper,
	];
}

/// For every cut `(i, j)`, the statistics of each of the four quadrants. The table is computed in a single `O(n1 * n2)` pass and never recomputed per cut.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadrantTable {
	/// (n1, n2, 4)
	pub sums: Array3<f64>,
	/// (n1, n2, 4)
	pub weights: Array3<f64>,
}

impl QuadrantTable {
	/// `cumulative1` and `cumulative2` must be the cumulative marginals of `histogram` along attribute 1 and attribute 2.
	pub fn new(
		histogram: &Histogram2D,
		cumulative1: &CumulativeHistogram,
		cumulative2: &CumulativeHistogram,
	) -> Self {
		let n1 = histogram.n_states1();
		let n2 = histogram.n_states2();
		let mut sums = Array::zeros((n1, n2, 4));
		let mut weights = Array::zeros((n1, n2, 4));
		let total = cumulative1.total();
		// `prefix` holds the inclusive 2D prefix sums of the row above, and `row` accumulates the current row.
		let mut prefix = vec![SufficientStats::default(); n2];
		for i in 0..n1 {
			let mut row = SufficientStats::default();
			for j in 0..n2 {
				row += SufficientStats::new(histogram.sums[[i, j]], histogram.weights[[i, j]]);
				prefix[j] += row;
				let lower_lower = prefix[j];
				let lower = cumulative1.up_to(i);
				let left = cumulative2.up_to(j);
				let quadrants = [
					lower_lower,
					lower - lower_lower,
					left - lower_lower,
					total - lower - left + lower_lower,
				];
				for (q, stats) in quadrants.iter().enumerate() {
					sums[[i, j, q]] = stats.sum;
					weights[[i, j, q]] = stats.weight;
				}
			}
		}
		Self { sums, weights }
	}

	/// Build the table directly from a 2D histogram.
	pub fn from_histogram(histogram: &Histogram2D) -> Self {
		let cumulative1 = CumulativeHistogram::from_stats(&histogram.marginal1());
		let cumulative2 = CumulativeHistogram::from_stats(&histogram.marginal2());
		Self::new(histogram, &cumulative1, &cumulative2)
	}

	pub fn n_states1(&self) -> usize {
		self.sums.shape()[0]
	}

	pub fn n_states2(&self) -> usize {
		self.sums.shape()[1]
	}

	pub fn quadrant(&self, i: usize, j: usize, quadrant: Quadrant) -> SufficientStats {
		let q = quadrant as usize;
		SufficientStats::new(self.sums[[i, j, q]], self.weights[[i, j, q]])
	}
}

#[cfg(test)]
use itertools::izip;

#[cfg(test)]
fn assert_close(a: f64, b: f64) {
	assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

#[test]
fn test_cumulative_histogram_prefix_sums() {
	let histogram =
		Histogram::from_values(&[1.0, 2.0, 2.0, 5.0], &[1.0, 2.0, 3.0, 4.0], &[1.0; 4]).unwrap();
	let cumulative = CumulativeHistogram::new(&histogram);
	let mut sum = 0.0;
	let mut weight = 0.0;
	for (i, bin) in histogram.bins.iter().enumerate() {
		sum += bin.sum;
		weight += bin.weight;
		assert_close(cumulative.sum[i], sum);
		assert_close(cumulative.weight[i], weight);
	}
	assert_eq!(cumulative.range(1, 3), SufficientStats::new(9.0, 3.0));
	assert_eq!(cumulative.range(0, 1), SufficientStats::new(1.0, 1.0));
	assert_eq!(cumulative.range(2, 2), SufficientStats::default());
	assert_eq!(cumulative.total(), SufficientStats::new(10.0, 4.0));
}

#[test]
fn test_quadrant_table_matches_brute_force() {
	let n1 = 3;
	let n2 = 4;
	let mut values1 = Vec::new();
	let mut values2 = Vec::new();
	let mut targets = Vec::new();
	for a in 0..n1 {
		for b in 0..n2 {
			for k in 0..(a + b) % 3 + 1 {
				values1.push(a as f64);
				values2.push(b as f64);
				targets.push((a * 7 + b * 3 + k) as f64 * 0.5 - 2.0);
			}
		}
	}
	let weights = vec![1.0; targets.len()];
	let histogram =
		Histogram2D::from_states(n1, n2, &values1, &values2, &targets, &weights).unwrap();
	let table = QuadrantTable::from_histogram(&histogram);
	for i in 0..n1 {
		for j in 0..n2 {
			let mut expected = [SufficientStats::default(); 4];
			for (a, b, target) in izip!(&values1, &values2, &targets) {
				let q = match (*a as usize <= i, *b as usize <= j) {
					(true, true) => 0,
					(true, false) => 1,
					(false, true) => 2,
					(false, false) => 3,
				};
				expected[q].add(*target, 1.0);
			}
			for quadrant in Quadrant::ALL.iter() {
				let actual = table.quadrant(i, j, *quadrant);
				assert_close(actual.sum, expected[*quadrant as usize].sum);
				assert_close(actual.weight, expected[*quadrant as usize].weight);
			}
		}
	}
}
