/*!
This module computes the sufficient statistics the splitters work from. A [`Histogram`](struct.Histogram.html) holds one `(value, sum, weight)` bin per distinct attribute value, sorted by value, plus a separate channel for rows whose value is missing. The missing channel is never merged into the ordered bins.
*/

use crate::{
	dataset::is_state,
	error::{check_len, Error, Result},
	not_nan::NotNan,
	subag::SampleDelta,
};
use itertools::izip;
use ndarray::prelude::*;
use std::collections::BTreeMap;

/// The sum of weighted targets and the sum of weights for a set of rows. These are sufficient to compute the mean prediction for the rows and the gain of splitting them.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SufficientStats {
	pub sum: f64,
	pub weight: f64,
}

impl SufficientStats {
	pub fn new(sum: f64, weight: f64) -> Self {
		Self { sum, weight }
	}

	/// The weighted mean of the targets, or 0 if there is no weight.
	pub fn mean(&self) -> f64 {
		if self.weight == 0.0 {
			0.0
		} else {
			self.sum / self.weight
		}
	}

	/// The reduction in sum of squared error from predicting the mean, `sum^2 / weight`, or 0 if there is no weight.
	pub fn gain(&self) -> f64 {
		gain(self.sum, self.weight)
	}

	pub fn add(&mut self, target: f64, weight: f64) {
		self.sum += target * weight;
		self.weight += weight;
	}

	pub fn remove(&mut self, target: f64, weight: f64) {
		self.sum -= target * weight;
		self.weight -= weight;
	}
}

impl std::ops::AddAssign for SufficientStats {
	fn add_assign(&mut self, other: Self) {
		self.sum += other.sum;
		self.weight += other.weight;
	}
}

impl std::ops::Add for SufficientStats {
	type Output = Self;
	fn add(mut self, other: Self) -> Self {
		self += other;
		self
	}
}

impl std::ops::Sub for SufficientStats {
	type Output = Self;
	fn sub(self, other: Self) -> Self {
		Self {
			sum: self.sum - other.sum,
			weight: self.weight - other.weight,
		}
	}
}

impl std::iter::Sum for SufficientStats {
	fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
		iter.fold(Self::default(), |a, b| a + b)
	}
}

/// `sum^2 / weight`, defined as 0 when `weight` is 0.
#[inline(always)]
pub fn gain(sum: f64, weight: f64) -> f64 {
	if weight == 0.0 {
		0.0
	} else {
		sum * sum / weight
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistogramBin {
	pub value: f64,
	pub sum: f64,
	pub weight: f64,
	/// The number of rows in the bin. Unlike `weight`, this is exact after any sequence of incremental updates, so it decides whether a bin is empty.
	pub count: usize,
}

impl HistogramBin {
	pub fn empty(value: f64) -> Self {
		Self {
			value,
			sum: 0.0,
			weight: 0.0,
			count: 0,
		}
	}

	pub fn stats(&self) -> SufficientStats {
		SufficientStats::new(self.sum, self.weight)
	}

	fn add(&mut self, target: f64, weight: f64) {
		self.sum += target * weight;
		self.weight += weight;
		self.count += 1;
	}

	fn remove(&mut self, target: f64, weight: f64) {
		self.sum -= target * weight;
		self.weight -= weight;
		self.count -= 1;
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Histogram {
	/// The bins, sorted ascending by `value`.
	pub bins: Vec<HistogramBin>,
	/// The statistics for rows whose value is missing.
	pub missing: SufficientStats,
}

impl Histogram {
	/// Build a histogram for a numeric attribute. Rows with equal values share a bin. Rows whose value is `NaN` are counted in the missing channel. Infinite values are present values and get bins at either end.
	pub fn from_values(values: &[f64], targets: &[f64], weights: &[f64]) -> Result<Self> {
		check_len("targets", values.len(), targets.len())?;
		check_len("weights", values.len(), weights.len())?;
		let mut missing = SufficientStats::default();
		let mut bins: BTreeMap<NotNan, HistogramBin> = BTreeMap::new();
		for (value, target, weight) in izip!(values, targets, weights) {
			match NotNan::new(*value) {
				Some(key) => bins
					.entry(key)
					.or_insert_with(|| HistogramBin::empty(key.get()))
					.add(*target, *weight),
				None => missing.add(*target, *weight),
			}
		}
		let bins = bins.into_iter().map(|(_, bin)| bin).collect();
		Ok(Self { bins, missing })
	}

	/// Build a histogram for a binned or nominal attribute with `n_states` states. There is one bin per state, including states no row takes, and the value of each bin is its state index.
	pub fn from_states(
		n_states: usize,
		values: &[f64],
		targets: &[f64],
		weights: &[f64],
	) -> Result<Self> {
		check_len("targets", values.len(), targets.len())?;
		check_len("weights", values.len(), weights.len())?;
		let mut histogram = Self::with_states(n_states);
		for (value, target, weight) in izip!(values, targets, weights) {
			match state_index(*value, n_states)? {
				Some(state) => histogram.add_to_bin(state, *target, *weight),
				None => histogram.missing.add(*target, *weight),
			}
		}
		Ok(histogram)
	}

	/// Build the histogram of the rows in `rows` using a precomputed layout. Histograms built from the same layout always have the same bins, so they can be updated incrementally with [`apply_delta`](#method.apply_delta).
	pub fn from_layout(
		layout: &BinLayout,
		rows: &[usize],
		targets: &[f64],
		weights: &[f64],
	) -> Result<Self> {
		check_len("targets", layout.n_rows(), targets.len())?;
		check_len("weights", layout.n_rows(), weights.len())?;
		let mut histogram = layout.empty_histogram();
		for row in rows {
			histogram.add_row(layout, *row, targets, weights);
		}
		Ok(histogram)
	}

	/// Turn the histogram of one sample into the histogram of another by adding the rows the other sample gains and removing the rows it loses.
	pub fn apply_delta(
		&mut self,
		layout: &BinLayout,
		delta: &SampleDelta,
		targets: &[f64],
		weights: &[f64],
	) {
		for row in delta.to_add.iter() {
			self.add_row(layout, *row, targets, weights);
		}
		for row in delta.to_del.iter() {
			self.remove_row(layout, *row, targets, weights);
		}
	}

	fn with_states(n_states: usize) -> Self {
		let bins = (0..n_states)
			.map(|state| HistogramBin::empty(state as f64))
			.collect();
		Self {
			bins,
			missing: SufficientStats::default(),
		}
	}

	fn add_to_bin(&mut self, bin_index: usize, target: f64, weight: f64) {
		self.bins[bin_index].add(target, weight);
	}

	fn add_row(&mut self, layout: &BinLayout, row: usize, targets: &[f64], weights: &[f64]) {
		match layout.bin(row) {
			Some(bin_index) => self.add_to_bin(bin_index, targets[row], weights[row]),
			None => self.missing.add(targets[row], weights[row]),
		}
	}

	fn remove_row(&mut self, layout: &BinLayout, row: usize, targets: &[f64], weights: &[f64]) {
		match layout.bin(row) {
			Some(bin_index) => self.bins[bin_index].remove(targets[row], weights[row]),
			None => self.missing.remove(targets[row], weights[row]),
		}
	}

	pub fn len(&self) -> usize {
		self.bins.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bins.is_empty()
	}

	/// The statistics over all non missing rows.
	pub fn total(&self) -> SufficientStats {
		self.bins.iter().map(HistogramBin::stats).sum()
	}

	/// Return a copy of this histogram without the bins that no row falls into. Histograms built from a layout contain a bin for every distinct value in the whole dataset, and a split should only ever be placed between values that are present.
	pub fn without_empty_bins(&self) -> Self {
		Self {
			bins: self
				.bins
				.iter()
				.filter(|bin| bin.count > 0)
				.cloned()
				.collect(),
			missing: self.missing,
		}
	}
}

/// Map a discrete value to its state index. `NaN` is missing. Anything else that is not a state is rejected.
pub(crate) fn state_index(value: f64, n_states: usize) -> Result<Option<usize>> {
	if value.is_nan() {
		Ok(None)
	} else if is_state(value, n_states) {
		Ok(Some(value as usize))
	} else {
		Err(Error::InvalidState { value, n_states })
	}
}

/// A `BinLayout` assigns every row of a column to a bin once, so that histograms over many different samples of the rows can be built and updated without sorting again.
#[derive(Clone, Debug)]
pub struct BinLayout {
	/// The value of each bin, sorted ascending.
	values: Vec<f64>,
	/// The bin of each row, or `None` if the row's value is missing.
	row_bins: Vec<Option<usize>>,
}

impl BinLayout {
	/// Lay out a numeric column with one bin per distinct value. Only `NaN` is missing.
	pub fn numeric(column: &[f64]) -> Self {
		let mut distinct: BTreeMap<NotNan, usize> = column
			.iter()
			.filter_map(|value| NotNan::new(*value))
			.map(|value| (value, 0))
			.collect();
		for (bin_index, entry) in distinct.values_mut().enumerate() {
			*entry = bin_index;
		}
		let row_bins = column
			.iter()
			.map(|value| NotNan::new(*value).map(|value| distinct[&value]))
			.collect();
		let values = distinct.keys().map(|value| value.get()).collect();
		Self { values, row_bins }
	}

	/// Lay out a discrete column with one bin per state.
	pub fn discrete(n_states: usize, column: &[f64]) -> Result<Self> {
		let row_bins = column
			.iter()
			.map(|value| state_index(*value, n_states))
			.collect::<Result<_>>()?;
		let values = (0..n_states).map(|state| state as f64).collect();
		Ok(Self { values, row_bins })
	}

	pub fn n_bins(&self) -> usize {
		self.values.len()
	}

	pub fn n_rows(&self) -> usize {
		self.row_bins.len()
	}

	pub fn bin(&self, row: usize) -> Option<usize> {
		self.row_bins[row]
	}

	pub fn empty_histogram(&self) -> Histogram {
		Histogram {
			bins: self
				.values
				.iter()
				.map(|value| HistogramBin::empty(*value))
				.collect(),
			missing: SufficientStats::default(),
		}
	}
}

/// The joint histogram of two discrete attributes. Rows where only one of the attributes is missing are kept per state of the other attribute, so the missing value predictions of a 2D function can be segmented like its splits.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram2D {
	/// (n1, n2)
	pub sums: Array2<f64>,
	/// (n1, n2)
	pub weights: Array2<f64>,
	/// Rows where attribute 1 is missing, by state of attribute 2.
	pub missing1: Vec<SufficientStats>,
	/// Rows where attribute 2 is missing, by state of attribute 1.
	pub missing2: Vec<SufficientStats>,
	/// Rows where both attributes are missing.
	pub missing_both: SufficientStats,
}

impl Histogram2D {
	pub fn from_states(
		n_states1: usize,
		n_states2: usize,
		values1: &[f64],
		values2: &[f64],
		targets: &[f64],
		weights: &[f64],
	) -> Result<Self> {
		check_len("values of the second attribute", values1.len(), values2.len())?;
		check_len("targets", values1.len(), targets.len())?;
		check_len("weights", values1.len(), weights.len())?;
		let mut histogram = Self {
			sums: Array::zeros((n_states1, n_states2)),
			weights: Array::zeros((n_states1, n_states2)),
			missing1: vec![SufficientStats::default(); n_states2],
			missing2: vec![SufficientStats::default(); n_states1],
			missing_both: SufficientStats::default(),
		};
		for (value1, value2, target, weight) in izip!(values1, values2, targets, weights) {
			let state1 = state_index(*value1, n_states1)?;
			let state2 = state_index(*value2, n_states2)?;
			match (state1, state2) {
				(Some(state1), Some(state2)) => {
					histogram.sums[[state1, state2]] += target * weight;
					histogram.weights[[state1, state2]] += weight;
				}
				(None, Some(state2)) => histogram.missing1[state2].add(*target, *weight),
				(Some(state1), None) => histogram.missing2[state1].add(*target, *weight),
				(None, None) => histogram.missing_both.add(*target, *weight),
			}
		}
		Ok(histogram)
	}

	pub fn n_states1(&self) -> usize {
		self.sums.nrows()
	}

	pub fn n_states2(&self) -> usize {
		self.sums.ncols()
	}

	/// The statistics for each state of attribute 1, over rows where both attributes are present.
	pub fn marginal1(&self) -> Vec<SufficientStats> {
		self.sums
			.genrows()
			.into_iter()
			.zip(self.weights.genrows())
			.map(|(sums, weights)| SufficientStats::new(sums.sum(), weights.sum()))
			.collect()
	}

	/// The statistics for each state of attribute 2, over rows where both attributes are present.
	pub fn marginal2(&self) -> Vec<SufficientStats> {
		self.sums
			.gencolumns()
			.into_iter()
			.zip(self.weights.gencolumns())
			.map(|(sums, weights)| SufficientStats::new(sums.sum(), weights.sum()))
			.collect()
	}
}

#[cfg(test)]
fn assert_close(a: f64, b: f64) {
	assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
}

#[test]
fn test_histogram_sums_match_rows() {
	let values = [3.0, 1.0, f64::NAN, 1.0, 2.0, 3.0, f64::NAN];
	let targets = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
	let weights = [1.0, 0.5, 2.0, 1.0, 1.0, 2.0, 1.0];
	let histogram = Histogram::from_values(&values, &targets, &weights).unwrap();
	let bin_values: Vec<f64> = histogram.bins.iter().map(|bin| bin.value).collect();
	assert_eq!(bin_values, vec![1.0, 2.0, 3.0]);
	let mut expected = SufficientStats::default();
	let mut expected_missing = SufficientStats::default();
	for (value, target, weight) in izip!(&values, &targets, &weights) {
		if value.is_nan() {
			expected_missing.add(*target, *weight);
		} else {
			expected.add(*target, *weight);
		}
	}
	let total = histogram.total();
	assert_close(total.sum, expected.sum);
	assert_close(total.weight, expected.weight);
	assert_close(histogram.missing.sum, expected_missing.sum);
	assert_close(histogram.missing.weight, expected_missing.weight);
	assert_close(histogram.bins[0].sum, 0.5 * 2.0 + 4.0);
	assert_close(histogram.bins[0].weight, 1.5);
}

#[test]
fn test_histogram_from_states_keeps_empty_states() {
	let values = [0.0, 2.0, 2.0, f64::NAN];
	let targets = [1.0, 2.0, 4.0, 8.0];
	let weights = [1.0; 4];
	let histogram = Histogram::from_states(4, &values, &targets, &weights).unwrap();
	insta::assert_debug_snapshot!(histogram, @r###"
 Histogram {
     bins: [
         HistogramBin {
             value: 0.0,
             sum: 1.0,
             weight: 1.0,
             count: 1,
         },
         HistogramBin {
             value: 1.0,
             sum: 0.0,
             weight: 0.0,
             count: 0,
         },
         HistogramBin {
             value: 2.0,
             sum: 6.0,
             weight: 2.0,
             count: 2,
         },
         HistogramBin {
             value: 3.0,
             sum: 0.0,
             weight: 0.0,
             count: 0,
         },
     ],
     missing: SufficientStats {
         sum: 8.0,
         weight: 1.0,
     },
 }
 "###);
}

#[test]
fn test_histogram_from_states_rejects_invalid_states() {
	let result = Histogram::from_states(2, &[0.0, 1.5], &[0.0, 0.0], &[1.0, 1.0]);
	assert!(matches!(result, Err(Error::InvalidState { .. })));
	let result = Histogram::from_states(2, &[0.0, 2.0], &[0.0, 0.0], &[1.0, 1.0]);
	assert!(matches!(result, Err(Error::InvalidState { .. })));
}

#[test]
fn test_histogram_from_layout_matches_from_values() {
	let column = [0.5, 0.25, f64::NAN, 0.5, 1.0, 0.25];
	let targets = [1.0, -1.0, 2.0, 3.0, 0.5, 4.0];
	let weights = [1.0; 6];
	let layout = BinLayout::numeric(&column);
	assert_eq!(layout.n_bins(), 3);
	let rows = [0, 2, 3, 5];
	let from_layout = Histogram::from_layout(&layout, &rows, &targets, &weights)
		.unwrap()
		.without_empty_bins();
	let values: Vec<f64> = rows.iter().map(|row| column[*row]).collect();
	let row_targets: Vec<f64> = rows.iter().map(|row| targets[*row]).collect();
	let from_values = Histogram::from_values(&values, &row_targets, &[1.0; 4]).unwrap();
	assert_eq!(from_layout, from_values);
}

#[test]
fn test_histogram_2d_marginals() {
	let values1 = [0.0, 0.0, 1.0, 1.0, f64::NAN, 1.0];
	let values2 = [0.0, 1.0, 0.0, 1.0, 1.0, f64::NAN];
	let targets = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
	let weights = [1.0; 6];
	let histogram =
		Histogram2D::from_states(2, 2, &values1, &values2, &targets, &weights).unwrap();
	assert_eq!(histogram.sums, arr2(&[[1.0, 2.0], [3.0, 4.0]]));
	assert_eq!(
		histogram.marginal1(),
		vec![SufficientStats::new(3.0, 2.0), SufficientStats::new(7.0, 2.0)]
	);
	assert_eq!(
		histogram.marginal2(),
		vec![SufficientStats::new(4.0, 2.0), SufficientStats::new(6.0, 2.0)]
	);
	assert_eq!(histogram.missing1[1], SufficientStats::new(5.0, 1.0));
	assert_eq!(histogram.missing2[1], SufficientStats::new(6.0, 1.0));
	assert_eq!(histogram.missing_both, SufficientStats::default());
}

#[test]
fn test_infinite_values_are_not_missing() {
	let values = [1.0, f64::INFINITY, f64::NAN, f64::NEG_INFINITY];
	let targets = [1.0, 2.0, 3.0, 4.0];
	let histogram = Histogram::from_values(&values, &targets, &[1.0; 4]).unwrap();
	let bin_values: Vec<f64> = histogram.bins.iter().map(|bin| bin.value).collect();
	assert_eq!(bin_values, vec![f64::NEG_INFINITY, 1.0, f64::INFINITY]);
	assert_eq!(histogram.missing, SufficientStats::new(3.0, 1.0));
	assert_eq!(histogram.total(), SufficientStats::new(7.0, 3.0));
	let layout = BinLayout::numeric(&values);
	assert_eq!(layout.n_bins(), 3);
	assert_eq!(layout.bin(1), Some(2));
	assert_eq!(layout.bin(2), None);
}

#[test]
fn test_tiny_weights_survive_empty_bin_removal() {
	let column = [1.0, 2.0, 3.0];
	let targets = [1.0, 2.0, 3.0];
	let weights = [1e-12, 1e-12, 1e-12];
	let layout = BinLayout::numeric(&column);
	let mut histogram = Histogram::from_layout(&layout, &[0, 1], &targets, &weights).unwrap();
	let delta = SampleDelta {
		to_add: vec![2],
		to_del: vec![0],
	};
	histogram.apply_delta(&layout, &delta, &targets, &weights);
	let bins = histogram.without_empty_bins().bins;
	let bin_values: Vec<f64> = bins.iter().map(|bin| bin.value).collect();
	assert_eq!(bin_values, vec![2.0, 3.0]);
	assert!(bins.iter().all(|bin| bin.count == 1));
}
