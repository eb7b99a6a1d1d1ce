/*!
The interval splitter partitions the bins of a histogram into a small number of contiguous intervals that best explain the target, in the sense of least squares.

Intervals live in an arena, the [`IntervalTree`](struct.IntervalTree.html), and refer to their children by index. Growth is best first: every interval that has been evaluated and found splittable waits in a priority queue keyed by how much its split would reduce the loss, and the most beneficial split is taken until the interval budget runs out.
*/

use crate::{
	error::{Error, Result},
	function::Function1D,
	histogram::{gain, Histogram, SufficientStats},
	not_nan::split_between,
};
use rand::Rng;
use std::{cmp::Ordering, collections::BinaryHeap};

/// This controls how far the splitter grows.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum IntervalLimit {
	/// Produce at most this many intervals.
	MaxIntervals(usize),
	/// Never split an interval holding at most this fraction of the total weight, and keep splitting until no interval can be split profitably.
	WeightFraction(f64),
}

/// These are the options passed to [`build_function`](fn.build_function.html).
#[derive(Clone, Debug)]
pub struct IntervalOptions {
	pub limit: IntervalLimit,
	/// In `MaxIntervals` mode, intervals whose weight is at most this value are not split.
	pub min_leaf_weight: f64,
	/// If true, leaf predictions are replaced by a Newton step for logistic loss after the intervals are chosen. See [`line_search`](../line_search/fn.line_search.html).
	pub line_search: bool,
}

impl Default for IntervalOptions {
	fn default() -> Self {
		Self {
			limit: IntervalLimit::MaxIntervals(32),
			min_leaf_weight: 0.0,
			line_search: false,
		}
	}
}

impl IntervalOptions {
	pub fn validate(&self) -> Result<()> {
		match self.limit {
			IntervalLimit::MaxIntervals(0) => Err(Error::InvalidOptions(
				"max_intervals must be at least 1".to_owned(),
			)),
			IntervalLimit::WeightFraction(alpha) if !(alpha > 0.0 && alpha <= 1.0) => {
				Err(Error::InvalidOptions(format!(
					"alpha must be in (0, 1] but is {}",
					alpha
				)))
			}
			_ => Ok(()),
		}
	}
}

/// An `Interval` covers the bins `start..end` of the histogram it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct Interval {
	pub start: usize,
	pub end: usize,
	pub sum: f64,
	pub weight: f64,
	pub state: IntervalState,
	/// `-gain + sum^2 / weight`, the change in loss from taking this interval's split. Lower is better. Only meaningful once the interval is `Internal`.
	pub priority: f64,
	/// An interval is finalized once its split has been taken and both of its children have been evaluated. Only finalized intervals contribute a split to the output.
	pub finalized: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IntervalState {
	/// The interval may be splittable but has not been evaluated yet.
	Unresolved,
	/// The interval was evaluated and will never be split.
	Leaf,
	/// The interval was evaluated and its best split was found.
	Internal(IntervalSplit),
}

#[derive(Clone, Debug, PartialEq)]
pub struct IntervalSplit {
	/// The split value, halfway between the last bin value of the left child and the first bin value of the right child.
	pub value: f64,
	/// The index of the first bin of the right child.
	pub cut: usize,
	/// `gain(left) + gain(right)`.
	pub gain: f64,
	pub left: usize,
	pub right: usize,
}

impl Interval {
	fn new(start: usize, end: usize, stats: SufficientStats) -> Self {
		Self {
			start,
			end,
			sum: stats.sum,
			weight: stats.weight,
			state: IntervalState::Unresolved,
			priority: f64::INFINITY,
			finalized: false,
		}
	}

	pub fn stats(&self) -> SufficientStats {
		SufficientStats::new(self.sum, self.weight)
	}

	pub fn as_split(&self) -> Option<&IntervalSplit> {
		match &self.state {
			IntervalState::Internal(split) => Some(split),
			_ => None,
		}
	}

	pub fn is_leaf(&self) -> bool {
		matches!(self.state, IntervalState::Leaf)
	}
}

/// The arena of intervals. The root is at index 0.
#[derive(Clone, Debug)]
pub struct IntervalTree {
	pub intervals: Vec<Interval>,
}

impl IntervalTree {
	/// Create a tree whose root covers every bin of `histogram`. The histogram must not be empty.
	pub fn new(histogram: &Histogram) -> Self {
		let root = Interval::new(0, histogram.len(), histogram.total());
		Self {
			intervals: vec![root],
		}
	}

	pub fn root(&self) -> &Interval {
		&self.intervals[0]
	}

	/// Evaluate the interval at `id`. If it holds at most `limit` weight or a single bin, it becomes a leaf. Otherwise the best cut is found with a single forward scan and the interval's two children are allocated, unresolved.
	pub fn split<R>(&mut self, id: usize, histogram: &Histogram, limit: f64, rng: &mut R)
	where
		R: Rng + ?Sized,
	{
		let interval = &self.intervals[id];
		let (start, end, total) = (interval.start, interval.end, interval.stats());
		if total.weight <= limit || end - start <= 1 {
			self.intervals[id].state = IntervalState::Leaf;
			return;
		}
		// Scan every cut, keeping all the cuts tied for the lowest loss.
		let mut best_loss = f64::INFINITY;
		let mut best_cuts: Vec<usize> = Vec::new();
		let mut left = SufficientStats::default();
		for (offset, bin) in histogram.bins[start..end - 1].iter().enumerate() {
			left += bin.stats();
			let right = total - left;
			let loss = -(gain(left.sum, left.weight) + gain(right.sum, right.weight));
			match loss.partial_cmp(&best_loss) {
				Some(Ordering::Less) => {
					best_loss = loss;
					best_cuts.clear();
					best_cuts.push(start + offset + 1);
				}
				Some(Ordering::Equal) => best_cuts.push(start + offset + 1),
				_ => {}
			}
		}
		let cut = match best_cuts.len() {
			0 => {
				self.intervals[id].state = IntervalState::Leaf;
				return;
			}
			1 => best_cuts[0],
			n => best_cuts[rng.gen_range(0, n)],
		};
		let left_stats: SufficientStats = histogram.bins[start..cut]
			.iter()
			.map(|bin| bin.stats())
			.sum();
		let right_stats = total - left_stats;
		let split_gain = -best_loss;
		let value = split_between(histogram.bins[cut - 1].value, histogram.bins[cut].value);
		let left = self.intervals.len();
		let right = left + 1;
		self.intervals.push(Interval::new(start, cut, left_stats));
		self.intervals.push(Interval::new(cut, end, right_stats));
		let interval = &mut self.intervals[id];
		interval.priority = -split_gain + total.gain();
		interval.state = IntervalState::Internal(IntervalSplit {
			value,
			cut,
			gain: split_gain,
			left,
			right,
		});
	}

	/// Return the ids of the output segments in order. A finalized interval is replaced by its children, anything else is a segment.
	pub fn leaves(&self) -> Vec<usize> {
		let mut leaves = Vec::new();
		let mut stack = vec![0];
		while let Some(id) = stack.pop() {
			let interval = &self.intervals[id];
			match interval.as_split() {
				Some(split) if interval.finalized => {
					stack.push(split.right);
					stack.push(split.left);
				}
				_ => leaves.push(id),
			}
		}
		leaves
	}

	/// Return the split values of the finalized intervals in order. Ordering the splits by their cut is the same as visiting them in order, since a finalized interval's cut always lies strictly inside its ancestors' ranges.
	pub fn split_values(&self) -> Vec<f64> {
		let mut splits: Vec<&IntervalSplit> = self
			.intervals
			.iter()
			.filter(|interval| interval.finalized)
			.filter_map(|interval| interval.as_split())
			.collect();
		splits.sort_by_key(|split| split.cut);
		splits.iter().map(|split| split.value).collect()
	}

	pub fn n_finalized(&self) -> usize {
		self.intervals
			.iter()
			.filter(|interval| interval.finalized)
			.count()
	}
}

/// In `WeightFraction` mode a split is only taken if it reduces the loss by more than this, so rounding error in the gains of a constant target does not count as an improvement.
const MIN_IMPROVEMENT: f64 = 1e-12;

struct QueueItem {
	priority: f64,
	id: usize,
}

impl PartialEq for QueueItem {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for QueueItem {
	/// `BinaryHeap` is a max heap, so the ordering is reversed to pop the lowest priority first. Ties go to the interval created first.
	fn cmp(&self, other: &Self) -> Ordering {
		other
			.priority
			.partial_cmp(&self.priority)
			.unwrap_or(Ordering::Equal)
			.then_with(|| other.id.cmp(&self.id))
	}
}

/// Grow an interval tree over a non empty histogram.
pub fn grow<R>(histogram: &Histogram, options: &IntervalOptions, rng: &mut R) -> IntervalTree
where
	R: Rng + ?Sized,
{
	let mut tree = IntervalTree::new(histogram);
	let (max_splits, limit, profitable_only) = match options.limit {
		IntervalLimit::MaxIntervals(max_intervals) => {
			(max_intervals.saturating_sub(1), options.min_leaf_weight, false)
		}
		IntervalLimit::WeightFraction(alpha) => (usize::MAX, alpha * tree.root().weight, true),
	};
	if max_splits == 0 {
		tree.intervals[0].state = IntervalState::Leaf;
		return tree;
	}
	tree.split(0, histogram, limit, rng);
	let should_push = |interval: &Interval| match interval.state {
		IntervalState::Internal(_) => !profitable_only || interval.priority < -MIN_IMPROVEMENT,
		_ => false,
	};
	if max_splits == 1 {
		if should_push(tree.root()) {
			tree.intervals[0].finalized = true;
		}
		return tree;
	}
	let mut queue: BinaryHeap<QueueItem> = BinaryHeap::new();
	if should_push(tree.root()) {
		queue.push(QueueItem {
			priority: tree.root().priority,
			id: 0,
		});
	}
	let mut n_splits = 0;
	while n_splits < max_splits {
		let id = match queue.pop() {
			Some(item) => item.id,
			None => break,
		};
		tree.intervals[id].finalized = true;
		n_splits += 1;
		let (left, right) = match tree.intervals[id].as_split() {
			Some(split) => (split.left, split.right),
			None => continue,
		};
		for child in [left, right].iter() {
			tree.split(*child, histogram, limit, rng);
			let interval = &tree.intervals[*child];
			if should_push(interval) {
				queue.push(QueueItem {
					priority: interval.priority,
					id: *child,
				});
			}
		}
	}
	tree
}

/// Build the piecewise constant function of `attribute` that best fits the targets summarized in `histogram`. An empty histogram produces the constant function 0, a histogram with a single bin produces its mean. The missing value prediction is always the mean of the missing channel.
pub fn build_function<R>(
	attribute: usize,
	histogram: &Histogram,
	options: &IntervalOptions,
	rng: &mut R,
) -> Result<Function1D>
where
	R: Rng + ?Sized,
{
	options.validate()?;
	let prediction_on_missing = histogram.missing.mean();
	if histogram.is_empty() {
		return Ok(Function1D::constant(attribute, 0.0, prediction_on_missing));
	}
	let tree = grow(histogram, options, rng);
	let leaves = tree.leaves();
	let mut splits = tree.split_values();
	splits.push(f64::INFINITY);
	let predictions: Vec<f64> = leaves
		.iter()
		.map(|id| tree.intervals[*id].stats().mean())
		.collect();
	log::debug!(
		"attribute {}: {} bins, {} intervals",
		attribute,
		histogram.len(),
		predictions.len()
	);
	Ok(Function1D {
		attribute,
		splits,
		predictions,
		prediction_on_missing,
	})
}

#[cfg(test)]
fn rng() -> rand_xoshiro::Xoshiro256Plus {
	rand::SeedableRng::seed_from_u64(42)
}

#[cfg(test)]
fn unit_histogram(values: &[f64], targets: &[f64]) -> Histogram {
	Histogram::from_values(values, targets, &vec![1.0; values.len()]).unwrap()
}

#[cfg(test)]
fn max_intervals(k: usize) -> IntervalOptions {
	IntervalOptions {
		limit: IntervalLimit::MaxIntervals(k),
		..Default::default()
	}
}

#[test]
fn test_two_intervals_split_at_largest_jump() {
	let histogram = unit_histogram(
		&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0],
		&[0.0, 0.0, 1.0, 1.0, 10.0, 10.0],
	);
	let function = build_function(0, &histogram, &max_intervals(2), &mut rng()).unwrap();
	insta::assert_debug_snapshot!(function, @r###"
 Function1D {
     attribute: 0,
     splits: [
         2.5,
         inf,
     ],
     predictions: [
         0.5,
         10.0,
     ],
     prediction_on_missing: 0.0,
 }
 "###);
}

#[test]
fn test_one_interval_is_the_mean() {
	let histogram = unit_histogram(&[1.0, 2.0, 3.0, f64::NAN], &[1.0, 2.0, 6.0, 5.0]);
	let function = build_function(0, &histogram, &max_intervals(1), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![f64::INFINITY]);
	assert_eq!(function.predictions, vec![3.0]);
	assert_eq!(function.prediction_on_missing, 5.0);
}

#[test]
fn test_degenerate_histograms() {
	let empty = Histogram::default();
	let function = build_function(2, &empty, &max_intervals(8), &mut rng()).unwrap();
	assert_eq!(function, Function1D::zero(2));
	let single = unit_histogram(&[4.0, 4.0], &[1.0, 2.0]);
	let function = build_function(2, &single, &max_intervals(8), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![f64::INFINITY]);
	assert_eq!(function.predictions, vec![1.5]);
}

#[test]
fn test_segment_count_is_bounded() {
	let values: Vec<f64> = (0..40).map(|i| i as f64).collect();
	let targets: Vec<f64> = (0..40).map(|i| ((i * 7919) % 13) as f64).collect();
	let histogram = unit_histogram(&values, &targets);
	for k in 1..12 {
		let function = build_function(0, &histogram, &max_intervals(k), &mut rng()).unwrap();
		assert!(function.n_segments() <= k);
		assert_eq!(function.predictions.len(), function.splits.len());
		assert!(Function1D::new(
			0,
			function.splits.clone(),
			function.predictions.clone(),
			0.0
		)
		.is_ok());
	}
}

#[test]
fn test_leaves_tile_the_histogram() {
	let values: Vec<f64> = (0..30).map(|i| (i / 2) as f64).collect();
	let targets: Vec<f64> = (0..30).map(|i| ((i * 31) % 7) as f64 - 3.0).collect();
	let histogram = unit_histogram(&values, &targets);
	let tree = grow(&histogram, &max_intervals(6), &mut rng());
	let leaves = tree.leaves();
	assert_eq!(leaves.len(), tree.n_finalized() + 1);
	let mut next = 0;
	for id in leaves.iter() {
		let interval = &tree.intervals[*id];
		assert_eq!(interval.start, next);
		assert!(interval.end > interval.start);
		next = interval.end;
	}
	assert_eq!(next, histogram.len());
	for interval in tree.intervals.iter() {
		if let Some(split) = interval.as_split() {
			let left = &tree.intervals[split.left];
			let right = &tree.intervals[split.right];
			assert_eq!(left.start, interval.start);
			assert_eq!(left.end, right.start);
			assert_eq!(right.end, interval.end);
		}
	}
}

#[test]
fn test_best_first_takes_the_most_valuable_split() {
	// The jump between 3 and 4 dwarfs the jump between 1 and 2, so with two splits both are found, and with one split only the larger.
	let histogram = unit_histogram(
		&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
		&[0.0, 1.0, 1.0, 100.0, 100.0, 100.0],
	);
	let function = build_function(0, &histogram, &max_intervals(2), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![3.5, f64::INFINITY]);
	let function = build_function(0, &histogram, &max_intervals(3), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![1.5, 3.5, f64::INFINITY]);
	assert_eq!(function.predictions, vec![0.0, 1.0, 100.0]);
}

#[test]
fn test_ties_are_broken_at_random() {
	// Every cut of a constant target has the same loss.
	let histogram = unit_histogram(&[1.0, 2.0, 3.0, 4.0, 5.0], &[1.0; 5]);
	let mut seen = std::collections::BTreeSet::new();
	let mut rng = rng();
	for _ in 0..64 {
		let function = build_function(0, &histogram, &max_intervals(2), &mut rng).unwrap();
		seen.insert(crate::not_nan::NotNan::new(function.splits[0]).unwrap());
	}
	assert!(seen.len() > 1);
}

#[test]
fn test_weight_fraction_stops_at_unprofitable_splits() {
	let histogram = unit_histogram(
		&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
		&[0.0, 0.0, 0.0, 0.0, 5.0, 5.0, 5.0, 5.0],
	);
	let options = IntervalOptions {
		limit: IntervalLimit::WeightFraction(0.125),
		..Default::default()
	};
	let function = build_function(0, &histogram, &options, &mut rng()).unwrap();
	assert_eq!(function.splits, vec![4.5, f64::INFINITY]);
	assert_eq!(function.predictions, vec![0.0, 5.0]);
}

#[test]
fn test_weight_fraction_respects_the_weight_limit() {
	let values: Vec<f64> = (0..16).map(|i| i as f64).collect();
	let targets: Vec<f64> = (0..16).map(|i| (i * i) as f64).collect();
	let histogram = unit_histogram(&values, &targets);
	let options = IntervalOptions {
		limit: IntervalLimit::WeightFraction(0.25),
		..Default::default()
	};
	let tree = grow(&histogram, &options, &mut rng());
	for interval in tree.intervals.iter().filter(|interval| interval.finalized) {
		assert!(interval.weight > 4.0);
	}
}

#[test]
fn test_invalid_options_are_rejected() {
	let histogram = unit_histogram(&[1.0, 2.0], &[1.0, 2.0]);
	assert!(build_function(0, &histogram, &max_intervals(0), &mut rng()).is_err());
	let options = IntervalOptions {
		limit: IntervalLimit::WeightFraction(1.5),
		..Default::default()
	};
	assert!(build_function(0, &histogram, &options, &mut rng()).is_err());
}

#[test]
fn test_extreme_magnitudes_keep_splits_increasing() {
	let histogram = unit_histogram(&[-1.7e308, 1.7e308], &[0.0, 1.0]);
	let function = build_function(0, &histogram, &max_intervals(2), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![0.0, f64::INFINITY]);
	assert!(Function1D::new(
		0,
		function.splits.clone(),
		function.predictions.clone(),
		0.0
	)
	.is_ok());
	assert_eq!(function.evaluate(-1.7e308), 0.0);
	assert_eq!(function.evaluate(1.7e308), 1.0);
}

#[test]
fn test_infinite_values_are_ordered_bins() {
	let histogram = unit_histogram(&[1.0, 2.0, f64::INFINITY], &[0.0, 0.0, 100.0]);
	assert_eq!(histogram.len(), 3);
	assert_eq!(histogram.missing.weight, 0.0);
	let function = build_function(0, &histogram, &max_intervals(2), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![2.0, f64::INFINITY]);
	assert_eq!(function.evaluate(f64::INFINITY), 100.0);
	assert_eq!(function.evaluate(2.0), 0.0);
	assert_eq!(function.prediction_on_missing, 0.0);
	let histogram = unit_histogram(&[f64::NEG_INFINITY, 1.0, 2.0], &[50.0, 0.0, 0.0]);
	let function = build_function(0, &histogram, &max_intervals(2), &mut rng()).unwrap();
	assert_eq!(function.splits, vec![f64::MIN, f64::INFINITY]);
	assert_eq!(function.evaluate(f64::NEG_INFINITY), 50.0);
	assert_eq!(function.evaluate(1.0), 0.0);
}
