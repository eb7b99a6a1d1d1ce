/*!
Subbagging trains one function per random subsample of the rows. Building every subsample's histogram from scratch costs a full scan each, so the subsamples are instead ordered along a minimum spanning tree of their pairwise symmetric difference distances. Every histogram after the root is derived from its parent in the tree by adding and removing only the rows in which the two samples differ.
*/

use crate::{
	error::{Error, Result},
	histogram::{BinLayout, Histogram},
};
use fnv::FnvHashMap;
use itertools::{EitherOrBoth, Itertools};
use num_traits::ToPrimitive;
use rand::{seq::SliceRandom, Rng};
use std::{
	cmp::Reverse,
	collections::{BinaryHeap, VecDeque},
};

/// A subsample of the rows of a dataset, stored as sorted unique row indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
	rows: Vec<usize>,
}

impl Sample {
	pub fn new(mut rows: Vec<usize>) -> Self {
		rows.sort_unstable();
		rows.dedup();
		Self { rows }
	}

	pub fn rows(&self) -> &[usize] {
		&self.rows
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	/// The cost of scanning this sample to build its histogram from scratch.
	pub fn weight(&self) -> usize {
		self.rows.len()
	}

	/// The size of the symmetric difference of the two samples.
	pub fn distance(&self, other: &Sample) -> usize {
		self.rows
			.iter()
			.merge_join_by(other.rows.iter(), |a, b| a.cmp(b))
			.filter(|entry| !matches!(entry, EitherOrBoth::Both(..)))
			.count()
	}
}

/// The rows to add to and remove from one sample's histogram to obtain another's.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SampleDelta {
	pub to_add: Vec<usize>,
	pub to_del: Vec<usize>,
}

impl SampleDelta {
	pub fn between(from: &Sample, to: &Sample) -> Self {
		let mut delta = SampleDelta::default();
		for entry in from.rows.iter().merge_join_by(to.rows.iter(), |a, b| a.cmp(b)) {
			match entry {
				EitherOrBoth::Left(row) => delta.to_del.push(*row),
				EitherOrBoth::Right(row) => delta.to_add.push(*row),
				EitherOrBoth::Both(..) => {}
			}
		}
		delta
	}

	pub fn distance(&self) -> usize {
		self.to_add.len() + self.to_del.len()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsampleSize {
	/// A fraction of the rows, in `(0, 1]`.
	Ratio(f64),
	Count(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubagOptions {
	pub n_bags: usize,
	pub subsample: SubsampleSize,
}

impl Default for SubagOptions {
	fn default() -> Self {
		Self {
			n_bags: 20,
			subsample: SubsampleSize::Ratio(0.5),
		}
	}
}

impl SubagOptions {
	pub fn validate(&self) -> Result<()> {
		if self.n_bags == 0 {
			return Err(Error::InvalidOptions("n_bags must be positive".to_owned()));
		}
		if let SubsampleSize::Ratio(ratio) = self.subsample {
			if !(ratio > 0.0 && ratio <= 1.0) {
				return Err(Error::InvalidOptions(format!(
					"subsample ratio must be in (0, 1] but is {}",
					ratio
				)));
			}
		}
		Ok(())
	}

	/// The number of rows in each subsample of a dataset with `n_rows` rows.
	pub fn subsample_size(&self, n_rows: usize) -> Result<usize> {
		self.validate()?;
		let size = match self.subsample {
			SubsampleSize::Ratio(ratio) => (ratio * n_rows.to_f64().unwrap())
				.round()
				.to_usize()
				.unwrap(),
			SubsampleSize::Count(count) => count,
		};
		if size > n_rows {
			return Err(Error::SubsampleTooLarge {
				subsample_size: size,
				n_rows,
			});
		}
		Ok(size)
	}
}

/// Draw `size` distinct rows out of `n_rows` uniformly at random.
pub fn draw_subsample<R>(n_rows: usize, size: usize, rng: &mut R) -> Result<Sample>
where
	R: Rng + ?Sized,
{
	if size > n_rows {
		return Err(Error::SubsampleTooLarge {
			subsample_size: size,
			n_rows,
		});
	}
	let mut rows: Vec<usize> = (0..n_rows).collect();
	rows.shuffle(rng);
	rows.truncate(size);
	Ok(Sample::new(rows))
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubagEdge {
	pub from: usize,
	pub to: usize,
	pub delta: SampleDelta,
}

/// The samples of a subbagging run and the order to visit them in. `edges` lists the spanning tree in breadth first order from `root`, so the source of every edge is either the root or the target of an earlier edge.
#[derive(Clone, Debug, PartialEq)]
pub struct SubagSequence {
	pub samples: Vec<Sample>,
	pub root: usize,
	pub edges: Vec<SubagEdge>,
}

impl SubagSequence {
	/// Draw `n_bags` subsamples of `subsample_size` rows and order them.
	pub fn build<R>(
		n_rows: usize,
		subsample_size: usize,
		n_bags: usize,
		rng: &mut R,
	) -> Result<Self>
	where
		R: Rng + ?Sized,
	{
		let samples = (0..n_bags)
			.map(|_| draw_subsample(n_rows, subsample_size, rng))
			.collect::<Result<Vec<_>>>()?;
		Self::from_samples(samples)
	}

	pub fn from_options<R>(n_rows: usize, options: &SubagOptions, rng: &mut R) -> Result<Self>
	where
		R: Rng + ?Sized,
	{
		let subsample_size = options.subsample_size(n_rows)?;
		Self::build(n_rows, subsample_size, options.n_bags, rng)
	}

	/// Order the samples along a minimum spanning tree of their pairwise distances, rooted at the lightest sample.
	pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
		if samples.is_empty() {
			return Err(Error::InvalidOptions(
				"a subbagging sequence needs at least one sample".to_owned(),
			));
		}
		let n_samples = samples.len();
		let mut queue = BinaryHeap::new();
		for (i, j) in (0..n_samples).tuple_combinations() {
			queue.push(Reverse((samples[i].distance(&samples[j]), i, j)));
		}
		// Kruskal's algorithm.
		let mut components = DisjointSet::new(n_samples);
		let mut adjacency: FnvHashMap<usize, Vec<usize>> = FnvHashMap::default();
		let mut n_tree_edges = 0;
		while n_tree_edges + 1 < n_samples {
			let Reverse((_, i, j)) = match queue.pop() {
				Some(item) => item,
				None => break,
			};
			if components.union(i, j) {
				adjacency.entry(i).or_default().push(j);
				adjacency.entry(j).or_default().push(i);
				n_tree_edges += 1;
			}
		}
		let root = samples
			.iter()
			.enumerate()
			.min_by_key(|(index, sample)| (sample.weight(), *index))
			.map(|(index, _)| index)
			.unwrap_or(0);
		let mut edges = Vec::with_capacity(n_samples - 1);
		let mut visited = vec![false; n_samples];
		visited[root] = true;
		let mut frontier = VecDeque::new();
		frontier.push_back(root);
		while let Some(from) = frontier.pop_front() {
			let mut neighbors = adjacency.remove(&from).unwrap_or_default();
			neighbors.sort_unstable();
			for to in neighbors {
				if visited[to] {
					continue;
				}
				visited[to] = true;
				edges.push(SubagEdge {
					from,
					to,
					delta: SampleDelta::between(&samples[from], &samples[to]),
				});
				frontier.push_back(to);
			}
		}
		let sequence = Self {
			samples,
			root,
			edges,
		};
		log::debug!(
			"subbagging {} samples: {} incremental row updates instead of {} rows scanned",
			n_samples,
			sequence.total_distance(),
			sequence.samples.iter().map(Sample::weight).sum::<usize>()
		);
		Ok(sequence)
	}

	pub fn n_samples(&self) -> usize {
		self.samples.len()
	}

	/// The total number of row updates needed to visit every sample after the root.
	pub fn total_distance(&self) -> usize {
		self.edges.iter().map(|edge| edge.delta.distance()).sum()
	}

	/// The number of edges leaving each sample.
	pub fn out_degrees(&self) -> Vec<usize> {
		let mut out_degrees = vec![0; self.samples.len()];
		for edge in self.edges.iter() {
			out_degrees[edge.from] += 1;
		}
		out_degrees
	}

	/// Visit the histogram of every sample in sequence order. The root's histogram is built with a full scan. Every other histogram is derived from its parent's by applying the edge's delta. A parent's histogram is moved into its last child and cloned for the others, so at most one histogram per open branch is alive at once.
	pub fn for_each_histogram<F>(
		&self,
		layout: &BinLayout,
		targets: &[f64],
		weights: &[f64],
		mut f: F,
	) -> Result<()>
	where
		F: FnMut(usize, &Histogram) -> Result<()>,
	{
		let mut remaining = self.out_degrees();
		let mut histograms: Vec<Option<Histogram>> = vec![None; self.samples.len()];
		let root_histogram =
			Histogram::from_layout(layout, self.samples[self.root].rows(), targets, weights)?;
		f(self.root, &root_histogram)?;
		if remaining[self.root] > 0 {
			histograms[self.root] = Some(root_histogram);
		}
		for edge in self.edges.iter() {
			remaining[edge.from] -= 1;
			let parent = if remaining[edge.from] == 0 {
				histograms[edge.from].take()
			} else {
				histograms[edge.from].clone()
			};
			let mut histogram = parent.ok_or_else(|| {
				Error::InvalidOptions(format!(
					"sample {} is visited before its parent {}",
					edge.to, edge.from
				))
			})?;
			histogram.apply_delta(layout, &edge.delta, targets, weights);
			f(edge.to, &histogram)?;
			if remaining[edge.to] > 0 {
				histograms[edge.to] = Some(histogram);
			}
		}
		Ok(())
	}
}

/// Union find with path compression and union by size.
struct DisjointSet {
	parent: Vec<usize>,
	size: Vec<usize>,
}

impl DisjointSet {
	fn new(n: usize) -> Self {
		Self {
			parent: (0..n).collect(),
			size: vec![1; n],
		}
	}

	fn find(&mut self, mut element: usize) -> usize {
		let mut root = element;
		while self.parent[root] != root {
			root = self.parent[root];
		}
		while self.parent[element] != root {
			let next = self.parent[element];
			self.parent[element] = root;
			element = next;
		}
		root
	}

	/// Merge the sets containing `a` and `b`. Returns false if they were already the same set.
	fn union(&mut self, a: usize, b: usize) -> bool {
		let a = self.find(a);
		let b = self.find(b);
		if a == b {
			return false;
		}
		let (large, small) = if self.size[a] >= self.size[b] {
			(a, b)
		} else {
			(b, a)
		};
		self.parent[small] = large;
		self.size[large] += self.size[small];
		true
	}
}

#[cfg(test)]
use rand::SeedableRng;
#[cfg(test)]
use rand_xoshiro::Xoshiro256Plus;

#[test]
fn test_two_samples_form_a_single_edge() {
	let mut rng = Xoshiro256Plus::seed_from_u64(0);
	let sequence = SubagSequence::build(10, 5, 2, &mut rng).unwrap();
	assert_eq!(sequence.samples.len(), 2);
	assert!(sequence.samples.iter().all(|sample| sample.len() == 5));
	assert_eq!(sequence.root, 0);
	assert_eq!(sequence.edges.len(), 1);
	let edge = &sequence.edges[0];
	assert_eq!((edge.from, edge.to), (0, 1));
	let (a, b) = (sequence.samples[0].rows(), sequence.samples[1].rows());
	let expected_add: Vec<usize> = b.iter().cloned().filter(|row| !a.contains(row)).collect();
	let expected_del: Vec<usize> = a.iter().cloned().filter(|row| !b.contains(row)).collect();
	assert_eq!(edge.delta.to_add, expected_add);
	assert_eq!(edge.delta.to_del, expected_del);
	assert_eq!(edge.delta.to_add.len(), edge.delta.to_del.len());
	assert_eq!(
		sequence.total_distance(),
		sequence.samples[0].distance(&sequence.samples[1])
	);
}

#[test]
fn test_sample_delta() {
	let from = Sample::new(vec![4, 1, 2, 2]);
	let to = Sample::new(vec![2, 3, 5]);
	assert_eq!(from.rows(), &[1, 2, 4]);
	let delta = SampleDelta::between(&from, &to);
	insta::assert_debug_snapshot!(delta, @r###"
 SampleDelta {
     to_add: [
         3,
         5,
     ],
     to_del: [
         1,
         4,
     ],
 }
 "###);
	assert_eq!(delta.distance(), from.distance(&to));
}

#[test]
fn test_draw_subsample() {
	let mut rng = Xoshiro256Plus::seed_from_u64(3);
	let sample = draw_subsample(20, 7, &mut rng).unwrap();
	assert_eq!(sample.len(), 7);
	assert!(sample.rows().windows(2).all(|pair| pair[0] < pair[1]));
	assert!(sample.rows().iter().all(|row| *row < 20));
	assert_eq!(draw_subsample(20, 20, &mut rng).unwrap().len(), 20);
	assert!(matches!(
		draw_subsample(5, 6, &mut rng),
		Err(Error::SubsampleTooLarge {
			subsample_size: 6,
			n_rows: 5
		})
	));
}

#[test]
fn test_root_is_the_lightest_sample() {
	let samples = vec![
		Sample::new(vec![0, 1, 2, 3]),
		Sample::new(vec![1, 2]),
		Sample::new(vec![0, 1, 2]),
		Sample::new(vec![5, 6]),
	];
	let sequence = SubagSequence::from_samples(samples).unwrap();
	assert_eq!(sequence.root, 1);
	assert_eq!(sequence.edges[0].from, 1);
}

#[test]
fn test_single_sample_has_no_edges() {
	let sequence = SubagSequence::from_samples(vec![Sample::new(vec![1, 2])]).unwrap();
	assert_eq!(sequence.root, 0);
	assert!(sequence.edges.is_empty());
	assert!(SubagSequence::from_samples(Vec::new()).is_err());
}

#[test]
fn test_spanning_tree_is_minimal() {
	for seed in 0..5 {
		let mut rng = Xoshiro256Plus::seed_from_u64(seed);
		let sequence = SubagSequence::build(12, 6, 5, &mut rng).unwrap();
		let samples = &sequence.samples;
		let pairs: Vec<(usize, usize)> = (0..samples.len()).tuple_combinations().collect();
		// Enumerate every set of n - 1 edges and keep the spanning ones.
		let mut best = usize::MAX;
		for tree in pairs.iter().combinations(samples.len() - 1) {
			let mut components = DisjointSet::new(samples.len());
			if tree.iter().all(|(i, j)| components.union(*i, *j)) {
				let total: usize = tree
					.iter()
					.map(|(i, j)| samples[*i].distance(&samples[*j]))
					.sum();
				best = best.min(total);
			}
		}
		assert_eq!(sequence.total_distance(), best);
	}
}

#[test]
fn test_every_sample_is_reached_once() {
	let mut rng = Xoshiro256Plus::seed_from_u64(11);
	let sequence = SubagSequence::build(50, 20, 9, &mut rng).unwrap();
	assert_eq!(sequence.edges.len(), 8);
	let mut reached = vec![false; 9];
	reached[sequence.root] = true;
	for edge in sequence.edges.iter() {
		assert!(reached[edge.from], "edge source must already be reached");
		assert!(!reached[edge.to], "sample reached twice");
		reached[edge.to] = true;
	}
	assert!(reached.iter().all(|reached| *reached));
	assert_eq!(sequence.out_degrees().iter().sum::<usize>(), 8);
}

#[test]
fn test_incremental_histograms_match_full_scans() {
	let mut rng = Xoshiro256Plus::seed_from_u64(5);
	let n_rows = 40;
	let column: Vec<f64> = (0..n_rows)
		.map(|row| if row % 9 == 0 { f64::NAN } else { (row % 7) as f64 })
		.collect();
	let targets: Vec<f64> = (0..n_rows).map(|row| (row * 13 % 5) as f64 - 2.0).collect();
	let weights: Vec<f64> = (0..n_rows).map(|row| 1.0 + (row % 3) as f64).collect();
	let layout = BinLayout::numeric(&column);
	let sequence = SubagSequence::build(n_rows, 15, 6, &mut rng).unwrap();
	let mut visited = Vec::new();
	sequence
		.for_each_histogram(&layout, &targets, &weights, |index, histogram| {
			let expected =
				Histogram::from_layout(&layout, sequence.samples[index].rows(), &targets, &weights)?;
			assert_eq!(histogram.bins.len(), expected.bins.len());
			for (a, b) in histogram.bins.iter().zip(expected.bins.iter()) {
				assert_eq!(a.value, b.value);
				assert!((a.sum - b.sum).abs() < 1e-9);
				assert!((a.weight - b.weight).abs() < 1e-9);
			}
			assert!((histogram.missing.sum - expected.missing.sum).abs() < 1e-9);
			assert!((histogram.missing.weight - expected.missing.weight).abs() < 1e-9);
			visited.push(index);
			Ok(())
		})
		.unwrap();
	visited.sort_unstable();
	assert_eq!(visited, (0..6).collect::<Vec<_>>());
}

#[test]
fn test_subsample_size_from_options() {
	let options = SubagOptions {
		n_bags: 3,
		subsample: SubsampleSize::Ratio(0.25),
	};
	assert_eq!(options.subsample_size(40).unwrap(), 10);
	let options = SubagOptions {
		n_bags: 3,
		subsample: SubsampleSize::Count(41),
	};
	assert!(options.subsample_size(40).is_err());
	let options = SubagOptions {
		n_bags: 0,
		..SubagOptions::default()
	};
	assert!(options.validate().is_err());
}
