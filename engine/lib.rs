/*!
This crate fits the shape functions of additive models. A generalized additive model predicts with a sum of one function per attribute, and a GA²M adds one function per selected pair of attributes. This crate does the part of training that turns residuals into those functions:

- The [`interval`](interval/index.html) splitter fits a piecewise constant function of one attribute by best first partitioning of a histogram.
- The [`quadrant`](quadrant/index.html) splitter fits a function of two discrete attributes with one primary cut and a companion cut on each side of it.
- The [`subag`](subag/index.html) module orders the subsamples of a subbagging run so each histogram is derived from the previous one instead of rebuilt.
- The [`function`](function/index.html) and [`function_2d`](function_2d/index.html) modules hold the resulting functions and the algebra the boosting loop needs to add, scale, and compress them.

The entry points taking a [`Dataset`](dataset/trait.Dataset.html) are in [`shape`](shape/index.html).
*/

#![allow(clippy::tabs_in_doc_comments)]

pub mod config;
pub mod cumulative;
pub mod dataset;
pub mod error;
pub mod function;
pub mod function_2d;
pub mod histogram;
pub mod interval;
pub mod line_search;
pub mod not_nan;
pub mod quadrant;
pub mod shape;
pub mod subag;
pub mod text;

pub use self::{
	config::{load_config, Config},
	dataset::{Attribute, AttributeKind, Dataset, Instances},
	error::{Error, Result},
	function::Function1D,
	function_2d::Function2D,
	interval::{IntervalLimit, IntervalOptions},
	shape::{build_interval, build_intervals_parallel, build_quadrant, build_subagged_interval},
	subag::{SubagOptions, SubagSequence, SubsampleSize},
};
