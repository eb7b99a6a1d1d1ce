/*!
This module defines the narrow view of a dataset the engine needs. Loading data is not the engine's job. Anything that can answer "what is the value of attribute `i` in row `r`" can implement [`Dataset`](trait.Dataset.html).
*/

use crate::error::{check_len, Error, Result};

/// The kind of an attribute determines which histogram and which splitters can be used for it.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AttributeKind {
	/// Numeric attributes take arbitrary real values. Their histograms have one bin per distinct value.
	#[serde(rename = "numeric")]
	Numeric,
	/// Binned attributes have been discretized into `n_bins` ordered bins. Values are bin indexes.
	#[serde(rename = "binned")]
	Binned { n_bins: usize },
	/// Nominal attributes take one of `cardinality` unordered states. Values are state indexes.
	#[serde(rename = "nominal")]
	Nominal { cardinality: usize },
}

impl AttributeKind {
	/// Return the number of discrete states, or `None` for numeric attributes.
	pub fn n_states(&self) -> Option<usize> {
		match self {
			AttributeKind::Numeric => None,
			AttributeKind::Binned { n_bins } => Some(*n_bins),
			AttributeKind::Nominal { cardinality } => Some(*cardinality),
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			AttributeKind::Numeric => "numeric",
			AttributeKind::Binned { .. } => "binned",
			AttributeKind::Nominal { .. } => "nominal",
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attribute {
	pub name: String,
	pub kind: AttributeKind,
}

/// A `Dataset` gives row level access to attribute values, targets and weights. Missing attribute values are reported as `NaN`.
pub trait Dataset {
	fn n_rows(&self) -> usize;
	fn n_attributes(&self) -> usize;
	fn attribute(&self, attribute_index: usize) -> &Attribute;
	fn value(&self, row: usize, attribute_index: usize) -> f64;
	fn target(&self, row: usize) -> f64;
	fn weight(&self, _row: usize) -> f64 {
		1.0
	}

	/// Collect the values of one attribute for every row.
	fn column(&self, attribute_index: usize) -> Vec<f64> {
		(0..self.n_rows())
			.map(|row| self.value(row, attribute_index))
			.collect()
	}

	/// Collect the weight of every row.
	fn weights(&self) -> Vec<f64> {
		(0..self.n_rows()).map(|row| self.weight(row)).collect()
	}
}

/// `Instances` is a column major in memory dataset.
#[derive(Clone, Debug)]
pub struct Instances {
	attributes: Vec<Attribute>,
	columns: Vec<Vec<f64>>,
	targets: Vec<f64>,
	weights: Option<Vec<f64>>,
}

impl Instances {
	/// Create a dataset with one column per attribute. Every column, and `weights` if present, must have one entry per target.
	pub fn new(
		attributes: Vec<Attribute>,
		columns: Vec<Vec<f64>>,
		targets: Vec<f64>,
		weights: Option<Vec<f64>>,
	) -> Result<Self> {
		check_len("columns", attributes.len(), columns.len())?;
		for column in columns.iter() {
			check_len("column values", targets.len(), column.len())?;
		}
		if let Some(weights) = &weights {
			check_len("weights", targets.len(), weights.len())?;
		}
		for (attribute, column) in attributes.iter().zip(columns.iter()) {
			if let Some(n_states) = attribute.kind.n_states() {
				if let Some(value) = column
					.iter()
					.find(|value| !value.is_nan() && !is_state(**value, n_states))
				{
					return Err(Error::InvalidState {
						value: *value,
						n_states,
					});
				}
			}
		}
		Ok(Self {
			attributes,
			columns,
			targets,
			weights,
		})
	}
}

impl Dataset for Instances {
	fn n_rows(&self) -> usize {
		self.targets.len()
	}

	fn n_attributes(&self) -> usize {
		self.attributes.len()
	}

	fn attribute(&self, attribute_index: usize) -> &Attribute {
		&self.attributes[attribute_index]
	}

	fn value(&self, row: usize, attribute_index: usize) -> f64 {
		self.columns[attribute_index][row]
	}

	fn target(&self, row: usize) -> f64 {
		self.targets[row]
	}

	fn weight(&self, row: usize) -> f64 {
		match &self.weights {
			Some(weights) => weights[row],
			None => 1.0,
		}
	}

	fn column(&self, attribute_index: usize) -> Vec<f64> {
		self.columns[attribute_index].clone()
	}
}

/// Return true if `value` is an integral state index in `0..n_states`.
pub(crate) fn is_state(value: f64, n_states: usize) -> bool {
	value >= 0.0 && value.fract() == 0.0 && value < n_states as f64
}

#[test]
fn test_instances_rejects_ragged_columns() {
	let attributes = vec![Attribute {
		name: "x".to_owned(),
		kind: AttributeKind::Numeric,
	}];
	let result = Instances::new(attributes, vec![vec![1.0, 2.0]], vec![0.0], None);
	assert!(matches!(
		result,
		Err(Error::LengthMismatch {
			expected: 1,
			actual: 2,
			..
		})
	));
}

#[test]
fn test_instances_rejects_out_of_range_states() {
	let attributes = vec![Attribute {
		name: "color".to_owned(),
		kind: AttributeKind::Nominal { cardinality: 3 },
	}];
	let result = Instances::new(
		attributes,
		vec![vec![0.0, 3.0, f64::NAN]],
		vec![0.0, 1.0, 2.0],
		None,
	);
	assert!(matches!(
		result,
		Err(Error::InvalidState { n_states: 3, .. })
	));
}

#[test]
fn test_attribute_kind_deserializes_from_yaml() {
	let kind: AttributeKind = serde_yaml::from_str("type: binned\nn_bins: 16\n").unwrap();
	assert_eq!(kind, AttributeKind::Binned { n_bins: 16 });
	assert_eq!(kind.n_states(), Some(16));
	assert_eq!(AttributeKind::Numeric.n_states(), None);
}
