/*!
This module defines the `Config` struct, which is read from a YAML file and converted into the options structs of the splitters and the subbagging sequence.

```yaml
seed: 7
interval:
  alpha: 0.05
  line_search: true
subag:
  n_bags: 10
  subsample_ratio: 0.5
```
*/

use crate::{
	error::{Error, Result},
	interval::{IntervalLimit, IntervalOptions},
	subag::{SubagOptions, SubsampleSize},
};
use anyhow::Context;
use std::path::Path;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
	pub seed: Option<u64>,
	pub interval: Option<IntervalConfig>,
	pub subag: Option<SubagConfig>,
}

/// At most one of `max_intervals` and `alpha` may be given.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalConfig {
	pub max_intervals: Option<usize>,
	pub alpha: Option<f64>,
	pub min_leaf_weight: Option<f64>,
	pub line_search: Option<bool>,
}

/// At most one of `subsample_ratio` and `subsample_size` may be given.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubagConfig {
	pub n_bags: Option<usize>,
	pub subsample_ratio: Option<f64>,
	pub subsample_size: Option<usize>,
}

impl Config {
	pub fn seed(&self) -> u64 {
		self.seed.unwrap_or(DEFAULT_SEED)
	}

	pub fn interval_options(&self) -> Result<IntervalOptions> {
		let defaults = IntervalOptions::default();
		let config = match &self.interval {
			Some(config) => config,
			None => return Ok(defaults),
		};
		let limit = match (config.max_intervals, config.alpha) {
			(Some(_), Some(_)) => {
				return Err(Error::InvalidOptions(
					"max_intervals and alpha cannot both be set".to_owned(),
				))
			}
			(Some(max_intervals), None) => IntervalLimit::MaxIntervals(max_intervals),
			(None, Some(alpha)) => IntervalLimit::WeightFraction(alpha),
			(None, None) => defaults.limit,
		};
		let options = IntervalOptions {
			limit,
			min_leaf_weight: config.min_leaf_weight.unwrap_or(defaults.min_leaf_weight),
			line_search: config.line_search.unwrap_or(defaults.line_search),
		};
		options.validate()?;
		Ok(options)
	}

	pub fn subag_options(&self) -> Result<SubagOptions> {
		let defaults = SubagOptions::default();
		let config = match &self.subag {
			Some(config) => config,
			None => return Ok(defaults),
		};
		let subsample = match (config.subsample_ratio, config.subsample_size) {
			(Some(_), Some(_)) => {
				return Err(Error::InvalidOptions(
					"subsample_ratio and subsample_size cannot both be set".to_owned(),
				))
			}
			(Some(ratio), None) => SubsampleSize::Ratio(ratio),
			(None, Some(size)) => SubsampleSize::Count(size),
			(None, None) => defaults.subsample,
		};
		let options = SubagOptions {
			n_bags: config.n_bags.unwrap_or(defaults.n_bags),
			subsample,
		};
		options.validate()?;
		Ok(options)
	}
}

pub fn load_config(config_path: &Path) -> anyhow::Result<Config> {
	let config = std::fs::read_to_string(config_path)
		.with_context(|| format!("failed to read config file {}", config_path.display()))?;
	let config = serde_yaml::from_str(&config)
		.with_context(|| format!("failed to parse config file {}", config_path.display()))?;
	Ok(config)
}

#[test]
fn test_empty_config_uses_defaults() {
	let config: Config = serde_yaml::from_str("{}").unwrap();
	assert_eq!(config.seed(), DEFAULT_SEED);
	assert_eq!(
		config.interval_options().unwrap().limit,
		IntervalLimit::MaxIntervals(32)
	);
	assert_eq!(config.subag_options().unwrap(), SubagOptions::default());
}

#[test]
fn test_parse_config() {
	let config: Config = serde_yaml::from_str(
		"
seed: 7
interval:
  alpha: 0.05
  line_search: true
subag:
  n_bags: 10
  subsample_size: 100
",
	)
	.unwrap();
	assert_eq!(config.seed(), 7);
	let interval_options = config.interval_options().unwrap();
	assert_eq!(interval_options.limit, IntervalLimit::WeightFraction(0.05));
	assert!(interval_options.line_search);
	assert_eq!(interval_options.min_leaf_weight, 0.0);
	let subag_options = config.subag_options().unwrap();
	assert_eq!(subag_options.n_bags, 10);
	assert_eq!(subag_options.subsample, SubsampleSize::Count(100));
}

#[test]
fn test_json_config() {
	let config: Config =
		serde_yaml::from_str(r#"{"interval": {"max_intervals": 4, "min_leaf_weight": 2.5}}"#)
			.unwrap();
	let options = config.interval_options().unwrap();
	assert_eq!(options.limit, IntervalLimit::MaxIntervals(4));
	assert_eq!(options.min_leaf_weight, 2.5);
}

#[test]
fn test_conflicting_options_are_rejected() {
	let config: Config =
		serde_yaml::from_str("interval:\n  max_intervals: 4\n  alpha: 0.1\n").unwrap();
	assert!(matches!(
		config.interval_options(),
		Err(Error::InvalidOptions(_))
	));
	let config: Config = serde_yaml::from_str("interval:\n  alpha: 1.5\n").unwrap();
	assert!(config.interval_options().is_err());
	let config: Config = serde_yaml::from_str("subag:\n  n_bags: 0\n").unwrap();
	assert!(config.subag_options().is_err());
	assert!(serde_yaml::from_str::<Config>("depth: 3\n").is_err());
}

#[test]
fn test_load_config() {
	let dir = std::env::temp_dir();
	let path = dir.join(format!("ga2m_engine_config_{}.yaml", std::process::id()));
	std::fs::write(&path, "seed: 3\nsubag:\n  subsample_ratio: 0.25\n").unwrap();
	let config = load_config(&path).unwrap();
	std::fs::remove_file(&path).unwrap();
	assert_eq!(config.seed(), 3);
	assert_eq!(
		config.subag_options().unwrap().subsample,
		SubsampleSize::Ratio(0.25)
	);
	let error = load_config(&dir.join("ga2m_engine_missing_config.yaml")).unwrap_err();
	assert!(error.to_string().starts_with("failed to read config file"));
}
