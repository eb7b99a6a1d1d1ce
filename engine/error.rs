use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// These are the contract violations the engine rejects at its boundary. Degenerate inputs such as empty histograms or zero weight quadrants are not errors, they produce defined fallback values instead.
#[derive(Debug, Error)]
pub enum Error {
	#[error("cannot combine a function over attribute {left:?} with a function over attribute {right:?}")]
	AttributeMismatch { left: Vec<usize>, right: Vec<usize> },
	#[error("subsample size {subsample_size} exceeds the number of rows {n_rows}")]
	SubsampleTooLarge { subsample_size: usize, n_rows: usize },
	#[error("attribute {attribute} is {kind} but a discrete attribute is required")]
	UnsupportedAttribute {
		attribute: usize,
		kind: &'static str,
	},
	#[error("value {value} is not a valid state for an attribute with {n_states} states")]
	InvalidState { value: f64, n_states: usize },
	#[error("expected {expected} values for {what} but got {actual}")]
	LengthMismatch {
		what: &'static str,
		expected: usize,
		actual: usize,
	},
	#[error("invalid options: {0}")]
	InvalidOptions(String),
	#[error("invalid function: {0}")]
	InvalidFunction(String),
	#[error("cannot compress an empty ensemble")]
	EmptyEnsemble,
	#[error("line {line}: {message}")]
	Parse { line: usize, message: String },
	#[error(transparent)]
	Csv(#[from] csv::Error),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Return a `LengthMismatch` error unless `actual == expected`.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
	if expected == actual {
		Ok(())
	} else {
		Err(Error::LengthMismatch {
			what,
			expected,
			actual,
		})
	}
}
