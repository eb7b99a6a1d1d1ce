use crate::{
	error::{check_len, Result},
	function::Function1D,
};
use itertools::izip;

/// Replace the predictions of `function` with a single Newton step on logistic loss. For every segment, and for the missing value segment, the prediction becomes `sum(w * y) / sum(w * |y| * (1 - |y|))` over the rows falling into it, where `y` is the residual. Segments where the denominator is 0 predict 0.
pub fn line_search(
	function: &mut Function1D,
	values: &[f64],
	residuals: &[f64],
	weights: &[f64],
) -> Result<()> {
	check_len("residuals", values.len(), residuals.len())?;
	check_len("weights", values.len(), weights.len())?;
	let n_segments = function.n_segments();
	let mut numerators = vec![0.0; n_segments];
	let mut denominators = vec![0.0; n_segments];
	let mut missing_numerator = 0.0;
	let mut missing_denominator = 0.0;
	for (value, residual, weight) in izip!(values, residuals, weights) {
		let numerator = weight * residual;
		let denominator = weight * residual.abs() * (1.0 - residual.abs());
		if value.is_nan() {
			missing_numerator += numerator;
			missing_denominator += denominator;
		} else {
			let segment = function.segment_index(*value);
			numerators[segment] += numerator;
			denominators[segment] += denominator;
		}
	}
	for (prediction, numerator, denominator) in
		izip!(function.predictions.iter_mut(), &numerators, &denominators)
	{
		*prediction = newton_step(*numerator, *denominator);
	}
	function.prediction_on_missing = newton_step(missing_numerator, missing_denominator);
	Ok(())
}

fn newton_step(numerator: f64, denominator: f64) -> f64 {
	if denominator == 0.0 {
		0.0
	} else {
		numerator / denominator
	}
}

#[test]
fn test_line_search_takes_a_newton_step_per_segment() {
	let mut function = Function1D::new(0, vec![1.5, f64::INFINITY], vec![0.0, 0.0], 0.0).unwrap();
	let values = [1.0, 1.0, 2.0, 2.0, f64::NAN];
	let residuals = [0.5, 0.5, -0.25, 0.75, 0.5];
	let weights = [1.0, 1.0, 1.0, 1.0, 2.0];
	line_search(&mut function, &values, &residuals, &weights).unwrap();
	// First segment: 1.0 / 0.5. Second segment: 0.5 / (0.1875 + 0.1875).
	assert!((function.predictions[0] - 2.0).abs() < 1e-12);
	assert!((function.predictions[1] - 0.5 / 0.375).abs() < 1e-12);
	assert!((function.prediction_on_missing - 2.0).abs() < 1e-12);
}

#[test]
fn test_line_search_guards_zero_denominators() {
	let mut function = Function1D::constant(0, 3.0, 3.0);
	line_search(&mut function, &[1.0, 2.0], &[0.0, 1.0], &[1.0, 1.0]).unwrap();
	assert_eq!(function.predictions, vec![0.0]);
	assert_eq!(function.prediction_on_missing, 0.0);
}
