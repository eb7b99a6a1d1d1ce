/*!
A plain text format for shape functions. Every field is a record on its own line, and arrays are written as a count record followed by a record of space separated values. Infinite splits are written `inf`.

```text
3
3
1.5 4 inf
3
-1 2 0.5
0.25
```
*/

use crate::{
	error::{Error, Result},
	function::Function1D,
	function_2d::Function2D,
};
use ndarray::prelude::*;
use num_traits::ToPrimitive;
use std::{
	fmt::Display,
	io::{Read, Write},
	str::FromStr,
};

pub fn write_function_1d<W>(writer: &mut W, function: &Function1D) -> Result<()>
where
	W: Write,
{
	let mut writer = csv_writer(writer);
	write_values(&mut writer, std::iter::once(function.attribute))?;
	write_array(&mut writer, &function.splits)?;
	write_array(&mut writer, &function.predictions)?;
	write_values(&mut writer, std::iter::once(function.prediction_on_missing))?;
	writer.flush()?;
	Ok(())
}

pub fn write_function_2d<W>(writer: &mut W, function: &Function2D) -> Result<()>
where
	W: Write,
{
	let mut writer = csv_writer(writer);
	let (attribute1, attribute2) = function.attributes;
	write_values(&mut writer, [attribute1, attribute2].iter())?;
	write_array(&mut writer, &function.splits1)?;
	write_array(&mut writer, &function.splits2)?;
	let (n_rows, n_cols) = function.predictions.dim();
	write_values(&mut writer, [n_rows, n_cols].iter())?;
	for row in function.predictions.genrows() {
		write_values(&mut writer, row.iter())?;
	}
	write_values(&mut writer, function.predictions_on_missing1.iter())?;
	write_values(&mut writer, function.predictions_on_missing2.iter())?;
	write_values(
		&mut writer,
		std::iter::once(function.prediction_on_missing_both),
	)?;
	writer.flush()?;
	Ok(())
}

/// Read a single 1D function.
pub fn read_function_1d<R>(reader: R) -> Result<Function1D>
where
	R: Read,
{
	FunctionReader::new(reader).read_function_1d()
}

/// Read a single 2D function.
pub fn read_function_2d<R>(reader: R) -> Result<Function2D>
where
	R: Read,
{
	FunctionReader::new(reader).read_function_2d()
}

fn csv_writer<W>(writer: W) -> csv::Writer<W>
where
	W: Write,
{
	csv::WriterBuilder::new()
		.delimiter(b' ')
		.has_headers(false)
		.flexible(true)
		.terminator(csv::Terminator::Any(b'\n'))
		.from_writer(writer)
}

fn write_values<W, T, I>(writer: &mut csv::Writer<W>, values: I) -> Result<()>
where
	W: Write,
	T: Display,
	I: Iterator<Item = T>,
{
	writer.write_record(values.map(|value| value.to_string()))?;
	Ok(())
}

fn write_array<W>(writer: &mut csv::Writer<W>, values: &[f64]) -> Result<()>
where
	W: Write,
{
	write_values(writer, std::iter::once(values.len()))?;
	write_values(writer, values.iter())?;
	Ok(())
}

/// Reads a stream of functions written by the functions in this module, one after another. Parse errors carry the line number of the offending record.
pub struct FunctionReader<R> {
	reader: csv::Reader<R>,
	record: csv::StringRecord,
	line: usize,
}

impl<R> FunctionReader<R>
where
	R: Read,
{
	pub fn new(reader: R) -> Self {
		let reader = csv::ReaderBuilder::new()
			.delimiter(b' ')
			.has_headers(false)
			.flexible(true)
			.trim(csv::Trim::All)
			.from_reader(reader);
		Self {
			reader,
			record: csv::StringRecord::new(),
			line: 0,
		}
	}

	pub fn read_function_1d(&mut self) -> Result<Function1D> {
		let attribute = self.read_value()?;
		let splits = self.read_array()?;
		let predictions = self.read_array()?;
		let prediction_on_missing = self.read_value()?;
		Function1D::new(attribute, splits, predictions, prediction_on_missing)
	}

	pub fn read_function_2d(&mut self) -> Result<Function2D> {
		let attributes = match self.read_values::<usize>()?.as_slice() {
			[attribute1, attribute2] => (*attribute1, *attribute2),
			_ => return Err(self.error("expected two attribute indexes")),
		};
		let splits1 = self.read_array()?;
		let splits2 = self.read_array()?;
		let (n_rows, n_cols) = match self.read_values::<usize>()?.as_slice() {
			[n_rows, n_cols] => (*n_rows, *n_cols),
			_ => return Err(self.error("expected the shape of the predictions")),
		};
		let mut predictions = Array::zeros((n_rows, n_cols));
		for mut row in predictions.genrows_mut() {
			let values = self.read_values::<f64>()?;
			if values.len() != n_cols {
				return Err(self.error(&format!("expected {} predictions", n_cols)));
			}
			for (prediction, value) in row.iter_mut().zip(values) {
				*prediction = value;
			}
		}
		let predictions_on_missing1 = self.read_values()?;
		let predictions_on_missing2 = self.read_values()?;
		let prediction_on_missing_both = self.read_value()?;
		Function2D::new(
			attributes,
			splits1,
			splits2,
			predictions,
			predictions_on_missing1,
			predictions_on_missing2,
			prediction_on_missing_both,
		)
	}

	fn error(&self, message: &str) -> Error {
		Error::Parse {
			line: self.line,
			message: message.to_owned(),
		}
	}

	fn next_record(&mut self) -> Result<()> {
		if !self.reader.read_record(&mut self.record)? {
			self.line += 1;
			return Err(self.error("unexpected end of input"));
		}
		self.line = match self.record.position() {
			Some(position) => position.line().to_usize().unwrap(),
			None => self.line + 1,
		};
		Ok(())
	}

	fn read_values<T>(&mut self) -> Result<Vec<T>>
	where
		T: FromStr,
	{
		self.next_record()?;
		let line = self.line;
		self.record
			.iter()
			.map(|field| {
				field.parse().map_err(|_| Error::Parse {
					line,
					message: format!("invalid value \"{}\"", field),
				})
			})
			.collect()
	}

	fn read_value<T>(&mut self) -> Result<T>
	where
		T: FromStr,
	{
		let mut values = self.read_values()?;
		if values.len() != 1 {
			return Err(self.error("expected a single value"));
		}
		Ok(values.remove(0))
	}

	/// Read a count record and a record with that many values.
	fn read_array(&mut self) -> Result<Vec<f64>> {
		let len: usize = self.read_value()?;
		let values = self.read_values()?;
		if values.len() != len {
			return Err(self.error(&format!(
				"expected {} values but found {}",
				len,
				values.len()
			)));
		}
		Ok(values)
	}
}

#[test]
fn test_write_function_1d() {
	let function = Function1D::new(
		3,
		vec![1.5, 4.0, f64::INFINITY],
		vec![-1.0, 2.0, 0.5],
		0.25,
	)
	.unwrap();
	let mut text = Vec::new();
	write_function_1d(&mut text, &function).unwrap();
	let text = String::from_utf8(text).unwrap();
	assert_eq!(text, "3\n3\n1.5 4 inf\n3\n-1 2 0.5\n0.25\n");
	let parsed = read_function_1d(text.as_bytes()).unwrap();
	assert_eq!(parsed, function);
}

#[test]
fn test_read_several_functions_from_one_stream() {
	let text = "0\n1\ninf\n1\n2.5\n0\n1\n2\n0 inf\n2\n1 -1\n3\n";
	let mut reader = FunctionReader::new(text.as_bytes());
	let first = reader.read_function_1d().unwrap();
	let second = reader.read_function_1d().unwrap();
	assert_eq!(first, Function1D::constant(0, 2.5, 0.0));
	assert_eq!(second.splits, vec![0.0, f64::INFINITY]);
	assert_eq!(second.prediction_on_missing, 3.0);
	assert!(matches!(
		reader.read_function_1d(),
		Err(Error::Parse { line: 13, .. })
	));
}

#[test]
fn test_read_function_1d_errors() {
	let result = read_function_1d("0\n2\n1.0 x\n".as_bytes());
	match result {
		Err(Error::Parse { line, message }) => {
			assert_eq!(line, 3);
			assert_eq!(message, "invalid value \"x\"");
		}
		_ => panic!("expected a parse error"),
	}
	let result = read_function_1d("0\n2\n1.0 inf\n".as_bytes());
	assert!(matches!(result, Err(Error::Parse { line: 4, .. })));
	let result = read_function_1d("0\n1\n1.0\n1\n0\n0\n".as_bytes());
	assert!(matches!(result, Err(Error::InvalidFunction(_))));
}

#[test]
fn test_extreme_values_round_trip() {
	let function = Function1D::new(
		1,
		vec![f64::MIN, 0.1, f64::INFINITY],
		vec![-1e-300, 1.7e308, 0.0],
		f64::MAX,
	)
	.unwrap();
	let mut text = Vec::new();
	write_function_1d(&mut text, &function).unwrap();
	let parsed = read_function_1d(text.as_slice()).unwrap();
	assert_eq!(parsed, function);
}

#[test]
fn test_function_2d_text_round_trip() {
	let function = Function2D::new(
		(4, 7),
		vec![0.0, f64::INFINITY],
		vec![1.0, 2.0, f64::INFINITY],
		arr2(&[[0.5, -1.0, 2.0], [3.0, 0.0, -0.25]]),
		vec![1.0, 2.0, 3.0],
		vec![-1.0, -2.0],
		0.125,
	)
	.unwrap();
	let mut text = Vec::new();
	write_function_2d(&mut text, &function).unwrap();
	let text = String::from_utf8(text).unwrap();
	assert_eq!(
		text,
		"4 7\n2\n0 inf\n3\n1 2 inf\n2 3\n0.5 -1 2\n3 0 -0.25\n1 2 3\n-1 -2\n0.125\n"
	);
	let parsed = read_function_2d(text.as_bytes()).unwrap();
	assert_eq!(parsed, function);
}
