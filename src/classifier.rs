use std::io::{Read, Write};

use crate::functions::argmax;

pub trait Classifier: Sized {
	/// One probability per class, summing to 1.
	fn predict_proba(&self, x: &[f64]) -> Vec<f64>;

	fn predict(&self, x: &[f64]) -> f64 {
		argmax(&self.predict_proba(x)) as f64
	}

	fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;
	fn deserialize<R: Read>(reader: &mut R) -> std::io::Result<Self>;
}
