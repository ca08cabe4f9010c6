//! Request and response bodies for the prediction API.

use serde::{Deserialize, Deserializer, Serialize};

use crate::link::LinkSample;

/// Inputs may arrive as JSON numbers or numeric strings.
fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumberOrString {
		Number(f64),
		String(String),
	}

	match NumberOrString::deserialize(deserializer)? {
		NumberOrString::Number(n) => Ok(n),
		NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
	}
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
	#[serde(deserialize_with = "number")]
	pub throughput: f64,
	#[serde(deserialize_with = "number")]
	pub delay: f64,
}

impl PredictRequest {
	pub fn sample(&self) -> LinkSample {
		LinkSample {
			throughput: self.throughput,
			delay: self.delay,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictInput {
	pub throughput: f64,
	pub delay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
	pub prediction: String,
	pub confidence: f64,
	/// Echo of the parsed input, for plotting on the client side.
	pub input: PredictInput,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_numbers_and_numeric_strings() {
		let req: PredictRequest = serde_json::from_str(r#"{"throughput": 4.2, "delay": "0.003"}"#).unwrap();
		assert_eq!(req.sample(), LinkSample { throughput: 4.2, delay: 0.003 });

		let req: PredictRequest = serde_json::from_str(r#"{"throughput": 3, "delay": " 1e-3 "}"#).unwrap();
		assert_eq!(req.throughput, 3.0);
		assert_eq!(req.delay, 0.001);
	}

	#[test]
	fn rejects_missing_or_non_numeric_fields() {
		assert!(serde_json::from_str::<PredictRequest>(r#"{"throughput": 4.2}"#).is_err());
		assert!(serde_json::from_str::<PredictRequest>(r#"{"throughput": "fast", "delay": 1}"#).is_err());
		assert!(serde_json::from_str::<PredictRequest>(r#"{"throughput": null, "delay": 1}"#).is_err());
	}
}
