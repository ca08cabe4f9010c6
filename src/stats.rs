//! Model statistics written next to the model file by `fit` and served on `/stats`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::{ClassMetrics, ClassificationReport, ConfusionMatrix};
use crate::random_forest::RandomForestBuilder;

pub const MODEL_NAME: &str = "Random Forest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
	pub cross_validation_accuracy: f64,
	pub cross_validation_std: f64,
	pub test_accuracy: f64,
	/// Keyed by class name, `failure` and `ok`.
	pub metrics: BTreeMap<String, ClassMetrics>,
	pub model_name: String,
	/// Percentages.
	pub data_split: DataSplit,
	pub samples: DataSplit,
	pub confusion_matrix: ConfusionMatrix,
	pub hyperparameters: RandomForestBuilder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplit {
	pub training: usize,
	pub testing: usize,
}

impl ModelStats {
	pub fn new(
		report: &ClassificationReport,
		confusion_matrix: ConfusionMatrix,
		cv_scores: &[f64],
		test_rate: f64,
		samples: DataSplit,
		hyperparameters: RandomForestBuilder,
	) -> Self {
		let testing = (test_rate * 100.0).round() as usize;

		Self {
			cross_validation_accuracy: crate::functions::mean(cv_scores),
			cross_validation_std: crate::functions::std(cv_scores),
			test_accuracy: report.accuracy,
			metrics: report
				.classes
				.iter()
				.map(|(status, m)| (status.key().to_string(), *m))
				.collect(),
			model_name: MODEL_NAME.to_string(),
			data_split: DataSplit { training: 100 - testing, testing },
			samples,
			confusion_matrix,
			hyperparameters,
		}
	}

	pub fn save(&self, path: &Path) -> Result<()> {
		fs::write(path, serde_json::to_vec_pretty(self)?)?;
		Ok(())
	}

	pub fn load(path: &Path) -> Result<Self> {
		let bytes = fs::read(path)?;
		Ok(serde_json::from_slice(&bytes)?)
	}
}
