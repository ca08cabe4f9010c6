use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::random_forest::RandomForestBuilder;

pub const DEFAULT_CONFIG: &str = "link-classifier.toml";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
	pub data: DataConfig,
	pub model: ModelConfig,
	pub forest: RandomForestBuilder,
	pub training: TrainingConfig,
	pub server: ServerConfig,
	pub simulate: SimulateConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DataConfig {
	/// CSV files or directories scanned for `file_prefix*.csv`.
	pub inputs: Vec<PathBuf>,
	pub file_prefix: String,
}

impl Default for DataConfig {
	fn default() -> Self {
		Self {
			inputs: vec![PathBuf::from(".")],
			file_prefix: "tcp_metrics_".to_string(),
		}
	}
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
	pub path: PathBuf,
}

impl Default for ModelConfig {
	fn default() -> Self {
		Self {
			path: PathBuf::from("link_failure_classifier.model"),
		}
	}
}

impl ModelConfig {
	/// The statistics sidecar lives next to the model file.
	pub fn stats_path(&self) -> PathBuf {
		self.path.with_extension("stats.json")
	}
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
	pub test_rate: f64,
	pub cv_folds: usize,
}

impl Default for TrainingConfig {
	fn default() -> Self {
		Self {
			test_rate: 0.2,
			cv_folds: 5,
		}
	}
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
	pub host: String,
	pub port: u16,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 5000,
		}
	}
}

impl ServerConfig {
	pub fn addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulateConfig {
	pub output_dir: PathBuf,
	pub runs: usize,
	pub seed: Option<u64>,
}

impl Default for SimulateConfig {
	fn default() -> Self {
		Self {
			output_dir: PathBuf::from("."),
			runs: 1,
			seed: None,
		}
	}
}

impl Config {
	pub fn from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)?;
		Ok(toml::from_str(&content)?)
	}

	/// An explicit path must exist; without one the default file is optional.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		match path {
			Some(path) => Self::from_file(path),
			None if Path::new(DEFAULT_CONFIG).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG)),
			None => Ok(Self::default()),
		}
	}
}
