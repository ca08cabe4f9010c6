use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),

	#[error("csv error: {0}")]
	Csv(#[from] csv::Error),

	#[error("json error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("failed to parse config: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("{path}: missing column {column:?}")]
	MissingColumn { path: PathBuf, column: &'static str },

	#[error("no input files found in {0:?}")]
	NoInputs(Vec<PathBuf>),

	#[error("dataset is empty after cleaning")]
	EmptyDataset,

	#[error("dataset has no rows labeled {0}")]
	MissingClass(&'static str),

	#[error("invalid setting: {0}")]
	InvalidSetting(String),

	#[error("{path}:{line}: row has a missing or invalid feature")]
	InvalidRow { path: PathBuf, line: usize },

	#[error("invalid model: {0}")]
	InvalidModel(String),
}

pub type Result<T> = std::result::Result<T, Error>;
