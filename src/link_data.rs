use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::dataset;
use crate::error::{Error, Result};
use crate::link::{LinkSample, LinkStatus, DELAY_COLUMN, N_CLASSES, STATUS_COLUMN, THROUGHPUT_COLUMN};

#[derive(Debug, Deserialize)]
struct LinkRecord {
	#[serde(rename = "Throughput(Mbps)", default, deserialize_with = "csv::invalid_option")]
	throughput: Option<f64>,
	#[serde(rename = "Delay(s)", default, deserialize_with = "csv::invalid_option")]
	delay: Option<f64>,
	#[serde(rename = "LinkStatus", default)]
	status: Option<String>,
}

impl LinkRecord {
	fn sample(&self) -> Option<LinkSample> {
		let sample = LinkSample {
			throughput: self.throughput?,
			delay: self.delay?,
		};

		Some(sample).filter(LinkSample::is_finite)
	}

	fn status(&self) -> Option<LinkStatus> {
		self.status.as_deref().and_then(|s| s.parse().ok())
	}
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LoadSummary {
	pub files: Vec<PathBuf>,
	pub rows: usize,
	pub dropped: usize,
	/// Indexed by class, only counted for labeled loads.
	pub class_counts: Vec<usize>,
}

impl LoadSummary {
	/// Every one of the `kept` rows carried a valid label.
	pub fn fully_labeled(&self, kept: usize) -> bool {
		kept > 0 && self.class_counts.iter().sum::<usize>() == kept
	}
}

/// Expands directories into the CSV files they hold whose name starts with `prefix`.
pub fn resolve_inputs(inputs: &[PathBuf], prefix: &str) -> Result<Vec<PathBuf>> {
	let mut files = Vec::new();

	for input in inputs {
		if input.is_dir() {
			let mut found = fs::read_dir(input)?
				.filter_map(|entry| entry.ok().map(|e| e.path()))
				.filter(|path| path.is_file() && matches_prefix(path, prefix))
				.collect::<Vec<_>>();
			found.sort();

			if found.is_empty() {
				warn!("no {}*.csv files in {}", prefix, input.display());
			}
			files.extend(found);
		} else {
			files.push(input.clone());
		}
	}

	if files.is_empty() {
		return Err(Error::NoInputs(inputs.to_vec()));
	}

	Ok(files)
}

fn matches_prefix(path: &Path, prefix: &str) -> bool {
	let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
	name.starts_with(prefix) && name.ends_with(".csv")
}

fn check_headers(path: &Path, headers: &csv::StringRecord, labeled: bool) -> Result<()> {
	let mut required = vec![THROUGHPUT_COLUMN, DELAY_COLUMN];
	if labeled {
		required.push(STATUS_COLUMN);
	}

	for column in required {
		if !headers.iter().any(|h| h.trim() == column) {
			return Err(Error::MissingColumn { path: path.to_path_buf(), column });
		}
	}

	Ok(())
}

/// Reads labeled rows from every file, dropping rows with missing or invalid values.
pub fn read(files: &[PathBuf]) -> Result<(dataset::Builder, LoadSummary)> {
	load(files, true)
}

/// Reads feature rows only; labels, when present and valid, stay available for scoring.
/// Every row is kept so that predictions line up with the input, a row whose
/// features cannot be used is an error.
pub fn read_evaluation(files: &[PathBuf]) -> Result<(dataset::Builder, LoadSummary)> {
	load(files, false)
}

fn load(files: &[PathBuf], labeled: bool) -> Result<(dataset::Builder, LoadSummary)> {
	let mut builder = dataset::Builder::new(N_CLASSES);
	let mut summary = LoadSummary {
		files: files.to_vec(),
		class_counts: vec![0; N_CLASSES],
		..Default::default()
	};

	for path in files {
		let mut reader = csv::ReaderBuilder::new()
			.trim(csv::Trim::All)
			.from_path(path)?;
		check_headers(path, reader.headers()?, labeled)?;

		let before = builder.len();
		for (i, record) in reader.deserialize::<LinkRecord>().enumerate() {
			summary.rows += 1;

			// Header is line 1
			let line = i + 2;
			let record = match record {
				Ok(record) => record,
				Err(e) if labeled => {
					debug!("{}:{}: dropping malformed row: {}", path.display(), line, e);
					summary.dropped += 1;
					continue;
				},
				Err(e) => {
					debug!("{}:{}: {}", path.display(), line, e);
					return Err(Error::InvalidRow { path: path.clone(), line });
				},
			};

			let status = record.status();
			match (record.sample(), status) {
				(Some(sample), Some(status)) => {
					summary.class_counts[status.class()] += 1;
					builder.add(&sample.features(), status.target());
				},
				(Some(sample), None) if !labeled => builder.add_x(&sample.features()),
				(None, _) if !labeled => return Err(Error::InvalidRow { path: path.clone(), line }),
				_ => summary.dropped += 1,
			}
		}

		debug!("{}: {} rows kept", path.display(), builder.len() - before);
	}

	info!(
		files = files.len(),
		rows = summary.rows,
		dropped = summary.dropped,
		"loaded link metrics"
	);

	Ok((builder, summary))
}
