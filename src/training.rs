use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::classifier::Classifier;
use crate::dataset::{Builder, Dataset};
use crate::error::{Error, Result};
use crate::functions;
use crate::link::{LinkStatus, N_FEATURES};
use crate::metrics::{ClassificationReport, ConfusionMatrix};
use crate::random_forest::{RandomForestBuilder, RandomForestClassifier};
use crate::stats::{DataSplit, ModelStats};

pub struct TrainOptions {
	pub forest: RandomForestBuilder,
	pub test_rate: f64,
	pub cv_folds: usize,
}

impl TrainOptions {
	/// Rejects settings that would leave a side of the split empty or not fit the model format.
	pub fn validate(&self) -> Result<()> {
		let invalid = |msg: String| Err(Error::InvalidSetting(msg));

		if !(self.test_rate > 0.0 && self.test_rate < 1.0) {
			return invalid(format!("test_rate must be between 0 and 1, got {}", self.test_rate));
		}
		if self.cv_folds == 1 {
			return invalid("cv_folds must be 0 to skip cross-validation, or at least 2".to_string());
		}
		if self.forest.n_trees == 0 || self.forest.n_trees > u16::MAX as usize {
			return invalid(format!("n_trees must be between 1 and {}, got {}", u16::MAX, self.forest.n_trees));
		}
		if !(self.forest.bag_amount > 0.0) {
			return invalid(format!("bag_amount must be positive, got {}", self.forest.bag_amount));
		}

		Ok(())
	}
}

pub struct TrainOutcome {
	pub model: RandomForestClassifier,
	pub report: ClassificationReport,
	pub confusion_matrix: ConfusionMatrix,
	pub cv_scores: Vec<f64>,
	pub stats: ModelStats,
}

fn check_classes(dataset: &Dataset) -> Result<()> {
	if dataset.rows_len() == 0 {
		return Err(Error::EmptyDataset);
	}

	let counts = dataset.class_counts();
	for status in LinkStatus::ALL.iter() {
		info!("{}: {} rows", status, counts[status.class()]);
		if counts[status.class()] == 0 {
			return Err(Error::MissingClass(status.label()));
		}
	}

	Ok(())
}

/// Stratified hold-out fit plus k-fold cross-validation over the whole dataset.
pub fn train(builder: &Builder, options: &TrainOptions) -> Result<TrainOutcome> {
	options.validate()?;
	let dataset = builder.build();
	check_classes(&dataset)?;

	let mut rng = match options.forest.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_seed(rand::thread_rng().gen()),
	};

	let (train, test) = dataset.stratified_split(&mut rng, options.test_rate);
	info!(train = train.rows_len(), test = test.rows_len(), "split dataset");

	info!(
		"fitting random forest [trees: {}, depth: {}] ...",
		options.forest.n_trees, options.forest.max_depth
	);
	let model = options.forest.fit(train.clone());

	let truth = test.targets().collect::<Vec<_>>();
	let predicted = test.classify(&model);
	let confusion_matrix = ConfusionMatrix::new(dataset.n_classes(), &truth, &predicted);
	let report = ClassificationReport::new(&confusion_matrix);
	info!(
		"classification rate test: {:.3}%, train: {:.3}%",
		report.accuracy * 100.0,
		train.evaluate(&model) * 100.0
	);

	let cv_scores = cross_validate(&dataset, &options.forest, options.cv_folds);
	info!(
		"cross-validation accuracy: {:.3} ± {:.3}",
		functions::mean(&cv_scores),
		functions::std(&cv_scores)
	);

	let stats = ModelStats::new(
		&report,
		confusion_matrix.clone(),
		&cv_scores,
		options.test_rate,
		DataSplit { training: train.rows_len(), testing: test.rows_len() },
		options.forest.clone(),
	);

	Ok(TrainOutcome { model, report, confusion_matrix, cv_scores, stats })
}

pub fn cross_validate(dataset: &Dataset, forest: &RandomForestBuilder, k: usize) -> Vec<f64> {
	if k < 2 {
		return Vec::new();
	}

	dataset
		.stratified_folds(k)
		.into_iter()
		.enumerate()
		.map(|(i, (train, test))| {
			let score = test.evaluate(&forest.fit(train));
			info!(fold = i + 1, "fold accuracy {:.3}", score);
			score
		})
		.collect()
}

/// Writes one status per row to `output`. Returns the accuracy when every row was labeled.
pub fn evaluate(model: &RandomForestClassifier, builder: &Builder, labeled: bool, output: &Path) -> Result<Option<f64>> {
	let dataset = builder.build();
	let classified = dataset.classify(model);

	let mut writer = BufWriter::new(File::create(output)?);
	for &class in &classified {
		writeln!(writer, "{}", LinkStatus::from_class(class as usize))?;
	}
	writer.flush()?;

	Ok(if labeled { Some(dataset.evaluate(model)) } else { None })
}

pub fn save_model(model: &RandomForestClassifier, path: &Path) -> Result<()> {
	let mut writer = BufWriter::new(File::create(path)?);
	model.serialize(&mut writer)?;
	writer.flush()?;

	Ok(())
}

pub fn load_model(path: &Path) -> Result<RandomForestClassifier> {
	let mut reader = BufReader::new(File::open(path)?);
	let model = RandomForestClassifier::deserialize(&mut reader)?;

	if model.n_features() != N_FEATURES {
		return Err(Error::InvalidModel(format!(
			"{} expects {} features, link models use {}",
			path.display(),
			model.n_features(),
			N_FEATURES
		)));
	}
	if model.n_classes() != LinkStatus::ALL.len() {
		return Err(Error::InvalidModel(format!(
			"{} predicts {} classes, link models use {}",
			path.display(),
			model.n_classes(),
			LinkStatus::ALL.len()
		)));
	}

	Ok(model)
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::link::N_CLASSES;

	/// Synthetic link metrics where low throughput or high delay means failure.
	pub(crate) fn link_builder(rows: usize, seed: u64) -> Builder {
		let mut rng = StdRng::seed_from_u64(seed);
		let mut builder = Builder::new(N_CLASSES);

		for _ in 0..rows {
			let throughput: f64 = rng.gen_range(0.0, 5.0);
			let delay: f64 = rng.gen_range(0.002, 0.02);
			let status = if throughput < 1.25 || delay > 0.0155 { LinkStatus::Failure } else { LinkStatus::Ok };
			builder.add(&[throughput, delay], status.target());
		}

		builder
	}

	pub(crate) fn options() -> TrainOptions {
		TrainOptions {
			forest: RandomForestBuilder { n_trees: 20, ..Default::default() },
			test_rate: 0.2,
			cv_folds: 3,
		}
	}

	#[test]
	fn trains_and_reports() {
		let builder = link_builder(400, 11);
		let outcome = train(&builder, &options()).unwrap();

		assert_eq!(outcome.cv_scores.len(), 3);
		assert!(outcome.report.accuracy > 0.85);
		assert_eq!(outcome.confusion_matrix.total(), 80);
		assert_eq!(outcome.stats.samples, DataSplit { training: 320, testing: 80 });
		assert_eq!(outcome.stats.data_split, DataSplit { training: 80, testing: 20 });
		assert!(outcome.stats.cross_validation_accuracy > 0.85);
	}

	#[test]
	fn refuses_single_class_data() {
		let mut builder = Builder::new(N_CLASSES);
		for i in 0..20 {
			builder.add(&[i as f64, 0.001], LinkStatus::Ok.target());
		}

		assert!(matches!(train(&builder, &options()), Err(Error::MissingClass("FAILURE"))));
		assert!(matches!(train(&Builder::new(N_CLASSES), &options()), Err(Error::EmptyDataset)));
	}

	#[test]
	fn rejects_out_of_range_settings() {
		let builder = link_builder(100, 1);
		let with = |f: fn(&mut TrainOptions)| {
			let mut options = options();
			f(&mut options);
			train(&builder, &options)
		};

		assert!(matches!(with(|o| o.test_rate = 1.5), Err(Error::InvalidSetting(_))));
		assert!(matches!(with(|o| o.test_rate = 0.0), Err(Error::InvalidSetting(_))));
		assert!(matches!(with(|o| o.test_rate = f64::NAN), Err(Error::InvalidSetting(_))));
		assert!(matches!(with(|o| o.cv_folds = 1), Err(Error::InvalidSetting(_))));
		assert!(matches!(with(|o| o.forest.n_trees = 70_000), Err(Error::InvalidSetting(_))));
		assert!(matches!(with(|o| o.forest.bag_amount = 0.0), Err(Error::InvalidSetting(_))));

		let outcome = with(|o| o.cv_folds = 0).unwrap();
		assert!(outcome.cv_scores.is_empty());
	}

	#[test]
	fn saved_models_load_back() {
		let builder = link_builder(120, 3);
		let model = RandomForestBuilder { n_trees: 5, ..Default::default() }.fit(builder.build());

		let path = std::env::temp_dir().join(format!("link-model-{}.model", std::process::id()));
		save_model(&model, &path).unwrap();
		assert_eq!(load_model(&path).unwrap(), model);
		let _ = std::fs::remove_file(path);
	}

	#[test]
	fn evaluate_writes_one_status_per_row() {
		let builder = link_builder(200, 5);
		let model = RandomForestBuilder { n_trees: 10, ..Default::default() }.fit(builder.build());

		let output = std::env::temp_dir().join(format!("link-eval-{}.txt", std::process::id()));
		let accuracy = evaluate(&model, &builder, true, &output).unwrap();
		assert!(accuracy.unwrap() > 0.85);

		let written = std::fs::read_to_string(&output).unwrap();
		assert_eq!(written.lines().count(), 200);
		assert!(written.lines().all(|l| l == "OK" || l == "FAILURE"));

		assert_eq!(evaluate(&model, &builder, false, &output).unwrap(), None);
		let _ = std::fs::remove_file(output);
	}

	#[test]
	fn rejects_models_with_other_shapes() {
		let mut builder = Builder::new(N_CLASSES);
		for i in 0..30 {
			builder.add(&[i as f64, 1.0, 2.0], (i % 2) as f64);
		}
		let model = RandomForestBuilder { n_trees: 2, ..Default::default() }.fit(builder.build());

		let path = std::env::temp_dir().join(format!("link-model-shape-{}.model", std::process::id()));
		save_model(&model, &path).unwrap();
		assert!(matches!(load_model(&path), Err(Error::InvalidModel(_))));
		let _ = std::fs::remove_file(path);
	}
}
