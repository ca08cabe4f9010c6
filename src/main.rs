//! Link status classifier.
//! - `fit` trains a random forest on TCP link metrics (throughput, delay) and saves it
//! - `evaluate` classifies CSV rows with a saved model
//! - `serve` exposes the model over HTTP (`/predict`, `/stats`)
//! - `simulate` generates labeled metrics in the logger's CSV format

mod classifier;
mod config;
mod dataset;
mod decision_tree;
mod dto;
mod error;
mod functions;
mod handlers;
mod link;
mod link_data;
mod metrics;
mod node;
mod random_forest;
mod server;
mod simulate;
mod stats;
mod training;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use structopt::StructOpt;
use tracing::info;

use config::Config;
use server::AppState;
use training::TrainOptions;

#[derive(StructOpt, Debug)]
#[structopt(name = "link-classifier")]
struct Cli {
	/// Path to config file (defaults to ./link-classifier.toml when present)
	#[structopt(short, long, parse(from_os_str))]
	config: Option<PathBuf>,

	#[structopt(subcommand)]
	command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
	/// Train the classifier and save the model with its statistics
	Fit {
		/// CSV files or directories of tcp_metrics_*.csv
		#[structopt(short, long, parse(from_os_str))]
		data: Vec<PathBuf>,
		#[structopt(short, long, parse(from_os_str))]
		model: Option<PathBuf>,
		#[structopt(long)]
		trees: Option<usize>,
	},
	/// Classify CSV rows with a saved model, one status per line
	Evaluate {
		#[structopt(short, long, parse(from_os_str))]
		data: Vec<PathBuf>,
		#[structopt(short, long, parse(from_os_str))]
		model: Option<PathBuf>,
		#[structopt(short, long, parse(from_os_str))]
		output: PathBuf,
	},
	/// Serve predictions over HTTP
	Serve {
		#[structopt(short, long, parse(from_os_str))]
		model: Option<PathBuf>,
		#[structopt(long)]
		host: Option<String>,
		#[structopt(short, long)]
		port: Option<u16>,
	},
	/// Generate synthetic link metrics
	Simulate {
		#[structopt(short, long, parse(from_os_str))]
		output_dir: Option<PathBuf>,
		#[structopt(short, long)]
		runs: Option<usize>,
		#[structopt(long)]
		seed: Option<u64>,
	},
}

fn fit(config: &Config) -> Result<()> {
	let files = link_data::resolve_inputs(&config.data.inputs, &config.data.file_prefix)?;
	let (builder, summary) = link_data::read(&files)?;
	info!(files = summary.files.len(), rows = builder.len(), dropped = summary.dropped, "dataset ready");

	let options = TrainOptions {
		forest: config.forest.clone(),
		test_rate: config.training.test_rate,
		cv_folds: config.training.cv_folds,
	};
	let outcome = training::train(&builder, &options)?;

	println!("\nClassification Report:\n{}", outcome.report);
	println!("Confusion Matrix:\n{}", outcome.confusion_matrix);
	println!(
		"Cross-Validation Accuracy: {:.3} ± {:.3}",
		functions::mean(&outcome.cv_scores),
		functions::std(&outcome.cv_scores)
	);

	training::save_model(&outcome.model, &config.model.path)
		.with_context(|| format!("saving model to {}", config.model.path.display()))?;
	outcome.stats.save(&config.model.stats_path())
		.with_context(|| format!("saving statistics to {}", config.model.stats_path().display()))?;
	info!("model saved to {}", config.model.path.display());

	Ok(())
}

fn evaluate(config: &Config, output: &Path) -> Result<()> {
	let files = link_data::resolve_inputs(&config.data.inputs, &config.data.file_prefix)?;
	let (builder, summary) = link_data::read_evaluation(&files)?;

	let model = training::load_model(&config.model.path)
		.with_context(|| format!("loading model {}", config.model.path.display()))?;

	let labeled = summary.fully_labeled(builder.len());
	let accuracy = training::evaluate(&model, &builder, labeled, output)?;
	info!(rows = builder.len(), "classified data written to {}", output.display());

	if let Some(accuracy) = accuracy {
		info!("classification rate: {:.3}%", accuracy * 100.0);
	}

	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt()
		.with_target(false)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.compact()
		.init();

	let args = Cli::from_args();
	let mut config = Config::load(args.config.as_deref()).context("loading config")?;

	match args.command {
		Command::Fit { data, model, trees } => {
			if !data.is_empty() {
				config.data.inputs = data;
			}
			if let Some(model) = model {
				config.model.path = model;
			}
			if let Some(trees) = trees {
				config.forest.n_trees = trees;
			}
			// Training is CPU bound and runs on the rayon pool
			tokio::task::spawn_blocking(move || fit(&config)).await??;
		},
		Command::Evaluate { data, model, output } => {
			if !data.is_empty() {
				config.data.inputs = data;
			}
			if let Some(model) = model {
				config.model.path = model;
			}
			tokio::task::spawn_blocking(move || evaluate(&config, &output)).await??;
		},
		Command::Serve { model, host, port } => {
			if let Some(model) = model {
				config.model.path = model;
			}
			if let Some(host) = host {
				config.server.host = host;
			}
			if let Some(port) = port {
				config.server.port = port;
			}
			let state = AppState::load(&config.model.path, &config.model.stats_path());
			server::serve(state, &config.server.addr()).await?;
		},
		Command::Simulate { output_dir, runs, seed } => {
			if let Some(dir) = output_dir {
				config.simulate.output_dir = dir;
			}
			if let Some(runs) = runs {
				config.simulate.runs = runs;
			}
			if seed.is_some() {
				config.simulate.seed = seed;
			}
			let files = tokio::task::spawn_blocking(move || simulate::simulate(&config.simulate)).await??;
			println!("Output saved to: {}", files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>().join(", "));
		},
	}

	Ok(())
}
