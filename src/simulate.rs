//! Synthetic TCP link metrics in the logger's CSV format.
//!
//! A run models one client/sink pair on a 10 Mbps point-to-point link. Every simulated
//! second each flow logs its cumulative throughput and mean packet delay, and the row is
//! labeled against percentiles of everything logged so far in the run.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use crate::config::SimulateConfig;
use crate::error::Result;
use crate::functions::percentile;
use crate::link::LinkStatus;

pub const TCP_VARIANTS: [&str; 5] = ["TcpNewReno", "TcpTahoe", "TcpReno", "TcpWestwood", "TcpVegas"];

const LINK_RATE: f64 = 10e6;
const APP_RATE: f64 = 5e6;
const ACK_SIZE: f64 = 52.0;
const SIM_END: u32 = 22;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
	#[serde(rename = "Time")]
	pub time: f64,
	#[serde(rename = "FlowID")]
	pub flow_id: u32,
	#[serde(rename = "Source->Dest")]
	pub route: String,
	#[serde(rename = "Throughput(Mbps)")]
	pub throughput: f64,
	#[serde(rename = "Delay(s)")]
	pub delay: f64,
	#[serde(rename = "LinkStatus")]
	pub status: String,
	#[serde(rename = "TCPVariant")]
	pub tcp_variant: String,
}

/// Labels rows against the 25th throughput and 75th delay percentile of the history.
#[derive(Debug, Default)]
pub struct DynamicLabeler {
	throughput_history: Vec<f64>,
	delay_history: Vec<f64>,
}

impl DynamicLabeler {
	pub fn label(&mut self, throughput: f64, delay: f64) -> LinkStatus {
		self.throughput_history.push(throughput);
		self.delay_history.push(delay);

		let throughput_threshold = percentile(&self.throughput_history, 0.25);
		let delay_threshold = percentile(&self.delay_history, 0.75);

		if throughput < throughput_threshold || delay > delay_threshold {
			LinkStatus::Failure
		} else {
			LinkStatus::Ok
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
	pub tcp_variant: &'static str,
	/// One-way propagation delay in seconds.
	pub link_delay: f64,
	pub packet_size: f64,
	pub start: f64,
	pub stop: f64,
}

impl RunParameters {
	pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
		let tcp_variant = TCP_VARIANTS.choose(rng).copied().unwrap_or(TCP_VARIANTS[0]);
		let delay_ms: u32 = rng.gen_range(2, 5);
		let packet_size: u32 = rng.gen_range(1000, 2401);
		let start: u32 = rng.gen_range(1, 5);
		let stop: u32 = rng.gen_range(15, 21);

		Self {
			tcp_variant,
			link_delay: delay_ms as f64 / 1000.0,
			packet_size: packet_size as f64,
			start: start as f64,
			stop: stop as f64,
		}
	}
}

#[derive(Debug)]
struct Flow {
	id: u32,
	route: &'static str,
	first_tx: Option<f64>,
	last_rx: f64,
	rx_bytes: f64,
	rx_packets: f64,
	delay_sum: f64,
}

impl Flow {
	fn new(id: u32, route: &'static str) -> Self {
		Self { id, route, first_tx: None, last_rx: 0.0, rx_bytes: 0.0, rx_packets: 0.0, delay_sum: 0.0 }
	}

	fn receive(&mut self, from: f64, to: f64, packets: f64, size: f64, delay: f64) {
		if packets <= 0.0 {
			return;
		}

		self.first_tx.get_or_insert(from);
		self.last_rx = to + delay;
		self.rx_bytes += packets * size;
		self.rx_packets += packets;
		self.delay_sum += packets * delay;
	}

	fn throughput(&self) -> f64 {
		match self.first_tx {
			Some(first) if self.last_rx > first => self.rx_bytes * 8.0 / (self.last_rx - first) / 1e6,
			_ => 0.0,
		}
	}

	fn delay(&self) -> f64 {
		if self.rx_packets > 0.0 { self.delay_sum / self.rx_packets } else { 0.0 }
	}
}

pub fn simulate_run<R: Rng + ?Sized>(rng: &mut R, params: &RunParameters) -> Vec<MetricRow> {
	let mut labeler = DynamicLabeler::default();
	let mut data = Flow::new(1, "10.1.1.1->10.1.1.2");
	let mut acks = Flow::new(2, "10.1.1.2->10.1.1.1");
	let mut rows = Vec::new();

	for t in 1..SIM_END {
		let now = t as f64;
		let from = f64::max(now - 1.0, params.start);
		let to = f64::min(now, params.stop);

		if to > from {
			// Occasional congestion episodes cut goodput and build a queue
			let (goodput, queueing): (f64, f64) = if rng.gen_bool(0.15) {
				(rng.gen_range(0.1, 0.6), rng.gen_range(0.005, 0.04))
			} else {
				(rng.gen_range(0.9, 1.0), rng.gen_range(0.0, 0.002))
			};

			let packets = (APP_RATE * goodput * (to - from) / 8.0 / params.packet_size).floor();
			let data_delay = params.link_delay + params.packet_size * 8.0 / LINK_RATE + queueing;
			data.receive(from, to, packets, params.packet_size, data_delay);

			let ack_delay = params.link_delay + ACK_SIZE * 8.0 / LINK_RATE + queueing / 10.0;
			acks.receive(from, to, (packets / 2.0).ceil(), ACK_SIZE, ack_delay);
		}

		for flow in [&data, &acks].iter() {
			if flow.first_tx.is_none() {
				continue;
			}

			let (throughput, delay) = (flow.throughput(), flow.delay());
			let status = labeler.label(throughput, delay);

			rows.push(MetricRow {
				time: now,
				flow_id: flow.id,
				route: flow.route.to_string(),
				throughput,
				delay,
				status: status.label().to_string(),
				tcp_variant: params.tcp_variant.to_string(),
			});
		}
	}

	rows
}

pub fn write_run(path: &Path, rows: &[MetricRow]) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;
	for row in rows {
		writer.serialize(row)?;
	}
	writer.flush()?;

	Ok(())
}

pub fn file_name(timestamp: &chrono::DateTime<chrono::Local>, run: Option<usize>) -> String {
	let stamp = timestamp.format("%Y-%-m-%-d_%-H-%-M-%-S");
	match run {
		Some(run) => format!("tcp_metrics_{}_{}.csv", stamp, run),
		None => format!("tcp_metrics_{}.csv", stamp),
	}
}

/// Runs the configured number of simulations and returns the files written.
pub fn simulate(config: &SimulateConfig) -> Result<Vec<PathBuf>> {
	let mut rng = match config.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::seed_from_u64(rand::thread_rng().gen()),
	};

	std::fs::create_dir_all(&config.output_dir)?;
	let now = chrono::Local::now();
	let mut written = Vec::new();

	for run in 0..config.runs {
		let params = RunParameters::random(&mut rng);
		let rows = simulate_run(&mut rng, &params);

		let suffix = if config.runs > 1 { Some(run + 1) } else { None };
		let path = config.output_dir.join(file_name(&now, suffix));
		write_run(&path, &rows)?;

		let failures = rows.iter().filter(|r| r.status == LinkStatus::Failure.label()).count();
		info!(
			variant = params.tcp_variant,
			rows = rows.len(),
			failures,
			"wrote {}",
			path.display()
		);
		written.push(path);
	}

	Ok(written)
}
