use std::fmt;
use std::str::FromStr;

pub const N_CLASSES: usize = 2;
pub const N_FEATURES: usize = 2;

pub const THROUGHPUT_COLUMN: &str = "Throughput(Mbps)";
pub const DELAY_COLUMN: &str = "Delay(s)";
pub const STATUS_COLUMN: &str = "LinkStatus";

/// Link status as predicted by the classifier. The discriminant is the class index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkStatus {
	Failure = 0,
	Ok = 1,
}

impl LinkStatus {
	pub const ALL: [LinkStatus; N_CLASSES] = [LinkStatus::Failure, LinkStatus::Ok];

	pub fn class(self) -> usize {
		self as usize
	}

	pub fn target(self) -> f64 {
		self.class() as f64
	}

	/// Maps a predicted class back to a status; anything but class 1 is a failure.
	pub fn from_class(class: usize) -> Self {
		match class {
			1 => LinkStatus::Ok,
			_ => LinkStatus::Failure,
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			LinkStatus::Failure => "FAILURE",
			LinkStatus::Ok => "OK",
		}
	}

	/// Key used for this class in the statistics document.
	pub fn key(self) -> &'static str {
		match self {
			LinkStatus::Failure => "failure",
			LinkStatus::Ok => "ok",
		}
	}
}

impl fmt::Display for LinkStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

impl FromStr for LinkStatus {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim() {
			"OK" => Ok(LinkStatus::Ok),
			"FAILURE" => Ok(LinkStatus::Failure),
			_ => Err(()),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSample {
	pub throughput: f64,
	pub delay: f64,
}

impl LinkSample {
	pub fn features(&self) -> [f64; N_FEATURES] {
		[self.throughput, self.delay]
	}

	pub fn is_finite(&self) -> bool {
		self.throughput.is_finite() && self.delay.is_finite()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_labels_from_logger_output() {
		assert_eq!("OK".parse::<LinkStatus>(), Ok(LinkStatus::Ok));
		assert_eq!(" FAILURE ".parse::<LinkStatus>(), Ok(LinkStatus::Failure));
		assert!("ok".parse::<LinkStatus>().is_err());
		assert!("".parse::<LinkStatus>().is_err());
	}

	#[test]
	fn class_indices_match_training_encoding() {
		assert_eq!(LinkStatus::Failure.class(), 0);
		assert_eq!(LinkStatus::Ok.class(), 1);
		assert_eq!(LinkStatus::from_class(1), LinkStatus::Ok);
		assert_eq!(LinkStatus::from_class(0), LinkStatus::Failure);
		assert_eq!(LinkStatus::Ok.to_string(), "OK");
	}
}
