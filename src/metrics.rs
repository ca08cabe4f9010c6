use std::fmt;

use serde::{Deserialize, Serialize};

use crate::link::LinkStatus;

/// Rows are the true class, columns the predicted class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix(pub Vec<Vec<usize>>);

impl ConfusionMatrix {
	pub fn new(n_classes: usize, truth: &[f64], predicted: &[f64]) -> Self {
		let mut cells = vec![vec![0; n_classes]; n_classes];

		for (&t, &p) in truth.iter().zip(predicted) {
			cells[t as usize][p as usize] += 1;
		}

		Self(cells)
	}

	pub fn n_classes(&self) -> usize {
		self.0.len()
	}

	pub fn total(&self) -> usize {
		self.0.iter().flatten().sum()
	}

	pub fn accuracy(&self) -> f64 {
		let total = self.total();
		if total == 0 {
			return 0.0;
		}

		(0..self.n_classes()).map(|i| self.0[i][i]).sum::<usize>() as f64 / total as f64
	}

	pub fn class_metrics(&self, class: usize) -> ClassMetrics {
		let tp = self.0[class][class];
		let support = self.0[class].iter().sum::<usize>();
		let predicted = self.0.iter().map(|row| row[class]).sum::<usize>();

		let precision = ratio(tp, predicted);
		let recall = ratio(tp, support);
		let f1_score = if precision + recall > 0.0 {
			2.0 * precision * recall / (precision + recall)
		} else {
			0.0
		};

		ClassMetrics { precision, recall, f1_score, support }
	}
}

fn ratio(a: usize, b: usize) -> f64 {
	if b == 0 { 0.0 } else { a as f64 / b as f64 }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
	pub precision: f64,
	pub recall: f64,
	#[serde(rename = "f1-score")]
	pub f1_score: f64,
	pub support: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
	pub classes: Vec<(LinkStatus, ClassMetrics)>,
	pub accuracy: f64,
	pub macro_avg: ClassMetrics,
	pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
	pub fn new(matrix: &ConfusionMatrix) -> Self {
		let classes = LinkStatus::ALL
			.iter()
			.map(|&status| (status, matrix.class_metrics(status.class())))
			.collect::<Vec<_>>();

		let total = matrix.total();
		let macro_avg = average(&classes, total, |_| 1.0);
		let weighted_avg = average(&classes, total, |m| m.support as f64);

		Self {
			accuracy: matrix.accuracy(),
			classes,
			macro_avg,
			weighted_avg,
		}
	}
}

fn average<F>(classes: &[(LinkStatus, ClassMetrics)], total: usize, weight: F) -> ClassMetrics
where
	F: Fn(&ClassMetrics) -> f64,
{
	let norm = classes.iter().map(|(_, m)| weight(m)).sum::<f64>();
	let avg = |f: fn(&ClassMetrics) -> f64| {
		if norm > 0.0 {
			classes.iter().map(|(_, m)| weight(m) * f(m)).sum::<f64>() / norm
		} else {
			0.0
		}
	};

	ClassMetrics {
		precision: avg(|m| m.precision),
		recall: avg(|m| m.recall),
		f1_score: avg(|m| m.f1_score),
		support: total,
	}
}

impl fmt::Display for ClassificationReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{:>14} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
		writeln!(f)?;

		for (status, m) in &self.classes {
			writeln!(f, "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}", status.label(), m.precision, m.recall, m.f1_score, m.support)?;
		}

		writeln!(f)?;
		writeln!(f, "{:>14} {:>9} {:>9} {:>9.2} {:>9}", "accuracy", "", "", self.accuracy, self.macro_avg.support)?;

		for (name, m) in &[("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
			writeln!(f, "{:>14} {:>9.2} {:>9.2} {:>9.2} {:>9}", name, m.precision, m.recall, m.f1_score, m.support)?;
		}

		Ok(())
	}
}

impl fmt::Display for ConfusionMatrix {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:>14}", "true \\ pred")?;
		for class in 0..self.n_classes() {
			write!(f, " {:>9}", LinkStatus::from_class(class).label())?;
		}
		writeln!(f)?;

		for (class, row) in self.0.iter().enumerate() {
			write!(f, "{:>14}", LinkStatus::from_class(class).label())?;
			for cell in row {
				write!(f, " {:>9}", cell)?;
			}
			writeln!(f)?;
		}

		Ok(())
	}
}
