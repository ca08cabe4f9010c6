use crate::classifier::Classifier;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::ops::Range;
use rand::seq::SliceRandom;
use rand::Rng;
use ordered_float::OrderedFloat;

/// A view over the rows of a [`Builder`]. Targets are class indices stored as `f64`.
#[derive(Clone, Debug)]
pub struct Dataset<'a> {
	columns: &'a [Vec<f64>],
	targets: &'a [f64],
	n_classes: usize,

	index: Vec<usize>,
	range: Range<usize>,
}

impl<'a, 'b> Dataset<'a> {
	pub fn evaluate<C: Classifier + Sync>(&self, classifier: &C) -> f64 {
		if self.rows_len() == 0 {
			return 0.0;
		}

		self.rows()
			.zip(self.targets())
			.collect::<Vec<_>>()
			.into_par_iter()
			.filter(|(x, y)| classifier.predict(&x) == *y)
			.count() as f64 / self.rows_len() as f64
	}

	pub fn sort(&mut self, column: usize) {
		(&mut self.index[self.range.start..self.range.end])
			.sort_by_key(|&x| OrderedFloat(self.columns[column][x]));
	}

	/// Candidate splits of a sorted column: the row where the right side starts and
	/// the midpoint threshold between the two neighbouring distinct values.
	/// The threshold is always above the lower value, so `x < threshold` selects
	/// exactly the rows before the split row.
	pub fn get_splits(&'b self, column: usize) -> impl 'b + Iterator<Item = (usize, f64)> {
		let column = &self.columns[column];

		self.indices()
			.map(move |x| column[x])
			.enumerate()
			.scan(None, |prev: &mut Option<f64>, (i, x)| {
				let split = match *prev {
					Some(y) if x > y => {
						let mid = (x + y) / 2.0;
						// Adjacent floats can round the midpoint down onto `y`
						Some((i, if mid > y { mid } else { x }))
					},
					_ => None,
				};
				*prev = Some(x);

				Some(split)
			})
			.filter_map(|t| t)
	}

	pub fn split<F, T>(&mut self, row: usize, mut f: F) -> (T, T)
	where
		F: FnMut(&mut Self) -> T,
	{
		let row = row + self.range.start;
		let original = self.range.clone();

		self.range.end = row;
		let left = f(self);
		self.range.end = original.end;

		self.range.start = row;
		let right = f(self);
		self.range.start = original.start;

		(left, right)
	}

	/// Per-class shuffle, each class puts `round(count * test_rate)` rows on the test side.
	pub fn stratified_split<R: Rng + ?Sized>(&self, rng: &mut R, test_rate: f64) -> (Self, Self) {
		let mut train = Vec::new();
		let mut test = Vec::new();

		for mut class_index in self.class_indices() {
			class_index.shuffle(rng);
			let test_num = (class_index.len() as f64 * test_rate).round() as usize;

			test.extend_from_slice(&class_index[..test_num]);
			train.extend_from_slice(&class_index[test_num..]);
		}

		train.shuffle(rng);
		test.shuffle(rng);

		(self.subset(train), self.subset(test))
	}

	/// Stratified k-fold without shuffling, as `(train, test)` pairs.
	pub fn stratified_folds(&self, k: usize) -> Vec<(Self, Self)> {
		let by_class = self.class_indices();
		let bound = |n: usize, i: usize| i * (n / k) + std::cmp::min(i, n % k);

		(0..k)
			.map(|fold| {
				let mut train = Vec::new();
				let mut test = Vec::new();

				for class_index in &by_class {
					let n = class_index.len();
					let (start, end) = (bound(n, fold), bound(n, fold + 1));

					test.extend_from_slice(&class_index[start..end]);
					train.extend_from_slice(&class_index[..start]);
					train.extend_from_slice(&class_index[end..]);
				}

				(self.subset(train), self.subset(test))
			})
			.collect()
	}

	pub fn bootstrap<R: Rng + ?Sized>(&self, rng: &mut R, max_samples: usize) -> Self {
		let samples = std::cmp::min(max_samples, self.rows_len());

		let index = (0..samples)
			.map(|_| self.index[rng.gen_range(self.range.start, self.range.end)])
			.collect::<Vec<_>>();

		self.subset(index)
	}

	fn subset(&self, index: Vec<usize>) -> Self {
		Self {
			range: 0..index.len(),
			index,
			columns: self.columns,
			targets: self.targets,
			n_classes: self.n_classes,
		}
	}

	fn class_indices(&self) -> Vec<Vec<usize>> {
		let mut by_class = vec![Vec::new(); self.n_classes];

		for i in self.indices() {
			by_class[self.targets[i] as usize].push(i);
		}

		by_class
	}

	fn indices(&'b self) -> impl 'b + Iterator<Item = usize> + Clone {
		self.index[self.range.start..self.range.end]
			.iter()
			.map(|&x| x)
	}

	pub fn targets(&'b self) -> impl 'b + Iterator<Item = f64> {
		self.indices()
			.map(move |i| self.targets[i])
	}

	pub fn column(&'b self, column: usize) -> impl 'b + Iterator<Item = f64> {
		let column = &self.columns[column];

		self.indices()
			.map(move |i| column[i])
	}

	pub fn class_counts(&self) -> Vec<usize> {
		let mut counts = vec![0; self.n_classes];

		for target in self.targets() {
			counts[target as usize] += 1;
		}

		counts
	}

	pub fn n_classes(&self) -> usize {
		self.n_classes
	}

	pub fn features_len(&self) -> usize {
		return self.columns.len()
	}

	pub fn rows_len(&self) -> usize {
		self.range.end - self.range.start
	}

	pub fn rows(&'b self) -> impl 'b + Iterator<Item = Vec<f64>> {
		self.indices().map(move |i| {
			(0..self.columns.len())
				.map(|j| self.columns[j][i])
				.collect()
		})
	}

	pub fn classify<C: Classifier + Sized>(&self, classifier: &C) -> Vec<f64> {
		self.rows()
			.map(|x| classifier.predict(&x))
			.collect()
	}
}

#[derive(Debug)]
pub struct Builder {
	columns: Vec<Vec<f64>>,
	targets: Vec<f64>,
	n_classes: usize,
}

impl Builder {
	pub fn new(n_classes: usize) -> Self {
		Self {
			columns: Vec::new(),
			targets: Vec::new(),
			n_classes,
		}
	}

	pub fn build(&self) -> Dataset {
		let range = 0..self.targets.len();

		Dataset {
			columns: &self.columns,
			targets: &self.targets,
			n_classes: self.n_classes,

			range: range.clone(),
			index: range.collect(),
		}
	}

	/// `y` must be a class index below `n_classes`.
	pub fn add(&mut self, x: &[f64], y: f64) {
		if self.columns.is_empty() {
			self.columns = vec![Vec::new(); x.len()];
		}

		for (column, value) in self.columns.iter_mut().zip(x) {
			column.push(*value);
		}

		self.targets.push(y);
	}

	pub fn add_x(&mut self, x: &[f64]) {
		self.add(x, 0.0)
	}

	pub fn len(&self) -> usize {
		self.targets.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn builder(rows: &[(f64, f64, f64)]) -> Builder {
		let mut builder = Builder::new(2);
		for &(a, b, y) in rows {
			builder.add(&[a, b], y);
		}
		builder
	}

	#[test]
	fn splits_sit_between_distinct_values() {
		let builder = builder(&[(3.0, 0.0, 0.0), (1.0, 0.0, 0.0), (1.0, 0.0, 1.0), (2.0, 0.0, 1.0)]);
		let mut dataset = builder.build();
		dataset.sort(0);

		let splits = dataset.get_splits(0).collect::<Vec<_>>();
		assert_eq!(splits, vec![(2, 1.5), (3, 2.5)]);
		assert!(dataset.get_splits(1).next().is_none());
	}

	#[test]
	fn thresholds_between_adjacent_floats_stay_above_the_lower_value() {
		let low: f64 = 2.0;
		let high = f64::from_bits(low.to_bits() + 1);
		let builder = builder(&[(high, 0.0, 1.0), (low, 0.0, 0.0), (high, 0.0, 1.0)]);
		let mut dataset = builder.build();
		dataset.sort(0);

		let splits = dataset.get_splits(0).collect::<Vec<_>>();
		assert_eq!(splits, vec![(1, high)]);
		assert_eq!(dataset.column(0).take_while(|&f| f < high).count(), 1);
	}

	#[test]
	fn split_restores_the_range() {
		let builder = builder(&[(1.0, 0.0, 0.0), (2.0, 0.0, 1.0), (3.0, 0.0, 1.0)]);
		let mut dataset = builder.build();

		let (left, right) = dataset.split(1, |d| d.rows_len());
		assert_eq!((left, right), (1, 2));
		assert_eq!(dataset.rows_len(), 3);
	}

	#[test]
	fn stratified_split_keeps_class_ratio() {
		let rows = (0..100)
			.map(|i| (i as f64, 0.0, if i < 20 { 0.0 } else { 1.0 }))
			.collect::<Vec<_>>();
		let builder = builder(&rows);
		let dataset = builder.build();
		let mut rng = StdRng::seed_from_u64(42);

		let (train, test) = dataset.stratified_split(&mut rng, 0.2);
		assert_eq!(test.class_counts(), vec![4, 16]);
		assert_eq!(train.class_counts(), vec![16, 64]);
	}

	#[test]
	fn stratified_folds_cover_every_row_once() {
		let rows = (0..23)
			.map(|i| (i as f64, 0.0, if i % 3 == 0 { 0.0 } else { 1.0 }))
			.collect::<Vec<_>>();
		let builder = builder(&rows);
		let dataset = builder.build();

		let folds = dataset.stratified_folds(5);
		assert_eq!(folds.len(), 5);

		let mut seen = folds
			.iter()
			.flat_map(|(_, test)| test.column(0).collect::<Vec<_>>())
			.map(|x| x as usize)
			.collect::<Vec<_>>();
		seen.sort();
		assert_eq!(seen, (0..23).collect::<Vec<_>>());

		for (train, test) in &folds {
			assert_eq!(train.rows_len() + test.rows_len(), 23);
			let sizes = test.class_counts();
			assert!(sizes[0] >= 1 && sizes[0] <= 2);
			assert!(sizes[1] >= 3 && sizes[1] <= 4);
		}
	}

	#[test]
	fn bootstrap_draws_from_the_current_view() {
		let builder = builder(&[(1.0, 0.0, 0.0), (2.0, 0.0, 1.0), (3.0, 0.0, 1.0), (4.0, 0.0, 0.0)]);
		let mut dataset = builder.build();
		dataset.sort(0);
		let mut rng = StdRng::seed_from_u64(7);

		let sample = dataset.split(2, |d| d.bootstrap(&mut rng, 10)).0;
		assert_eq!(sample.rows_len(), 2);
		assert!(sample.column(0).all(|x| x <= 2.0));
	}
}
