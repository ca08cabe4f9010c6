use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::Dataset;
use crate::classifier::Classifier;
use crate::decision_tree::{DecisionTreeBuilder, DecisionTree};
use crate::node::to_u16;

const MAGIC: &[u8; 4] = b"LSRF";
const VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
	Uniform,
	/// `n_rows / (n_classes * count_c)`, zero for classes without rows.
	Balanced,
}

impl ClassWeight {
	pub fn weights(&self, dataset: &Dataset) -> Vec<f64> {
		let counts = dataset.class_counts();

		match self {
			ClassWeight::Uniform => vec![1.0; counts.len()],
			ClassWeight::Balanced => {
				let n = dataset.rows_len() as f64;
				let k = counts.len() as f64;

				counts
					.iter()
					.map(|&c| if c == 0 { 0.0 } else { n / (k * c as f64) })
					.collect()
			},
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestBuilder {
	pub n_trees: usize,
	pub max_depth: usize,
	pub min_samples_split: usize,
	pub min_samples_leaf: usize,
	/// Bootstrap size as a fraction of the training rows.
	pub bag_amount: f64,
	pub class_weight: ClassWeight,
	/// Fixed seed for reproducible fits, `None` draws one from the thread rng.
	pub seed: Option<u64>,
}

impl Default for RandomForestBuilder {
	fn default() -> Self {
		Self {
			n_trees: 100,
			max_depth: 5,
			min_samples_split: 5,
			min_samples_leaf: 5,
			bag_amount: 1.0,
			class_weight: ClassWeight::Balanced,
			seed: Some(42),
		}
	}
}

impl RandomForestBuilder {
	pub fn fit(&self, dataset: Dataset) -> RandomForestClassifier {
		let feature_len = std::cmp::max(1, (dataset.features_len() as f64).sqrt().floor() as usize);
		let class_weights = self.class_weight.weights(&dataset);

		let whole = Instant::now();
		let done = AtomicUsize::new(0);

		let forest = self.get_rngs()
			.collect::<Vec<_>>()
			.into_par_iter()
			.map(|mut rng| {
				let now = Instant::now();
				let tree = self.fit_tree(&mut rng, &dataset, feature_len, &class_weights);

				let i = done.fetch_add(1, Ordering::Relaxed) + 1;
				debug!(
					"[{:.1}%] tree {}/{} fitted in {:.2} ms",
					i as f64 / self.n_trees as f64 * 100.0,
					i,
					self.n_trees,
					now.elapsed().as_secs_f64() * 1000.0,
				);

				tree
			})
			.collect::<Vec<_>>();

		info!(
			trees = forest.len(),
			rows = dataset.rows_len(),
			depth = forest.iter().map(|t| t.root().depth()).max().unwrap_or(0),
			"fitted random forest in {:.2} s",
			whole.elapsed().as_secs_f64()
		);

		RandomForestClassifier {
			forest,
			n_features: dataset.features_len(),
			n_classes: dataset.n_classes(),
		}
	}

	fn fit_tree<R: Rng + ?Sized>(&self, rng: &mut R, dataset: &Dataset, feature_len: usize, class_weights: &[f64]) -> DecisionTree {
		let builder = DecisionTreeBuilder {
			max_features: Some(feature_len),
			max_depth: self.max_depth,
			min_samples_split: self.min_samples_split,
			min_samples_leaf: self.min_samples_leaf,
		};

		let max_samples = (dataset.rows_len() as f64 * self.bag_amount).round() as usize;
		let bootstrapped = dataset.bootstrap(rng, max_samples);

		builder.fit(rng, bootstrapped, class_weights)
	}

	// One rng per tree, derived up front so the result does not depend on scheduling
	fn get_rngs(&self) -> impl Iterator<Item = StdRng> {
		let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
		let mut rng = StdRng::seed_from_u64(seed);
		(0..self.n_trees).map(move |_| {
			let mut seed = [0u8; 32];
			rng.fill(&mut seed);
			StdRng::from_seed(seed)
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomForestClassifier {
	forest: Vec<DecisionTree>,
	n_features: usize,
	n_classes: usize,
}

impl RandomForestClassifier {
	pub fn n_trees(&self) -> usize {
		self.forest.len()
	}

	pub fn n_features(&self) -> usize {
		self.n_features
	}

	pub fn n_classes(&self) -> usize {
		self.n_classes
	}
}

impl Classifier for RandomForestClassifier {
	fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
		let mut proba = vec![0.0; self.n_classes];
		if self.forest.is_empty() {
			return proba;
		}

		for tree in &self.forest {
			for (sum, p) in proba.iter_mut().zip(tree.root().predict_proba(x)) {
				*sum += p;
			}
		}

		let n = self.forest.len() as f64;
		proba.iter_mut().for_each(|p| *p /= n);

		proba
	}

	fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
		let n_features = to_u16(self.n_features, "feature count")?;
		let n_classes = to_u16(self.n_classes, "class count")?;
		let n_trees = to_u16(self.forest.len(), "tree count")?;

		writer.write_all(MAGIC)?;
		writer.write_u16::<BigEndian>(VERSION)?;
		writer.write_u16::<BigEndian>(n_features)?;
		writer.write_u16::<BigEndian>(n_classes)?;
		writer.write_u16::<BigEndian>(n_trees)?;

		for tree in &self.forest {
			tree.serialize(writer)?;
		}

		Ok(())
	}

	fn deserialize<R: Read>(reader: &mut R) -> std::io::Result<Self> {
		let invalid = |msg: String| std::io::Error::new(std::io::ErrorKind::InvalidData, msg);

		let mut magic = [0u8; 4];
		reader.read_exact(&mut magic)?;
		if &magic != MAGIC {
			return Err(invalid(format!("bad magic {:?}", magic)));
		}

		let version = reader.read_u16::<BigEndian>()?;
		if version != VERSION {
			return Err(invalid(format!("unsupported model version {}", version)));
		}

		let n_features = reader.read_u16::<BigEndian>()? as usize;
		let n_classes = reader.read_u16::<BigEndian>()? as usize;
		let len = reader.read_u16::<BigEndian>()?;

		let forest = (0..len)
			.map(|_| DecisionTree::deserialize(reader))
			.collect::<std::io::Result<Vec<DecisionTree>>>()?;

		for tree in &forest {
			tree.root().validate(n_features, n_classes).map_err(invalid)?;
		}

		Ok(Self {
			forest,
			n_features,
			n_classes,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dataset::Builder;

	fn separable() -> Builder {
		let mut builder = Builder::new(2);
		for i in 0..200 {
			let throughput = (i % 50) as f64 / 10.0;
			let delay = (i % 7) as f64 / 1000.0;
			let y = if throughput < 1.0 || delay > 0.005 { 0.0 } else { 1.0 };
			builder.add(&[throughput, delay], y);
		}
		builder
	}

	fn small() -> RandomForestBuilder {
		RandomForestBuilder {
			n_trees: 15,
			..Default::default()
		}
	}

	#[test]
	fn balanced_weights_invert_class_frequency() {
		let mut builder = Builder::new(2);
		for i in 0..8 {
			builder.add(&[i as f64], if i < 2 { 0.0 } else { 1.0 });
		}
		let weights = ClassWeight::Balanced.weights(&builder.build());
		assert_eq!(weights, vec![2.0, 8.0 / 12.0]);
		assert_eq!(ClassWeight::Uniform.weights(&builder.build()), vec![1.0, 1.0]);
	}

	#[test]
	fn learns_a_separable_rule() {
		let builder = separable();
		let model = small().fit(builder.build());

		assert_eq!(model.n_trees(), 15);
		assert_eq!(model.n_features(), 2);
		assert!(builder.build().evaluate(&model) > 0.9);
		assert_eq!(model.predict(&[4.0, 0.001]), 1.0);
		assert_eq!(model.predict(&[0.2, 0.001]), 0.0);
	}

	#[test]
	fn probabilities_sum_to_one_and_agree_with_predict() {
		let builder = separable();
		let model = small().fit(builder.build());

		for x in builder.build().rows() {
			let proba = model.predict_proba(&x);
			assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
			let expected = if proba[1] > proba[0] { 1.0 } else { 0.0 };
			assert_eq!(model.predict(&x), expected);
		}
	}

	#[test]
	fn seeded_fits_are_reproducible() {
		let builder = separable();
		let a = small().fit(builder.build());
		let b = small().fit(builder.build());
		assert_eq!(a, b);
	}

	#[test]
	fn serialization_preserves_predictions() -> std::io::Result<()> {
		let builder = separable();
		let model = small().fit(builder.build());

		let mut bytes = Vec::new();
		model.serialize(&mut bytes)?;
		assert_eq!(&bytes[..4], b"LSRF");

		let restored = RandomForestClassifier::deserialize(&mut &bytes[..])?;
		assert_eq!(restored, model);
		assert_eq!(builder.build().evaluate(&restored), builder.build().evaluate(&model));

		Ok(())
	}

	#[test]
	fn rejects_foreign_files() {
		let err = RandomForestClassifier::deserialize(&mut &b"NOPE\0\x01"[..]).unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

		let mut bytes = Vec::new();
		small().fit(separable().build()).serialize(&mut bytes).unwrap();
		bytes[5] = 9;
		let err = RandomForestClassifier::deserialize(&mut &bytes[..]).unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
	}

	#[test]
	fn refuses_to_save_more_trees_than_the_header_holds() {
		let model = RandomForestBuilder { n_trees: 1, ..Default::default() }.fit(separable().build());
		let tree = model.forest[0].clone();
		let oversized = RandomForestClassifier {
			forest: vec![tree; u16::MAX as usize + 2],
			..model
		};

		let mut bytes = Vec::new();
		let err = oversized.serialize(&mut bytes).unwrap_err();
		assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
		assert!(bytes.is_empty());
	}
}
