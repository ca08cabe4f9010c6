use std::io::{Read, Write};
use rand::Rng;
use rand::seq::SliceRandom as _;

use crate::dataset::Dataset;
use crate::node::{Node, Split};
use crate::classifier::Classifier;
use crate::functions::{class_weights_sum, gini, normalize};

// Weighted class totals on one side of a moving split position
struct Window {
	sums: Vec<f64>,
	total: f64,
}

impl Window {
	fn new(sums: Vec<f64>) -> Self {
		Self {
			total: sums.iter().sum(),
			sums,
		}
	}

	fn inc(&mut self, class: usize, weight: f64) {
		self.sums[class] += weight;
		self.total += weight;
	}

	fn dec(&mut self, class: usize, weight: f64) {
		self.sums[class] -= weight;
		self.total -= weight;
	}

	fn gini(&self) -> f64 {
		gini(&self.sums)
	}
}

struct NodeBuilder<'w, R> {
	max_features: usize,
	max_depth: usize,
	min_samples_split: usize,
	min_samples_leaf: usize,
	class_weights: &'w [f64],
	rng: R,
}

impl<'w, R: Rng> NodeBuilder<'w, R> {
	fn build(&mut self, dataset: &mut Dataset, depth: usize) -> Node {
		let distribution = class_weights_sum(dataset.targets(), self.class_weights);
		let impurity = gini(&distribution);
		let rows = dataset.rows_len();

		if depth > self.max_depth
			|| rows < self.min_samples_split
			|| rows < 2 * self.min_samples_leaf
			|| impurity <= std::f64::EPSILON
		{
			return Node::Leaf(normalize(&distribution));
		}

		let mut best_split: Option<Split> = None;
		let mut best_gain = std::f64::MIN;
		let mut columns = (0..dataset.features_len()).collect::<Vec<usize>>();
		columns.shuffle(&mut self.rng);

		for (visited, &column) in columns.iter().enumerate() {
			// Keep looking past max_features only while nothing splittable was found
			if visited >= self.max_features && best_split.is_some() {
				break;
			}

			dataset.sort(column);

			let targets = dataset.targets().map(|t| t as usize).collect::<Vec<_>>();
			let mut left = Window::new(vec![0.0; distribution.len()]);
			let mut right = Window::new(distribution.clone());
			let mut consumed = 0;

			for (row, value) in dataset.get_splits(column) {
				for &class in &targets[consumed..row] {
					let weight = self.class_weights[class];
					left.inc(class, weight);
					right.dec(class, weight);
				}
				consumed = row;

				if row < self.min_samples_leaf || rows - row < self.min_samples_leaf {
					continue;
				}

				let total = left.total + right.total;
				if total <= 0.0 {
					continue;
				}

				let ratio_l = left.total / total;
				let ratio_r = 1.0 - ratio_l;

				let gain = impurity - (ratio_l * left.gini() + ratio_r * right.gini());

				if best_gain < gain {
					best_split = Some(Split { column, value });
					best_gain = gain;
				}
			}
		}

		if let Some(split) = best_split {
			self.build_children(dataset, split, depth)
		} else {
			Node::Leaf(normalize(&distribution))
		}
	}

	fn build_children(&mut self, dataset: &mut Dataset, split: Split, depth: usize) -> Node {
		dataset.sort(split.column);

		let split_row = dataset
			.column(split.column)
			.take_while(|&f| f < split.value)
			.count();

		let (left, right) = dataset.split(split_row, |x| Box::new(self.build(x, depth + 1)));

		Node::Children {
			left, right, split
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
	root: Node,
}

impl DecisionTree {
	pub fn root(&self) -> &Node {
		&self.root
	}
}

impl Classifier for DecisionTree {
	fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
		self.root.predict_proba(x).to_vec()
	}

	fn serialize<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
		self.root.serialize(writer)
	}

	fn deserialize<R: Read>(reader: &mut R) -> std::io::Result<Self> {
		let root = Node::deserialize(reader)?;

		Ok(Self {
			root
		})
	}
}

pub struct DecisionTreeBuilder {
	pub max_features: Option<usize>,
	pub max_depth: usize,
	pub min_samples_split: usize,
	pub min_samples_leaf: usize,
}

impl Default for DecisionTreeBuilder {
	fn default() -> Self {
		Self {
			max_features: None,
			max_depth: 32,
			min_samples_split: 2,
			min_samples_leaf: 1,
		}
	}
}

impl DecisionTreeBuilder {
	/// `class_weights` holds one weight per class of `dataset`.
	pub fn fit<R: Rng + ?Sized>(&self, rng: &mut R, mut dataset: Dataset, class_weights: &[f64]) -> DecisionTree {
		let max_features = self.max_features.unwrap_or(dataset.features_len());
		let root = (NodeBuilder {
			max_features,
			max_depth: self.max_depth,
			min_samples_split: std::cmp::max(self.min_samples_split, 2),
			min_samples_leaf: std::cmp::max(self.min_samples_leaf, 1),
			class_weights,
			rng,
		}).build(&mut dataset, 1);

		DecisionTree { root }
	}
}
