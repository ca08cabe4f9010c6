use ordered_float::OrderedFloat;

/// Weighted class totals for a set of targets.
pub fn class_weights_sum(targets: impl Iterator<Item = f64>, weights: &[f64]) -> Vec<f64> {
	let mut sums = vec![0.0; weights.len()];

	for target in targets {
		let class = target as usize;
		sums[class] += weights[class];
	}

	sums
}

pub fn gini(distribution: &[f64]) -> f64 {
	let total = distribution.iter().sum::<f64>();
	if total <= 0.0 {
		return 0.0;
	}

	1.0 - distribution
		.iter()
		.map(|&w| (w / total).powi(2))
		.sum::<f64>()
}

pub fn normalize(distribution: &[f64]) -> Vec<f64> {
	let total = distribution.iter().sum::<f64>();
	if total <= 0.0 {
		return vec![1.0 / distribution.len() as f64; distribution.len()];
	}

	distribution.iter().map(|&w| w / total).collect()
}

/// Index of the largest value, the lowest index wins ties.
pub fn argmax(values: &[f64]) -> usize {
	values
		.iter()
		.enumerate()
		.fold((0, std::f64::MIN), |(best, max), (i, &v)| {
			if v > max { (i, v) } else { (best, max) }
		})
		.0
}

pub fn mean(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std(values: &[f64]) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let m = mean(values);
	(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Value at sorted position `min(floor(p * n), n - 1)`, 0 for no values.
pub fn percentile(values: &[f64], p: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let idx = std::cmp::min((p * values.len() as f64) as usize, values.len() - 1);
	let mut values = values.iter().map(|&v| OrderedFloat(v)).collect::<Vec<_>>();
	let (_, nth, _) = values.select_nth_unstable(idx);

	nth.0
}
