/// Compute cosine similarity between two feature vectors.
/// Returns 0.0 for zero-magnitude vectors or dimension mismatches.
/// Result clamped to [-1.0, 1.0].
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0;
	let mut norm_a = 0.0;
	let mut norm_b = 0.0;

	for (&ai, &bi) in a.iter().zip(b) {
		dot += ai * bi;
		norm_a += ai * ai;
		norm_b += bi * bi;
	}

	let denom = norm_a.sqrt() * norm_b.sqrt();
	if denom == 0.0 {
		return 0.0;
	}

	let result = dot / denom;
	if !result.is_finite() {
		return 0.0;
	}
	result.clamp(-1.0, 1.0)
}

/// Compute the magnitude (L2 norm) of a vector.
pub fn compute_magnitude(v: &[f64]) -> f64 {
	v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Compute cosine similarity using pre-computed magnitudes.
/// Falls back to returning 0.0 if magnitudes are zero.
pub fn cosine_similarity_with_magnitude(a: &[f64], b: &[f64], mag_a: f64, mag_b: f64) -> f64 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let denom = mag_a * mag_b;
	if denom == 0.0 {
		return 0.0;
	}

	let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();

	let result = dot / denom;
	if !result.is_finite() {
		return 0.0;
	}
	result.clamp(-1.0, 1.0)
}

/// Squared Euclidean distance. Mismatched lengths compare the shared prefix.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean distance.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
	squared_distance(a, b).sqrt()
}

/// Element-wise mean of a set of equal-length rows. `None` when `rows` is empty.
pub fn mean_vector<'a, I>(rows: I, dim: usize) -> Option<Vec<f64>>
where
	I: IntoIterator<Item = &'a [f64]>,
{
	let mut sum = vec![0.0; dim];
	let mut count = 0usize;
	for row in rows {
		for (s, &v) in sum.iter_mut().zip(row) {
			*s += v;
		}
		count += 1;
	}
	if count == 0 {
		return None;
	}
	let n = count as f64;
	for s in &mut sum {
		*s /= n;
	}
	Some(sum)
}

/// Scale a vector in place to unit L2 length. Zero vectors are left unchanged.
pub fn normalize_l2(v: &mut [f64]) {
	let mag = compute_magnitude(v);
	if mag > 0.0 {
		for x in v.iter_mut() {
			*x /= mag;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_vectors() {
		let v = vec![1.0, 2.0, 3.0];
		let sim = cosine_similarity(&v, &v);
		assert!((sim - 1.0).abs() < 1e-10);
	}

	#[test]
	fn orthogonal_vectors() {
		let a = vec![1.0, 0.0];
		let b = vec![0.0, 1.0];
		assert!((cosine_similarity(&a, &b)).abs() < 1e-10);
	}

	#[test]
	fn opposite_vectors() {
		let a = vec![1.0, 0.0];
		let b = vec![-1.0, 0.0];
		assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-10);
	}

	#[test]
	fn empty_vectors() {
		assert_eq!(cosine_similarity(&[], &[]), 0.0);
	}

	#[test]
	fn mismatched_lengths() {
		assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
	}

	#[test]
	fn zero_magnitude() {
		let a = vec![0.0, 0.0];
		let b = vec![1.0, 2.0];
		assert_eq!(cosine_similarity(&a, &b), 0.0);
	}

	#[test]
	fn similarity_stays_in_bounds() {
		let rows = [
			vec![0.3, -2.0, 7.5, 1e-9],
			vec![-1e6, 4.0, 0.0, 2.0],
			vec![1e-12, 1e-12, 1e-12, 1e-12],
			vec![5.0, 5.0, -5.0, 0.5],
		];
		for a in &rows {
			for b in &rows {
				let sim = cosine_similarity(a, b);
				assert!((-1.0..=1.0).contains(&sim), "{sim} out of range");
			}
		}
	}

	#[test]
	fn magnitude_basic() {
		assert!((compute_magnitude(&[3.0, 4.0]) - 5.0).abs() < 1e-10);
		assert_eq!(compute_magnitude(&[]), 0.0);
	}

	#[test]
	fn cosine_with_precomputed_identical() {
		let v = vec![1.0, 2.0, 3.0];
		let mag = compute_magnitude(&v);
		let sim = cosine_similarity_with_magnitude(&v, &v, mag, mag);
		assert!((sim - 1.0).abs() < 1e-10);
	}

	#[test]
	fn distance_basic() {
		assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-10);
		assert_eq!(squared_distance(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
	}

	#[test]
	fn mean_of_rows() {
		let a = [1.0, 2.0];
		let b = [3.0, 6.0];
		let mean = mean_vector([&a[..], &b[..]], 2).unwrap();
		assert_eq!(mean, vec![2.0, 4.0]);
		assert!(mean_vector(std::iter::empty::<&[f64]>(), 2).is_none());
	}

	#[test]
	fn normalize_to_unit_length() {
		let mut v = vec![3.0, 4.0];
		normalize_l2(&mut v);
		assert!((compute_magnitude(&v) - 1.0).abs() < 1e-12);

		let mut zero = vec![0.0, 0.0];
		normalize_l2(&mut zero);
		assert_eq!(zero, vec![0.0, 0.0]);
	}
}
