use rand::Rng;

use crate::error::{MarkovError, Result};

/// Categorical sampler over weighted candidates.
///
/// The probability of selecting a candidate is proportional to its weight.
/// Weights need not be sorted nor normalized.
///
/// ## Invariants
/// - At least one candidate
/// - Every weight is strictly positive, so `cumulative` is strictly increasing
#[derive(Clone, Debug)]
pub struct WeightedChoice<T> {
	items: Vec<T>,
	/// Running sum of weights, `cumulative[i] = w0 + ... + wi`.
	cumulative: Vec<u64>,
}

impl<T> WeightedChoice<T> {
	/// Builds the sampler from `(candidate, weight)` pairs.
	///
	/// # Errors
	/// - `EmptyChoice` if `choices` is empty.
	/// - `InvalidWeight` if a weight is 0.
	pub fn new(choices: Vec<(T, u64)>) -> Result<Self> {
		if choices.is_empty() {
			return Err(MarkovError::EmptyChoice);
		}

		let mut items = Vec::with_capacity(choices.len());
		let mut cumulative = Vec::with_capacity(choices.len());
		let mut total: u64 = 0;
		for (index, (item, weight)) in choices.into_iter().enumerate() {
			if weight == 0 {
				return Err(MarkovError::InvalidWeight(index));
			}
			total += weight;
			items.push(item);
			cumulative.push(total);
		}

		Ok(Self { items, cumulative })
	}

	/// Sum of all weights.
	pub fn total(&self) -> u64 {
		// Never empty by construction
		self.cumulative.last().copied().unwrap_or(0)
	}

	/// Picks one candidate.
	///
	/// Draws `r` uniformly in `[0, total)` and returns the first candidate whose
	/// cumulative weight is strictly greater than `r` (binary search, O(log n)).
	pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
		let r = rng.random_range(0..self.total());
		let index = self.cumulative.partition_point(|&sum| sum <= r);
		&self.items[index]
	}

	/// Same as [`choose`](Self::choose) but consumes the sampler.
	pub fn into_choice<R: Rng + ?Sized>(mut self, rng: &mut R) -> T {
		let r = rng.random_range(0..self.total());
		let index = self.cumulative.partition_point(|&sum| sum <= r);
		self.items.swap_remove(index)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	#[test]
	fn rejects_empty_and_zero_weights() {
		assert!(matches!(WeightedChoice::<char>::new(vec![]), Err(MarkovError::EmptyChoice)));
		assert!(matches!(
			WeightedChoice::new(vec![('a', 2), ('b', 0)]),
			Err(MarkovError::InvalidWeight(1))
		));
	}

	#[test]
	fn single_candidate_is_always_chosen() {
		let choice = WeightedChoice::new(vec![("only", 7)]).unwrap();
		let mut rng = StdRng::seed_from_u64(1);
		for _ in 0..100 {
			assert_eq!(*choice.choose(&mut rng), "only");
		}
	}

	#[test]
	fn same_seed_same_choices() {
		let choice = WeightedChoice::new(vec![('a', 1), ('b', 5), ('c', 2)]).unwrap();
		let mut first = StdRng::seed_from_u64(42);
		let mut second = StdRng::seed_from_u64(42);
		let a: Vec<char> = (0..50).map(|_| *choice.choose(&mut first)).collect();
		let b: Vec<char> = (0..50).map(|_| *choice.choose(&mut second)).collect();
		assert_eq!(a, b);
	}

	#[test]
	fn frequencies_follow_weights() {
		// Unsorted weights, 1:6:3
		let choice = WeightedChoice::new(vec![(0usize, 1), (1, 6), (2, 3)]).unwrap();
		let mut rng = StdRng::seed_from_u64(7);
		let mut counts = [0usize; 3];
		for _ in 0..10_000 {
			counts[*choice.choose(&mut rng)] += 1;
		}
		assert!((700..1300).contains(&counts[0]), "{:?}", counts);
		assert!((5600..6400).contains(&counts[1]), "{:?}", counts);
		assert!((2600..3400).contains(&counts[2]), "{:?}", counts);
	}

	#[test]
	fn into_choice_returns_a_candidate() {
		let choice = WeightedChoice::new(vec![(String::from("x"), 1), (String::from("y"), 1)]).unwrap();
		let picked = choice.into_choice(&mut StdRng::seed_from_u64(3));
		assert!(picked == "x" || picked == "y");
	}
}
