use serde::{Deserialize, Serialize};

/// A sliding window over the last symbols of a stream.
///
/// A `State` is a vertex of the transition graph. Two states are equal iff
/// their symbols are equal element-wise.
///
/// ## Invariants
/// - Inside a graph of order `n`, a state holds at most `n` symbols.
/// - States shorter than `n` only appear while the window warms up
///   (the first `n` symbols of a training stream).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct State<S> {
	symbols: Vec<S>,
}

impl<S: Clone> State<S> {
	/// Creates the empty window, the state training starts from.
	pub fn empty() -> Self {
		Self { symbols: Vec::new() }
	}

	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}

	pub fn symbols(&self) -> &[S] {
		&self.symbols
	}

	/// Returns the most recent symbol, the one emitted when entering this state.
	pub fn last(&self) -> Option<&S> {
		self.symbols.last()
	}

	/// Returns the window obtained by observing `symbol`.
	///
	/// - If the window already holds `order` symbols, the oldest is dropped.
	/// - `symbol` is appended.
	pub fn shifted(&self, symbol: S, order: usize) -> Self {
		let skip = (self.symbols.len() + 1).saturating_sub(order);
		let mut symbols: Vec<S> = self.symbols.iter().skip(skip).cloned().collect();
		symbols.push(symbol);
		Self { symbols }
	}
}

impl<S> From<Vec<S>> for State<S> {
	fn from(symbols: Vec<S>) -> Self {
		Self { symbols }
	}
}

impl<S> FromIterator<S> for State<S> {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		Self { symbols: iter.into_iter().collect() }
	}
}
