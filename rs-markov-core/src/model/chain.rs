use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{MarkovError, Result};
use crate::model::graph::{MarkovGraph, StateChooser, open_graph};
use crate::model::native_graph::NativeGraph;
use crate::model::state::State;
use crate::model::symbol::{Symbol, TextSymbol};
use crate::model::weighted_choice::WeightedChoice;

/// A Markov chain of order `n` bound to one graph backend.
///
/// # Responsibilities
/// - Learn: turn a stream of symbols into graph transitions
/// - Emit: walk the graph, sampling each step by transition weight
/// - Merge: combine the graphs of two chains of the same order
///
/// # Warm-up
/// The learning window starts empty and grows by one symbol per step until it
/// holds `order` symbols, so the first transitions of a stream start from
/// shorter states (`() -> (a)`, `(a) -> (a, b)`, ...). These warm-up edges are
/// kept: a fresh chain starts emitting from the empty state and follows them.
///
/// # Notes
/// - The learning window survives between `learn` calls, so a stream can be
///   fed in several pieces.
/// - A chain owns its graph; driving one backend from several chains at once
///   is not supported.
pub struct MarkovChain<S: Symbol> {
	graph: Box<dyn MarkovGraph<S>>,
	/// Current state for generation, `None` once a terminal state is reached.
	state: Option<State<S>>,
	/// Sliding window carried across `learn` calls.
	learn_state: State<S>,
	/// Number of emission steps taken.
	time: u64,
	rng: StdRng,
}

impl<S: Symbol> MarkovChain<S> {
	/// Creates a chain over `graph`, seeded from the thread RNG.
	pub fn new(graph: Box<dyn MarkovGraph<S>>) -> Self {
		Self::with_rng(graph, StdRng::from_rng(&mut rand::rng()))
	}

	/// Creates a chain whose sampling is reproducible.
	pub fn with_seed(graph: Box<dyn MarkovGraph<S>>, seed: u64) -> Self {
		Self::with_rng(graph, StdRng::seed_from_u64(seed))
	}

	fn with_rng(graph: Box<dyn MarkovGraph<S>>, rng: StdRng) -> Self {
		Self {
			graph,
			state: Some(State::empty()),
			learn_state: State::empty(),
			time: 0,
			rng,
		}
	}

	/// Creates a chain over an empty in-memory graph.
	///
	/// # Errors
	/// Returns an error if `order < 1`.
	pub fn native(order: usize) -> Result<Self> {
		Ok(Self::new(Box::new(NativeGraph::new(order)?)))
	}

	pub fn order(&self) -> usize {
		self.graph.order()
	}

	pub fn time(&self) -> u64 {
		self.time
	}

	/// Current generation state, `None` after the walk hit a terminal state.
	pub fn state(&self) -> Option<&State<S>> {
		self.state.as_ref()
	}

	pub fn learn_state(&self) -> &State<S> {
		&self.learn_state
	}

	pub fn graph(&self) -> &dyn MarkovGraph<S> {
		self.graph.as_ref()
	}

	pub fn graph_mut(&mut self) -> &mut dyn MarkovGraph<S> {
		self.graph.as_mut()
	}

	pub fn into_graph(self) -> Box<dyn MarkovGraph<S>> {
		self.graph
	}

	/// Learns transitions from `source`.
	///
	/// For each symbol, the window is shifted (oldest symbol dropped once it
	/// holds `order` symbols) and the `old -> new` transition is recorded.
	/// Learning resumes from the window left by the previous call.
	///
	/// # Errors
	/// Stops at the first backend error. Transitions recorded before it are
	/// kept and the window is left just after the last recorded one.
	pub fn learn<I: IntoIterator<Item = S>>(&mut self, source: I) -> Result<()> {
		let order = self.graph.order();
		let mut window = self.learn_state.clone();
		let mut count: u64 = 0;

		for symbol in source {
			let next = window.shifted(symbol, order);
			if let Err(e) = self.graph.add_transition(&window, &next) {
				self.learn_state = window;
				return Err(e);
			}
			window = next;
			count += 1;
		}

		debug!("Learned {} symbols (order {})", count, order);
		self.learn_state = window;
		Ok(())
	}

	/// Jumps to a state drawn uniformly from the graph.
	///
	/// # Errors
	/// `EmptyGraph` if nothing was learned.
	pub fn set_random_state(&mut self) -> Result<()> {
		self.state = Some(self.graph.random_state(&mut self.rng)?);
		Ok(())
	}

	/// Jumps to a state picked by `chooser` among all states.
	pub fn set_random_state_with(&mut self, chooser: &mut StateChooser<'_, S>) -> Result<()> {
		self.state = Some(self.graph.random_state_with(chooser)?);
		Ok(())
	}

	pub fn set_state(&mut self, state: State<S>) {
		self.state = Some(state);
	}

	/// Takes one step of the walk.
	///
	/// Returns the last symbol of the new state, or `None` when the current
	/// state has no outgoing transition. Once `None` is returned the walk
	/// stays finished until a new state is set.
	pub fn next_symbol(&mut self) -> Result<Option<S>> {
		let Some(state) = self.state.as_ref() else {
			return Ok(None);
		};
		self.time += 1;

		let candidates = self.graph.weighted_transitions(state)?;
		if candidates.is_empty() {
			self.state = None;
			return Ok(None);
		}

		let next = WeightedChoice::new(candidates)?.into_choice(&mut self.rng);
		let symbol = next.last().cloned();
		self.state = Some(next);
		Ok(symbol)
	}

	/// Lazily emits symbols by walking the graph.
	///
	/// The sequence is unbounded when the graph has cycles; take as many
	/// items as needed. It ends when a state without outgoing transitions is
	/// reached.
	pub fn emit(&mut self) -> Emit<'_, S> {
		Emit { chain: self }
	}

	/// Merges `other`'s graph into this chain's graph.
	///
	/// Only the graphs are combined: current state, learning window and
	/// clock of both chains are left as they are.
	///
	/// # Errors
	/// - `OrderMismatch` if the orders differ; neither graph is modified.
	/// - `UnsupportedOperation` if this chain's backend cannot merge.
	pub fn merge(&mut self, other: &mut MarkovChain<S>) -> Result<()> {
		if self.order() != other.order() {
			return Err(MarkovError::OrderMismatch {
				expected: self.order(),
				found: other.order(),
			});
		}
		self.graph.merge(other.graph.as_mut())
	}

	/// Persists the graph (see [`MarkovGraph::flush`]).
	pub fn flush(&mut self, identifier: Option<&str>) -> Result<()> {
		self.graph.flush(identifier)
	}
}

impl<S: TextSymbol> MarkovChain<S> {
	/// Opens the graph behind `identifier` and wraps it in a chain.
	///
	/// See [`open_graph`] for the identifier forms.
	pub fn open(identifier: &str, order: Option<usize>) -> Result<Self> {
		Ok(Self::new(open_graph(identifier, order)?))
	}
}

/// Iterator returned by [`MarkovChain::emit`].
///
/// Yields `Ok(symbol)` per step, `Err` on backend failure, and ends (`None`)
/// when the walk reaches a terminal state.
pub struct Emit<'a, S: Symbol> {
	chain: &'a mut MarkovChain<S>,
}

impl<S: Symbol> Iterator for Emit<'_, S> {
	type Item = Result<S>;

	fn next(&mut self) -> Option<Self::Item> {
		self.chain.next_symbol().transpose()
	}
}
