use std::path::Path;

use log::debug;
use rand::RngCore;

use crate::error::{MarkovError, Result};
use crate::model::config::RelationalConfig;
use crate::model::native_graph::NativeGraph;
use crate::model::relational_graph::RelationalGraph;
use crate::model::state::State;
use crate::model::symbol::{Symbol, TextSymbol};

/// An outgoing edge: destination state and its observed count.
pub type WeightedTransition<S> = (State<S>, u64);

/// A full edge: `(src, dst, weight)`.
pub type Transition<S> = (State<S>, State<S>, u64);

/// Caller-supplied distribution over the vertex set.
///
/// Receives every state of the graph and returns the index of the chosen one.
pub type StateChooser<'a, S> = dyn FnMut(&[State<S>]) -> Option<usize> + 'a;

/// Storage contract every Markov graph backend satisfies.
///
/// A graph holds the distinct states (vertices) of one fixed `order` and the
/// weighted transitions (edges) between them.
///
/// Read methods take `&mut self` because buffered backends settle their
/// pending writes before answering.
///
/// A backend instance is meant to be driven by a single chain at a time; no
/// locking is provided.
pub trait MarkovGraph<S: Symbol> {
	/// Window length fixed at construction or load time.
	fn order(&self) -> usize;

	/// Records one `src -> dst` observation.
	///
	/// Inserts the edge with weight 1, or increments its weight. On error the
	/// observation is not recorded.
	fn add_transition(&mut self, src: &State<S>, dst: &State<S>) -> Result<()>;

	/// All outgoing edges of `src`; empty if `src` is unknown or terminal.
	fn weighted_transitions(&mut self, src: &State<S>) -> Result<Vec<WeightedTransition<S>>>;

	/// A vertex drawn uniformly from the whole vertex set.
	///
	/// # Errors
	/// `EmptyGraph` if the graph has no vertices.
	fn random_state(&mut self, rng: &mut dyn RngCore) -> Result<State<S>>;

	/// A vertex picked by `chooser` among all vertices.
	///
	/// # Errors
	/// - `EmptyGraph` if the graph has no vertices.
	/// - `InvalidChoice` if the chooser returns `None` or an out-of-range index.
	fn random_state_with(&mut self, chooser: &mut StateChooser<'_, S>) -> Result<State<S>>;

	/// Every vertex, in no particular order.
	fn vertices(&mut self) -> Result<Vec<State<S>>>;

	/// Every edge with its weight, in no particular order.
	fn transitions(&mut self) -> Result<Vec<Transition<S>>>;

	fn vertex_count(&mut self) -> Result<usize>;

	/// Adds `other`'s vertices and edges into `self`, summing weights of
	/// matching edges.
	///
	/// # Errors
	/// - `OrderMismatch` if orders differ; `self` is left untouched.
	/// - `UnsupportedOperation` for backends that cannot merge.
	fn merge(&mut self, other: &mut dyn MarkovGraph<S>) -> Result<()>;

	/// Persists the graph to `identifier`, or to the identifier it was
	/// opened from when `None`.
	fn flush(&mut self, identifier: Option<&str>) -> Result<()>;

	/// Identifier this graph was opened from or last flushed to.
	fn identifier(&self) -> Option<&str>;
}

/// Backend selected from an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
	/// Local snapshot file.
	Native(String),
	/// SQLite connection; `None` for an in-memory database.
	Relational(Option<String>),
}

const FILE_SCHEME: &str = "file://";
const SQLITE_SCHEME: &str = "sqlite://";
const SQLITE_MEMORY: [&str; 2] = ["sqlite::memory:", "sqlite://:memory:"];

impl BackendKind {
	/// Resolves an identifier to a backend.
	///
	/// - `sqlite::memory:` / `sqlite://:memory:` -> in-memory relational
	/// - `sqlite://<path>` -> relational
	/// - `file://<path>` or a bare path -> native
	///
	/// # Errors
	/// `MalformedIdentifier` for an empty identifier, an empty path or an unknown scheme.
	pub fn parse(identifier: &str) -> Result<Self> {
		let malformed = || MarkovError::MalformedIdentifier(identifier.to_owned());

		if SQLITE_MEMORY.contains(&identifier) {
			return Ok(BackendKind::Relational(None));
		}
		if let Some(path) = identifier.strip_prefix(SQLITE_SCHEME) {
			if path.is_empty() {
				return Err(malformed());
			}
			return Ok(BackendKind::Relational(Some(path.to_owned())));
		}
		if let Some(path) = identifier.strip_prefix(FILE_SCHEME) {
			if path.is_empty() {
				return Err(malformed());
			}
			return Ok(BackendKind::Native(path.to_owned()));
		}
		if identifier.is_empty() || identifier.contains("://") {
			return Err(malformed());
		}
		Ok(BackendKind::Native(identifier.to_owned()))
	}
}

/// Opens the graph behind `identifier`.
///
/// # Behavior
/// - Relational identifiers connect to the store; `order` is checked against
///   (or inferred from) the existing schema.
/// - Native identifiers load the snapshot if the file exists, otherwise an
///   empty graph of `order` is created and bound to the path.
///
/// # Errors
/// - `MalformedIdentifier` if the identifier matches no backend.
/// - `MissingOrder` if nothing exists yet and no order was given.
/// - Any error from the selected backend's `open`.
pub fn open_graph<S: TextSymbol>(identifier: &str, order: Option<usize>) -> Result<Box<dyn MarkovGraph<S>>> {
	match BackendKind::parse(identifier)? {
		BackendKind::Relational(_) => {
			debug!("Opening relational graph {}", identifier);
			let graph = RelationalGraph::open(identifier, order, RelationalConfig::default())?;
			Ok(Box::new(graph))
		}
		BackendKind::Native(path) => {
			if Path::new(&path).exists() {
				debug!("Loading native graph from {}", path);
				return Ok(Box::new(NativeGraph::open(&path, order)?));
			}
			let order = order.ok_or_else(|| MarkovError::MissingOrder(path.clone()))?;
			debug!("No snapshot at {}, creating an empty graph of order {}", path, order);
			let mut graph = NativeGraph::new(order)?;
			graph.bind(&path);
			Ok(Box::new(graph))
		}
	}
}
