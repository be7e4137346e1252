use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use rand::RngCore;
use rand::prelude::IteratorRandom;
use serde::{Deserialize, Serialize};

use crate::error::{MarkovError, Result};
use crate::io;
use crate::model::graph::{BackendKind, MarkovGraph, StateChooser, Transition, WeightedTransition};
use crate::model::state::State;
use crate::model::symbol::Symbol;

const SNAPSHOT_MAGIC: [u8; 4] = *b"MKVG";
const SNAPSHOT_VERSION: u32 = 1;

/// Leading part of a snapshot, decoded before the body so a wrong file is
/// rejected without interpreting its content.
#[derive(Serialize, Deserialize, Debug)]
struct SnapshotHeader {
	magic: [u8; 4],
	version: u32,
	kind: String,
	order: usize,
}

#[derive(Serialize)]
struct SnapshotBodyRef<'a, S> {
	vertices: Vec<&'a State<S>>,
	edges: Vec<(&'a State<S>, &'a State<S>, u64)>,
}

#[derive(Deserialize)]
struct SnapshotBody<S> {
	vertices: Vec<State<S>>,
	edges: Vec<(State<S>, State<S>, u64)>,
}

/// In-memory Markov graph.
///
/// Vertices are kept in a set, edges in a nested map `src -> {dst -> weight}`.
/// Both are ordered by state, so iteration (and with it every seeded draw)
/// does not depend on the process.
///
/// # Responsibilities
/// - Count transitions in O(1) amortized
/// - Draw states uniformly (not weighted by degree)
/// - Merge with other graphs of the same order by summing weights
/// - Save and reload a full snapshot with `postcard`
///
/// # Invariants
/// - `order >= 1`
/// - Every edge endpoint is in `vertices`
/// - Every weight is >= 1
#[derive(Clone, Debug)]
pub struct NativeGraph<S: Symbol> {
	order: usize,
	vertices: BTreeSet<State<S>>,
	edges: BTreeMap<State<S>, BTreeMap<State<S>, u64>>,
	identifier: Option<String>,
}

impl<S: Symbol> NativeGraph<S> {
	/// Creates an empty graph of order `order`.
	///
	/// # Errors
	/// Returns an error if `order < 1`.
	pub fn new(order: usize) -> Result<Self> {
		if order < 1 {
			return Err(MarkovError::InvalidOrder(order));
		}
		Ok(Self {
			order,
			vertices: BTreeSet::new(),
			edges: BTreeMap::new(),
			identifier: None,
		})
	}

	/// Loads a snapshot written by [`flush`](MarkovGraph::flush).
	///
	/// `identifier` is a path or a `file://` URL. When `order` is given it must
	/// match the order stored in the snapshot.
	///
	/// # Errors
	/// - `MalformedIdentifier` if `identifier` is not a native location.
	/// - `SerializationTypeMismatch` if the file is not a snapshot of this
	///   symbol type, or stores a different order.
	/// - I/O and decoding errors.
	pub fn open(identifier: &str, order: Option<usize>) -> Result<Self> {
		let path = native_path(identifier)?;
		let bytes = std::fs::read(&path)?;

		let (header, rest): (SnapshotHeader, _) = postcard::take_from_bytes(&bytes)
			.map_err(|e| MarkovError::SerializationTypeMismatch(format!("unreadable header: {}", e)))?;
		if header.magic != SNAPSHOT_MAGIC || header.version != SNAPSHOT_VERSION {
			return Err(MarkovError::SerializationTypeMismatch(format!(
				"{} is not a version {} graph snapshot",
				path, SNAPSHOT_VERSION
			)));
		}
		if header.kind != S::KIND {
			return Err(MarkovError::SerializationTypeMismatch(format!(
				"snapshot holds {} symbols, expected {}",
				header.kind,
				S::KIND
			)));
		}
		if let Some(order) = order {
			if order != header.order {
				return Err(MarkovError::SerializationTypeMismatch(format!(
					"snapshot has order {}, expected {}",
					header.order, order
				)));
			}
		}

		let body: SnapshotBody<S> = postcard::from_bytes(rest)?;
		let mut graph = Self::new(header.order)?;
		graph.vertices.extend(body.vertices);
		for (src, dst, weight) in body.edges {
			graph.edges.entry(src).or_default().insert(dst, weight);
		}
		graph.identifier = Some(identifier.to_owned());

		debug!(
			"Loaded graph of order {} from {} ({} states)",
			graph.order,
			path,
			graph.vertices.len()
		);
		Ok(graph)
	}

	/// Remembers `identifier` as the default flush target without writing.
	pub fn bind(&mut self, identifier: &str) {
		self.identifier = Some(identifier.to_owned());
	}

	pub fn len(&self) -> usize {
		self.vertices.len()
	}

	pub fn is_empty(&self) -> bool {
		self.vertices.is_empty()
	}

	pub fn edge_count(&self) -> usize {
		self.edges.values().map(BTreeMap::len).sum()
	}

	pub fn contains(&self, state: &State<S>) -> bool {
		self.vertices.contains(state)
	}

	/// Weight of `src -> dst`, 0 if the edge does not exist.
	pub fn weight(&self, src: &State<S>, dst: &State<S>) -> u64 {
		self.edges
			.get(src)
			.and_then(|targets| targets.get(dst))
			.copied()
			.unwrap_or(0)
	}

	fn add_vertex(&mut self, state: &State<S>) {
		if !self.vertices.contains(state) {
			self.vertices.insert(state.clone());
		}
	}

	fn add_weight(&mut self, src: &State<S>, dst: &State<S>, weight: u64) {
		self.add_vertex(src);
		self.add_vertex(dst);
		*self.edges
			.entry(src.clone())
			.or_default()
			.entry(dst.clone())
			.or_insert(0) += weight;
	}

	fn encode(&self) -> Result<Vec<u8>> {
		let header = SnapshotHeader {
			magic: SNAPSHOT_MAGIC,
			version: SNAPSHOT_VERSION,
			kind: S::KIND.to_owned(),
			order: self.order,
		};
		let body = SnapshotBodyRef {
			vertices: self.vertices.iter().collect(),
			edges: self
				.edges
				.iter()
				.flat_map(|(src, targets)| targets.iter().map(move |(dst, weight)| (src, dst, *weight)))
				.collect(),
		};

		let mut bytes = postcard::to_stdvec(&header)?;
		bytes.extend(postcard::to_stdvec(&body)?);
		Ok(bytes)
	}
}

/// Extracts the file path of a native identifier.
fn native_path(identifier: &str) -> Result<String> {
	match BackendKind::parse(identifier)? {
		BackendKind::Native(path) => Ok(path),
		BackendKind::Relational(_) => Err(MarkovError::MalformedIdentifier(identifier.to_owned())),
	}
}

impl<S: Symbol> MarkovGraph<S> for NativeGraph<S> {
	fn order(&self) -> usize {
		self.order
	}

	fn add_transition(&mut self, src: &State<S>, dst: &State<S>) -> Result<()> {
		for state in [src, dst] {
			if state.len() > self.order {
				return Err(MarkovError::OrderMismatch {
					expected: self.order,
					found: state.len(),
				});
			}
		}
		self.add_weight(src, dst, 1);
		Ok(())
	}

	fn weighted_transitions(&mut self, src: &State<S>) -> Result<Vec<WeightedTransition<S>>> {
		Ok(self
			.edges
			.get(src)
			.map(|targets| targets.iter().map(|(dst, weight)| (dst.clone(), *weight)).collect())
			.unwrap_or_default())
	}

	fn random_state(&mut self, rng: &mut dyn RngCore) -> Result<State<S>> {
		self.vertices.iter().choose(rng).cloned().ok_or(MarkovError::EmptyGraph)
	}

	fn random_state_with(&mut self, chooser: &mut StateChooser<'_, S>) -> Result<State<S>> {
		if self.vertices.is_empty() {
			return Err(MarkovError::EmptyGraph);
		}
		let mut states: Vec<State<S>> = self.vertices.iter().cloned().collect();
		let len = states.len();
		match chooser(&states) {
			Some(index) if index < len => Ok(states.swap_remove(index)),
			index => Err(MarkovError::InvalidChoice { index, len }),
		}
	}

	fn vertices(&mut self) -> Result<Vec<State<S>>> {
		Ok(self.vertices.iter().cloned().collect())
	}

	fn transitions(&mut self) -> Result<Vec<Transition<S>>> {
		Ok(self
			.edges
			.iter()
			.flat_map(|(src, targets)| {
				targets.iter().map(move |(dst, weight)| (src.clone(), dst.clone(), *weight))
			})
			.collect())
	}

	fn vertex_count(&mut self) -> Result<usize> {
		Ok(self.vertices.len())
	}

	/// Vertex sets are unioned and matching edge weights summed.
	///
	/// `other` is read in full before `self` is touched.
	fn merge(&mut self, other: &mut dyn MarkovGraph<S>) -> Result<()> {
		if self.order != other.order() {
			return Err(MarkovError::OrderMismatch {
				expected: self.order,
				found: other.order(),
			});
		}

		let vertices = other.vertices()?;
		let transitions = other.transitions()?;
		debug!(
			"Merging {} states and {} transitions into graph of order {}",
			vertices.len(),
			transitions.len(),
			self.order
		);

		for state in &vertices {
			self.add_vertex(state);
		}
		for (src, dst, weight) in &transitions {
			self.add_weight(src, dst, *weight);
		}
		Ok(())
	}

	fn flush(&mut self, identifier: Option<&str>) -> Result<()> {
		let identifier = match identifier.or(self.identifier.as_deref()) {
			Some(identifier) => identifier.to_owned(),
			None => return Err(MarkovError::MissingIdentifier),
		};
		let path = native_path(&identifier)?;

		let bytes = self.encode()?;
		io::write_atomic(&path, &bytes)?;
		debug!("Flushed graph of order {} to {} ({} bytes)", self.order, path, bytes.len());

		self.identifier = Some(identifier);
		Ok(())
	}

	fn identifier(&self) -> Option<&str> {
		self.identifier.as_deref()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn state(s: &str) -> State<char> {
		s.chars().collect()
	}

	#[test]
	fn rejects_order_zero() {
		assert!(matches!(NativeGraph::<char>::new(0), Err(MarkovError::InvalidOrder(0))));
	}

	#[test]
	fn add_transition_accumulates() {
		let mut graph = NativeGraph::new(2).unwrap();
		graph.add_transition(&state("ab"), &state("bc")).unwrap();
		graph.add_transition(&state("ab"), &state("bc")).unwrap();
		graph.add_transition(&state("ab"), &state("bd")).unwrap();

		assert_eq!(graph.weight(&state("ab"), &state("bc")), 2);
		assert_eq!(graph.weight(&state("ab"), &state("bd")), 1);
		assert_eq!(graph.len(), 3);
		assert_eq!(graph.edge_count(), 2);

		let mut outgoing = graph.weighted_transitions(&state("ab")).unwrap();
		outgoing.sort();
		assert_eq!(outgoing, vec![(state("bc"), 2), (state("bd"), 1)]);
	}

	#[test]
	fn rejects_states_longer_than_order() {
		let mut graph = NativeGraph::new(1).unwrap();
		assert!(matches!(
			graph.add_transition(&state("a"), &state("ab")),
			Err(MarkovError::OrderMismatch { expected: 1, found: 2 })
		));
		assert!(graph.is_empty());
	}

	#[test]
	fn unknown_and_terminal_states_have_no_transitions() {
		let mut graph = NativeGraph::new(1).unwrap();
		graph.add_transition(&state("a"), &state("b")).unwrap();
		assert!(graph.weighted_transitions(&state("b")).unwrap().is_empty());
		assert!(graph.weighted_transitions(&state("z")).unwrap().is_empty());
	}

	#[test]
	fn random_state_on_empty_graph_fails() {
		let mut graph = NativeGraph::<char>::new(1).unwrap();
		let mut rng = StdRng::seed_from_u64(0);
		assert!(matches!(graph.random_state(&mut rng), Err(MarkovError::EmptyGraph)));
		assert!(matches!(graph.random_state_with(&mut |_| Some(0)), Err(MarkovError::EmptyGraph)));
	}

	#[test]
	fn random_state_with_single_vertex() {
		let mut graph = NativeGraph::new(1).unwrap();
		graph.add_transition(&state("a"), &state("a")).unwrap();
		let mut rng = StdRng::seed_from_u64(9);
		for _ in 0..20 {
			assert_eq!(graph.random_state(&mut rng).unwrap(), state("a"));
		}
	}

	#[test]
	fn random_state_with_chooser() {
		let mut graph = NativeGraph::new(1).unwrap();
		graph.add_transition(&state("a"), &state("b")).unwrap();

		let picked = graph
			.random_state_with(&mut |states: &[State<char>]| states.iter().position(|s| *s == state("b")))
			.unwrap();
		assert_eq!(picked, state("b"));

		assert!(matches!(
			graph.random_state_with(&mut |_| Some(5)),
			Err(MarkovError::InvalidChoice { index: Some(5), len: 2 })
		));
		assert!(matches!(
			graph.random_state_with(&mut |_| None),
			Err(MarkovError::InvalidChoice { index: None, len: 2 })
		));
	}

	#[test]
	fn merge_order_mismatch_leaves_graph_untouched() {
		let mut two = NativeGraph::new(2).unwrap();
		two.add_transition(&state("ab"), &state("bc")).unwrap();
		let mut three = NativeGraph::new(3).unwrap();
		three.add_transition(&state("abc"), &state("bcd")).unwrap();

		let result = two.merge(&mut three);
		assert!(matches!(result, Err(MarkovError::OrderMismatch { expected: 2, found: 3 })));
		assert_eq!(two.len(), 2);
		assert_eq!(two.edge_count(), 1);
		assert_eq!(three.len(), 2);
	}

	#[test]
	fn flush_without_identifier_fails() {
		let mut graph = NativeGraph::<char>::new(1).unwrap();
		assert!(matches!(graph.flush(None), Err(MarkovError::MissingIdentifier)));
	}

	#[test]
	fn flush_to_relational_identifier_fails() {
		let mut graph = NativeGraph::<char>::new(1).unwrap();
		assert!(matches!(
			graph.flush(Some("sqlite::memory:")),
			Err(MarkovError::MalformedIdentifier(_))
		));
	}

	#[test]
	fn open_rejects_other_symbol_kind_and_order() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("words.chain");
		let path = path.to_str().unwrap();

		let mut graph = NativeGraph::<String>::new(2).unwrap();
		graph
			.add_transition(&State::empty(), &State::from(vec!["hello".to_owned()]))
			.unwrap();
		graph.flush(Some(path)).unwrap();

		assert!(matches!(
			NativeGraph::<char>::open(path, None),
			Err(MarkovError::SerializationTypeMismatch(_))
		));
		assert!(matches!(
			NativeGraph::<String>::open(path, Some(3)),
			Err(MarkovError::SerializationTypeMismatch(_))
		));
		assert_eq!(NativeGraph::<String>::open(path, Some(2)).unwrap().len(), 2);
	}

	#[test]
	fn open_rejects_garbage() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("garbage.chain");
		std::fs::write(&path, b"definitely not a snapshot").unwrap();
		assert!(matches!(
			NativeGraph::<char>::open(path.to_str().unwrap(), None),
			Err(MarkovError::SerializationTypeMismatch(_))
		));
	}
}
