//! Properties of learning and merging, checked against independent
//! computations and across backends.

use std::collections::HashMap;

use rs_markov_core::model::chain::MarkovChain;
use rs_markov_core::model::config::RelationalConfig;
use rs_markov_core::model::graph::{MarkovGraph, Transition};
use rs_markov_core::model::native_graph::NativeGraph;
use rs_markov_core::model::relational_graph::RelationalGraph;
use rs_markov_core::model::state::State;

const STREAMS: [&str; 4] = ["aab", "choochoooshoe", "abracadabra", "mississippi river"];

/// Windows produced by the sliding-window rule, counted directly.
fn expected_edges(stream: &[char], order: usize) -> HashMap<(State<char>, State<char>), u64> {
	let mut edges = HashMap::new();
	for i in 0..stream.len() {
		let old: State<char> = stream[i.saturating_sub(order)..i].iter().copied().collect();
		let new: State<char> = stream[(i + 1).saturating_sub(order)..=i].iter().copied().collect();
		*edges.entry((old, new)).or_insert(0) += 1;
	}
	edges
}

fn sorted_transitions(graph: &mut dyn MarkovGraph<char>) -> Vec<Transition<char>> {
	let mut transitions = graph.transitions().unwrap();
	transitions.sort();
	transitions
}

fn sorted_vertices(graph: &mut dyn MarkovGraph<char>) -> Vec<State<char>> {
	let mut vertices = graph.vertices().unwrap();
	vertices.sort();
	vertices
}

fn learned(stream: &str, order: usize) -> NativeGraph<char> {
	let mut graph = NativeGraph::new(order).unwrap();
	let mut window = State::empty();
	for c in stream.chars() {
		let next = window.shifted(c, order);
		graph.add_transition(&window, &next).unwrap();
		window = next;
	}
	graph
}

#[test]
fn learned_graph_matches_sliding_windows() {
	for stream in STREAMS {
		let symbols: Vec<char> = stream.chars().collect();
		for order in 1..=symbols.len().min(5) {
			let mut chain = MarkovChain::native(order).unwrap();
			chain.learn(symbols.iter().copied()).unwrap();

			let expected = expected_edges(&symbols, order);
			let mut expected_transitions: Vec<Transition<char>> = expected
				.iter()
				.map(|((src, dst), weight)| (src.clone(), dst.clone(), *weight))
				.collect();
			expected_transitions.sort();
			assert_eq!(sorted_transitions(chain.graph_mut()), expected_transitions, "{:?} order {}", stream, order);

			let mut expected_vertices: Vec<State<char>> = expected
				.keys()
				.flat_map(|(src, dst)| [src.clone(), dst.clone()])
				.collect();
			expected_vertices.sort();
			expected_vertices.dedup();
			assert_eq!(sorted_vertices(chain.graph_mut()), expected_vertices);
			assert!(expected_vertices.iter().all(|v| v.len() <= order));
		}
	}
}

#[test]
fn merge_is_commutative() {
	let a = learned("abracadabra", 2);
	let b = learned("cadabra abra", 2);

	let mut a_then_b = a.clone();
	a_then_b.merge(&mut b.clone()).unwrap();
	let mut b_then_a = b.clone();
	b_then_a.merge(&mut a.clone()).unwrap();

	assert_eq!(sorted_vertices(&mut a_then_b), sorted_vertices(&mut b_then_a));
	assert_eq!(sorted_transitions(&mut a_then_b), sorted_transitions(&mut b_then_a));
}

#[test]
fn merge_is_associative() {
	let a = learned("choochoo", 1);
	let b = learned("shoe", 1);
	let c = learned("ooh", 1);

	let mut left = a.clone();
	left.merge(&mut b.clone()).unwrap();
	left.merge(&mut c.clone()).unwrap();

	let mut bc = b.clone();
	bc.merge(&mut c.clone()).unwrap();
	let mut right = a.clone();
	right.merge(&mut bc).unwrap();

	assert_eq!(sorted_transitions(&mut left), sorted_transitions(&mut right));
}

#[test]
fn merge_sums_matching_weights() {
	let mut a = learned("aab", 1);
	let mut b = learned("aab", 1);
	a.merge(&mut b).unwrap();

	let a_state: State<char> = State::from(vec!['a']);
	assert_eq!(a.weight(&State::empty(), &a_state), 2);
	assert_eq!(a.weight(&a_state, &State::from(vec!['b'])), 2);
	assert_eq!(a.len(), 3);
}

#[test]
fn relational_and_native_learn_the_same_graph() {
	let config = RelationalConfig::default().with_buffer_capacity(3).unwrap();
	let relational = RelationalGraph::<char>::open("sqlite::memory:", Some(3), config).unwrap();
	let mut sql_chain = MarkovChain::new(Box::new(relational));
	let mut native_chain = MarkovChain::native(3).unwrap();

	for piece in ["der mensch ", "ist frei ", "geschaffen, ist frei"] {
		sql_chain.learn(piece.chars()).unwrap();
		native_chain.learn(piece.chars()).unwrap();
	}

	assert_eq!(sorted_transitions(sql_chain.graph_mut()), sorted_transitions(native_chain.graph_mut()));
	assert_eq!(sorted_vertices(sql_chain.graph_mut()), sorted_vertices(native_chain.graph_mut()));
}

#[test]
fn native_graph_absorbs_a_relational_graph() {
	let mut relational = RelationalGraph::<char>::open("sqlite::memory:", Some(2), RelationalConfig::default()).unwrap();
	relational.add_transition(&State::empty(), &State::from(vec!['q'])).unwrap();
	relational.add_transition(&State::empty(), &State::from(vec!['q'])).unwrap();

	let mut native = learned("qu", 2);
	native.merge(&mut relational).unwrap();

	assert_eq!(native.weight(&State::empty(), &State::from(vec!['q'])), 3);
}

#[test]
fn relational_emission_follows_stored_weights() {
	let relational = RelationalGraph::<String>::open("sqlite::memory:", Some(1), RelationalConfig::default()).unwrap();
	let mut chain = MarkovChain::with_seed(Box::new(relational), 17);
	let words = "ich bin nicht schiller".split(' ').map(str::to_owned);
	chain.learn(words).unwrap();

	let out: Vec<String> = chain.emit().collect::<Result<_, _>>().unwrap();
	assert_eq!(out, vec!["ich", "bin", "nicht", "schiller"]);
}
