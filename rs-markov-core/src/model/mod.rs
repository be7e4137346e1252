//! Top-level module for the Markov-chain engine.
//!
//! This module provides:
//! - Sliding-window states (`State`)
//! - Weighted sampling (`WeightedChoice`)
//! - The graph backend contract (`MarkovGraph`) and its in-memory
//!   (`NativeGraph`) and SQLite (`RelationalGraph`) implementations
//! - The learning and generation session (`MarkovChain`)

/// Learning, emission and merging over any graph backend.
pub mod chain;

/// Tuning parameters of the relational backend.
pub mod config;

/// Backend contract and identifier-based backend selection.
pub mod graph;

/// In-memory graph with `postcard` snapshots.
pub mod native_graph;

/// SQLite graph with buffered writes and an id cache.
pub mod relational_graph;

/// Sliding window of symbols, a vertex of the graph.
pub mod state;

/// Symbol traits and their implementations for common types.
pub mod symbol;

/// Categorical sampling over weighted candidates.
pub mod weighted_choice;
