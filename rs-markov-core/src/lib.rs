//! Markov-chain text generation library.
//!
//! This crate provides an order-N Markov-chain engine including:
//! - Learning from any stream of symbols (characters, words, tokens)
//! - Weighted random generation
//! - Interchangeable graph backends: in memory or SQLite
//! - Merging and persistence of learned graphs
//!
//! # Example
//! ```
//! use rs_markov_core::model::chain::MarkovChain;
//!
//! let mut chain = MarkovChain::native(2)?;
//! chain.learn("choochoooshoe".chars())?;
//! chain.set_random_state()?;
//! let text = chain.emit().take(20).collect::<Result<String, _>>()?;
//! assert!(text.chars().count() <= 20);
//! # Ok::<(), rs_markov_core::MarkovError>(())
//! ```

/// Markov-chain engine: states, graphs and chains.
pub mod model;

/// Text symbol sources.
pub mod source;

/// File helpers (reading, snapshot paths).
pub mod io;

/// Error type shared by the whole crate.
pub mod error;

pub use error::{MarkovError, Result};
