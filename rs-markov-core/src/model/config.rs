use crate::error::{MarkovError, Result};

/// Default number of distinct pending transitions before a relational graph
/// writes them out.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Default maximum length of a stored symbol, in characters.
pub const DEFAULT_MAX_SYMBOL_LEN: usize = 63;

/// Tuning parameters of a relational graph.
///
/// # Invariants
/// - `buffer_capacity >= 1`
/// - `max_symbol_len >= 1`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationalConfig {
	/// Distinct `(src, dst)` pairs held in memory before a batched write.
	buffer_capacity: usize,

	/// Width of a symbol column. Longer symbols are rejected.
	max_symbol_len: usize,
}

impl Default for RelationalConfig {
	fn default() -> Self {
		Self {
			buffer_capacity: DEFAULT_BUFFER_CAPACITY,
			max_symbol_len: DEFAULT_MAX_SYMBOL_LEN,
		}
	}
}

impl RelationalConfig {
	pub fn buffer_capacity(&self) -> usize {
		self.buffer_capacity
	}

	pub fn max_symbol_len(&self) -> usize {
		self.max_symbol_len
	}

	/// Sets the write buffer size.
	///
	/// A capacity of 1 writes every transition immediately.
	///
	/// # Errors
	/// Returns an error if `capacity` is 0.
	pub fn set_buffer_capacity(&mut self, capacity: usize) -> Result<()> {
		if capacity == 0 {
			return Err(MarkovError::InvalidConfig("buffer capacity must be >= 1".to_owned()));
		}
		self.buffer_capacity = capacity;
		Ok(())
	}

	/// Sets the maximum symbol length.
	///
	/// # Errors
	/// Returns an error if `len` is 0.
	pub fn set_max_symbol_len(&mut self, len: usize) -> Result<()> {
		if len == 0 {
			return Err(MarkovError::InvalidConfig("max symbol length must be >= 1".to_owned()));
		}
		self.max_symbol_len = len;
		Ok(())
	}

	/// Builder form of [`set_buffer_capacity`](Self::set_buffer_capacity).
	pub fn with_buffer_capacity(mut self, capacity: usize) -> Result<Self> {
		self.set_buffer_capacity(capacity)?;
		Ok(self)
	}
}
