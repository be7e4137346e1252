use std::fmt::Debug;
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{MarkovError, Result};

/// An opaque unit of a training stream (character, word, token id...).
///
/// The engine only compares, orders and hashes symbols. The order makes
/// in-memory iteration stable, which seeded sampling relies on. `KIND` names the symbol type
/// inside native snapshots so a graph of words is never reloaded as a graph
/// of characters.
pub trait Symbol: Clone + Eq + Ord + Hash + Debug + Serialize + DeserializeOwned + 'static {
	const KIND: &'static str;
}

/// A symbol that can be stored in a text column.
pub trait TextSymbol: Symbol {
	fn to_text(&self) -> String;

	/// # Errors
	/// Returns `SchemaMismatch` if `text` does not encode a symbol of this type.
	fn from_text(text: &str) -> Result<Self>;
}

impl Symbol for char {
	const KIND: &'static str = "char";
}

impl Symbol for String {
	const KIND: &'static str = "string";
}

impl Symbol for u8 {
	const KIND: &'static str = "u8";
}

impl Symbol for u32 {
	const KIND: &'static str = "u32";
}

impl Symbol for u64 {
	const KIND: &'static str = "u64";
}

impl TextSymbol for char {
	fn to_text(&self) -> String {
		self.to_string()
	}

	fn from_text(text: &str) -> Result<Self> {
		let mut chars = text.chars();
		match (chars.next(), chars.next()) {
			(Some(c), None) => Ok(c),
			_ => Err(MarkovError::SchemaMismatch(format!(
				"expected a single character, got {:?}",
				text
			))),
		}
	}
}

impl TextSymbol for String {
	fn to_text(&self) -> String {
		self.clone()
	}

	fn from_text(text: &str) -> Result<Self> {
		Ok(text.to_owned())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn char_text_round_trip() {
		assert_eq!(char::from_text(&'ß'.to_text()).unwrap(), 'ß');
	}

	#[test]
	fn char_rejects_multi_character_text() {
		assert!(matches!(char::from_text("ab"), Err(MarkovError::SchemaMismatch(_))));
		assert!(matches!(char::from_text(""), Err(MarkovError::SchemaMismatch(_))));
	}
}
