//! Turns raw text into symbol streams for [`MarkovChain::learn`](crate::model::chain::MarkovChain::learn).

use std::io;
use std::path::Path;

/// Unit a text is split into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unit {
	Chars,
	/// Whitespace-separated words.
	Words,
}

/// Normalization applied to the text before it is split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Folding {
	#[default]
	Keep,
	Lowercase,
	/// Runs of whitespace become a single space.
	Whitespace,
	LowercaseWhitespace,
}

impl Folding {
	fn lowercase(self) -> bool {
		matches!(self, Folding::Lowercase | Folding::LowercaseWhitespace)
	}

	fn whitespace(self) -> bool {
		matches!(self, Folding::Whitespace | Folding::LowercaseWhitespace)
	}

	/// Applies the folding to `text`.
	pub fn apply(self, text: &str) -> String {
		let text = if self.lowercase() { text.to_lowercase() } else { text.to_owned() };
		if !self.whitespace() {
			return text;
		}

		let mut folded = String::with_capacity(text.len());
		let mut in_space = false;
		for c in text.chars() {
			if c.is_whitespace() {
				if !in_space {
					folded.push(' ');
				}
				in_space = true;
			} else {
				folded.push(c);
				in_space = false;
			}
		}
		folded
	}
}

/// Symbol source over a text, with its splitting and folding fixed at
/// construction.
///
/// # Example
/// ```
/// use rs_markov_core::source::{Folding, TextSource};
///
/// let source = TextSource::new(Folding::LowercaseWhitespace);
/// let symbols: String = source.chars("Ab\n\n c").collect();
/// assert_eq!(symbols, "ab c");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TextSource {
	folding: Folding,
}

impl TextSource {
	pub fn new(folding: Folding) -> Self {
		Self { folding }
	}

	pub fn folding(&self) -> Folding {
		self.folding
	}

	/// Characters of `text` after folding.
	pub fn chars(&self, text: &str) -> std::vec::IntoIter<char> {
		self.folding.apply(text).chars().collect::<Vec<_>>().into_iter()
	}

	/// Words of `text` after folding.
	pub fn words(&self, text: &str) -> std::vec::IntoIter<String> {
		self.folding
			.apply(text)
			.split_whitespace()
			.map(str::to_owned)
			.collect::<Vec<_>>()
			.into_iter()
	}

	/// Reads `path` and splits it into `unit`s.
	pub fn read<P: AsRef<Path>>(&self, path: P, unit: Unit) -> io::Result<Symbols> {
		let text = crate::io::read_file(path)?;
		Ok(match unit {
			Unit::Chars => Symbols::Chars(self.chars(&text).collect()),
			Unit::Words => Symbols::Words(self.words(&text).collect()),
		})
	}
}

/// Symbols read from a file, by unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Symbols {
	Chars(Vec<char>),
	Words(Vec<String>),
}

impl Symbols {
	pub fn len(&self) -> usize {
		match self {
			Symbols::Chars(chars) => chars.len(),
			Symbols::Words(words) => words.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
