use thiserror::Error;

/// Errors raised by graphs, chains and their persistence.
///
/// Running out of transitions while emitting is not an error: the emit
/// iterator simply ends.
#[derive(Debug, Error)]
pub enum MarkovError {
	#[error("Order mismatch: expected {expected}, found {found}")]
	OrderMismatch { expected: usize, found: usize },

	#[error("Graph has no states")]
	EmptyGraph,

	#[error("Schema mismatch: {0}")]
	SchemaMismatch(String),

	#[error("Operation not supported: {0}")]
	UnsupportedOperation(&'static str),

	#[error("Malformed identifier: {0:?}")]
	MalformedIdentifier(String),

	#[error("Snapshot type mismatch: {0}")]
	SerializationTypeMismatch(String),

	#[error("Order must be >= 1, got {0}")]
	InvalidOrder(usize),

	#[error("Cannot choose from an empty candidate list")]
	EmptyChoice,

	#[error("Weight at index {0} must be > 0")]
	InvalidWeight(usize),

	#[error("Chooser returned an invalid index {index:?} for {len} states")]
	InvalidChoice { index: Option<usize>, len: usize },

	#[error("No identifier given and none remembered from open")]
	MissingIdentifier,

	#[error("No order given and none stored at {0:?}")]
	MissingOrder(String),

	#[error("Symbol {symbol:?} exceeds {max} characters")]
	SymbolTooLong { symbol: String, max: usize },

	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	Postcard(#[from] postcard::Error),

	#[error("SQLite error: {0}")]
	Sqlite(#[from] rusqlite::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MarkovError>;
