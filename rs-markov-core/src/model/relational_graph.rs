use std::collections::{BTreeMap, HashMap, HashSet};

use log::{debug, trace, warn};
use rand::{Rng, RngCore};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use crate::error::{MarkovError, Result};
use crate::model::config::RelationalConfig;
use crate::model::graph::{BackendKind, MarkovGraph, StateChooser, Transition, WeightedTransition};
use crate::model::state::State;
use crate::model::symbol::TextSymbol;

/// Known ids are dropped wholesale past this size.
const NODE_CACHE_CAPACITY: usize = 1 << 16;

/// Outcome of a cache lookup.
#[derive(Debug, PartialEq, Eq)]
enum Cached {
	Id(i64),
	Absent,
	Unknown,
}

/// State -> node id lookups, positive and negative.
///
/// Ids are stable once assigned (nodes are never deleted), so known ids stay
/// valid. Absent entries are cleared whenever a node is inserted, otherwise a
/// state inserted after a miss would keep answering "absent".
#[derive(Debug)]
struct NodeCache<S> {
	ids: HashMap<State<S>, i64>,
	absent: HashSet<State<S>>,
}

impl<S: TextSymbol> NodeCache<S> {
	fn new() -> Self {
		Self {
			ids: HashMap::new(),
			absent: HashSet::new(),
		}
	}

	fn get(&self, state: &State<S>) -> Cached {
		if let Some(id) = self.ids.get(state) {
			Cached::Id(*id)
		} else if self.absent.contains(state) {
			Cached::Absent
		} else {
			Cached::Unknown
		}
	}

	fn remember(&mut self, state: &State<S>, id: i64) {
		if self.ids.len() >= NODE_CACHE_CAPACITY {
			self.ids.clear();
		}
		self.ids.insert(state.clone(), id);
	}

	fn remember_absent(&mut self, state: &State<S>) {
		if self.absent.len() >= NODE_CACHE_CAPACITY {
			self.absent.clear();
		}
		self.absent.insert(state.clone());
	}

	fn inserted(&mut self, state: &State<S>, id: i64) {
		self.absent.clear();
		self.remember(state, id);
	}

	fn clear(&mut self) {
		self.ids.clear();
		self.absent.clear();
	}
}

/// SQL text derived once from the order.
#[derive(Debug)]
struct Statements {
	select_id: String,
	insert_node: String,
	upsert_edge: String,
	select_outgoing: String,
	select_nodes: String,
	select_node_at: String,
	select_edges: String,
}

impl Statements {
	fn new(order: usize) -> Self {
		let columns = |alias: &str| -> String {
			std::iter::once(format!("{}len", alias))
				.chain((0..order).map(|i| format!("{}v{}", alias, i)))
				.collect::<Vec<_>>()
				.join(", ")
		};
		let where_node = (0..order)
			.map(|i| format!(" AND v{} = ?{}", i, i + 2))
			.collect::<String>();
		let placeholders = (1..=order + 1).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");

		Self {
			select_id: format!("SELECT id FROM nodes WHERE len = ?1{}", where_node),
			insert_node: format!("INSERT INTO nodes ({}) VALUES ({})", columns(""), placeholders),
			upsert_edge: "INSERT INTO edges (src, dst, weight) VALUES (?1, ?2, ?3) \
				ON CONFLICT (src, dst) DO UPDATE SET weight = weight + excluded.weight"
				.to_owned(),
			select_outgoing: format!(
				"SELECT {}, e.weight FROM edges e JOIN nodes d ON d.id = e.dst WHERE e.src = ?1 ORDER BY d.id",
				columns("d.")
			),
			select_nodes: format!("SELECT {} FROM nodes ORDER BY id", columns("")),
			select_node_at: format!("SELECT {} FROM nodes ORDER BY id LIMIT 1 OFFSET ?1", columns("")),
			select_edges: format!(
				"SELECT {}, {}, e.weight FROM edges e \
				JOIN nodes s ON s.id = e.src JOIN nodes d ON d.id = e.dst \
				ORDER BY e.src, e.dst",
				columns("s."),
				columns("d.")
			),
		}
	}
}

/// Markov graph stored in SQLite.
///
/// Trades speed for capacity: only pending writes and a bounded id cache
/// live in memory.
///
/// # Schema
/// - `nodes(id, len, v0 .. v{order-1})`, unique over `(len, v0 ..)`. Symbols
///   past `len` are stored as empty strings.
/// - `edges(src, dst, weight)` keyed by `(src, dst)`.
///
/// # Behavior
/// - `add_transition` is buffered: pending transitions coalesce by
///   `(src, dst)` and are written in one transaction once the buffer holds
///   `buffer_capacity` entries, on `flush`, before any read and on drop.
///   When that write fails, the transition being added is not recorded.
/// - Pending transitions are written in state order and reads are ordered
///   by node id, so the same input always yields the same store.
/// - `merge` is not supported.
/// - `open` connects to a store; nothing is loaded up front.
pub struct RelationalGraph<S: TextSymbol> {
	conn: Connection,
	order: usize,
	identifier: String,
	config: RelationalConfig,
	pending: BTreeMap<(State<S>, State<S>), u64>,
	cache: NodeCache<S>,
	statements: Statements,
}

impl<S: TextSymbol> RelationalGraph<S> {
	/// Connects to `identifier` (`sqlite://<path>` or `sqlite::memory:`).
	///
	/// The tables are created if missing. When `order` is `None` it is read
	/// from the existing schema.
	///
	/// # Errors
	/// - `MalformedIdentifier` if `identifier` is not a relational location.
	/// - `SchemaMismatch` if the existing schema implies another order.
	/// - `MissingOrder` if there is neither a schema nor an order.
	pub fn open(identifier: &str, order: Option<usize>, config: RelationalConfig) -> Result<Self> {
		let conn = match BackendKind::parse(identifier)? {
			BackendKind::Relational(None) => Connection::open_in_memory()?,
			BackendKind::Relational(Some(path)) => Connection::open(path)?,
			BackendKind::Native(_) => return Err(MarkovError::MalformedIdentifier(identifier.to_owned())),
		};
		Self::with_connection(conn, identifier, order, config)
	}

	/// Same as [`open`](Self::open) on an already established connection.
	pub fn with_connection(
		conn: Connection,
		identifier: &str,
		order: Option<usize>,
		config: RelationalConfig,
	) -> Result<Self> {
		let stored = order_from_db(&conn)?;
		let order = match (order, stored) {
			(Some(0), _) => return Err(MarkovError::InvalidOrder(0)),
			(Some(requested), Some(stored)) if requested != stored => {
				return Err(MarkovError::SchemaMismatch(format!(
					"store has order {}, requested {}",
					stored, requested
				)));
			}
			(Some(requested), _) => requested,
			(None, Some(stored)) => stored,
			(None, None) => return Err(MarkovError::MissingOrder(identifier.to_owned())),
		};

		conn.execute_batch(&create_tables(order, config.max_symbol_len()))?;
		debug!("Opened relational graph {} (order {})", identifier, order);

		Ok(Self {
			conn,
			order,
			identifier: identifier.to_owned(),
			config,
			pending: BTreeMap::new(),
			cache: NodeCache::new(),
			statements: Statements::new(order),
		})
	}

	pub fn config(&self) -> &RelationalConfig {
		&self.config
	}

	/// Number of distinct transitions waiting to be written.
	pub fn pending_len(&self) -> usize {
		self.pending.len()
	}

	fn check_symbols(&self, state: &State<S>) -> Result<()> {
		if state.len() > self.order {
			return Err(MarkovError::OrderMismatch {
				expected: self.order,
				found: state.len(),
			});
		}
		let max = self.config.max_symbol_len();
		for symbol in state.symbols() {
			let text = symbol.to_text();
			if text.chars().count() > max {
				return Err(MarkovError::SymbolTooLong { symbol: text, max });
			}
		}
		Ok(())
	}

	/// Writes every pending transition in a single transaction.
	///
	/// On failure the pending transitions are kept and the id cache is reset,
	/// as it may hold ids of rows that were rolled back.
	fn flush_pending(&mut self) -> Result<()> {
		if self.pending.is_empty() {
			return Ok(());
		}
		let result = write_pending(
			&mut self.conn,
			&mut self.cache,
			&self.statements,
			self.order,
			&self.pending,
		);
		match result {
			Ok(()) => {
				trace!("Wrote {} pending transitions to {}", self.pending.len(), self.identifier);
				self.pending.clear();
				Ok(())
			}
			Err(e) => {
				self.cache.clear();
				Err(e)
			}
		}
	}

	fn lookup(&mut self, state: &State<S>) -> Result<Option<i64>> {
		match self.cache.get(state) {
			Cached::Id(id) => return Ok(Some(id)),
			Cached::Absent => return Ok(None),
			Cached::Unknown => (),
		}
		let id = select_id(&self.conn, &self.statements, self.order, state)?;
		match id {
			Some(id) => self.cache.remember(state, id),
			None => self.cache.remember_absent(state),
		}
		Ok(id)
	}

	fn read_states(&self) -> Result<Vec<State<S>>> {
		let mut stmt = self.conn.prepare_cached(&self.statements.select_nodes)?;
		let mut rows = stmt.query([])?;
		let mut states = Vec::new();
		while let Some(row) = rows.next()? {
			states.push(read_state(row, 0, self.order)?);
		}
		Ok(states)
	}
}

impl<S: TextSymbol> Drop for RelationalGraph<S> {
	fn drop(&mut self) {
		if let Err(e) = self.flush_pending() {
			warn!("Dropping {} pending transitions for {}: {}", self.pending.len(), self.identifier, e);
		}
	}
}

fn create_tables(order: usize, width: usize) -> String {
	let symbol_columns = (0..order)
		.map(|i| format!("v{} VARCHAR({}) NOT NULL DEFAULT ''", i, width))
		.collect::<Vec<_>>()
		.join(",\n\t");
	let unique = (0..order).map(|i| format!("v{}", i)).collect::<Vec<_>>().join(", ");
	format!(
		"CREATE TABLE IF NOT EXISTS nodes (\n\
		\tid INTEGER PRIMARY KEY,\n\
		\tlen INTEGER NOT NULL,\n\
		\t{},\n\
		\tUNIQUE (len, {})\n\
		);\n\
		CREATE TABLE IF NOT EXISTS edges (\n\
		\tsrc INTEGER NOT NULL REFERENCES nodes (id),\n\
		\tdst INTEGER NOT NULL REFERENCES nodes (id),\n\
		\tweight INTEGER NOT NULL CHECK (weight > 0),\n\
		\tPRIMARY KEY (src, dst)\n\
		) WITHOUT ROWID;",
		symbol_columns, unique
	)
}

/// Order implied by an existing `nodes` table, `None` if there is none.
fn order_from_db(conn: &Connection) -> Result<Option<usize>> {
	let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('nodes')")?;
	let names = stmt
		.query_map([], |row| row.get::<_, String>(0))?
		.collect::<rusqlite::Result<Vec<_>>>()?;
	if names.is_empty() {
		return Ok(None);
	}
	if !names.iter().any(|n| n == "len") {
		return Err(MarkovError::SchemaMismatch("nodes table has no len column".to_owned()));
	}

	let order = names
		.iter()
		.filter(|n| n.len() > 1 && n.starts_with('v') && n[1..].bytes().all(|b| b.is_ascii_digit()))
		.count();
	if order == 0 {
		return Err(MarkovError::SchemaMismatch("nodes table has no symbol columns".to_owned()));
	}
	Ok(Some(order))
}

/// `[len, v0, .., v{order-1}]`, padded with empty strings.
fn node_values<S: TextSymbol>(state: &State<S>, order: usize) -> Vec<Value> {
	let mut values = Vec::with_capacity(order + 1);
	values.push(Value::Integer(state.len() as i64));
	values.extend(state.symbols().iter().map(|s| Value::Text(s.to_text())));
	values.resize(order + 1, Value::Text(String::new()));
	values
}

fn read_state<S: TextSymbol>(row: &Row<'_>, offset: usize, order: usize) -> Result<State<S>> {
	let len: i64 = row.get(offset)?;
	let len = usize::try_from(len)
		.ok()
		.filter(|len| *len <= order)
		.ok_or_else(|| MarkovError::SchemaMismatch(format!("node of length {} in a store of order {}", len, order)))?;

	let mut symbols = Vec::with_capacity(len);
	for i in 0..len {
		let text: String = row.get(offset + 1 + i)?;
		symbols.push(S::from_text(&text)?);
	}
	Ok(State::from(symbols))
}

fn select_id<S: TextSymbol>(conn: &Connection, statements: &Statements, order: usize, state: &State<S>) -> Result<Option<i64>> {
	let mut stmt = conn.prepare_cached(&statements.select_id)?;
	let id = stmt
		.query_row(params_from_iter(node_values(state, order)), |row| row.get(0))
		.optional()?;
	Ok(id)
}

/// Id of `state`, inserting the node if needed.
fn ensure_node<S: TextSymbol>(
	conn: &Connection,
	cache: &mut NodeCache<S>,
	statements: &Statements,
	order: usize,
	state: &State<S>,
) -> Result<i64> {
	if let Cached::Id(id) = cache.get(state) {
		return Ok(id);
	}
	if let Some(id) = select_id(conn, statements, order, state)? {
		cache.remember(state, id);
		return Ok(id);
	}

	let mut stmt = conn.prepare_cached(&statements.insert_node)?;
	stmt.execute(params_from_iter(node_values(state, order)))?;
	let id = conn.last_insert_rowid();
	cache.inserted(state, id);
	Ok(id)
}

fn write_pending<S: TextSymbol>(
	conn: &mut Connection,
	cache: &mut NodeCache<S>,
	statements: &Statements,
	order: usize,
	pending: &BTreeMap<(State<S>, State<S>), u64>,
) -> Result<()> {
	let tx = conn.transaction()?;
	{
		let mut upsert = tx.prepare_cached(&statements.upsert_edge)?;
		for ((src, dst), weight) in pending {
			let src_id = ensure_node(&tx, cache, statements, order, src)?;
			let dst_id = ensure_node(&tx, cache, statements, order, dst)?;
			upsert.execute(params![src_id, dst_id, *weight as i64])?;
		}
	}
	tx.commit()?;
	Ok(())
}

impl<S: TextSymbol> MarkovGraph<S> for RelationalGraph<S> {
	fn order(&self) -> usize {
		self.order
	}

	fn add_transition(&mut self, src: &State<S>, dst: &State<S>) -> Result<()> {
		self.check_symbols(src)?;
		self.check_symbols(dst)?;

		let key = (src.clone(), dst.clone());
		*self.pending.entry(key.clone()).or_insert(0) += 1;
		if self.pending.len() < self.config.buffer_capacity() {
			return Ok(());
		}
		if let Err(e) = self.flush_pending() {
			// Only this transition is taken back; older pending ones stay queued
			if let Some(weight) = self.pending.get_mut(&key) {
				*weight -= 1;
				if *weight == 0 {
					self.pending.remove(&key);
				}
			}
			return Err(e);
		}
		Ok(())
	}

	fn weighted_transitions(&mut self, src: &State<S>) -> Result<Vec<WeightedTransition<S>>> {
		self.flush_pending()?;
		let Some(src_id) = self.lookup(src)? else {
			return Ok(Vec::new());
		};

		let mut stmt = self.conn.prepare_cached(&self.statements.select_outgoing)?;
		let mut rows = stmt.query([src_id])?;
		let mut transitions = Vec::new();
		while let Some(row) = rows.next()? {
			let dst = read_state(row, 0, self.order)?;
			let weight: i64 = row.get(self.order + 1)?;
			transitions.push((dst, weight as u64));
		}
		Ok(transitions)
	}

	/// Counts the nodes and fetches the one at a random offset, so only one
	/// row crosses the connection.
	fn random_state(&mut self, rng: &mut dyn RngCore) -> Result<State<S>> {
		self.flush_pending()?;
		let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
		if count == 0 {
			return Err(MarkovError::EmptyGraph);
		}

		let offset = rng.random_range(0..count);
		let mut stmt = self.conn.prepare_cached(&self.statements.select_node_at)?;
		let mut rows = stmt.query([offset])?;
		match rows.next()? {
			Some(row) => read_state(row, 0, self.order),
			None => Err(MarkovError::EmptyGraph),
		}
	}

	/// Reads every node before calling `chooser`. This is slow on large
	/// stores; prefer [`random_state`](MarkovGraph::random_state).
	fn random_state_with(&mut self, chooser: &mut StateChooser<'_, S>) -> Result<State<S>> {
		self.flush_pending()?;
		warn!("Custom chooser on {}: scanning every node", self.identifier);

		let mut states = self.read_states()?;
		if states.is_empty() {
			return Err(MarkovError::EmptyGraph);
		}
		let len = states.len();
		match chooser(&states) {
			Some(index) if index < len => Ok(states.swap_remove(index)),
			index => Err(MarkovError::InvalidChoice { index, len }),
		}
	}

	fn vertices(&mut self) -> Result<Vec<State<S>>> {
		self.flush_pending()?;
		self.read_states()
	}

	fn transitions(&mut self) -> Result<Vec<Transition<S>>> {
		self.flush_pending()?;
		let mut stmt = self.conn.prepare_cached(&self.statements.select_edges)?;
		let mut rows = stmt.query([])?;
		let mut transitions = Vec::new();
		while let Some(row) = rows.next()? {
			let src = read_state(row, 0, self.order)?;
			let dst = read_state(row, self.order + 1, self.order)?;
			let weight: i64 = row.get(2 * (self.order + 1))?;
			transitions.push((src, dst, weight as u64));
		}
		Ok(transitions)
	}

	fn vertex_count(&mut self) -> Result<usize> {
		self.flush_pending()?;
		let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
		Ok(count as usize)
	}

	/// Two stores cannot be unioned cheaply in one transaction.
	fn merge(&mut self, _other: &mut dyn MarkovGraph<S>) -> Result<()> {
		Err(MarkovError::UnsupportedOperation("merge into a relational graph"))
	}

	/// Drains the write buffer. The store is the connection itself, so only
	/// the identifier used at open time (or none) is accepted.
	fn flush(&mut self, identifier: Option<&str>) -> Result<()> {
		if let Some(identifier) = identifier {
			if identifier != self.identifier {
				return Err(MarkovError::UnsupportedOperation("flush a relational graph to another connection"));
			}
		}
		let count = self.pending.len();
		self.flush_pending()?;
		debug!("Flushed {} pending transitions to {}", count, self.identifier);
		Ok(())
	}

	fn identifier(&self) -> Option<&str> {
		Some(&self.identifier)
	}
}
