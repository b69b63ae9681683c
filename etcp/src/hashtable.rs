//! The demultiplexing hash table ("HT"): an open-addressed map keyed by a 128-bit composite
//! key, used both for the top-level destination table and for each `LAMap`'s source table.
//!
//! Grounded directly on `collections::map::Map` (`hashbrown::HashTable` + `slab::Slab`
//! underneath, via `collections::map::inner::safe::Core`); the const generic `N` is only an
//! initial-capacity hint, not a hard cap — both backing structures grow on demand, matching the
//! upstream table's ability to absorb more connections than its initial sizing anticipated.

use collections::map::{Entry, Key, Map};

/// A 128-bit composite key: `(addr, port)` packed as `hi`/`lo` 64-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key128 {
	pub hi: u64,
	pub lo: u64,
}

impl Key128 {
	pub fn new(addr: u64, port: u32) -> Self {
		Self { hi: addr, lo: port as u64 }
	}
}

struct Entry128<T> {
	key: Key128,
	value: T,
}

impl<T> Key for Entry128<T> {
	type Type = Key128;

	fn key(&self) -> &Key128 {
		&self.key
	}
}

/// A 128-bit-keyed hash table with `N` as an initial-capacity hint.
pub struct HashTable<T, const N: usize> {
	map: Map<Entry128<T>, N>,
}

impl<T, const N: usize> Default for HashTable<T, N> {
	fn default() -> Self {
		Self { map: Map::default() }
	}
}

impl<T, const N: usize> HashTable<T, N> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn find(&self, key: Key128) -> Option<&T> {
		self.map.find(&key).map(|e| &e.value)
	}

	pub fn find_mut(&mut self, key: Key128) -> Option<&mut T> {
		match self.map.find_entry(&key) {
			Entry::Filled(f) => Some(&mut f.into_ref().value),
			Entry::Empty(_) => None,
		}
	}

	/// Inserts `value` at `key` if absent, then returns a mutable reference to whatever is
	/// stored there (existing or freshly inserted) — the demux admission path (§4.3.1) needs
	/// exactly this "find or create" behavior when a DAT frame opens a new connection.
	pub fn get_or_insert_with(&mut self, key: Key128, f: impl FnOnce() -> T) -> &mut T {
		let entry: &mut Entry128<T> = match self.map.find_entry(&key) {
			Entry::Filled(filled) => filled.into_ref(),
			Entry::Empty(empty) => empty.insert(Entry128::wrap(key, f())).into_ref(),
		};
		&mut entry.value
	}

	pub fn remove(&mut self, key: Key128) -> Option<T> {
		match self.map.find_entry(&key) {
			Entry::Filled(f) => Some(f.remove().value),
			Entry::Empty(_) => None,
		}
	}

	pub fn contains(&self, key: Key128) -> bool {
		self.map.find(&key).is_some()
	}
}

impl<T> Entry128<T> {
	fn wrap(key: Key128, value: T) -> Self {
		Self { key, value }
	}
}
