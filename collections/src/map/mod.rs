mod inner;

use core::hash::{BuildHasher, BuildHasherDefault, Hash};
use core::ops::{Deref, DerefMut};

use ahash::AHasher;
use inner::Core;

pub trait Key {
	type Type: Hash + Eq;

	/// Get the contained key.
	fn key(&self) -> &Self::Type;
}

pub struct Map<T, const N: usize, S = BuildHasherDefault<AHasher>> {
	core: Core<T, N>,
	hash: S,
}

impl<T, const N: usize, S: Default> Default for Map<T, N, S> {
	fn default() -> Self {
		Self { core: Core::default(), hash: S::default() }
	}
}

impl<T: Key, const N: usize, S: BuildHasher> Map<T, N, S> {
	#[must_use]
	pub fn new(hash: S) -> Self {
		Self { core: Default::default(), hash }
	}

	#[must_use]
	pub fn find(&self, k: &T::Type) -> Option<&T> {
		let hash = self.hash.hash_one(k);
		let idx = self.core.find(hash, |i| i.key() == k)?;
		// SAFETY: index was just returned from `find`
		Some(unsafe { self.core.get(idx) })
	}

	#[must_use]
	pub fn find_entry(&mut self, k: &T::Type) -> Entry<T, N> {
		let hash = self.hash.hash_one(k);
		match self.core.find_or_find_insert(hash, |i| i.key() == k) {
			Ok(idx) => Entry::Filled(Filled { map: &mut self.core, idx }),
			Err(idx) => Entry::Empty(Empty { map: &mut self.core, idx, hash }),
		}
	}

	#[inline]
	pub fn insert_unique(&mut self, k: &T::Type) -> Empty<T, N> {
		let hash = self.hash.hash_one(k);
		let idx = self.core.find_insert(hash);

		Empty { map: &mut self.core, idx, hash }
	}

	/// # Safety
	/// `idx` must have been returned by a prior `find`/`find_entry`/`insert_unique` call on
	/// this map and not yet removed.
	#[inline]
	pub unsafe fn get_unchecked(&self, idx: usize) -> &T {
		self.core.get(idx)
	}

	/// # Safety
	/// See [`Map::get_unchecked`].
	#[inline]
	pub unsafe fn get_unchecked_mut(&mut self, idx: usize) -> &mut T {
		self.core.get_mut(idx)
	}
}

pub enum Entry<'a, T, const N: usize> {
	Filled(Filled<'a, T, N>),
	Empty(Empty<'a, T, N>),
}

impl<'a, T, const N: usize> Entry<'a, T, N> {
	pub fn filled(self) -> Option<Filled<'a, T, N>> {
		match self {
			Self::Filled(f) => Some(f),
			_ => None,
		}
	}

	pub fn remove(self) -> Option<T> {
		match self {
			Self::Filled(f) => Some(f.remove()),
			_ => None,
		}
	}
}

pub struct Filled<'a, T, const N: usize> {
	map: &'a mut Core<T, N>,
	idx: usize,
}

impl<'a, T, const N: usize> Filled<'a, T, N> {
	#[inline]
	pub fn index(&self) -> usize {
		self.idx
	}

	#[inline]
	pub fn into_ref(self) -> &'a mut T {
		unsafe { self.map.get_mut(self.idx) }
	}

	#[inline]
	pub fn remove(self) -> T {
		self.map.remove(self.idx)
	}
}

impl<'a, T, const N: usize> Deref for Filled<'a, T, N> {
	type Target = T;

	fn deref(&self) -> &Self::Target {
		unsafe { self.map.get(self.idx) }
	}
}

impl<'a, T, const N: usize> DerefMut for Filled<'a, T, N> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		unsafe { self.map.get_mut(self.idx) }
	}
}

pub struct Empty<'a, T, const N: usize> {
	map: &'a mut Core<T, N>,
	idx: usize,
	hash: u64,
}

impl<'a, T: Key, const N: usize> Empty<'a, T, N> {
	#[inline]
	pub fn insert(self, t: T) -> Filled<'a, T, N> {
		self.map.insert(self.idx, self.hash, t);
		Filled { map: self.map, idx: self.idx }
	}

	#[inline]
	pub fn index(&self) -> usize {
		self.idx
	}
}
