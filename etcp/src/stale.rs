//! The stale list ("LL"): an unbounded, order-preserving sparse list of out-of-window DAT
//! frames that still demand an acknowledgement.
//!
//! A frame lands here when it arrives with `seq < rxQ.rdMin` (already acked once, the ack was
//! presumably lost) and `noAck == 0`. Unlike the circular queue, this structure is not
//! window-bounded: it grows to however many re-ack requests are outstanding, which in practice
//! is small and self-limiting (the peer stops retransmitting once the replacement ack arrives).

use std::collections::VecDeque;

use log::warn;

use crate::frame::PBuff;

/// A single entry: the sequence number the peer is re-asking about, and the packet buffer it
/// arrived in (carried through so the stale-ack generator can read its timestamp).
pub struct Entry {
	pub seq: u64,
	pub pbuff: PBuff,
}

/// Ordered by `seq`, ascending. Insertion tolerates a duplicate `seq` (the peer retransmitted
/// its ack-request before the first copy was drained) by replacing the existing entry and
/// logging once; it never panics on a duplicate, since duplicates are ordinary network
/// behaviour, not an invariant violation.
#[derive(Default)]
pub struct StaleList {
	entries: VecDeque<Entry>,
}

impl StaleList {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Inserts `pbuff` in sequence order. A duplicate `seq` replaces the existing entry in
	/// place, preserving order.
	pub fn insert(&mut self, seq: u64, pbuff: PBuff) {
		match self.entries.iter().position(|e| e.seq >= seq) {
			Some(idx) if self.entries[idx].seq == seq => {
				warn!("duplicate stale entry for seq {seq}, replacing");
				self.entries[idx] = Entry { seq, pbuff };
			}
			Some(idx) => self.entries.insert(idx, Entry { seq, pbuff }),
			None => self.entries.push_back(Entry { seq, pbuff }),
		}
	}

	/// Returns the lowest-sequence entry without removing it.
	pub fn peek_front(&self) -> Option<&Entry> {
		self.entries.front()
	}

	/// Removes and returns the lowest-sequence entry.
	pub fn pop_front(&mut self) -> Option<Entry> {
		self.entries.pop_front()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(seq: u64) -> PBuff {
		PBuff::new_dat(&seq.to_le_bytes())
	}

	#[test]
	fn insertion_stays_ordered() {
		let mut list = StaleList::new();
		list.insert(4, entry(4));
		list.insert(1, entry(1));
		list.insert(3, entry(3));

		let seqs: Vec<u64> = std::iter::from_fn(|| list.pop_front()).map(|e| e.seq).collect();
		assert_eq!(seqs, vec![1, 3, 4]);
	}

	#[test]
	fn duplicate_insert_replaces_in_place() {
		let mut list = StaleList::new();
		list.insert(1, entry(1));
		list.insert(1, entry(1));
		assert_eq!(list.len(), 1);
	}
}
