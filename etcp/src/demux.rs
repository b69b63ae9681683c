//! Global connection lookup: destination-map → source-map → connection, plus the admission
//! rule that creates a connection on a listening `LAMap`'s first DAT frame.
//!
//! Two lookup directions share the same pair of nested tables and deliberately disagree about
//! which half of a flow is the "outer" key (see §9 Design Notes, Open Question 2, and
//! `DESIGN.md`): a listening side keys its `LAMap` by its own local address and the inner table
//! by the remote peer; an explicit connect keys the `LAMap` by the remote peer and the inner
//! table by its own local address. Both conventions converge on the same lookup an incoming ACK
//! performs, which is why they must not be unified into one.

use log::warn;

use crate::config::DST_TAB_SIZE;
use crate::connection::{Connection, FlowId, LAMap, LinkOptions, Pending};
use crate::error::{EtcpError, Result};
use crate::hashtable::{HashTable, Key128};

fn key(addr: u64, port: u32) -> Key128 {
	Key128::new(addr, port)
}

/// The top-level demultiplexing structure: one destination table shared by every listen and
/// connect this host has established.
#[derive(Default)]
pub struct State {
	dst_map: HashTable<LAMap, DST_TAB_SIZE>,
}

impl State {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers local `(addr, port)` as a listening endpoint. Child connections are created
	/// lazily, on each new source's first DAT frame (see [`State::admit_dat`]).
	pub fn listen(&mut self, addr: u64, port: u32, options: LinkOptions) {
		self.dst_map.get_or_insert_with(key(addr, port), || LAMap::new(options));
	}

	/// Establishes an outbound connection from local `(local_addr, local_port)` to
	/// `(remote_addr, remote_port)`, creating it immediately rather than waiting on a DAT frame
	/// from the peer.
	pub fn connect(
		&mut self,
		local_addr: u64,
		local_port: u32,
		remote_addr: u64,
		remote_port: u32,
		options: LinkOptions,
	) -> &mut Connection {
		let flow_id = FlowId::new(local_addr, local_port, remote_addr, remote_port);
		let lamap = self.dst_map.get_or_insert_with(key(remote_addr, remote_port), || LAMap::new(options));
		lamap.table.get_or_insert_with(key(local_addr, local_port), || Connection::new(flow_id, &lamap.options))
	}

	/// §4.3.1: locates the connection a DAT frame belongs to, creating it (under the
	/// destination's listening `LAMap`) if this is the first frame from that source. Fails with
	/// [`EtcpError::RejectedConnection`] if nobody is listening on `(dstAddr, dstPort)`.
	pub fn admit_dat(&mut self, flow: FlowId) -> Result<&mut Connection> {
		let dst_key = key(flow.dst_addr, flow.dst_port);
		let lamap = self.dst_map.find_mut(dst_key).ok_or_else(|| {
			warn!("no listener for dst={:#x}:{}", flow.dst_addr, flow.dst_port);
			EtcpError::RejectedConnection
		})?;

		let src_key = key(flow.src_addr, flow.src_port);
		if !lamap.table.contains(src_key) {
			let options = lamap.options;
			lamap.table.get_or_insert_with(src_key, || Connection::new(flow, &options));
			lamap.listen_q.push_back(Pending { flow_id: flow });
		}

		Ok(lamap.table.find_mut(src_key).expect("just inserted or already present"))
	}

	/// §4.3.2: locates the connection an ACK frame's SACK fields apply to. The incoming flow's
	/// src/dst are swapped relative to [`State::admit_dat`] (the ack targets the original
	/// sender). Never creates a connection; an ack for an unknown flow is simply rejected.
	pub fn admit_ack(&mut self, flow: FlowId) -> Result<&mut Connection> {
		let dst_key = key(flow.src_addr, flow.src_port);
		let lamap = self.dst_map.find_mut(dst_key).ok_or_else(|| {
			warn!("ack for unknown destination src={:#x}:{}", flow.src_addr, flow.src_port);
			EtcpError::RejectedConnection
		})?;

		let src_key = key(flow.dst_addr, flow.dst_port);
		lamap.table.find_mut(src_key).ok_or_else(|| {
			warn!("ack for unknown source dst={:#x}:{}", flow.dst_addr, flow.dst_port);
			EtcpError::RejectedConnection
		})
	}

	/// Pops the next pending child connection admitted under `(addr, port)`'s `LAMap`, if any.
	pub fn accept(&mut self, addr: u64, port: u32) -> Option<FlowId> {
		let lamap = self.dst_map.find_mut(key(addr, port))?;
		lamap.listen_q.pop_front().map(|p| p.flow_id)
	}

	/// Looks up an already-established connection directly, bypassing admission — used by a
	/// host's explicit send/recv surface once it holds a flow handle.
	///
	/// Takes `(src_addr, src_port, dst_addr, dst_port)` in the same sense as [`FlowId`]'s own
	/// fields — the original DAT's sender and recipient — not "my address" vs. "the peer's
	/// address": a connecting client's own flow has `src` pointing at itself, while a listener's
	/// admitted connection has `src` pointing at the remote peer (see [`State::admit_dat`] vs.
	/// [`State::connect`]). Passing the connection's own [`Connection::flow_id`] fields in order
	/// always resolves correctly regardless of which side created it.
	pub fn get_mut(&mut self, src_addr: u64, src_port: u32, dst_addr: u64, dst_port: u32) -> Option<&mut Connection> {
		let lamap = self.dst_map.find_mut(key(dst_addr, dst_port))?;
		lamap.table.find_mut(key(src_addr, src_port))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn opts() -> LinkOptions {
		LinkOptions { window_size_log2: 3, buff_size: 1500, vlan: None, priority: 0 }
	}

	#[test]
	fn dat_ingress_creates_connection_under_listening_lamap() {
		let mut state = State::new();
		state.listen(2, 14, opts());

		let flow = FlowId::new(1, 15, 2, 14);
		let conn = state.admit_dat(flow).unwrap();
		assert_eq!(conn.flow_id, flow);

		// second DAT from the same source reuses the same connection, not a new one.
		let conn = state.admit_dat(flow).unwrap();
		assert_eq!(conn.seq_snd, 0);
	}

	#[test]
	fn dat_ingress_rejects_unknown_destination() {
		let mut state = State::new();
		let flow = FlowId::new(1, 15, 2, 14);
		assert_eq!(state.admit_dat(flow), Err(EtcpError::RejectedConnection));
	}

	#[test]
	fn ack_ingress_swaps_keys_relative_to_dat_ingress() {
		let mut state = State::new();
		state.listen(2, 14, opts());
		let dat_flow = FlowId::new(1, 15, 2, 14);
		state.admit_dat(dat_flow).unwrap();

		// the ack frame arrives with src/dst reversed relative to the original DAT.
		let ack_flow = dat_flow.reversed();
		let conn = state.admit_ack(ack_flow).unwrap();
		assert_eq!(conn.flow_id, dat_flow);
	}

	#[test]
	fn connect_then_admit_matching_ack() {
		let mut state = State::new();
		// client (addr=1,port=15) connects out to server (addr=2,port=14).
		state.connect(1, 15, 2, 14, opts());

		let dat_flow = FlowId::new(1, 15, 2, 14);
		// the server's reply ack arrives with src/dst swapped relative to the client's DAT.
		let ack_flow = dat_flow.reversed();
		let conn = state.admit_ack(ack_flow).unwrap();
		assert_eq!(conn.flow_id, dat_flow);
	}

	#[test]
	fn accept_drains_pending_in_order() {
		let mut state = State::new();
		state.listen(2, 14, opts());
		state.admit_dat(FlowId::new(1, 15, 2, 14)).unwrap();
		state.admit_dat(FlowId::new(3, 16, 2, 14)).unwrap();

		assert_eq!(state.accept(2, 14).unwrap().src_addr, 1);
		assert_eq!(state.accept(2, 14).unwrap().src_addr, 3);
		assert!(state.accept(2, 14).is_none());
	}
}
