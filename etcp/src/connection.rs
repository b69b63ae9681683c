//! Per-flow state: [`FlowId`], [`Connection`], and the listen-side [`LAMap`].

use std::collections::VecDeque;

use collections::sparse::Ring;

use crate::config::{ACK_RX_HISTORY, RTT_ALPHA_DENOM, RTT_ALPHA_NUM, SRC_TAB_SIZE};
use crate::hashtable::HashTable;
use crate::queue::CircularQueue;
use crate::stale::StaleList;

/// The four-tuple identifying a connection: local and remote (link address, port). Immutable
/// once a [`Connection`] is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowId {
	pub src_addr: u64,
	pub src_port: u32,
	pub dst_addr: u64,
	pub dst_port: u32,
}

impl FlowId {
	pub fn new(src_addr: u64, src_port: u32, dst_addr: u64, dst_port: u32) -> Self {
		Self { src_addr, src_port, dst_addr, dst_port }
	}

	/// The flow as seen from the other end: source and destination swapped.
	pub fn reversed(self) -> Self {
		Self { src_addr: self.dst_addr, src_port: self.dst_port, dst_addr: self.src_addr, dst_port: self.src_port }
	}
}

/// Link-layer and window parameters a newly created connection inherits from its [`LAMap`], or
/// that a host supplies directly to an explicit connect.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
	pub window_size_log2: u32,
	pub buff_size: usize,
	pub vlan: Option<u16>,
	pub priority: u8,
}

impl LinkOptions {
	pub fn window_size(&self) -> usize {
		1usize << self.window_size_log2
	}
}

/// One incoming-SACK summary, retained so a Transmission Control policy can look back at recent
/// round-trip behaviour when deciding what to send next (see `crate::tc`).
#[derive(Debug, Clone, Copy)]
pub struct AckSample {
	pub seq: u64,
	pub rtt_ns: i64,
}

/// The per-flow state: send/receive windows, the stale-ack queue, and the sequence cursors.
///
/// Created on the first DAT frame received for a (dst, src) pair under a listening [`LAMap`],
/// or by an explicit client connect (see `crate::demux::State::connect`). Destruction (an
/// explicit close, not modeled here — see §9 Design Notes, Open Question 1) drops all three
/// queues with it.
pub struct Connection {
	pub flow_id: FlowId,
	pub vlan: Option<u16>,
	pub priority: u8,

	pub rx_q: CircularQueue,
	pub tx_q: CircularQueue,
	pub stale_q: StaleList,

	/// Recent incoming-ack RTT samples, for the TX Transmission Control policy to inspect.
	pub ack_rx: Ring<AckSample, ACK_RX_HISTORY>,
	ack_rx_next: u64,

	/// Next DAT sequence number to assign on `user_tx`.
	pub seq_snd: u64,
	/// Lowest sequence number not yet acknowledged to the peer; advances as SACKs are emitted.
	pub seq_ack: u64,

	/// Exponential moving average of observed RTT, nanoseconds (α = 1/8). `None` until the first
	/// sample arrives.
	rtt_estimate_ns: Option<i64>,
}

impl Connection {
	pub fn new(flow_id: FlowId, opts: &LinkOptions) -> Self {
		let capacity = opts.window_size();
		Self {
			flow_id,
			vlan: opts.vlan,
			priority: opts.priority,
			rx_q: CircularQueue::new(capacity),
			tx_q: CircularQueue::new(capacity),
			stale_q: StaleList::new(),
			ack_rx: Ring::default(),
			ack_rx_next: 0,
			seq_snd: 0,
			seq_ack: 0,
			rtt_estimate_ns: None,
		}
	}

	/// Records an RTT sample from a just-processed ack, for `ack_rx` consumers. Overwrites the
	/// oldest sample once `ACK_RX_HISTORY` is reached.
	pub fn record_ack_sample(&mut self, sample: AckSample) {
		let idx = (self.ack_rx_next % ACK_RX_HISTORY as u64) as usize;
		self.ack_rx_next += 1;
		self.ack_rx.insert(idx, sample);
	}

	/// Folds one RTT observation into the running estimate (EMA, α = 1/8).
	pub fn record_rtt_sample(&mut self, rtt_ns: i64) {
		self.rtt_estimate_ns = Some(match self.rtt_estimate_ns {
			None => rtt_ns,
			Some(prev) => prev + (rtt_ns - prev) * RTT_ALPHA_NUM / RTT_ALPHA_DENOM,
		});
	}

	/// The current smoothed RTT estimate, if any sample has been recorded yet.
	pub fn rtt_estimate(&self) -> Option<i64> {
		self.rtt_estimate_ns
	}
}

/// A pending child connection, observable by `accept` until consumed.
pub struct Pending {
	pub flow_id: FlowId,
}

/// Per-destination listen state: the child-connection table (keyed by the remote peer's
/// address/port) plus the options newly admitted connections inherit.
pub struct LAMap {
	pub table: HashTable<Connection, SRC_TAB_SIZE>,
	pub listen_q: VecDeque<Pending>,
	pub options: LinkOptions,
}

impl LAMap {
	pub fn new(options: LinkOptions) -> Self {
		Self { table: HashTable::new(), listen_q: VecDeque::new(), options }
	}
}
