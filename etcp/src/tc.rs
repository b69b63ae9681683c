//! Host-supplied policy surfaces: the link transport and the Transmission Control gates.
//!
//! The source expresses these as function-pointer + opaque-state pairs (`etcpTXCB`/`etcpRXCB`/
//! `etcpTC`); here they are plain traits, generic parameters on the pump functions rather than
//! stored callbacks (see §9 Design Notes, "Dynamic dispatch" — a deliberate divergence from the
//! teacher's `stakker`-actor callback style, since this protocol's concurrency model is
//! pump-driven, not event-loop-driven).

use crate::frame::TxState;

/// A hardware (or software-only) transmit/receive timestamp, nanoseconds since an unspecified
/// epoch. `None` when hardware timestamping is unavailable for this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwTimestamp(pub Option<u64>);

/// Fatal link I/O error. Packet-level conditions (no data, no send capacity) are not errors —
/// they are expressed through the `Ok` side of [`Link::send`]/[`Link::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkError(pub &'static str);

/// The physical link a host wires the core to. `send`/`recv` must never block.
pub trait Link {
	/// Transmits `frame` (already fully encoded, link header included). Returns the hardware TX
	/// timestamp on success, or `Err` if the link has no send capacity right now — the caller
	/// (egress) surfaces this as [`crate::error::EtcpError::TryAgain`] and retries later.
	fn send(&mut self, frame: &[u8]) -> Result<HwTimestamp, LinkError>;

	/// Polls for one received frame. `Ok(None)` means nothing is available right now (not an
	/// error); `Ok(Some((len, ts)))` means `buf[..len]` holds a frame received at hardware
	/// timestamp `ts`.
	fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, HwTimestamp)>, LinkError>;
}

/// A single queued slot's address and state, as seen by a Transmission Control policy. TC reads
/// this to decide, and writes back by returning the state a slot should adopt.
#[derive(Debug, Clone, Copy)]
pub struct TcSlotView {
	pub seq: u64,
	pub tx_state: TxState,
	pub tx_attempts: u32,
}

/// The context handed to [`TxTc::gate`]: read-only views of the connection's send-side queues,
/// for the policy to inspect before deciding each slot's next [`TxState`].
pub struct TxTcCtx<'a> {
	pub dat_tx_q: &'a [TcSlotView],
	pub ack_tx_q: &'a [TcSlotView],
	pub ack_rx_q: &'a [crate::connection::AckSample],
}

/// TC's verdict for one egress pass: which slots (by sequence) to flip to `Now`, which to `Drp`,
/// and the max number of DAT/ACK slots egress should walk regardless of budget exhaustion.
#[derive(Debug, Clone, Default)]
pub struct TxBudget {
	pub now: Vec<u64>,
	pub drop: Vec<u64>,
	pub max_dat: usize,
	pub max_ack: usize,
}

/// Decides, before each egress pass, which queued slots may transmit.
///
/// The core never moves a slot `Rdy → Now` on its own (§4.5) — that transition is this trait's
/// sole authority.
pub trait TxTc {
	fn gate(&mut self, ctx: TxTcCtx<'_>) -> TxBudget;
}

/// The context handed to [`RxTc::budget`]: read-only views of the connection's receive-side
/// state, for the policy to decide how many ack frames this pass may emit.
pub struct RxTcCtx<'a> {
	pub dat_rx_q: &'a [TcSlotView],
	pub ack_tx_q: &'a [TcSlotView],
}

/// Decides, before each ack-generation pass, how many ack frames are permitted.
pub trait RxTc {
	fn budget(&mut self, ctx: RxTcCtx<'_>) -> usize;
}

/// A permissive reference policy: always sends everything queued, never drops, and allows an
/// unbounded number of acks. Useful for tests and the loopback walkthrough; not meant to model a
/// real congestion-aware policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSend;

impl TxTc for AlwaysSend {
	fn gate(&mut self, ctx: TxTcCtx<'_>) -> TxBudget {
		TxBudget {
			now: ctx.dat_tx_q.iter().chain(ctx.ack_tx_q.iter()).map(|s| s.seq).collect(),
			drop: Vec::new(),
			max_dat: ctx.dat_tx_q.len(),
			max_ack: ctx.ack_tx_q.len(),
		}
	}
}

impl RxTc for AlwaysSend {
	fn budget(&mut self, ctx: RxTcCtx<'_>) -> usize {
		ctx.dat_rx_q.len().max(ctx.ack_tx_q.len())
	}
}
