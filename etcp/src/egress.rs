//! `do_net_tx`: walks a connection's `tx_q` under Transmission Control gating and hands
//! transmit-eligible slots to the link.
//!
//! Grounded on `etcpOnNetTx` (`examples/original_source/src/etcp.c`): `Rdy`/`Now`/`Drp` txState
//! gating, first-attempt-only timestamp stamping for DAT, unconditional stamping for ACK, and
//! `no_ack`-gated release.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::config::ACK_RX_HISTORY;
use crate::connection::{AckSample, Connection};
use crate::error::{EtcpError, Result};
use crate::frame::{MsgType, PBuff, TxState};
use crate::tc::{Link, LinkError, TcSlotView, TxTc, TxTcCtx};

/// Splits `conn.tx_q`'s committed slots into DAT and ACK views for a [`TxTc`] policy — the queue
/// itself carries both message types in one sequence namespace (§9 Design Notes (4)), but the TC
/// contract hands the policy separate views of each.
fn tx_tc_views(conn: &Connection) -> (Vec<TcSlotView>, Vec<TcSlotView>) {
	let mut dat = Vec::new();
	let mut ack = Vec::new();

	for (seq, pbuff) in conn.tx_q.iter_committed(conn.tx_q.capacity()) {
		let view = TcSlotView { seq, tx_state: pbuff.tx_state, tx_attempts: pbuff.tx_attempts };
		match MsgType::try_from(pbuff.head().msg_type) {
			Ok(MsgType::Dat) => dat.push(view),
			Ok(MsgType::Ack) => ack.push(view),
			_ => {}
		}
	}

	(dat, ack)
}

/// Invokes `tc` to decide the next egress budget, then applies its verdict (§4.5: the core never
/// flips `Rdy → Now` itself) onto `conn.tx_q`'s slot states. The host calls this before
/// [`do_net_tx`] each pass; `do_net_tx` itself never consults a [`TxTc`] policy directly.
pub fn apply_tx_tc(conn: &mut Connection, tc: &mut impl TxTc) {
	let (dat_tx_q, ack_tx_q) = tx_tc_views(conn);
	let ack_rx_q: Vec<AckSample> = (0..ACK_RX_HISTORY).filter_map(|i| conn.ack_rx.get(i).copied()).collect();

	let budget = tc.gate(TxTcCtx { dat_tx_q: &dat_tx_q, ack_tx_q: &ack_tx_q, ack_rx_q: &ack_rx_q });

	for seq in budget.now {
		if let Some(slot) = conn.tx_q.get_mut(seq) {
			slot.tx_state = TxState::Now;
		}
	}
	for seq in budget.drop {
		if let Some(slot) = conn.tx_q.get_mut(seq) {
			slot.tx_state = TxState::Drp;
		}
	}
}

fn now_ns() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

fn stamp_tx(pbuff: &mut PBuff, is_first_attempt: bool) {
	let msg_type = MsgType::try_from(pbuff.head().msg_type).ok();
	let stamp = msg_type == Some(MsgType::Ack) || is_first_attempt;
	if stamp {
		pbuff.head_mut().sw_tx.set(now_ns());
	}
}

/// Drives up to `max` slots of `conn.tx_q` through the link, starting at `rd_min`. Returns the
/// number of frames handed to the link (sent + dropped + released-without-send).
pub fn do_net_tx(conn: &mut Connection, link: &mut impl Link, max: usize) -> Result<usize> {
	let rd_min = conn.tx_q.rd_min();
	let wr_max = conn.tx_q.wr_max();
	let scan_end = wr_max.min(rd_min + max as u64);

	let mut handled = 0;
	let mut seq = rd_min;

	while seq < scan_end {
		let Some(pbuff) = conn.tx_q.get(seq) else {
			seq += 1;
			continue;
		};

		match pbuff.tx_state {
			TxState::Drp => {
				debug!("dropping seq {seq} per transmission control");
				let _ = conn.tx_q.release(seq);
				handled += 1;
			}
			TxState::Rdy => {}
			TxState::Now => {
				handled += send_one(conn, link, seq)?;
			}
		}

		seq += 1;
	}

	Ok(handled)
}

fn send_one(conn: &mut Connection, link: &mut impl Link, seq: u64) -> Result<usize> {
	let pbuff = conn.tx_q.get_mut(seq).ok_or(EtcpError::Structural)?;
	pbuff.tx_state = TxState::Rdy;

	let is_dat = MsgType::try_from(pbuff.head().msg_type) == Ok(MsgType::Dat);
	let first_attempt = pbuff.tx_attempts == 0;
	stamp_tx(pbuff, first_attempt);

	match link.send(pbuff.bytes()) {
		Ok(hw_tx) => {
			let pbuff = conn.tx_q.get_mut(seq).ok_or(EtcpError::Structural)?;
			if first_attempt || !is_dat {
				if let Some(nanos) = hw_tx.0 {
					pbuff.head_mut().hw_tx.set(nanos);
				}
			}
			pbuff.tx_attempts += 1;

			let no_ack = is_dat && pbuff.dat_hdr().flags.no_ack();
			if !is_dat || no_ack {
				let _ = conn.tx_q.release(seq);
			}
			Ok(1)
		}
		Err(LinkError(reason)) => {
			warn!("link tx busy for seq {seq}: {reason}");
			Err(EtcpError::TryAgain)
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;

	use super::*;
	use crate::connection::{FlowId, LinkOptions};
	use crate::frame::build_dat;
	use crate::tc::HwTimestamp;

	struct FakeLink {
		sent: VecDeque<Vec<u8>>,
	}

	impl Link for FakeLink {
		fn send(&mut self, frame: &[u8]) -> Result<HwTimestamp, LinkError> {
			self.sent.push_back(frame.to_vec());
			Ok(HwTimestamp(Some(42)))
		}

		fn recv(&mut self, _buf: &mut [u8]) -> Result<Option<(usize, HwTimestamp)>, LinkError> {
			Ok(None)
		}
	}

	fn conn() -> Connection {
		let flow = FlowId::new(1, 15, 2, 14);
		let opts = LinkOptions { window_size_log2: 4, buff_size: 1500, vlan: None, priority: 0 };
		Connection::new(flow, &opts)
	}

	#[test]
	fn now_slot_sends_and_releases_noack_dat() {
		let mut c = conn();
		let mut pbuff = build_dat(2, 1, None, 15, 14, 0, true, false, b"hi");
		pbuff.tx_state = TxState::Now;
		c.tx_q.push(pbuff, 0).unwrap();
		c.tx_q.commit(0).unwrap();

		let mut link = FakeLink { sent: VecDeque::new() };
		let handled = do_net_tx(&mut c, &mut link, 8).unwrap();

		assert_eq!(handled, 1);
		assert_eq!(link.sent.len(), 1);
		assert!(!c.tx_q.is_committed(0));
	}

	#[test]
	fn rdy_slot_is_skipped() {
		let mut c = conn();
		let pbuff = build_dat(2, 1, None, 15, 14, 0, false, false, b"hi");
		c.tx_q.push(pbuff, 0).unwrap();
		c.tx_q.commit(0).unwrap();

		let mut link = FakeLink { sent: VecDeque::new() };
		let handled = do_net_tx(&mut c, &mut link, 8).unwrap();

		assert_eq!(handled, 0);
		assert!(link.sent.is_empty());
		assert!(c.tx_q.is_committed(0));
	}

	#[test]
	fn retained_dat_keeps_tx_attempts_across_retransmits() {
		let mut c = conn();
		let mut pbuff = build_dat(2, 1, None, 15, 14, 0, false, false, b"hi");
		pbuff.tx_state = TxState::Now;
		c.tx_q.push(pbuff, 0).unwrap();
		c.tx_q.commit(0).unwrap();

		let mut link = FakeLink { sent: VecDeque::new() };
		do_net_tx(&mut c, &mut link, 8).unwrap();
		assert!(c.tx_q.is_committed(0));
		assert_eq!(c.tx_q.get(0).unwrap().tx_attempts, 1);

		c.tx_q.get_mut(0).unwrap().tx_state = TxState::Now;
		do_net_tx(&mut c, &mut link, 8).unwrap();
		assert_eq!(c.tx_q.get(0).unwrap().tx_attempts, 2);
	}
}
