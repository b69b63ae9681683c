//! Fresh and stale SACK generation: `generate_acks`/`generate_stale_acks`.
//!
//! Grounded on `etcpGenAcks`/`etcpGenStaleAcks` (`examples/original_source/src/etcp.c`) — the
//! field-coalescing loop, the `ETCP_MAX_SACKS`-triggered frame flush, and the `seqAck`
//! advance-by-first-field rule.

use bilge::prelude::*;
use log::debug;

use crate::config::ETCP_MAX_SACKS;
use crate::connection::Connection;
use crate::error::{EtcpError, Result};
use crate::frame::{build_sack, DatFlags, MsgType, SackField, TimeSample};
use crate::tc::{RxTc, RxTcCtx, TcSlotView};

/// Builds the read-only views a [`RxTc`] policy inspects: every committed `rx_q` slot, and the
/// ACK-type slots already queued in `tx_q` (so the policy can see ack frames not yet sent).
fn rx_tc_views(conn: &Connection) -> (Vec<TcSlotView>, Vec<TcSlotView>) {
	let dat_rx_q = conn
		.rx_q
		.iter_committed(conn.rx_q.capacity())
		.map(|(seq, pbuff)| TcSlotView { seq, tx_state: pbuff.tx_state, tx_attempts: pbuff.tx_attempts })
		.collect();

	let ack_tx_q = conn
		.tx_q
		.iter_committed(conn.tx_q.capacity())
		.filter(|(_, pbuff)| MsgType::try_from(pbuff.head().msg_type) == Ok(MsgType::Ack))
		.map(|(seq, pbuff)| TcSlotView { seq, tx_state: pbuff.tx_state, tx_attempts: pbuff.tx_attempts })
		.collect();

	(dat_rx_q, ack_tx_q)
}

/// Asks `rx_tc` how many ack frames this pass may emit, then runs [`generate_acks`] with that
/// budget as `max_slots`. The host calls this instead of `generate_acks` directly when it has a
/// real [`RxTc`] policy to consult.
pub fn generate_acks_with_tc(conn: &mut Connection, rx_tc: &mut impl RxTc) -> Result<usize> {
	let (dat_rx_q, ack_tx_q) = rx_tc_views(conn);
	let max = rx_tc.budget(RxTcCtx { dat_rx_q: &dat_rx_q, ack_tx_q: &ack_tx_q });
	generate_acks(conn, max)
}

fn mark_ack_sent(flags: DatFlags) -> DatFlags {
	DatFlags::new(flags.no_ack(), flags.no_ret(), flags.stale_dat(), true, u4::new(0))
}

struct Builder {
	sack_base_seq: u64,
	fields: Vec<SackField>,
	time_first: Option<TimeSample>,
	time_last: Option<TimeSample>,
	prev_seq: Option<u64>,
}

impl Builder {
	fn new(sack_base_seq: u64) -> Self {
		Self { sack_base_seq, fields: Vec::new(), time_first: None, time_last: None, prev_seq: None }
	}

	fn record(&mut self, seq: u64, ts: TimeSample, counts: bool) {
		if self.time_first.is_none() {
			self.time_first = Some(ts);
		}
		self.time_last = Some(ts);

		if !counts {
			self.prev_seq = None;
			return;
		}

		let contiguous = self.prev_seq == Some(seq.wrapping_sub(1));
		if contiguous {
			if let Some(last) = self.fields.last_mut() {
				last.count = (last.count.get() + 1).into();
			}
		} else {
			let offset = (seq - self.sack_base_seq) as u16;
			self.fields.push(SackField { offset: offset.into(), count: 1u16.into() });
		}
		self.prev_seq = Some(seq);
	}

	fn is_full(&self) -> bool {
		self.fields.len() >= ETCP_MAX_SACKS
	}

	fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

/// §4.4 fresh-ack generator. Scans `conn.rx_q` from `rd_min` up to `rd_min + max_slots`, marking
/// every not-yet-acked committed slot `ack_sent` and coalescing contiguous runs into SACK fields.
/// Returns the number of ack frames emitted.
pub fn generate_acks(conn: &mut Connection, max_slots: usize) -> Result<usize> {
	let rd_min = conn.rx_q.rd_min();
	let wr_max = conn.rx_q.wr_max();
	let scan_end = wr_max.min(rd_min + max_slots as u64);

	let mut emitted = 0;
	let mut builder = Builder::new(conn.seq_ack);

	let mut seq = rd_min;
	while seq < scan_end {
		let Some(already_sent) = (match conn.rx_q.get(seq) {
			None => None,
			Some(slot) => Some(slot.dat_hdr().flags.ack_sent()),
		}) else {
			builder.prev_seq = None;
			seq += 1;
			continue;
		};

		if already_sent {
			builder.prev_seq = None;
			seq += 1;
			continue;
		}

		let (no_ack, ts) = {
			let slot = conn.rx_q.get(seq).expect("checked above");
			(slot.dat_hdr().flags.no_ack(), slot.head().sw_rx)
		};
		builder.record(seq, ts, !no_ack);

		let slot = conn.rx_q.get_mut(seq).expect("checked above");
		let flags = slot.dat_hdr().flags;
		slot.dat_hdr_mut().flags = mark_ack_sent(flags);

		if builder.is_full() {
			emit(conn, &mut builder)?;
			emitted += 1;
			builder = Builder::new(conn.seq_ack);
		}

		seq += 1;
	}

	if !builder.is_empty() {
		emit(conn, &mut builder)?;
		emitted += 1;
	}

	Ok(emitted)
}

fn emit(conn: &mut Connection, builder: &mut Builder) -> Result<()> {
	let dst_mac = conn.flow_id.src_addr;
	let src_mac = conn.flow_id.dst_addr;
	let dst_port = conn.flow_id.src_port;
	let src_port = conn.flow_id.dst_port;

	let pbuff = build_sack(
		dst_mac,
		src_mac,
		conn.vlan,
		src_port,
		dst_port,
		builder.sack_base_seq,
		builder.time_first.unwrap_or_default(),
		builder.time_last.unwrap_or_default(),
		&builder.fields,
	);

	conn.tx_q.push_next(pbuff).map_err(|_| EtcpError::TryAgain)?;

	let first = builder.fields[0];
	conn.seq_ack = builder.sack_base_seq + first.offset.get() as u64 + first.count.get() as u64;
	debug!("emitted ack base={} fields={} seq_ack now {}", builder.sack_base_seq, builder.fields.len(), conn.seq_ack);
	Ok(())
}

/// §4.4 stale-ack generator. Drains `conn.stale_q` head-first, coalescing into SACK frames the
/// same way, except `sack_base_seq` is taken from the first drained entry rather than
/// `conn.seq_ack`, and `conn.seq_ack` is never advanced by this path.
pub fn generate_stale_acks(conn: &mut Connection, max_entries: usize) -> Result<usize> {
	let mut emitted = 0;
	let mut builder: Option<Builder> = None;
	let mut expected_next: Option<u64> = None;

	for _ in 0..max_entries {
		let Some(entry) = conn.stale_q.peek_front() else { break };
		let seq = entry.seq;

		if let Some(expected) = expected_next {
			if seq + 1 == expected {
				debug!("duplicate stale seq {seq}, dropping");
				conn.stale_q.pop_front();
				continue;
			}
			if seq < expected {
				return Err(EtcpError::Fatal("stale ack sequence went backward"));
			}
		}

		let entry = conn.stale_q.pop_front().expect("just peeked");
		let b = builder.get_or_insert_with(|| Builder::new(seq));
		let ts = entry.pbuff.head().sw_rx;
		b.record(seq, ts, true);
		expected_next = Some(seq + 1);

		if b.is_full() {
			let mut taken = builder.take().expect("just inserted");
			emit_stale(conn, &mut taken)?;
			emitted += 1;
		}
	}

	if let Some(mut b) = builder {
		if !b.is_empty() {
			emit_stale(conn, &mut b)?;
			emitted += 1;
		}
	}

	Ok(emitted)
}

fn emit_stale(conn: &mut Connection, builder: &mut Builder) -> Result<()> {
	let dst_mac = conn.flow_id.src_addr;
	let src_mac = conn.flow_id.dst_addr;
	let dst_port = conn.flow_id.src_port;
	let src_port = conn.flow_id.dst_port;

	let pbuff = build_sack(
		dst_mac,
		src_mac,
		conn.vlan,
		src_port,
		dst_port,
		builder.sack_base_seq,
		builder.time_first.unwrap_or_default(),
		builder.time_last.unwrap_or_default(),
		&builder.fields,
	);

	conn.tx_q.push_next(pbuff).map_err(|_| EtcpError::TryAgain)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::{FlowId, LinkOptions};
	use crate::frame::build_dat;

	fn conn() -> Connection {
		let flow = FlowId::new(1, 15, 2, 14);
		let opts = LinkOptions { window_size_log2: 4, buff_size: 1500, vlan: None, priority: 0 };
		Connection::new(flow, &opts)
	}

	fn commit_dat(conn: &mut Connection, seq: u64, no_ack: bool) {
		let pbuff = build_dat(2, 1, None, 15, 14, seq, no_ack, false, b"x");
		conn.rx_q.push(pbuff, seq).unwrap();
		conn.rx_q.commit(seq).unwrap();
	}

	#[test]
	fn in_order_burst_coalesces_into_one_field() {
		let mut c = conn();
		for seq in 0..4 {
			commit_dat(&mut c, seq, false);
		}
		let emitted = generate_acks(&mut c, 16).unwrap();
		assert_eq!(emitted, 1);
		assert_eq!(c.seq_ack, 4);

		let (_, pbuff) = c.tx_q.get_next_rd().unwrap();
		let hdr = pbuff.sack_hdr();
		assert_eq!(hdr.sack_base_seq.get(), 0);
		assert_eq!(hdr.sack_count.get(), 1);
		let fields = pbuff.sack_fields();
		assert_eq!(fields[0].offset.get(), 0);
		assert_eq!(fields[0].count.get(), 4);
	}

	#[test]
	fn one_gap_yields_two_fields_and_partial_advance() {
		let mut c = conn();
		commit_dat(&mut c, 0, false);
		commit_dat(&mut c, 1, false);
		commit_dat(&mut c, 3, false);
		commit_dat(&mut c, 4, false);

		let emitted = generate_acks(&mut c, 16).unwrap();
		assert_eq!(emitted, 1);
		// only the leading contiguous run is locked into seq_ack.
		assert_eq!(c.seq_ack, 2);

		let (_, pbuff) = c.tx_q.get_next_rd().unwrap();
		let fields = pbuff.sack_fields();
		assert_eq!(fields.len(), 2);
		assert_eq!((fields[0].offset.get(), fields[0].count.get()), (0, 2));
		assert_eq!((fields[1].offset.get(), fields[1].count.get()), (3, 2));
	}

	#[test]
	fn stale_ack_does_not_touch_seq_ack() {
		let mut c = conn();
		c.seq_ack = 4;
		let pbuff = build_dat(2, 1, None, 15, 14, 0, false, false, b"x");
		c.stale_q.insert(0, pbuff);

		let emitted = generate_stale_acks(&mut c, 16).unwrap();
		assert_eq!(emitted, 1);
		assert_eq!(c.seq_ack, 4);
	}
}
