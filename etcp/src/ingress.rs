//! `do_net_rx`: pulls frames off the link, classifies them, and routes DAT/ACK frames to the
//! connection they belong to.
//!
//! Grounded on `etcpOnNetRx`/`etcpOnRxDat`/`etcpOnRxAck` in
//! `examples/original_source/src/etcp.c`. Preserves the DAT-vs-ACK key-swap asymmetry (see
//! `crate::demux`, §9 Design Notes (2)) and the window classification rule (`seq < rdMin` stale,
//! `seq >= wrMax` out of range).

use std::time::{SystemTime, UNIX_EPOCH};

use bilge::prelude::*;
use log::{debug, warn};

use crate::config::MAX_FRAME;
use crate::connection::{AckSample, Connection, FlowId};
use crate::demux::State;
use crate::error::{EtcpError, Result};
use crate::frame::{self, Body, DatFlags, MsgType, PBuff};
use crate::tc::{HwTimestamp, Link, LinkError};

fn now_ns() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

/// Stamps the hardware and software RX timestamps into the message header at `[head_off,
/// body_off)` of `buf`, in place.
fn stamp_rx(buf: &mut [u8], head_off: usize, body_off: usize, hw_rx: HwTimestamp) {
	let head: &mut frame::MsgHead = utils::bytes::cast_mut(&mut buf[head_off..body_off]);
	match hw_rx.0 {
		Some(nanos) => head.hw_rx.set(nanos),
		None => head.hw_rx = frame::TimeSample::default(),
	}
	head.sw_rx.set(now_ns());
}

/// Drives up to `max` frames off `link` into `state`. Per-frame errors are logged and absorbed;
/// the loop only stops early on a fatal link error. Returns the number of frames read (whether or
/// not each was ultimately admitted).
pub fn do_net_rx(state: &mut State, link: &mut impl Link, max: usize) -> Result<usize> {
	let mut scratch = [0u8; MAX_FRAME];
	let mut processed = 0;

	while processed < max {
		let (len, hw_rx) = match link.recv(&mut scratch) {
			Ok(Some(pair)) => pair,
			Ok(None) => break,
			Err(LinkError(reason)) => {
				warn!("link rx error: {reason}");
				return Err(EtcpError::TryAgain);
			}
		};

		if let Err(e) = on_frame(state, &mut scratch[..len], hw_rx) {
			warn!("dropping inbound frame: {e}");
		}
		processed += 1;
	}

	Ok(processed)
}

fn on_frame(state: &mut State, buf: &mut [u8], hw_rx: HwTimestamp) -> Result<()> {
	let (head_off, body_off) = {
		let decoded = frame::decode(buf)?;
		(decoded.head_off, decoded.body_off)
	};
	stamp_rx(buf, head_off, body_off, hw_rx);

	let decoded = frame::decode(buf)?;
	let src_port = decoded.head.src_port.get();
	let dst_port = decoded.head.dst_port.get();
	let dst_addr = decoded.dst_mac;
	let src_addr = decoded.src_mac;

	match decoded.body {
		Body::Dat { hdr, .. } => {
			let seq = hdr.seq_num.get();
			let no_ack = hdr.flags.no_ack();
			drop(decoded);
			on_dat(state, FlowId::new(src_addr, src_port, dst_addr, dst_port), buf, seq, no_ack)
		}
		Body::Ack { hdr, fields } => {
			let sack_base_seq = hdr.sack_base_seq.get();
			let time_last = hdr.time_last;
			let fields: Vec<_> = fields.to_vec();
			drop(decoded);
			on_ack(state, FlowId::new(src_addr, src_port, dst_addr, dst_port), sack_base_seq, time_last, &fields)
		}
		Body::Fin => {
			debug!("fin received from {src_addr:#x}:{src_port}, teardown unimplemented");
			Ok(())
		}
	}
}

/// §4.3.1.
fn on_dat(state: &mut State, flow: FlowId, raw: &[u8], seq: u64, no_ack: bool) -> Result<()> {
	let conn = state.admit_dat(flow)?;

	let rd_min = conn.rx_q.rd_min();
	let wr_max = conn.rx_q.wr_max();

	if seq >= wr_max {
		warn!("dat seq {seq} beyond rx window [{rd_min},{wr_max}), dropping");
		return Err(EtcpError::OutOfRange);
	}

	if seq < rd_min {
		if no_ack {
			debug!("stale dat seq {seq} with no_ack, dropping silently");
			return Ok(());
		}
		let mut pbuff = PBuff::from_bytes(raw)?;
		mark_stale(&mut pbuff);
		conn.stale_q.insert(seq, pbuff);
		return Ok(());
	}

	if conn.rx_q.is_committed(seq) {
		debug!("duplicate commit at seq {seq}, prior copy wins");
		return Ok(());
	}

	let pbuff = PBuff::from_bytes(raw)?;
	conn.rx_q.push(pbuff, seq)?;
	conn.rx_q.commit(seq)?;
	Ok(())
}

fn mark_stale(pbuff: &mut PBuff) {
	let flags = pbuff.dat_hdr().flags;
	pbuff.dat_hdr_mut().flags = DatFlags::new(flags.no_ack(), flags.no_ret(), true, flags.ack_sent(), u4::new(0));
}

/// §4.3.2.
fn on_ack(
	state: &mut State,
	flow: FlowId,
	sack_base_seq: u64,
	time_last: frame::TimeSample,
	fields: &[frame::SackField],
) -> Result<()> {
	let conn = state.admit_ack(flow)?;

	let rx_time = now_ns();
	record_sack_summary(conn, sack_base_seq, fields, rx_time);

	for field in fields {
		let offset = field.offset.get() as u64;
		let count = field.count.get() as u64;
		for k in 0..count {
			let ack_seq = sack_base_seq + offset + k;
			process_one_ack(conn, ack_seq, time_last);
		}
	}

	Ok(())
}

fn record_sack_summary(conn: &mut Connection, sack_base_seq: u64, fields: &[frame::SackField], rx_time: u64) {
	let acked: u64 = fields.iter().map(|f| f.count.get() as u64).sum();
	conn.record_ack_sample(AckSample { seq: sack_base_seq, rtt_ns: 0 });
	debug!("ack summary base={sack_base_seq} acked={acked} at {rx_time}");
}

fn process_one_ack(conn: &mut Connection, ack_seq: u64, time_last: frame::TimeSample) {
	if ack_seq < conn.tx_q.rd_min() {
		return;
	}

	let Some(slot) = conn.tx_q.get(ack_seq) else {
		warn!("ack for uncommitted slot at seq {ack_seq}");
		return;
	};

	if slot.dat_hdr().seq_num.get() != ack_seq {
		warn!("ack for a packet that's gone at seq {ack_seq}");
		return;
	}

	let sw_tx = slot.head().sw_tx.get();
	if let (Some(sw_tx), Some(sw_rx)) = (sw_tx, time_last.get()) {
		let rtt_ns = sw_rx as i64 - sw_tx as i64;
		conn.record_ack_sample(AckSample { seq: ack_seq, rtt_ns });
		conn.record_rtt_sample(rtt_ns);
		debug!("rtt sample for seq {ack_seq}: {rtt_ns}ns");
	}

	let _ = conn.tx_q.release(ack_seq);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::LinkOptions;
	use crate::frame::build_dat;

	fn opts() -> LinkOptions {
		LinkOptions { window_size_log2: 3, buff_size: 1500, vlan: None, priority: 0 }
	}

	#[test]
	fn dat_ingress_commits_into_rx_window() {
		let mut state = State::new();
		state.listen(2, 14, opts());

		let pbuff = build_dat(2, 1, None, 15, 14, 0, false, false, b"hello");
		let raw = pbuff.bytes().to_vec();
		let mut buf = raw.clone();
		let (head_off, body_off) = {
			let d = frame::decode(&buf).unwrap();
			(d.head_off, d.body_off)
		};
		stamp_rx(&mut buf, head_off, body_off, HwTimestamp(Some(100)));

		on_frame(&mut state, &mut buf, HwTimestamp(Some(100))).unwrap();

		let conn = state.get_mut(1, 15, 2, 14).unwrap();
		assert!(conn.rx_q.is_committed(0));
		assert_eq!(conn.rx_q.get(0).unwrap().dat_payload(), b"hello");
	}

	#[test]
	fn dat_ingress_rejects_beyond_window() {
		let mut state = State::new();
		state.listen(2, 14, opts());

		let pbuff = build_dat(2, 1, None, 15, 14, 100, false, false, b"x");
		let mut buf = pbuff.bytes().to_vec();
		assert_eq!(on_frame(&mut state, &mut buf, HwTimestamp(None)), Err(EtcpError::OutOfRange));
	}
}
