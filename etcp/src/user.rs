//! The user-facing send/receive boundary: `user_tx`/`user_rx`.
//!
//! Grounded on `etcpUserTx`/`etcpUserRx` (`examples/original_source/src/etcpConn.c`):
//! slot-spanning writes that report `TryAgain` on exhaustion, and head-only reads that refuse to
//! deliver a DAT before its ack has been generated.

use crate::connection::Connection;
use crate::error::{EtcpError, Result};
use crate::frame::build_dat;

/// Maximum payload bytes a single slot can carry, leaving room for link + protocol headers
/// within [`crate::config::MAX_FRAME`].
const MAX_DAT_PAYLOAD: usize = 1400;

/// §4.6 `user_tx`. Buffers as much of `data` as fits into consecutive `tx_q` slots starting at
/// `conn.seq_snd`, one slot per call-provided chunk of up to [`MAX_DAT_PAYLOAD`] bytes. Returns
/// the number of bytes actually buffered; if that is less than `data.len()`, the connection's
/// send window is full and the caller should retry with the remainder once acks free up slots.
pub fn user_tx(conn: &mut Connection, dst_mac: u64, src_mac: u64, data: &[u8]) -> Result<usize> {
	let mut sent = 0;

	while sent < data.len() {
		let chunk_end = (sent + MAX_DAT_PAYLOAD).min(data.len());
		let chunk = &data[sent..chunk_end];

		let pbuff = build_dat(
			dst_mac,
			src_mac,
			conn.vlan,
			conn.flow_id.src_port,
			conn.flow_id.dst_port,
			conn.seq_snd,
			false,
			false,
			chunk,
		);

		match conn.tx_q.push_next(pbuff) {
			Ok(_) => {
				conn.tx_q.commit(conn.seq_snd).map_err(|_| EtcpError::Structural)?;
				conn.seq_snd += 1;
				sent = chunk_end;
			}
			Err(_) => return Err(EtcpError::TryAgain),
		}
	}

	Ok(sent)
}

/// §4.6 `user_rx`. Consumes the head of `conn.rx_q`: a slot not yet `ack_sent` means we must not
/// deliver before the peer has been told, and returns `TryAgain`. A stale slot (left over from an
/// out-of-window arrival — normally these live in `stale_q`, not `rx_q`, but a defensive check
/// costs nothing) is released and skipped. Otherwise copies the payload out and releases the
/// slot.
pub fn user_rx(conn: &mut Connection, out: &mut [u8]) -> Result<usize> {
	loop {
		let Some((seq, _)) = conn.rx_q.get_next_rd() else {
			return Err(EtcpError::TryAgain);
		};

		let slot = conn.rx_q.get(seq).expect("get_next_rd just confirmed this");
		if !slot.dat_hdr().flags.ack_sent() {
			return Err(EtcpError::TryAgain);
		}

		let payload = slot.dat_payload();
		let n = payload.len().min(out.len());
		out[..n].copy_from_slice(&payload[..n]);

		conn.rx_q.release(seq).map_err(|_| EtcpError::Structural)?;
		return Ok(n);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connection::{FlowId, LinkOptions};

	fn conn() -> Connection {
		let flow = FlowId::new(1, 15, 2, 14);
		let opts = LinkOptions { window_size_log2: 2, buff_size: 1500, vlan: None, priority: 0 };
		Connection::new(flow, &opts)
	}

	#[test]
	fn user_tx_fills_consecutive_slots() {
		let mut c = conn();
		let n = user_tx(&mut c, 2, 1, &[0xAAu8; 16]).unwrap();
		assert_eq!(n, 16);
		assert_eq!(c.seq_snd, 1);
		assert!(c.tx_q.is_committed(0));
	}

	#[test]
	fn user_tx_reports_try_again_when_window_is_full() {
		let mut c = conn();
		// window size is 4; one call per byte forces 16 distinct slots and exhausts it.
		for _ in 0..4 {
			user_tx(&mut c, 2, 1, &[0u8; 1]).unwrap();
		}
		assert_eq!(user_tx(&mut c, 2, 1, &[0u8; 1]), Err(EtcpError::TryAgain));
	}

	#[test]
	fn user_rx_withholds_until_ack_sent() {
		let mut c = conn();
		let pbuff = crate::frame::build_dat(2, 1, None, 15, 14, 0, false, false, b"hi");
		c.rx_q.push(pbuff, 0).unwrap();
		c.rx_q.commit(0).unwrap();

		let mut buf = [0u8; 8];
		assert_eq!(user_rx(&mut c, &mut buf), Err(EtcpError::TryAgain));
	}

	#[test]
	fn user_rx_delivers_after_ack_sent() {
		let mut c = conn();

		let pbuff = {
			let mut p = crate::frame::build_dat(2, 1, None, 15, 14, 0, false, false, b"hi");
			let flags = p.dat_hdr().flags;
			p.dat_hdr_mut().flags =
				crate::frame::DatFlags::new(flags.no_ack(), flags.no_ret(), flags.stale_dat(), true, bilge::prelude::u4::new(0));
			p
		};
		c.rx_q.push(pbuff, 0).unwrap();
		c.rx_q.commit(0).unwrap();

		let mut buf = [0u8; 8];
		let read = user_rx(&mut c, &mut buf).unwrap();
		assert_eq!(&buf[..read], b"hi");
	}
}
