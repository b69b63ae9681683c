//! An in-memory [`etcp::Link`] connecting two endpoints directly, with no real hardware — used by
//! `main.rs`'s walkthrough and by this crate's own tests to exercise the end-to-end scenarios
//! against the core without a physical NIC.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use etcp::tc::{HwTimestamp, Link, LinkError};

/// One side of an in-memory point-to-point link. `send` enqueues onto the peer's inbox; `recv`
/// dequeues from this side's own inbox. Never blocks: an empty inbox is `Ok(None)`, matching the
/// link callback contract (§6).
pub struct LoopbackLink {
	inbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
	outbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
}

impl LoopbackLink {
	/// Builds a connected pair: whatever the first endpoint sends, the second receives, and vice
	/// versa.
	pub fn pair() -> (Self, Self) {
		let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
		let b_to_a = Rc::new(RefCell::new(VecDeque::new()));
		let a = Self { inbox: b_to_a.clone(), outbox: a_to_b.clone() };
		let b = Self { inbox: a_to_b, outbox: b_to_a };
		(a, b)
	}
}

impl Link for LoopbackLink {
	fn send(&mut self, frame: &[u8]) -> Result<HwTimestamp, LinkError> {
		self.outbox.borrow_mut().push_back(frame.to_vec());
		Ok(HwTimestamp(Some(0)))
	}

	fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, HwTimestamp)>, LinkError> {
		let Some(frame) = self.inbox.borrow_mut().pop_front() else {
			return Ok(None);
		};
		buf[..frame.len()].copy_from_slice(&frame);
		Ok(Some((frame.len(), HwTimestamp(Some(0)))))
	}
}

#[cfg(test)]
mod tests {
	use etcp::connection::LinkOptions;
	use etcp::demux::State;
	use etcp::error::EtcpError;
	use etcp::tc::AlwaysSend;
	use etcp::{egress, ingress, sack, user};

	use super::*;

	const CLIENT_ADDR: u64 = 0x000001;
	const CLIENT_PORT: u32 = 0x0F;
	const SERVER_ADDR: u64 = 0x000002;
	const SERVER_PORT: u32 = 0x0E;

	fn opts(window_size_log2: u32) -> LinkOptions {
		LinkOptions { window_size_log2, buff_size: 1500, vlan: None, priority: 0 }
	}

	struct Harness {
		client: State,
		server: State,
		client_link: LoopbackLink,
		server_link: LoopbackLink,
		tc: AlwaysSend,
	}

	impl Harness {
		fn new(window_size_log2: u32) -> Self {
			let (client_link, server_link) = LoopbackLink::pair();
			let mut client = State::new();
			client.connect(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT, opts(window_size_log2));

			let mut server = State::new();
			server.listen(SERVER_ADDR, SERVER_PORT, opts(window_size_log2));

			Self { client, server, client_link, server_link, tc: AlwaysSend }
		}

		fn client_conn(&mut self) -> &mut etcp::connection::Connection {
			self.client.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap()
		}

		fn server_conn(&mut self) -> &mut etcp::connection::Connection {
			// the connection's flow_id always has src = the original DAT's sender (the client),
			// regardless of which side (client's `connect`, server's admission) created it.
			self.server.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap()
		}

		/// Drives the client's DAT frames to the server: TC gate, egress, ingress.
		fn deliver_client_to_server(&mut self) {
			let Self { client, client_link, tc, .. } = self;
			let conn = client.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap();
			egress::apply_tx_tc(conn, tc);
			egress::do_net_tx(conn, client_link, 16).unwrap();
			ingress::do_net_rx(&mut self.server, &mut self.server_link, 16).unwrap();
		}

		/// Generates acks on the server for whatever it has received, then delivers them back to
		/// the client.
		fn ack_server_to_client(&mut self) {
			let Self { server, server_link, tc, .. } = self;
			let conn = server.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap();
			sack::generate_acks(conn, 16).unwrap();
			egress::apply_tx_tc(conn, tc);
			egress::do_net_tx(conn, server_link, 16).unwrap();
			ingress::do_net_rx(&mut self.client, &mut self.client_link, 16).unwrap();
		}
	}

	#[test]
	fn single_send_round_trip() {
		let mut h = Harness::new(3);
		let payload: Vec<u8> = (0xAAu8..=0xB9u8).collect();
		assert_eq!(payload.len(), 16);

		let sent = user::user_tx(h.client_conn(), SERVER_ADDR, CLIENT_ADDR, &payload).unwrap();
		assert_eq!(sent, 16);

		h.deliver_client_to_server();
		h.ack_server_to_client();

		let mut out = [0u8; 16];
		let n = user::user_rx(h.server_conn(), &mut out).unwrap();
		assert_eq!(n, 16);
		assert_eq!(&out[..n], payload.as_slice());
		assert_eq!(h.server_conn().rx_q.rd_min(), 1);

		assert!(!h.client_conn().tx_q.is_committed(0));
	}

	#[test]
	fn in_order_burst_of_four() {
		let mut h = Harness::new(4);
		for _ in 0..4 {
			user::user_tx(h.client_conn(), SERVER_ADDR, CLIENT_ADDR, &[0u8; 128]).unwrap();
		}

		h.deliver_client_to_server();
		h.ack_server_to_client();

		assert_eq!(h.server_conn().seq_ack, 4);
		assert_eq!(h.client_conn().tx_q.rd_min(), 4);
	}

	#[test]
	fn ordered_multi_packet_delivery() {
		// the server's rx_q is populated exclusively via `ingress::on_dat`'s `push(seq)` (never
		// `push_next`); each of these four packets must be delivered, in order, not just the
		// first one.
		let mut h = Harness::new(4);
		let payloads: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i; 32]).collect();
		for payload in &payloads {
			user::user_tx(h.client_conn(), SERVER_ADDR, CLIENT_ADDR, payload).unwrap();
		}

		h.deliver_client_to_server();
		h.ack_server_to_client();

		for (i, payload) in payloads.iter().enumerate() {
			let mut out = [0u8; 32];
			let n = user::user_rx(h.server_conn(), &mut out).unwrap();
			assert_eq!(n, payload.len());
			assert_eq!(&out[..n], payload.as_slice());
			assert_eq!(h.server_conn().rx_q.rd_min(), i as u64 + 1);
		}
	}

	#[test]
	fn window_overflow_is_rejected() {
		let mut h = Harness::new(3); // window size 8
		let conn = h.client_conn();
		assert_eq!(conn.tx_q.push(etcp::frame::PBuff::default(), 9), Err(EtcpError::OutOfRange));
	}
}
