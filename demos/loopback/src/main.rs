//! Runs the "single send" scenario end to end over an in-memory link, logging each pump
//! invocation so the protocol's driver-style control flow is visible.

use etcp::connection::LinkOptions;
use etcp::demux::State;
use etcp::tc::AlwaysSend;
use etcp::{egress, ingress, sack, user};
use loopback_demo::LoopbackLink;
use log::{info, LevelFilter};

const CLIENT_ADDR: u64 = 0x000001;
const CLIENT_PORT: u32 = 0x0F;
const SERVER_ADDR: u64 = 0x000002;
const SERVER_PORT: u32 = 0x0E;

fn opts() -> LinkOptions {
	LinkOptions { window_size_log2: 3, buff_size: 1500, vlan: None, priority: 0 }
}

fn main() {
	runtime::init(LevelFilter::Debug);

	let (mut client_link, mut server_link) = LoopbackLink::pair();
	let mut tc = AlwaysSend;

	let mut client = State::new();
	client.connect(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT, opts());

	let mut server = State::new();
	server.listen(SERVER_ADDR, SERVER_PORT, opts());

	let payload: Vec<u8> = (0xAAu8..=0xB9u8).collect();
	info!("client: user_tx {} bytes", payload.len());
	let conn = client.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap();
	user::user_tx(conn, SERVER_ADDR, CLIENT_ADDR, &payload).unwrap();

	info!("client: egress pass");
	egress::apply_tx_tc(conn, &mut tc);
	egress::do_net_tx(conn, &mut client_link, 16).unwrap();

	info!("server: ingress pass");
	ingress::do_net_rx(&mut server, &mut server_link, 16).unwrap();

	let server_conn = server.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap();
	info!("server: generate_acks");
	sack::generate_acks(server_conn, 16).unwrap();

	info!("server: egress pass (ack)");
	egress::apply_tx_tc(server_conn, &mut tc);
	egress::do_net_tx(server_conn, &mut server_link, 16).unwrap();

	info!("client: ingress pass (ack)");
	ingress::do_net_rx(&mut client, &mut client_link, 16).unwrap();

	let mut out = [0u8; 16];
	let server_conn = server.get_mut(CLIENT_ADDR, CLIENT_PORT, SERVER_ADDR, SERVER_PORT).unwrap();
	let n = user::user_rx(server_conn, &mut out).unwrap();
	info!("server: user_rx delivered {n} bytes: {:02x?}", &out[..n]);
	assert_eq!(&out[..n], payload.as_slice());

	info!("single-send scenario complete");
}
