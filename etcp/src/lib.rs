//! Core implementation of a reliable, connection-oriented datagram transport that runs directly
//! over a framed link layer.
//!
//! The core is pump-driven, not event-loop-driven: it exposes non-blocking operations
//! ([`ingress::do_net_rx`], [`sack::generate_acks`], [`sack::generate_stale_acks`],
//! [`egress::do_net_tx`], [`user::user_tx`], [`user::user_rx`]) and a host repeatedly invokes
//! them in whatever order and cadence it likes. Nothing here starts a thread, blocks, or owns a
//! clock beyond sampling it for timestamps.
//!
//! Physical link I/O and the concrete Transmission Control policy are host-supplied, via the
//! [`tc::Link`], [`tc::TxTc`], and [`tc::RxTc`] traits. Everything else — the sliding-window
//! send/receive queues, the demultiplexing tables, the ingress state machine, and the SACK
//! generator — lives in this crate.

pub mod config;
pub mod connection;
pub mod demux;
pub mod egress;
pub mod error;
pub mod frame;
pub mod hashtable;
pub mod ingress;
pub mod queue;
pub mod sack;
pub mod stale;
pub mod tc;
pub mod user;

pub use connection::{Connection, FlowId, LAMap, LinkOptions};
pub use demux::State;
pub use error::{EtcpError, Result};
pub use tc::{Link, LinkError, RxTc, TxTc};
