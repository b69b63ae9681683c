//! Ethernet (+ optional 802.1Q) encapsulation and the protocol's own wire headers.
//!
//! All integer fields are little-endian on the wire (see [`utils::endian`]); headers are laid
//! out with `#[repr(C)]` over the endian wrapper types so they can be cast directly onto frame
//! bytes via [`macros::Cast`].

use core::mem::size_of;

use bilge::prelude::*;
use macros::Cast;
use utils::bytes::{as_slice, as_slice_mut, cast, cast_mut};
use utils::endian::{u16be, u16le, u32le, u64le};

use crate::config::MAX_FRAME;
use crate::error::{EtcpError, Result};

/// EtherType used for untagged protocol frames.
pub const ETH_P_ETCP: u16 = 0x8888;
/// EtherType marking an 802.1Q VLAN tag; the real EtherType follows the tag.
pub const ETH_P_8021Q: u16 = 0x8100;

pub const ETH_ALEN: usize = 6;
/// Ethernet header (two MACs + EtherType), no FCS.
pub const ETH_HLEN: usize = 14;
/// Trailing frame check sequence carried by the link layer, excluded from `msgSize` here.
pub const ETH_FCS_LEN: usize = 4;
/// Minimum legal Ethernet frame length, FCS included.
pub const ETH_ZLEN: usize = 60;

pub const ETCP_MAGIC: u16 = 0xE7C9;
pub const ETCP_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
	Dat = 1,
	Ack = 2,
	Fin = 3,
}

impl TryFrom<u8> for MsgType {
	type Error = EtcpError;

	fn try_from(value: u8) -> Result<Self> {
		match value {
			1 => Ok(Self::Dat),
			2 => Ok(Self::Ack),
			3 => Ok(Self::Fin),
			_ => Err(EtcpError::BadPacket),
		}
	}
}

/// A hardware or software timestamp, nanoseconds since an unspecified epoch, with an explicit
/// validity flag (hardware timestamping is not always available).
#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct TimeSample {
	pub nanos: u64le,
	pub valid: u8,
}

impl Default for TimeSample {
	fn default() -> Self {
		Self { nanos: 0u64.into(), valid: 0 }
	}
}

impl TimeSample {
	pub fn set(&mut self, nanos: u64) {
		self.nanos = nanos.into();
		self.valid = 1;
	}

	pub fn get(self) -> Option<u64> {
		(self.valid != 0).then(|| self.nanos.get())
	}
}

#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct Ethernet {
	pub dst: [u8; ETH_ALEN],
	pub src: [u8; ETH_ALEN],
	pub ether_type: u16be,
}

/// The fixed part of every protocol message, regardless of type.
#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct MsgHead {
	pub magic: u16le,
	pub version: u8,
	pub msg_type: u8,
	pub src_port: u32le,
	pub dst_port: u32le,
	pub hw_rx: TimeSample,
	pub sw_rx: TimeSample,
	pub hw_tx: TimeSample,
	pub sw_tx: TimeSample,
}

impl MsgHead {
	pub fn new(msg_type: MsgType, src_port: u32, dst_port: u32) -> Self {
		Self {
			magic: ETCP_MAGIC.into(),
			version: ETCP_VERSION,
			msg_type: msg_type as u8,
			src_port: src_port.into(),
			dst_port: dst_port.into(),
			hw_rx: TimeSample::default(),
			sw_rx: TimeSample::default(),
			hw_tx: TimeSample::default(),
			sw_tx: TimeSample::default(),
		}
	}
}

#[bitsize(8)]
#[derive(FromBits, Cast, Clone, Copy)]
#[repr(C)]
pub struct DatFlags {
	pub no_ack: bool,
	pub no_ret: bool,
	pub stale_dat: bool,
	pub ack_sent: bool,
	reserved: u4,
}

#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct DatHdr {
	pub seq_num: u64le,
	pub dat_len: u64le,
	pub tx_attempts: u32le,
	pub flags: DatFlags,
}

#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct SackField {
	pub offset: u16le,
	pub count: u16le,
}

#[derive(Cast, Clone, Copy)]
#[repr(C)]
pub struct SackHdr {
	pub sack_base_seq: u64le,
	pub sack_count: u16le,
	pub time_first: TimeSample,
	pub time_last: TimeSample,
}

/// The parsed body of a message, borrowing from the decoded frame.
pub enum Body<'a> {
	Dat { hdr: &'a DatHdr, payload: &'a [u8] },
	Ack { hdr: &'a SackHdr, fields: &'a [SackField] },
	Fin,
}

/// A fully decoded incoming frame: link addresses plus the parsed protocol message.
///
/// `head_off`/`body_off` are the byte offsets (from the start of the original buffer) of the
/// fixed message header and the DAT/SACK header that follows it, respectively — callers that
/// need to retain the frame (admitting it into a queue) use these to avoid re-deriving the
/// link-layer framing a second time.
pub struct Decoded<'a> {
	pub dst_mac: u64,
	pub src_mac: u64,
	pub vlan: Option<u16>,
	pub head_off: usize,
	pub body_off: usize,
	pub head: &'a MsgHead,
	pub body: Body<'a>,
}

fn mac_to_u64(bytes: &[u8; ETH_ALEN]) -> u64 {
	let mut out = 0u64;
	for &b in bytes {
		out = (out << 8) | b as u64;
	}
	out
}

fn u64_to_mac(addr: u64) -> [u8; ETH_ALEN] {
	let mut out = [0u8; ETH_ALEN];
	for (i, slot) in out.iter_mut().enumerate() {
		*slot = (addr >> (8 * (ETH_ALEN - 1 - i))) as u8;
	}
	out
}

/// Decapsulates the Ethernet (and optional VLAN) layer and parses the protocol message that
/// follows. `buf` is the whole received frame, FCS excluded.
pub fn decode(buf: &[u8]) -> Result<Decoded<'_>> {
	if buf.len() < ETH_ZLEN - ETH_FCS_LEN {
		return Err(EtcpError::BadPacket);
	}

	let eth: &Ethernet = cast(&buf[..core::mem::size_of::<Ethernet>()]);
	let dst_mac = mac_to_u64(&eth.dst);
	let src_mac = mac_to_u64(&eth.src);

	let (vlan, head_off) = match eth.ether_type.get() {
		ETH_P_ETCP => (None, ETH_HLEN),
		ETH_P_8021Q => {
			if buf.len() < ETH_HLEN + 4 {
				return Err(EtcpError::BadPacket);
			}
			let tci = u16::from_be_bytes([buf[ETH_HLEN], buf[ETH_HLEN + 1]]);
			let inner_type = u16::from_be_bytes([buf[ETH_HLEN + 2], buf[ETH_HLEN + 3]]);
			if inner_type != ETH_P_ETCP {
				return Err(EtcpError::BadPacket);
			}
			(Some(tci), ETH_HLEN + 4)
		}
		_ => return Err(EtcpError::BadPacket),
	};

	let rest = buf.get(head_off..).ok_or(EtcpError::BadPacket)?;
	let head_size = size_of::<MsgHead>();
	if rest.len() < head_size {
		return Err(EtcpError::BadPacket);
	}
	let head: &MsgHead = cast(&rest[..head_size]);

	if head.magic.get() != ETCP_MAGIC || head.version != ETCP_VERSION {
		return Err(EtcpError::BadPacket);
	}

	let body_off = head_off + head_size;
	let rest = &rest[head_size..];
	let msg_type = MsgType::try_from(head.msg_type)?;

	let body = match msg_type {
		MsgType::Dat => {
			let dat_size = size_of::<DatHdr>();
			if rest.len() < dat_size {
				return Err(EtcpError::BadPacket);
			}
			let hdr: &DatHdr = cast(&rest[..dat_size]);
			let dat_len = hdr.dat_len.get() as usize;
			let payload = rest.get(dat_size..dat_size + dat_len).ok_or(EtcpError::BadPacket)?;
			Body::Dat { hdr, payload }
		}
		MsgType::Ack => {
			let sack_size = size_of::<SackHdr>();
			if rest.len() < sack_size {
				return Err(EtcpError::BadPacket);
			}
			let hdr: &SackHdr = cast(&rest[..sack_size]);
			let count = hdr.sack_count.get() as usize;
			let field_size = size_of::<SackField>();
			let fields_bytes = rest.get(sack_size..sack_size + count * field_size).ok_or(EtcpError::BadPacket)?;
			let fields: &[SackField] = as_slice(fields_bytes);
			Body::Ack { hdr, fields }
		}
		MsgType::Fin => Body::Fin,
	};

	Ok(Decoded { dst_mac, src_mac, vlan, head_off, body_off, head, body })
}

/// Gating state a Transmission Control policy sets on a queued slot between producer and
/// egress; the core never moves a slot from `Rdy` to `Now` on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxState {
	#[default]
	Rdy,
	Now,
	Drp,
}

/// A slot-resident packet: the raw frame bytes plus the bookkeeping egress/TC need. Embedded
/// directly (no heap box) so that a queue's backing `Vec` of slots is the only allocation the
/// data path makes.
///
/// `head_off`/`body_off` mirror [`Decoded`]'s offsets of the same name, kept alongside the bytes
/// so a slot built by [`build_dat`]/[`build_sack`] or admitted from [`decode`] doesn't need to be
/// re-parsed on every subsequent access (timestamp stamping, sack inspection, retransmission).
pub struct PBuff {
	pub buf: [u8; MAX_FRAME],
	pub len: usize,
	pub head_off: usize,
	pub body_off: usize,
	pub tx_state: TxState,
	pub tx_attempts: u32,
}

impl Default for PBuff {
	fn default() -> Self {
		Self {
			buf: [0; MAX_FRAME],
			len: 0,
			head_off: 0,
			body_off: 0,
			tx_state: TxState::default(),
			tx_attempts: 0,
		}
	}
}

impl PBuff {
	pub fn bytes(&self) -> &[u8] {
		&self.buf[..self.len]
	}

	pub fn bytes_mut(&mut self) -> &mut [u8] {
		&mut self.buf[..self.len]
	}

	/// Builds a slot directly from already-encoded bytes, re-deriving `head_off`/`body_off` by
	/// decoding them. Used by tests and by ingress admission, which copies a received frame into
	/// a fresh slot before retaining it.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
		let decoded = decode(bytes)?;
		let head_off = decoded.head_off;
		let body_off = decoded.body_off;
		let mut p = Self::default();
		p.len = bytes.len();
		p.buf[..bytes.len()].copy_from_slice(bytes);
		p.head_off = head_off;
		p.body_off = body_off;
		Ok(p)
	}

	pub fn head(&self) -> &MsgHead {
		cast(&self.buf[self.head_off..self.body_off])
	}

	pub fn head_mut(&mut self) -> &mut MsgHead {
		let body_off = self.body_off;
		cast_mut(&mut self.buf[self.head_off..body_off])
	}

	pub fn dat_hdr(&self) -> &DatHdr {
		cast(&self.buf[self.body_off..self.body_off + size_of::<DatHdr>()])
	}

	pub fn dat_hdr_mut(&mut self) -> &mut DatHdr {
		let off = self.body_off;
		cast_mut(&mut self.buf[off..off + size_of::<DatHdr>()])
	}

	pub fn dat_payload(&self) -> &[u8] {
		let start = self.body_off + size_of::<DatHdr>();
		let dat_len = self.dat_hdr().dat_len.get() as usize;
		&self.buf[start..start + dat_len]
	}

	pub fn sack_hdr(&self) -> &SackHdr {
		cast(&self.buf[self.body_off..self.body_off + size_of::<SackHdr>()])
	}

	pub fn sack_hdr_mut(&mut self) -> &mut SackHdr {
		let off = self.body_off;
		cast_mut(&mut self.buf[off..off + size_of::<SackHdr>()])
	}

	pub fn sack_fields(&self) -> &[SackField] {
		let start = self.body_off + size_of::<SackHdr>();
		let count = self.sack_hdr().sack_count.get() as usize;
		as_slice(&self.buf[start..start + count * size_of::<SackField>()])
	}

	#[cfg(test)]
	pub fn new_dat(payload: &[u8]) -> Self {
		build_dat(0x1, 0x2, None, 1, 2, 0, false, false, payload)
	}
}

/// Writes the Ethernet (and, if `vlan` is set, 802.1Q) header into the front of `buf`, returning
/// the byte offset the caller should continue writing the protocol message at.
pub fn encode_link_header(buf: &mut [u8], dst_mac: u64, src_mac: u64, vlan: Option<u16>) -> usize {
	let eth: &mut Ethernet = cast_mut(&mut buf[..core::mem::size_of::<Ethernet>()]);
	eth.dst = u64_to_mac(dst_mac);
	eth.src = u64_to_mac(src_mac);

	match vlan {
		None => {
			eth.ether_type = ETH_P_ETCP.into();
			ETH_HLEN
		}
		Some(tci) => {
			eth.ether_type = ETH_P_8021Q.into();
			buf[ETH_HLEN..ETH_HLEN + 2].copy_from_slice(&tci.to_be_bytes());
			buf[ETH_HLEN + 2..ETH_HLEN + 4].copy_from_slice(&ETH_P_ETCP.to_be_bytes());
			ETH_HLEN + 4
		}
	}
}

/// Builds a fully-formed DAT frame: link header, [`MsgHead`], [`DatHdr`], and payload.
#[allow(clippy::too_many_arguments)]
pub fn build_dat(
	dst_mac: u64,
	src_mac: u64,
	vlan: Option<u16>,
	src_port: u32,
	dst_port: u32,
	seq_num: u64,
	no_ack: bool,
	no_ret: bool,
	payload: &[u8],
) -> PBuff {
	let mut p = PBuff::default();
	let head_off = encode_link_header(&mut p.buf, dst_mac, src_mac, vlan);
	let body_off = head_off + size_of::<MsgHead>();
	let dat_end = body_off + size_of::<DatHdr>();
	let payload_end = dat_end + payload.len();

	*cast_mut(&mut p.buf[head_off..body_off]) = MsgHead::new(MsgType::Dat, src_port, dst_port);
	*cast_mut(&mut p.buf[body_off..dat_end]) = DatHdr {
		seq_num: seq_num.into(),
		dat_len: (payload.len() as u64).into(),
		tx_attempts: 0u32.into(),
		flags: DatFlags::new(no_ack, no_ret, false, false, u4::new(0)),
	};
	p.buf[dat_end..payload_end].copy_from_slice(payload);

	p.head_off = head_off;
	p.body_off = body_off;
	p.len = payload_end;
	p
}

/// Builds a fully-formed ACK (SACK) frame: link header, [`MsgHead`], [`SackHdr`], and fields.
#[allow(clippy::too_many_arguments)]
pub fn build_sack(
	dst_mac: u64,
	src_mac: u64,
	vlan: Option<u16>,
	src_port: u32,
	dst_port: u32,
	sack_base_seq: u64,
	time_first: TimeSample,
	time_last: TimeSample,
	fields: &[SackField],
) -> PBuff {
	let mut p = PBuff::default();
	let head_off = encode_link_header(&mut p.buf, dst_mac, src_mac, vlan);
	let body_off = head_off + size_of::<MsgHead>();
	let sack_end = body_off + size_of::<SackHdr>();
	let fields_end = sack_end + fields.len() * size_of::<SackField>();

	*cast_mut(&mut p.buf[head_off..body_off]) = MsgHead::new(MsgType::Ack, src_port, dst_port);
	*cast_mut(&mut p.buf[body_off..sack_end]) = SackHdr {
		sack_base_seq: sack_base_seq.into(),
		sack_count: (fields.len() as u16).into(),
		time_first,
		time_last,
	};
	as_slice_mut::<SackField, _>(&mut p.buf[sack_end..fields_end]).copy_from_slice(fields);

	p.head_off = head_off;
	p.body_off = body_off;
	p.len = fields_end;
	p
}
