use core::fmt;

/// Errors returned by core protocol operations.
///
/// Packet-level faults ([`EtcpError::BadPacket`], [`EtcpError::RejectedConnection`],
/// [`EtcpError::OutOfRange`]) are expected traffic and are logged then absorbed by the ingress
/// pump rather than propagated to the host. [`EtcpError::TryAgain`] means the caller made what
/// progress it could and should be invoked again. [`EtcpError::Fatal`] means an invariant the
/// core relies on was violated; the host should treat the connection as unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtcpError {
	/// A frame failed to parse: too short, bad magic/version, or an unrecognized message type.
	BadPacket,
	/// No listener or connection matches the frame's flow.
	RejectedConnection,
	/// A sequence number fell outside the addressable window of a queue.
	OutOfRange,
	/// The operation could not complete because a resource (slot, send capacity) is exhausted;
	/// retry later.
	TryAgain,
	/// An internal structure (circular queue or hash table) reached an inconsistent state.
	Structural,
	/// An invariant the core depends on was violated.
	Fatal(&'static str),
}

impl fmt::Display for EtcpError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::BadPacket => write!(f, "malformed packet"),
			Self::RejectedConnection => write!(f, "no matching listener or connection"),
			Self::OutOfRange => write!(f, "sequence number out of window"),
			Self::TryAgain => write!(f, "resource temporarily unavailable"),
			Self::Structural => write!(f, "internal structure inconsistent"),
			Self::Fatal(reason) => write!(f, "fatal protocol error: {reason}"),
		}
	}
}

impl std::error::Error for EtcpError {}

/// Local alias matching the crate-wide convention of a defaulted-success-type `Result`.
pub type Result<T = ()> = core::result::Result<T, EtcpError>;
