//! Compile-time tunables.
//!
//! Window size and per-connection buffer size are genuine runtime parameters in the upstream
//! design (supplied when a connection is created) and are therefore fields on [`crate::connection::Connection`],
//! not constants here.

/// Maximum number of `(offset, count)` fields a single SACK frame may carry before it must be
/// flushed and a fresh frame started.
pub const ETCP_MAX_SACKS: usize = 16;

/// log2 of the number of buckets in a `LAMap`'s child-connection table.
pub const SRC_TAB_MAX_LOG2: u32 = 8;

/// log2 of the number of buckets in the top-level destination table.
pub const DST_TAB_MAX_LOG2: u32 = 8;

/// Initial-capacity hint (in entries) for a `LAMap`'s child-connection table, derived from
/// [`SRC_TAB_MAX_LOG2`]. Both backing structures grow past this on demand (see
/// `crate::hashtable::HashTable`).
pub const SRC_TAB_SIZE: usize = 1 << SRC_TAB_MAX_LOG2;

/// Initial-capacity hint (in entries) for the top-level destination table, derived from
/// [`DST_TAB_MAX_LOG2`].
pub const DST_TAB_SIZE: usize = 1 << DST_TAB_MAX_LOG2;

/// Scratch capacity for a single ingress frame, including Ethernet/VLAN encapsulation.
pub const MAX_FRAME: usize = 2048;

/// Number of recent incoming-SACK summaries retained per connection for the TX Transmission
/// Control policy to inspect (see `Connection::ack_rx`).
pub const ACK_RX_HISTORY: usize = 32;

/// Smoothing factor numerator/denominator for the RTT exponential moving average (1/8, matching
/// the classical TCP RTT estimator).
pub const RTT_ALPHA_NUM: i64 = 1;
pub const RTT_ALPHA_DENOM: i64 = 8;
