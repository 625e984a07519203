//! Unified message size limits for the netplay protocol.

use crate::msg_id::MsgId;

/// Maximum payload size for control messages (console/port/session
/// management, key-press batches, ping/pong).
pub const MAX_CONTROL_PAYLOAD: usize = 4 * 1024;

/// Maximum payload size for a data-carrying message. Nothing on this wire
/// needs it today; kept as a separate ceiling so a future bulk-transfer
/// message doesn't have to share the control budget.
pub const MAX_DATA_PAYLOAD: usize = 64 * 1024;

/// Maximum frame size (header + payload).
pub const MAX_TCP_FRAME: usize = crate::constants::HEADER_LEN + MAX_DATA_PAYLOAD;

/// TCP receive buffer cap before a connection is dropped as misbehaving.
pub const TCP_RX_BUFFER_SIZE: usize = MAX_DATA_PAYLOAD + 16 * 1024;

/// Returns the maximum payload size allowed for the given message id.
#[inline]
pub const fn max_payload_for(_msg_id: MsgId) -> usize {
    MAX_CONTROL_PAYLOAD
}
