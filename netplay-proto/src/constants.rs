//! Protocol constants for netplay-proto.
//!
//! For message size limits, see the [`limits`](crate::limits) module.

/// Magic bytes at the beginning of every frame. Used to quickly reject
/// unrelated or corrupted data.
pub const MAGIC: [u8; 2] = *b"LS";

/// Wire-format protocol version. Bump only for breaking changes to the
/// header layout or message formats.
pub const VERSION: u8 = 1;

/// Fixed header length in bytes (wire format).
pub const HEADER_LEN: usize = 8;

/// TCP framing prefix length in bytes.
///
/// TCP is a byte stream, so each frame is sent as
/// `[u32 frame_len_le][Header][Payload]`, where `frame_len_le` is the
/// length of `[Header][Payload]` in bytes.
pub const TCP_LEN_PREFIX: usize = 4;

/// Default deadline applied by the client to every unary RPC, in
/// milliseconds.
pub const DEFAULT_UNARY_DEADLINE_MS: u64 = 5_000;

/// Wait applied by the client when retrying a remote-port `Get` after
/// `ReadUntilButtons` reports success but the queue still comes up empty.
/// A defensive bound, not a steady-state path.
pub const REMOTE_GET_RETRY_TIMEOUT_MS: u64 = 5_000;
