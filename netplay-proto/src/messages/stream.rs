use serde::{Deserialize, Serialize};

use super::port::Port;
use super::status::StopConsoleReason;

/// First message a client must send on its event stream, binding the
/// stream to a `(console_id, client_id)` pair obtained from a prior
/// `PlugController` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientReady {
    pub console_id: u64,
    pub client_id: u64,
}

/// The fixed-schema wire encoding of one controller sample.
///
/// This is the literal bit layout peers must agree on; it is not
/// interpreted by the coordination core itself, only moved between a
/// [`crate::codec::ButtonCodec`] and the wire. `buttons` packs 16 boolean
/// button flags, one per bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeyBits {
    pub buttons: u16,
    pub x_axis: i8,
    pub y_axis: i8,
    pub reserved_1: u8,
    pub reserved_2: u8,
}

/// One controller sample for one bound port on one frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyState {
    pub console_id: u64,
    pub port: Port,
    pub frame_number: i64,
    pub bits: KeyBits,
}

/// Client -> server: one or more key states, sent together to amortize
/// framing overhead across a burst of frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPressBatch {
    pub states: Vec<KeyState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPort {
    pub port: Port,
    pub delay_frames: i32,
}

/// Server -> client: pushed on the event stream once every client bound to
/// a console has sent `ClientReady`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStartGame {
    pub console_id: u64,
    pub connected_ports: Vec<ConnectedPort>,
}

/// Server -> client: pushed when a console is torn down, terminating the
/// stream for every client bound to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConsole {
    pub console_id: u64,
    pub reason: StopConsoleReason,
}

/// Server -> client: a malformed or out-of-protocol message was received
/// from this client; the connection will be closed after this is sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidData {
    pub reason: String,
}
