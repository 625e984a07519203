use strum::FromRepr;

/// Identifies the payload type carried by a [`Header`](crate::header::Header).
///
/// Request/response pairs get distinct ids (rather than being distinguished
/// by direction alone) so a misrouted message is caught by `UnknownMsgId`
/// decoding rather than silently misinterpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum MsgId {
    Ping = 0,
    Pong = 1,

    MakeConsoleRequest = 2,
    MakeConsoleResponse = 3,

    PlugControllerRequest = 4,
    PlugControllerResponse = 5,

    StartGameRequest = 6,
    StartGameResponse = 7,

    ShutDownServerRequest = 8,
    ShutDownServerResponse = 9,

    /// First message a client sends on the long-lived event stream.
    ClientReady = 10,
    /// Controller input batch, client -> server, sent on the event stream.
    KeyPressBatch = 11,
    /// Server -> client push on the event stream once every bound client is
    /// ready.
    StreamStartGame = 12,
    /// Server -> client push on the event stream when a console is torn
    /// down.
    StopConsole = 13,
    /// Server -> client push on the event stream reporting a malformed or
    /// rejected client message.
    InvalidData = 14,
}

impl MsgId {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::from_repr(raw)
    }
}
