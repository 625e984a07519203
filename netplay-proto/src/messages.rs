pub mod console;
pub mod port;
pub mod status;
pub mod stream;

pub use console::{
    MakeConsoleRequest, MakeConsoleResponse, PingRequest, PingResponse, PlugControllerRequest,
    PlugControllerResponse, PortRejection, ShutDownServerRequest, ShutDownServerResponse,
    StartGameRequest, StartGameResponse,
};
pub use port::Port;
pub use status::{
    MakeConsoleStatus, PlugControllerStatus, PortRejectionReason, StartGameStatus,
    StopConsoleReason,
};
pub use stream::{
    ClientReady, ConnectedPort, InvalidData, KeyBits, KeyPressBatch, KeyState, StopConsole,
    StreamStartGame,
};

use crate::msg_id::MsgId;

/// A fully decoded application message, tagged with the [`MsgId`] it was
/// decoded from. Produced by [`crate::codec::decode_payload`] and consumed
/// by dispatch code in `netplay-server`/`netplay-client`.
#[derive(Debug, Clone)]
pub enum Message {
    Ping(PingRequest),
    Pong(PingResponse),
    MakeConsoleRequest(MakeConsoleRequest),
    MakeConsoleResponse(MakeConsoleResponse),
    PlugControllerRequest(PlugControllerRequest),
    PlugControllerResponse(PlugControllerResponse),
    StartGameRequest(StartGameRequest),
    StartGameResponse(StartGameResponse),
    ShutDownServerRequest(ShutDownServerRequest),
    ShutDownServerResponse(ShutDownServerResponse),
    ClientReady(ClientReady),
    KeyPressBatch(KeyPressBatch),
    StreamStartGame(StreamStartGame),
    StopConsole(StopConsole),
    InvalidData(InvalidData),
}

impl Message {
    pub fn msg_id(&self) -> MsgId {
        match self {
            Message::Ping(_) => MsgId::Ping,
            Message::Pong(_) => MsgId::Pong,
            Message::MakeConsoleRequest(_) => MsgId::MakeConsoleRequest,
            Message::MakeConsoleResponse(_) => MsgId::MakeConsoleResponse,
            Message::PlugControllerRequest(_) => MsgId::PlugControllerRequest,
            Message::PlugControllerResponse(_) => MsgId::PlugControllerResponse,
            Message::StartGameRequest(_) => MsgId::StartGameRequest,
            Message::StartGameResponse(_) => MsgId::StartGameResponse,
            Message::ShutDownServerRequest(_) => MsgId::ShutDownServerRequest,
            Message::ShutDownServerResponse(_) => MsgId::ShutDownServerResponse,
            Message::ClientReady(_) => MsgId::ClientReady,
            Message::KeyPressBatch(_) => MsgId::KeyPressBatch,
            Message::StreamStartGame(_) => MsgId::StreamStartGame,
            Message::StopConsole(_) => MsgId::StopConsole,
            Message::InvalidData(_) => MsgId::InvalidData,
        }
    }
}
