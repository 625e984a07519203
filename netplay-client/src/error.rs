use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),
    #[error("connection lost")]
    ConnectionLost,
    #[error("protocol error: {0}")]
    Protocol(#[from] netplay_proto::ProtoError),
    #[error("unary rpc timed out after {0:?}")]
    UnaryTimeout(std::time::Duration),
    #[error("server rejected MakeConsole: {0:?}")]
    MakeConsoleFailed(netplay_proto::messages::MakeConsoleStatus),
    #[error("server rejected PlugController: {0:?}")]
    PlugControllerFailed(netplay_proto::messages::PlugControllerStatus),
    #[error("server rejected StartGame: {0:?}")]
    StartGameFailed(netplay_proto::messages::StartGameStatus),
    #[error("unexpected message on event stream")]
    UnexpectedMessage,
    #[error("stream already cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
