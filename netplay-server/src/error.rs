use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no console with id {0}")]
    NoSuchConsole(u64),
    #[error("no client with id {0} on console {1}")]
    NoSuchClient(u64, u64),
    #[error("protocol error: {0}")]
    Protocol(#[from] netplay_proto::ProtoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("console {0} already started")]
    AlreadyStarted(u64),
    #[error("console {0} has not started yet")]
    ConsoleNotStarted(u64),
    #[error("key press batch referenced a console other than {0}")]
    ConsoleIdMismatch(u64),
}
