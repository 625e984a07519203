use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MakeConsoleStatus {
    Unknown,
    Success,
    UnspecifiedFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlugControllerStatus {
    Unknown,
    Success,
    NoSuchConsole,
    RomMd5Mismatch,
    NoPortsRequested,
    PortRequestRejected,
    UnspecifiedFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortRejectionReason {
    PortAlreadyOccupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartGameStatus {
    Unknown,
    Success,
    NoSuchConsole,
    NotAllClientsReady,
    UnspecifiedFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopConsoleReason {
    Error,
    StopRequestedByClient,
}
