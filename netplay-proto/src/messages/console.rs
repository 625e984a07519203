use serde::{Deserialize, Serialize};

use super::port::Port;
use super::status::{MakeConsoleStatus, PlugControllerStatus, PortRejectionReason, StartGameStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeConsoleRequest {
    pub console_title: String,
    pub rom_name: String,
    pub rom_file_md5: [u8; 16],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeConsoleResponse {
    pub status: MakeConsoleStatus,
    /// Only meaningful when `status == Success`.
    pub console_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRejection {
    pub port: Port,
    pub reason: PortRejectionReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlugControllerRequest {
    pub console_id: u64,
    pub rom_file_md5: [u8; 16],
    pub delay_frames: i32,
    pub requested_ports: Vec<Port>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlugControllerResponse {
    pub console_id: u64,
    pub status: PlugControllerStatus,
    /// Only meaningful when `status == Success`.
    pub client_id: u64,
    /// Ports actually bound, in the order the server granted them.
    pub ports: Vec<Port>,
    pub port_rejections: Vec<PortRejection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameRequest {
    pub console_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameResponse {
    pub status: StartGameStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutDownServerRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutDownServerResponse {
    pub server_will_die: bool,
}
