use std::time::Duration;

/// Client-side configuration. Unlike the server's CLI-driven config, this
/// is a plain struct: the client is embedded inside an emulator process
/// rather than run as its own binary.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub unary_deadline: Duration,
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            unary_deadline: Duration::from_millis(netplay_proto::constants::DEFAULT_UNARY_DEADLINE_MS),
        }
    }
}
