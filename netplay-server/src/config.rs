use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "netplayd", about = "Lockstep netplay coordination server")]
pub struct Args {
    /// Address to bind the TCP listener to.
    #[arg(long, default_value = "0.0.0.0:7654")]
    pub bind: String,

    /// Tracing log filter (e.g. "info", "netplay_server=debug").
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Maximum accepted payload size in bytes, applied per message.
    #[arg(long, default_value_t = netplay_proto::limits::MAX_CONTROL_PAYLOAD)]
    pub max_payload: usize,

    /// Deadline, in milliseconds, the server holds a unary connection
    /// open waiting for a request before dropping it.
    #[arg(long, default_value_t = netplay_proto::constants::DEFAULT_UNARY_DEADLINE_MS)]
    pub unary_deadline_ms: u64,

    /// Enable the `ShutDownServer` RPC. Off by default so a stray client
    /// can't take the process down in production.
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}
