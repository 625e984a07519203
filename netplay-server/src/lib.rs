//! Lockstep netplay coordination server: the authoritative process that
//! allocates controller ports, gates game start on every client being
//! ready, and relays each frame's key presses to every other client.

pub mod config;
pub mod console;
pub mod error;
pub mod net;
pub mod registry;

use std::sync::Arc;

use tokio::sync::Notify;

pub use config::Args;
pub use error::ServerError;
pub use registry::ConsoleRegistry;

/// Runs the server until a `ShutDownServer` RPC is accepted (only possible
/// with `--debug`) or the process is signalled to stop.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let registry = ConsoleRegistry::new();
    let shutdown = Arc::new(Notify::new());

    tokio::select! {
        result = net::serve(args, registry, shutdown.clone()) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
            Ok(())
        }
    }
}
