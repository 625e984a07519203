use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use netplay_proto::codec::{read_frame_async, write_frame_async};
use netplay_proto::messages::{
    ClientReady, InvalidData, MakeConsoleRequest, MakeConsoleResponse, MakeConsoleStatus, Message,
    PingResponse, PlugControllerRequest, PlugControllerResponse, PlugControllerStatus,
    ShutDownServerResponse, StartGameRequest, StartGameResponse, StartGameStatus, StreamStartGame,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::config::Args;
use crate::error::ServerError;
use crate::registry::{ConsoleRegistry, PlugOutcome};

/// Accepts connections until `shutdown` is signalled. Each connection gets
/// its own task; unary RPCs answer once and close, while a `ClientReady`
/// first message upgrades the connection to a long-lived event stream.
pub async fn serve(args: Args, registry: Arc<ConsoleRegistry>, shutdown: Arc<Notify>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&args.bind).await?;
    info!(addr = %args.bind, "netplay server listening");
    let unary_deadline = Duration::from_millis(args.unary_deadline_ms);
    serve_with_listener(listener, registry, shutdown, args.debug, unary_deadline).await
}

/// Same as [`serve`], but against an already-bound listener. Split out so
/// tests can bind to `127.0.0.1:0`, read back the OS-assigned port, and
/// hand the listener in directly rather than guessing a free port.
pub async fn serve_with_listener(
    listener: TcpListener,
    registry: Arc<ConsoleRegistry>,
    shutdown: Arc<Notify>,
    debug_mode: bool,
    unary_deadline: Duration,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let registry = registry.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_connection(stream, peer, registry, shutdown, debug_mode, unary_deadline).await
                    {
                        debug!(%peer, error = %err, "connection closed");
                    }
                });
            }
            _ = shutdown.notified() => {
                info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
        }
    }
}

/// Reads the first message of a freshly accepted connection, bounded by
/// `unary_deadline` — a client that opens a socket and never sends
/// anything (or sends too slowly) must not tie up a server task forever.
/// Once a connection identifies itself as `ClientReady` the deadline no
/// longer applies: the event stream is meant to sit open for the whole
/// game.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConsoleRegistry>,
    shutdown: Arc<Notify>,
    debug_mode: bool,
    unary_deadline: Duration,
) -> anyhow::Result<()> {
    let first = match tokio::time::timeout(unary_deadline, read_frame_async(&mut stream)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!(%peer, "no message received within the unary deadline, dropping connection");
            return Ok(());
        }
    };

    match first {
        Message::Ping(_) => {
            write_frame_async(&mut stream, &Message::Pong(PingResponse)).await?;
        }
        Message::MakeConsoleRequest(req) => handle_make_console(&mut stream, &registry, req).await?,
        Message::PlugControllerRequest(req) => {
            handle_plug_controller(&mut stream, &registry, req).await?
        }
        Message::StartGameRequest(req) => handle_start_game(&mut stream, &registry, req).await?,
        Message::ShutDownServerRequest(_) => {
            handle_shut_down(&mut stream, &shutdown, debug_mode).await?
        }
        Message::ClientReady(ready) => handle_event_stream(stream, peer, registry, ready).await?,
        other => {
            let reply = Message::InvalidData(InvalidData {
                reason: format!("unexpected first message: {:?}", other.msg_id()),
            });
            write_frame_async(&mut stream, &reply).await.ok();
        }
    }
    Ok(())
}

async fn handle_make_console(
    stream: &mut TcpStream,
    registry: &ConsoleRegistry,
    req: MakeConsoleRequest,
) -> anyhow::Result<()> {
    let console_id = registry.make_console(req.console_title, req.rom_name, req.rom_file_md5);
    let resp = Message::MakeConsoleResponse(MakeConsoleResponse {
        status: MakeConsoleStatus::Success,
        console_id,
    });
    write_frame_async(stream, &resp).await?;
    Ok(())
}

async fn handle_plug_controller(
    stream: &mut TcpStream,
    registry: &ConsoleRegistry,
    req: PlugControllerRequest,
) -> anyhow::Result<()> {
    let outcome = registry.plug_controller(
        req.console_id,
        req.rom_file_md5,
        req.delay_frames,
        &req.requested_ports,
    );

    let resp = match outcome {
        Ok(PlugOutcome::Granted { client_id, ports }) => PlugControllerResponse {
            console_id: req.console_id,
            status: PlugControllerStatus::Success,
            client_id,
            ports,
            port_rejections: Vec::new(),
        },
        Ok(PlugOutcome::RomMismatch) => PlugControllerResponse {
            console_id: req.console_id,
            status: PlugControllerStatus::RomMd5Mismatch,
            client_id: 0,
            ports: Vec::new(),
            port_rejections: Vec::new(),
        },
        Ok(PlugOutcome::NoPortsRequested) => PlugControllerResponse {
            console_id: req.console_id,
            status: PlugControllerStatus::NoPortsRequested,
            client_id: 0,
            ports: Vec::new(),
            port_rejections: Vec::new(),
        },
        Ok(PlugOutcome::Rejected { rejections }) => PlugControllerResponse {
            console_id: req.console_id,
            status: PlugControllerStatus::PortRequestRejected,
            client_id: 0,
            ports: Vec::new(),
            port_rejections: rejections,
        },
        Err(ServerError::NoSuchConsole(_)) => PlugControllerResponse {
            console_id: req.console_id,
            status: PlugControllerStatus::NoSuchConsole,
            client_id: 0,
            ports: Vec::new(),
            port_rejections: Vec::new(),
        },
        Err(err) => {
            warn!(error = %err, "plug_controller failed unexpectedly");
            PlugControllerResponse {
                console_id: req.console_id,
                status: PlugControllerStatus::UnspecifiedFailure,
                client_id: 0,
                ports: Vec::new(),
                port_rejections: Vec::new(),
            }
        }
    };

    write_frame_async(stream, &Message::PlugControllerResponse(resp)).await?;
    Ok(())
}

async fn handle_start_game(
    stream: &mut TcpStream,
    registry: &ConsoleRegistry,
    req: StartGameRequest,
) -> anyhow::Result<()> {
    let (status, connected_ports) = match registry.start_game(req.console_id) {
        Ok(Some(ports)) => (StartGameStatus::Success, Some(ports)),
        Ok(None) => (StartGameStatus::NotAllClientsReady, None),
        Err(ServerError::NoSuchConsole(_)) => (StartGameStatus::NoSuchConsole, None),
        Err(err) => {
            warn!(error = %err, "start_game failed unexpectedly");
            (StartGameStatus::UnspecifiedFailure, None)
        }
    };

    if let Some(connected_ports) = connected_ports {
        registry.broadcast(
            req.console_id,
            Message::StreamStartGame(StreamStartGame {
                console_id: req.console_id,
                connected_ports,
            }),
        );
    }

    write_frame_async(stream, &Message::StartGameResponse(StartGameResponse { status })).await?;
    Ok(())
}

async fn handle_shut_down(
    stream: &mut TcpStream,
    shutdown: &Notify,
    debug_mode: bool,
) -> anyhow::Result<()> {
    write_frame_async(
        stream,
        &Message::ShutDownServerResponse(ShutDownServerResponse {
            server_will_die: debug_mode,
        }),
    )
    .await?;
    if debug_mode {
        shutdown.notify_waiters();
    }
    Ok(())
}

/// Upgrades a connection that opened with `ClientReady` into a long-lived
/// event stream: one task drains the server→client channel onto the
/// socket, while this task keeps reading client→server key-press batches
/// until the connection ends.
async fn handle_event_stream(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConsoleRegistry>,
    ready: ClientReady,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    if let Err(err) = registry.register_stream(ready.console_id, ready.client_id, tx) {
        let mut stream = stream;
        let reply = Message::InvalidData(InvalidData {
            reason: err.to_string(),
        });
        write_frame_async(&mut stream, &reply).await.ok();
        return Ok(());
    }

    let (mut read_half, mut write_half) = stream.into_split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write_frame_async(&mut write_half, &msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        match read_frame_async(&mut read_half).await {
            Ok(Message::KeyPressBatch(batch)) => {
                if let Err(err) = registry.handle_event(ready.console_id, ready.client_id, batch) {
                    warn!(%peer, error = %err, "rejecting key press batch");
                }
            }
            Ok(other) => {
                warn!(%peer, msg_id = ?other.msg_id(), "unexpected message on event stream");
            }
            Err(_) => break,
        }
    }

    writer.abort();
    registry.handle_stream_closed(ready.console_id, ready.client_id);
    Ok(())
}
