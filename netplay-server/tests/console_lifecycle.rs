//! End-to-end tests driving the real TCP front-end with hand-rolled wire
//! clients, covering the console/session-coordinator scenarios from
//! spec.md §8: concrete-before-wildcard allocation, rejection leaving the
//! client-id counter untouched, start gating on every client being ready,
//! broadcast fan-out excluding the sender, and stream-termination
//! tearing the console down.

use std::sync::Arc;
use std::time::Duration;

use netplay_proto::codec::{read_frame_async, write_frame_async};
use netplay_proto::messages::{
    ClientReady, KeyBits, KeyPressBatch, KeyState, MakeConsoleRequest, MakeConsoleResponse,
    MakeConsoleStatus, Message, PlugControllerRequest, PlugControllerResponse,
    PlugControllerStatus, Port, StartGameRequest, StartGameResponse, StartGameStatus,
    StopConsoleReason,
};
use netplay_server::ConsoleRegistry;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::timeout;

const ROM_MD5: [u8; 16] = [7; 16];

/// Binds an ephemeral port, spawns the real accept loop against it, and
/// returns the address clients should connect to.
async fn spawn_server() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = ConsoleRegistry::new();
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(netplay_server::net::serve_with_listener(
        listener,
        registry,
        shutdown,
        false,
        Duration::from_millis(netplay_proto::constants::DEFAULT_UNARY_DEADLINE_MS),
    ));
    addr
}

async fn unary(addr: std::net::SocketAddr, request: Message) -> Message {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_frame_async(&mut stream, &request).await.unwrap();
    timeout(Duration::from_secs(2), read_frame_async(&mut stream))
        .await
        .expect("server did not respond")
        .unwrap()
}

async fn make_console(addr: std::net::SocketAddr) -> u64 {
    match unary(
        addr,
        Message::MakeConsoleRequest(MakeConsoleRequest {
            console_title: "test room".into(),
            rom_name: "game.rom".into(),
            rom_file_md5: ROM_MD5,
        }),
    )
    .await
    {
        Message::MakeConsoleResponse(MakeConsoleResponse {
            status: MakeConsoleStatus::Success,
            console_id,
        }) => console_id,
        other => panic!("unexpected MakeConsole response: {other:?}"),
    }
}

async fn plug(
    addr: std::net::SocketAddr,
    console_id: u64,
    delay_frames: i32,
    ports: Vec<Port>,
) -> PlugControllerResponse {
    match unary(
        addr,
        Message::PlugControllerRequest(PlugControllerRequest {
            console_id,
            rom_file_md5: ROM_MD5,
            delay_frames,
            requested_ports: ports,
        }),
    )
    .await
    {
        Message::PlugControllerResponse(resp) => resp,
        other => panic!("unexpected PlugController response: {other:?}"),
    }
}

async fn start_game(addr: std::net::SocketAddr, console_id: u64) -> StartGameStatus {
    match unary(addr, Message::StartGameRequest(StartGameRequest { console_id })).await {
        Message::StartGameResponse(StartGameResponse { status }) => status,
        other => panic!("unexpected StartGame response: {other:?}"),
    }
}

/// Opens the long-lived event stream connection and sends `ClientReady`.
async fn ready(addr: std::net::SocketAddr, console_id: u64, client_id: u64) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_frame_async(
        &mut stream,
        &Message::ClientReady(ClientReady { console_id, client_id }),
    )
    .await
    .unwrap();
    stream
}

/// Scenario (c): concrete-before-wildcard allocation. `PortAny, Port3,
/// PortAny` on an empty console must grant Port3 plus two of
/// {Port1, Port2, Port4}, never losing Port3 to a wildcard.
#[tokio::test]
async fn concrete_before_wildcard_allocation() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let grant = plug(addr, console_id, 0, vec![Port::PortAny, Port::Port3, Port::PortAny]).await;
    assert_eq!(grant.status, PlugControllerStatus::Success);
    assert!(grant.ports.contains(&Port::Port3));
    assert_eq!(grant.ports.len(), 3);
    let others: Vec<Port> = grant.ports.iter().copied().filter(|p| *p != Port::Port3).collect();
    assert!(others.iter().all(|p| matches!(p, Port::Port1 | Port::Port2 | Port::Port4)));
}

/// All-PortAny requests on a fresh console allocate Port1..Port4 in order.
#[tokio::test]
async fn all_wildcard_allocates_in_ascending_order() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let grant = plug(
        addr,
        console_id,
        0,
        vec![Port::PortAny, Port::PortAny, Port::PortAny, Port::PortAny],
    )
    .await;
    assert_eq!(grant.status, PlugControllerStatus::Success);
    assert_eq!(grant.ports, vec![Port::Port1, Port::Port2, Port::Port3, Port::Port4]);
}

/// Scenario (d): a rejected PlugController must not create a gap in the
/// sequence of successfully granted client ids.
#[tokio::test]
async fn rejection_does_not_skip_a_client_id() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let first = plug(addr, console_id, 0, vec![Port::Port1]).await;
    assert_eq!(first.status, PlugControllerStatus::Success);

    // Port1 is taken; this whole request is rejected.
    let rejected = plug(addr, console_id, 0, vec![Port::Port1]).await;
    assert_eq!(rejected.status, PlugControllerStatus::PortRequestRejected);
    assert_eq!(rejected.port_rejections.len(), 1);

    let second = plug(addr, console_id, 0, vec![Port::Port2]).await;
    assert_eq!(second.status, PlugControllerStatus::Success);
    assert_eq!(second.client_id, first.client_id + 1);
}

#[tokio::test]
async fn plug_controller_rejects_rom_mismatch() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    write_frame_async(
        &mut stream,
        &Message::PlugControllerRequest(PlugControllerRequest {
            console_id,
            rom_file_md5: [0xAA; 16],
            delay_frames: 0,
            requested_ports: vec![Port::Port1],
        }),
    )
    .await
    .unwrap();
    match read_frame_async(&mut stream).await.unwrap() {
        Message::PlugControllerResponse(resp) => {
            assert_eq!(resp.status, PlugControllerStatus::RomMd5Mismatch);
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

/// `StartGame` refuses to start until every granted client has registered
/// its event stream, then broadcasts `StreamStartGame` once they have.
#[tokio::test]
async fn start_game_gates_on_every_client_being_ready() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let a = plug(addr, console_id, 2, vec![Port::Port1]).await;
    let b = plug(addr, console_id, 0, vec![Port::Port2]).await;

    assert_eq!(
        start_game(addr, console_id).await,
        StartGameStatus::NotAllClientsReady
    );

    let mut stream_a = ready(addr, console_id, a.client_id).await;
    assert_eq!(
        start_game(addr, console_id).await,
        StartGameStatus::NotAllClientsReady
    );

    let mut stream_b = ready(addr, console_id, b.client_id).await;
    assert_eq!(start_game(addr, console_id).await, StartGameStatus::Success);

    for stream in [&mut stream_a, &mut stream_b] {
        match timeout(Duration::from_secs(2), read_frame_async(stream)).await.unwrap().unwrap() {
            Message::StreamStartGame(start) => {
                assert_eq!(start.console_id, console_id);
                let mut ports: Vec<_> = start.connected_ports.iter().map(|cp| cp.port).collect();
                ports.sort_by_key(|p| *p as i8);
                assert_eq!(ports, vec![Port::Port1, Port::Port2]);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Scenario (b) at the wire level: a key-press batch from one client is
/// relayed to every other client bound to the console, and never echoed
/// back to its own sender.
#[tokio::test]
async fn broadcast_excludes_the_sending_client() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let a = plug(addr, console_id, 0, vec![Port::Port1]).await;
    let b = plug(addr, console_id, 0, vec![Port::Port2]).await;
    let mut stream_a = ready(addr, console_id, a.client_id).await;
    let mut stream_b = ready(addr, console_id, b.client_id).await;
    assert_eq!(start_game(addr, console_id).await, StartGameStatus::Success);

    for stream in [&mut stream_a, &mut stream_b] {
        assert!(matches!(
            read_frame_async(stream).await.unwrap(),
            Message::StreamStartGame(_)
        ));
    }

    write_frame_async(
        &mut stream_a,
        &Message::KeyPressBatch(KeyPressBatch {
            states: vec![KeyState {
                console_id,
                port: Port::Port1,
                frame_number: 0,
                bits: KeyBits {
                    buttons: 0xF00D,
                    ..Default::default()
                },
            }],
        }),
    )
    .await
    .unwrap();

    match timeout(Duration::from_secs(2), read_frame_async(&mut stream_b))
        .await
        .unwrap()
        .unwrap()
    {
        Message::KeyPressBatch(batch) => {
            assert_eq!(batch.states.len(), 1);
            assert_eq!(batch.states[0].port, Port::Port1);
            assert_eq!(batch.states[0].bits.buttons, 0xF00D);
        }
        other => panic!("unexpected message: {other:?}"),
    }

    // The sender must never see its own input echoed back.
    let race = timeout(Duration::from_millis(200), read_frame_async(&mut stream_a)).await;
    assert!(race.is_err(), "sender should not have received its own broadcast");
}

/// Scenario (f): once a console is running, any one stream dropping tears
/// the whole console down and every remaining stream gets `StopConsole`.
#[tokio::test]
async fn a_dropped_stream_after_start_terminates_every_remaining_peer() {
    let addr = spawn_server().await;
    let console_id = make_console(addr).await;

    let a = plug(addr, console_id, 0, vec![Port::Port1]).await;
    let b = plug(addr, console_id, 0, vec![Port::Port2]).await;
    let stream_a = ready(addr, console_id, a.client_id).await;
    let mut stream_b = ready(addr, console_id, b.client_id).await;
    assert_eq!(start_game(addr, console_id).await, StartGameStatus::Success);

    assert!(matches!(
        read_frame_async(&mut stream_b).await.unwrap(),
        Message::StreamStartGame(_)
    ));

    drop(stream_a);

    match timeout(Duration::from_secs(2), read_frame_async(&mut stream_b))
        .await
        .unwrap()
        .unwrap()
    {
        Message::StopConsole(stop) => {
            assert_eq!(stop.console_id, console_id);
            assert_eq!(stop.reason, StopConsoleReason::Error);
        }
        other => panic!("unexpected message: {other:?}"),
    }
}
