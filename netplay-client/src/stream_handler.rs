use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netplay_proto::button_codec::ButtonCodec;
use netplay_proto::codec::{read_frame_sync, write_frame_sync};
use netplay_proto::constants::REMOTE_GET_RETRY_TIMEOUT_MS;
use netplay_proto::messages::{
    ClientReady, ConnectedPort, KeyPressBatch, KeyState, Message, Port, StopConsoleReason,
};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::ClientError;
use crate::input_queue::{GetTimeout, InputQueue, PutError};

/// A point in the lifetime of a stream handler, recorded with the
/// [`Instant`] it occurred at. Used for diagnostics, not control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingEvent {
    ClientReadySent,
    StreamStartGameReceived,
    KeyPressBatchSent,
    KeyPressBatchReceived,
    Cancelled,
    StreamClosed { reason: Option<StopConsoleReason> },
}

/// Append-only log of [`TimingEvent`]s, guarded by a mutex so both the
/// calling thread and a concurrent `try_cancel` can append to it.
#[derive(Default)]
pub struct Timings {
    events: Mutex<Vec<(TimingEvent, Instant)>>,
}

impl Timings {
    fn record(&self, event: TimingEvent) {
        self.events.lock().push((event, Instant::now()));
    }

    pub fn snapshot(&self) -> Vec<(TimingEvent, Instant)> {
        self.events.lock().clone()
    }
}

/// Where a [`ClientStreamHandler`] sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    NotYetStarted,
    Running,
    Terminated,
}

/// Why [`ClientStreamHandler::put_buttons`] rejected a batch entry.
#[derive(Debug, thiserror::Error)]
pub enum PutButtonsError {
    #[error("no queue bound for port {0:?}")]
    NoSuchPort(Port),
    #[error("queue rejected the write for port {0:?}: {1}")]
    RejectedByQueue(Port, PutError),
    #[error("codec failed to encode buttons for port {0:?}")]
    FailedToEncode(Port),
    #[error("failed to transmit the batch to the remote peer")]
    FailedToTransmitRemote,
}

/// Why [`ClientStreamHandler::get_buttons`] couldn't return a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetButtonsError {
    #[error("no queue bound for port {0:?}")]
    NoSuchPort(Port),
    #[error("failed to obtain buttons for the requested frame")]
    Failure,
}

/// Outcome of a successful [`ClientStreamHandler::read_until_buttons`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadUntilOutcome {
    GotButtons,
}

/// Why [`ClientStreamHandler::read_until_buttons`] gave up.
#[derive(Debug, thiserror::Error)]
pub enum ReadUntilError {
    #[error("failed to read the next message from the server")]
    RpcReadFailure,
    #[error("received a message that carries no button state")]
    NonButtonMessage,
    #[error("received a key-press batch referencing an unbound port or undecodable bits")]
    InvalidButtonsMessage,
    #[error("a decoded key state was rejected by its queue: {0}")]
    RejectedByQueue(PutError),
    #[error("the console was terminated while waiting")]
    ConsoleTerminated,
}

/// Owns the long-lived, bidirectional event-stream connection for one
/// bound client. Fully synchronous: every operation reads or writes
/// directly on the calling thread, with no background reader.
///
/// `local_ports` is fixed at construction — it's exactly the set of ports
/// this client's own emulator instance drives. Every other connected port
/// (announced by the server's `StreamStartGame`) is "remote": fed by
/// [`Self::read_until_buttons`] decoding batches off the wire.
pub struct ClientStreamHandler<C: ButtonCodec> {
    console_id: u64,
    client_id: u64,
    local_ports: HashSet<Port>,
    write_stream: Mutex<TcpStream>,
    read_stream: Mutex<TcpStream>,
    /// A clone of the socket used only to call `shutdown` from
    /// `try_cancel`, so it can unblock a read held by another thread
    /// without needing to acquire `read_stream`'s lock itself.
    shutdown_handle: TcpStream,
    cancelled: Arc<AtomicBool>,
    input_queues: RwLock<HashMap<Port, Arc<InputQueue<C::Buttons>>>>,
    connected_ports: RwLock<Vec<ConnectedPort>>,
    status: Mutex<HandlerStatus>,
    closed_reason: Mutex<Option<Option<StopConsoleReason>>>,
    timings: Arc<Timings>,
    _codec: PhantomData<C>,
}

impl<C: ButtonCodec> ClientStreamHandler<C> {
    /// Bind a stream handler to an already-connected, already-split pair
    /// of read/write halves of the same socket.
    ///
    /// # Panics
    /// Panics if `console_id` or `client_id` is `0`, if `local_ports` is
    /// empty, holds more than four entries, contains a duplicate, or
    /// contains `Port::PortAny`/`Port::Unknown` — all of these indicate
    /// the caller skipped or misused the preceding `PlugController` call.
    pub fn new(
        write_stream: TcpStream,
        read_stream: TcpStream,
        console_id: u64,
        client_id: u64,
        local_ports: Vec<Port>,
    ) -> Self {
        assert_ne!(console_id, 0, "ClientStreamHandler requires a real console_id");
        assert_ne!(client_id, 0, "ClientStreamHandler requires a real client_id");
        assert!(!local_ports.is_empty(), "ClientStreamHandler requires at least one local port");
        assert!(local_ports.len() <= 4, "at most four ports can be bound");
        assert!(
            local_ports.iter().all(Port::is_concrete),
            "local ports must be concrete (Port1..Port4)"
        );
        let unique: HashSet<Port> = local_ports.iter().copied().collect();
        assert_eq!(unique.len(), local_ports.len(), "local ports must not repeat");

        let shutdown_handle = write_stream.try_clone().expect("socket clone for shutdown handle");

        Self {
            console_id,
            client_id,
            local_ports: unique,
            write_stream: Mutex::new(write_stream),
            read_stream: Mutex::new(read_stream),
            shutdown_handle,
            cancelled: Arc::new(AtomicBool::new(false)),
            input_queues: RwLock::new(HashMap::new()),
            connected_ports: RwLock::new(Vec::new()),
            status: Mutex::new(HandlerStatus::NotYetStarted),
            closed_reason: Mutex::new(None),
            timings: Arc::new(Timings::default()),
            _codec: PhantomData,
        }
    }

    /// Send `ClientReady` and block until the server pushes
    /// `StreamStartGame`, building one [`InputQueue`] per connected port.
    ///
    /// On any failure the handler stays `NotYetStarted` and no queues are
    /// installed — a partially validated connected-port list is never
    /// committed.
    pub fn ready_and_wait_for_console_start(&self) -> Result<(), ClientError> {
        {
            let mut w = self.write_stream.lock();
            write_frame_sync(
                &mut *w,
                &Message::ClientReady(ClientReady {
                    console_id: self.console_id,
                    client_id: self.client_id,
                }),
            )?;
        }
        self.timings.record(TimingEvent::ClientReadySent);

        let msg = read_frame_sync(&mut *self.read_stream.lock())?;
        match msg {
            Message::StreamStartGame(start) if start.console_id == self.console_id => {
                self.timings.record(TimingEvent::StreamStartGameReceived);
                let queues = self.build_queues(&start.connected_ports)?;
                *self.input_queues.write() = queues;
                *self.connected_ports.write() = start.connected_ports;
                *self.status.lock() = HandlerStatus::Running;
                Ok(())
            }
            Message::StopConsole(stop) if stop.console_id == self.console_id => {
                *self.status.lock() = HandlerStatus::Terminated;
                *self.closed_reason.lock() = Some(Some(stop.reason));
                Err(match stop.reason {
                    StopConsoleReason::Error => ClientError::ConnectionLost,
                    StopConsoleReason::StopRequestedByClient => ClientError::Cancelled,
                })
            }
            _ => Err(ClientError::UnexpectedMessage),
        }
    }

    fn build_queues(
        &self,
        connected_ports: &[ConnectedPort],
    ) -> Result<HashMap<Port, Arc<InputQueue<C::Buttons>>>, ClientError> {
        if connected_ports.is_empty() || connected_ports.len() > 4 {
            return Err(ClientError::UnexpectedMessage);
        }
        let mut seen = HashSet::new();
        for cp in connected_ports {
            if cp.port == Port::PortAny || cp.port == Port::Unknown {
                return Err(ClientError::UnexpectedMessage);
            }
            if !seen.insert(cp.port) {
                return Err(ClientError::UnexpectedMessage);
            }
        }
        if !self.local_ports.iter().all(|p| seen.contains(p)) {
            return Err(ClientError::UnexpectedMessage);
        }

        let mut queues = HashMap::with_capacity(connected_ports.len());
        for cp in connected_ports {
            let delay = cp.delay_frames as i64;
            let queue = if self.local_ports.contains(&cp.port) {
                InputQueue::local(delay)
            } else {
                InputQueue::remote(delay)
            };
            queues.insert(cp.port, Arc::new(queue));
        }
        Ok(queues)
    }

    /// Send one batch of locally-produced frames to the server.
    ///
    /// Every entry is first written into its port's own [`InputQueue`]
    /// (so a local port's own [`Self::get_buttons`] sees the delay-shifted
    /// value immediately); only entries for local ports are also encoded
    /// and placed on the wire.
    pub fn put_buttons(&self, batch: &[(Port, i64, C::Buttons)]) -> Result<(), PutButtonsError> {
        let queues = self.input_queues.read();
        let mut outgoing = Vec::new();

        for (port, frame, buttons) in batch.iter().copied() {
            let queue = queues.get(&port).ok_or(PutButtonsError::NoSuchPort(port))?;
            queue
                .put(frame, buttons)
                .map_err(|e| PutButtonsError::RejectedByQueue(port, e))?;

            if self.local_ports.contains(&port) {
                let bits = C::encode(buttons).ok_or(PutButtonsError::FailedToEncode(port))?;
                outgoing.push(KeyState {
                    console_id: self.console_id,
                    port,
                    frame_number: frame + queue.delay_frames(),
                    bits,
                });
            }
        }
        drop(queues);

        if !outgoing.is_empty() {
            let mut w = self.write_stream.lock();
            write_frame_sync(&mut *w, &Message::KeyPressBatch(KeyPressBatch { states: outgoing }))
                .map_err(|_| PutButtonsError::FailedToTransmitRemote)?;
            drop(w);
            self.timings.record(TimingEvent::KeyPressBatchSent);
        }
        Ok(())
    }

    /// Non-blocking-beyond-one-retry read of `port`'s value for `frame`.
    ///
    /// Local ports are a single immediate queue read. Remote ports try an
    /// immediate read first; on a miss, drive [`Self::read_until_buttons`]
    /// to pull frames off the wire until this one shows up, then retry
    /// the queue with a bounded wait.
    pub fn get_buttons(&self, port: Port, frame: i64) -> Result<C::Buttons, GetButtonsError> {
        let queue = {
            let queues = self.input_queues.read();
            queues.get(&port).cloned().ok_or(GetButtonsError::NoSuchPort(port))?
        };

        if self.local_ports.contains(&port) {
            return queue.get(frame, GetTimeout::Immediate).map_err(|_| GetButtonsError::Failure);
        }

        match queue.get(frame, GetTimeout::Immediate) {
            Ok(buttons) => Ok(buttons),
            Err(crate::input_queue::GetError::TimedOut(_)) => {
                match self.read_until_buttons(port, frame) {
                    Ok(ReadUntilOutcome::GotButtons) => queue
                        .get(frame, GetTimeout::After(Duration::from_millis(REMOTE_GET_RETRY_TIMEOUT_MS)))
                        .map_err(|_| {
                            warn!(
                                ?port,
                                frame, "read_until_buttons reported success but the queue still has nothing for this frame"
                            );
                            GetButtonsError::Failure
                        }),
                    Err(_) => Err(GetButtonsError::Failure),
                }
            }
            Err(_) => Err(GetButtonsError::Failure),
        }
    }

    /// Block, reading frames off the wire, until `port`'s value for
    /// `frame` has been decoded into its queue.
    ///
    /// Holds `read_stream`'s lock for the whole call — only one thread is
    /// ever waiting on a remote frame at a time in this design.
    pub fn read_until_buttons(&self, port: Port, frame: i64) -> Result<ReadUntilOutcome, ReadUntilError> {
        let mut r = self.read_stream.lock();
        loop {
            let msg = read_frame_sync(&mut *r).map_err(|_| ReadUntilError::RpcReadFailure)?;
            match msg {
                Message::KeyPressBatch(batch) => {
                    self.timings.record(TimingEvent::KeyPressBatchReceived);
                    let mut found = false;
                    let queues = self.input_queues.read();
                    for state in batch.states {
                        let queue = queues
                            .get(&state.port)
                            .ok_or(ReadUntilError::InvalidButtonsMessage)?;
                        let buttons =
                            C::decode(state.bits).ok_or(ReadUntilError::InvalidButtonsMessage)?;
                        queue
                            .put(state.frame_number, buttons)
                            .map_err(ReadUntilError::RejectedByQueue)?;
                        if state.port == port && state.frame_number == frame {
                            found = true;
                        }
                    }
                    if found {
                        return Ok(ReadUntilOutcome::GotButtons);
                    }
                }
                Message::StopConsole(stop) => {
                    *self.status.lock() = HandlerStatus::Terminated;
                    *self.closed_reason.lock() = Some(Some(stop.reason));
                    self.timings.record(TimingEvent::StreamClosed { reason: Some(stop.reason) });
                    return Err(ReadUntilError::ConsoleTerminated);
                }
                _ => return Err(ReadUntilError::NonButtonMessage),
            }
        }
    }

    /// Best-effort cancellation: flips the cancelled flag and shuts the
    /// socket down so any blocked read or write unblocks with an error.
    pub fn try_cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.timings.record(TimingEvent::Cancelled);
        let _ = self.shutdown_handle.shutdown(std::net::Shutdown::Both);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn status(&self) -> HandlerStatus {
        *self.status.lock()
    }

    pub fn local_ports(&self) -> &HashSet<Port> {
        &self.local_ports
    }

    pub fn delay_frames_for_port(&self, port: Port) -> Option<i64> {
        self.input_queues.read().get(&port).map(|q| q.delay_frames())
    }

    /// The full connected-port list the server sent in `StreamStartGame`.
    /// Empty until the handler reaches `Running`.
    pub fn connected_ports(&self) -> Vec<ConnectedPort> {
        self.connected_ports.read().clone()
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// `Some(reason)` if the stream was closed by an explicit
    /// `StopConsole`, `Some(None)` if it was closed for any other reason,
    /// or `None` if the stream is still open.
    pub fn closed_reason(&self) -> Option<Option<StopConsoleReason>> {
        *self.closed_reason.lock()
    }

    pub fn console_id(&self) -> u64 {
        self.console_id
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }
}

impl<C: ButtonCodec> Drop for ClientStreamHandler<C> {
    fn drop(&mut self) {
        self.try_cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netplay_proto::button_codec::OpaqueButtonCodec;
    use netplay_proto::messages::KeyBits;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    fn handler_with_queues(local_ports: Vec<Port>) -> (ClientStreamHandler<OpaqueButtonCodec>, TcpStream) {
        let (client_write, server_read) = connected_pair();
        let (_server_write, client_read) = connected_pair();
        let handler = ClientStreamHandler::<OpaqueButtonCodec>::new(client_write, client_read, 1, 1, local_ports);
        (handler, server_read)
    }

    #[test]
    fn construction_rejects_port_any() {
        let (client_write, client_read) = connected_pair();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ClientStreamHandler::<OpaqueButtonCodec>::new(
                client_write,
                client_read,
                1,
                1,
                vec![Port::PortAny],
            )
        }));
        assert!(result.is_err());
    }

    #[test]
    fn put_buttons_to_unbound_port_fails() {
        let (handler, _server_read) = handler_with_queues(vec![Port::Port1]);
        let bits = KeyBits::default();
        let err = handler.put_buttons(&[(Port::Port2, 0, bits)]).unwrap_err();
        assert!(matches!(err, PutButtonsError::NoSuchPort(Port::Port2)));
    }

    #[test]
    fn get_buttons_on_unbound_port_fails() {
        let (handler, _server_read) = handler_with_queues(vec![Port::Port1]);
        let err = handler.get_buttons(Port::Port2, 0).unwrap_err();
        assert!(matches!(err, GetButtonsError::NoSuchPort(Port::Port2)));
    }

    #[test]
    fn ready_and_wait_rejects_mismatched_console_id() {
        let (client_write, server_read) = connected_pair();
        let (server_write, client_read) = connected_pair();
        let handler = ClientStreamHandler::<OpaqueButtonCodec>::new(
            client_write,
            client_read,
            7,
            1,
            vec![Port::Port1],
        );

        // Drain the ClientReady the handler writes, then send back a
        // StreamStartGame bound to a different console.
        std::thread::spawn(move || {
            let mut server_read = server_read;
            let mut len_buf = [0u8; 4];
            server_read.read_exact(&mut len_buf).unwrap();
            let mut rest = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            server_read.read_exact(&mut rest).unwrap();

            let msg = Message::StreamStartGame(netplay_proto::messages::StreamStartGame {
                console_id: 999,
                connected_ports: vec![],
            });
            let frame = netplay_proto::codec::encode_frame(&msg).unwrap();
            let len = (frame.len() as u32).to_le_bytes();
            let mut server_write = server_write;
            server_write.write_all(&len).unwrap();
            server_write.write_all(&frame).unwrap();
        });

        let err = handler.ready_and_wait_for_console_start().unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedMessage));
        assert_eq!(handler.status(), HandlerStatus::NotYetStarted);
    }
}
