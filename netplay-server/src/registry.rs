use std::collections::HashMap;
use std::sync::Arc;

use netplay_proto::messages::{ConnectedPort, KeyPressBatch, Message, Port, PortRejection};
use parking_lot::Mutex;

use crate::console::{ClientSender, Console, PortAllocation};
use crate::error::ServerError;

/// All consoles live here, guarded by a single mutex. Mutations (make
/// console, plug a controller, register a stream) are all quick
/// map/struct operations; the mutex is never held across an `.await`, so
/// contention is limited to genuinely concurrent requests.
#[derive(Default)]
pub struct ConsoleRegistry {
    inner: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    consoles: HashMap<u64, Console>,
    next_console_id: u64,
}

/// Outcome of a `PlugController` call, replacing the raw status/ports
/// tuple the wire response is built from.
pub enum PlugOutcome {
    RomMismatch,
    /// Every requested slot was `Unknown`/absent.
    NoPortsRequested,
    Granted { client_id: u64, ports: Vec<Port> },
    Rejected { rejections: Vec<PortRejection> },
}

impl ConsoleRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn make_console(&self, title: String, rom_name: String, rom_md5: [u8; 16]) -> u64 {
        let mut state = self.inner.lock();
        state.next_console_id += 1;
        let id = state.next_console_id;
        state.consoles.insert(id, Console::new(id, title, rom_name, rom_md5));
        id
    }

    pub fn plug_controller(
        &self,
        console_id: u64,
        rom_md5: [u8; 16],
        delay_frames: i32,
        requested_ports: &[Port],
    ) -> Result<PlugOutcome, ServerError> {
        let mut state = self.inner.lock();
        let console = state
            .consoles
            .get_mut(&console_id)
            .ok_or(ServerError::NoSuchConsole(console_id))?;

        if console.rom_md5 != rom_md5 {
            return Ok(PlugOutcome::RomMismatch);
        }

        let requested: Vec<Port> = requested_ports
            .iter()
            .copied()
            .filter(|p| *p != Port::Unknown)
            .collect();
        if requested.is_empty() {
            return Ok(PlugOutcome::NoPortsRequested);
        }

        // Allocation is attempted under a placeholder client id, then
        // re-bound with the real one once it's known to have succeeded —
        // the binding doesn't exist until allocation does.
        let PortAllocation { granted, rejections } = console.request_port_mapping(0, &requested);
        if granted.is_empty() {
            return Ok(PlugOutcome::Rejected { rejections });
        }
        // `request_port_mapping` tagged the placeholder id; move the
        // grant to the real binding it's about to create.
        console.release_ports(&granted);

        let client_id = console.bind_client(granted.clone(), delay_frames);
        Ok(PlugOutcome::Granted {
            client_id,
            ports: granted,
        })
    }

    pub fn register_stream(
        &self,
        console_id: u64,
        client_id: u64,
        sender: ClientSender,
    ) -> Result<bool, ServerError> {
        let mut state = self.inner.lock();
        let console = state
            .consoles
            .get_mut(&console_id)
            .ok_or(ServerError::NoSuchConsole(console_id))?;
        console.register_stream(client_id, sender)?;
        Ok(console.clients_present_and_ready())
    }

    /// Starts the console if every bound client has registered its event
    /// stream. Returns `None` (leaving the console unstarted) if any
    /// client hasn't registered yet.
    pub fn start_game(&self, console_id: u64) -> Result<Option<Vec<ConnectedPort>>, ServerError> {
        let mut state = self.inner.lock();
        let console = state
            .consoles
            .get_mut(&console_id)
            .ok_or(ServerError::NoSuchConsole(console_id))?;
        if console.started {
            return Err(ServerError::AlreadyStarted(console_id));
        }
        if !console.clients_present_and_ready() {
            return Ok(None);
        }
        console.started = true;
        Ok(Some(console.all_connected_ports()))
    }

    pub fn broadcast(&self, console_id: u64, msg: Message) {
        let state = self.inner.lock();
        if let Some(console) = state.consoles.get(&console_id) {
            console.broadcast(msg);
        }
    }

    /// Relays one client's key-press batch to every other client bound to
    /// the same console.
    ///
    /// Rejects the whole batch if the console isn't `RUNNING` yet, or if
    /// any sample in it claims a `console_id` other than the one this
    /// stream is bound to — a client can only ever speak for its own
    /// console.
    pub fn handle_event(
        &self,
        console_id: u64,
        from_client: u64,
        batch: KeyPressBatch,
    ) -> Result<(), ServerError> {
        let state = self.inner.lock();
        let console = state
            .consoles
            .get(&console_id)
            .ok_or(ServerError::NoSuchConsole(console_id))?;

        if !console.started {
            return Err(ServerError::ConsoleNotStarted(console_id));
        }
        if batch.states.iter().any(|s| s.console_id != console_id) {
            return Err(ServerError::ConsoleIdMismatch(console_id));
        }

        let msg = Message::KeyPressBatch(batch);
        for client_id in console.client_ids() {
            if client_id != from_client {
                console.send_to(client_id, msg.clone());
            }
        }
        Ok(())
    }

    pub fn remove_console(&self, console_id: u64) {
        self.inner.lock().consoles.remove(&console_id);
    }

    /// Called when one client's event stream ends, however that happened
    /// (clean EOF, transport error, or the process dropping the socket).
    ///
    /// If the console hadn't started yet, the client's port binding is
    /// left intact and only its stream is marked unregistered — it's
    /// still waiting on `ClientsPresentAndReady`, and may reconnect. If
    /// the console was already `RUNNING`, a dropped peer can't be
    /// recovered from in a lockstep session: every remaining stream is
    /// sent `StopConsole{reason: Error}` and the console is torn down.
    pub fn handle_stream_closed(&self, console_id: u64, client_id: u64) {
        let mut state = self.inner.lock();
        let Some(console) = state.consoles.get_mut(&console_id) else {
            return;
        };

        if console.started {
            console.broadcast(Message::StopConsole(netplay_proto::messages::StopConsole {
                console_id,
                reason: netplay_proto::messages::StopConsoleReason::Error,
            }));
            state.consoles.remove(&console_id);
        } else {
            console.unregister_stream(client_id);
        }
    }

    pub fn with_console<T>(&self, console_id: u64, f: impl FnOnce(&Console) -> T) -> Option<T> {
        self.inner.lock().consoles.get(&console_id).map(f)
    }
}
