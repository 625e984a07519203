use std::collections::HashMap;

use netplay_proto::messages::{ConnectedPort, Port, PortRejection, PortRejectionReason};
use tokio::sync::mpsc;

use crate::error::ServerError;

/// An event-stream outbound channel for one bound client. The server
/// never writes to a client socket directly from request-handling code;
/// it always goes through this channel so the connection's own writer
/// task owns the socket.
pub type ClientSender = mpsc::UnboundedSender<netplay_proto::messages::Message>;

#[derive(Debug)]
pub struct ClientBinding {
    pub client_id: u64,
    pub ports: Vec<Port>,
    pub delay_frames: i32,
    pub ready: bool,
    pub sender: Option<ClientSender>,
}

#[derive(Debug)]
pub struct Console {
    pub id: u64,
    pub title: String,
    pub rom_name: String,
    pub rom_md5: [u8; 16],
    pub started: bool,
    clients: HashMap<u64, ClientBinding>,
    occupied_ports: HashMap<Port, u64>,
    next_client_id: u64,
}

/// Outcome of a port allocation attempt against one console.
pub struct PortAllocation {
    pub granted: Vec<Port>,
    pub rejections: Vec<PortRejection>,
}

impl Console {
    pub fn new(id: u64, title: String, rom_name: String, rom_md5: [u8; 16]) -> Self {
        Self {
            id,
            title,
            rom_name,
            rom_md5,
            started: false,
            clients: HashMap::new(),
            occupied_ports: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Allocate ports for a `PlugController` request.
    ///
    /// Concrete requests (`Port1`..`Port4`) are resolved before wildcard
    /// requests (`PortAny`): a concrete request that's already occupied
    /// is rejected outright, while a wildcard request is satisfied from
    /// whatever ports remain free afterward, in ascending port order.
    /// This ordering keeps a concrete request from losing its specific
    /// port to a wildcard request that would have been equally happy
    /// with any other free port.
    ///
    /// The whole request is all-or-nothing: the first sub-request that
    /// can't be satisfied stops allocation and rolls back every port this
    /// call had already granted, so a partially-satisfiable batch never
    /// leaves ports occupied on a rejected binding.
    pub fn request_port_mapping(&mut self, client_id: u64, requested: &[Port]) -> PortAllocation {
        let mut requests: Vec<(usize, Port)> = requested.iter().copied().enumerate().collect();
        requests.sort_by_key(|(_, port)| port.is_wildcard());

        let mut granted = vec![Port::Unknown; requested.len()];
        let mut granted_ports: Vec<Port> = Vec::new();
        let mut rejection = None;

        for (original_index, port) in requests {
            if port.is_concrete() {
                if self.occupied_ports.contains_key(&port) {
                    rejection = Some(PortRejection {
                        port,
                        reason: PortRejectionReason::PortAlreadyOccupied,
                    });
                    break;
                }
                self.occupied_ports.insert(port, client_id);
                granted[original_index] = port;
                granted_ports.push(port);
            } else {
                match self.first_free_port() {
                    Some(free) => {
                        self.occupied_ports.insert(free, client_id);
                        granted[original_index] = free;
                        granted_ports.push(free);
                    }
                    None => {
                        rejection = Some(PortRejection {
                            port: Port::PortAny,
                            reason: PortRejectionReason::PortAlreadyOccupied,
                        });
                        break;
                    }
                }
            }
        }

        if let Some(rejection) = rejection {
            self.release_ports(&granted_ports);
            return PortAllocation {
                granted: Vec::new(),
                rejections: vec![rejection],
            };
        }

        let granted: Vec<Port> = granted.into_iter().filter(|p| *p != Port::Unknown).collect();
        PortAllocation {
            granted,
            rejections: Vec::new(),
        }
    }

    /// Undo a port allocation, restoring the counters as though the
    /// request had never been made. Used when a `PlugController` call
    /// ends up rejected overall so partially granted ports don't leak as
    /// permanently occupied.
    pub fn release_ports(&mut self, ports: &[Port]) {
        for port in ports {
            self.occupied_ports.remove(port);
        }
    }

    fn first_free_port(&self) -> Option<Port> {
        Port::ALL_CONCRETE
            .into_iter()
            .find(|p| !self.occupied_ports.contains_key(p))
    }

    fn reserve_client_id(&mut self) -> u64 {
        let client_id = self.next_client_id;
        self.next_client_id += 1;
        client_id
    }

    /// Create a new client binding holding `ports`, delayed by
    /// `delay_frames`. `ports` must already have been granted by
    /// [`Self::request_port_mapping`].
    pub fn bind_client(&mut self, ports: Vec<Port>, delay_frames: i32) -> u64 {
        let client_id = self.reserve_client_id();
        for port in &ports {
            self.occupied_ports.insert(*port, client_id);
        }
        self.clients.insert(
            client_id,
            ClientBinding {
                client_id,
                ports,
                delay_frames,
                ready: false,
                sender: None,
            },
        );
        client_id
    }

    pub fn register_stream(&mut self, client_id: u64, sender: ClientSender) -> Result<(), ServerError> {
        let binding = self
            .clients
            .get_mut(&client_id)
            .ok_or(ServerError::NoSuchClient(client_id, self.id))?;
        binding.sender = Some(sender);
        binding.ready = true;
        Ok(())
    }

    pub fn clients_present_and_ready(&self) -> bool {
        !self.clients.is_empty() && self.clients.values().all(|c| c.ready)
    }

    /// Marks a client's event stream as gone, without otherwise touching
    /// its port binding. Used when a stream ends before the console has
    /// started — the client may still reconnect and register a new one.
    pub fn unregister_stream(&mut self, client_id: u64) {
        if let Some(binding) = self.clients.get_mut(&client_id) {
            binding.sender = None;
            binding.ready = false;
        }
    }

    pub fn client_ids(&self) -> Vec<u64> {
        self.clients.keys().copied().collect()
    }

    pub fn binding(&self, client_id: u64) -> Option<&ClientBinding> {
        self.clients.get(&client_id)
    }

    /// Every port bound across every client, paired with the delay that
    /// client's writes are shifted by. Sent to every client as
    /// `StreamStartGame.connected_ports` once the console starts.
    pub fn all_connected_ports(&self) -> Vec<ConnectedPort> {
        self.clients
            .values()
            .flat_map(|c| {
                c.ports.iter().map(move |port| ConnectedPort {
                    port: *port,
                    delay_frames: c.delay_frames,
                })
            })
            .collect()
    }

    pub fn broadcast(&self, msg: netplay_proto::messages::Message) {
        for binding in self.clients.values() {
            if let Some(sender) = &binding.sender {
                let _ = sender.send(msg.clone());
            }
        }
    }

    pub fn send_to(&self, client_id: u64, msg: netplay_proto::messages::Message) {
        if let Some(binding) = self.clients.get(&client_id) {
            if let Some(sender) = &binding.sender {
                let _ = sender.send(msg);
            }
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_requests_take_priority_over_wildcards() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        let alloc = console.request_port_mapping(1, &[Port::PortAny, Port::Port1]);
        assert_eq!(alloc.granted, vec![Port::Port2, Port::Port1]);
        assert!(alloc.rejections.is_empty());
    }

    #[test]
    fn concrete_request_already_occupied_is_rejected() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        console.request_port_mapping(1, &[Port::Port1]);

        let alloc = console.request_port_mapping(2, &[Port::Port1]);
        assert!(alloc.granted.is_empty());
        assert_eq!(alloc.rejections.len(), 1);
        assert_eq!(alloc.rejections[0].port, Port::Port1);
    }

    #[test]
    fn rejection_does_not_consume_a_free_port() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        console.request_port_mapping(1, &[Port::Port1]);

        // Port1 is taken; this rejected attempt must not advance any
        // internal counters that would affect subsequent allocations.
        let _ = console.request_port_mapping(2, &[Port::Port1]);
        let alloc = console.request_port_mapping(3, &[Port::PortAny]);
        assert_eq!(alloc.granted, vec![Port::Port2]);
    }

    #[test]
    fn wildcard_exhaustion_is_rejected_once_all_ports_taken() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        for client in 1..=4u64 {
            let alloc = console.request_port_mapping(client, &[Port::PortAny]);
            assert_eq!(alloc.granted.len(), 1);
        }
        let alloc = console.request_port_mapping(5, &[Port::PortAny]);
        assert!(alloc.granted.is_empty());
        assert_eq!(alloc.rejections.len(), 1);
    }

    #[test]
    fn release_ports_frees_them_for_reallocation() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        let alloc = console.request_port_mapping(1, &[Port::Port1]);
        console.release_ports(&alloc.granted);

        let alloc2 = console.request_port_mapping(2, &[Port::Port1]);
        assert_eq!(alloc2.granted, vec![Port::Port1]);
    }

    #[test]
    fn a_partial_rejection_rolls_back_ports_already_granted_this_call() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        console.request_port_mapping(1, &[Port::Port3]);

        // Port1 would be granted first (concrete requests resolve before
        // the conflicting Port3 is even reached in sorted order), but the
        // whole batch must fail and Port1 must not remain occupied.
        let alloc = console.request_port_mapping(2, &[Port::Port1, Port::Port3]);
        assert!(alloc.granted.is_empty());
        assert_eq!(alloc.rejections.len(), 1);

        let alloc3 = console.request_port_mapping(3, &[Port::Port1]);
        assert_eq!(alloc3.granted, vec![Port::Port1]);
    }

    #[test]
    fn clients_present_and_ready_requires_every_binding_ready() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        assert!(!console.clients_present_and_ready());

        let client_id = console.bind_client(vec![Port::Port1], 2);
        assert!(!console.clients_present_and_ready());

        let (tx, _rx) = mpsc::unbounded_channel();
        console.register_stream(client_id, tx).unwrap();
        assert!(console.clients_present_and_ready());
    }

    #[test]
    fn all_connected_ports_carries_each_client_delay() {
        let mut console = Console::new(1, "t".into(), "r".into(), [0; 16]);
        console.bind_client(vec![Port::Port1], 3);
        console.bind_client(vec![Port::Port2], 5);

        let mut ports = console.all_connected_ports();
        ports.sort_by_key(|p| p.port as i8);
        assert_eq!(ports[0].port, Port::Port1);
        assert_eq!(ports[0].delay_frames, 3);
        assert_eq!(ports[1].port, Port::Port2);
        assert_eq!(ports[1].delay_frames, 5);
    }
}
