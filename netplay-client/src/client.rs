use std::marker::PhantomData;
use std::net::TcpStream;
use std::time::Duration;

use netplay_proto::button_codec::{ButtonCodec, OpaqueButtonCodec};
use netplay_proto::codec::{read_frame_sync, write_frame_sync};
use netplay_proto::messages::{
    ConnectedPort, MakeConsoleRequest, MakeConsoleResponse, MakeConsoleStatus, Message,
    PingRequest, PlugControllerRequest, PlugControllerResponse, PlugControllerStatus, Port,
    StartGameRequest, StartGameResponse, StartGameStatus,
};
use tracing::instrument;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::stream_handler::ClientStreamHandler;

/// The console and ports a successful `PlugController` call granted.
#[derive(Debug, Clone)]
pub struct PlugControllerGrant {
    pub console_id: u64,
    pub client_id: u64,
    pub ports: Vec<Port>,
}

/// Entry point for the unary control-plane calls (`MakeConsole`,
/// `PlugController`, `StartGame`) and for opening the event stream
/// afterward.
///
/// Each unary call opens its own short-lived connection, bounded by
/// `config.unary_deadline`; the event stream gets its own long-lived
/// connection, opened separately via [`NetplayClient::open_event_stream`].
///
/// Generic over the [`ButtonCodec`] used to translate this emulator's
/// native controller state to and from the wire; defaults to
/// [`OpaqueButtonCodec`] for integrations that speak the wire schema
/// directly.
pub struct NetplayClient<C: ButtonCodec = OpaqueButtonCodec> {
    config: ClientConfig,
    _codec: PhantomData<C>,
}

impl NetplayClient<OpaqueButtonCodec> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_codec(config)
    }
}

impl<C: ButtonCodec> NetplayClient<C> {
    /// Build a client for a codec other than the default
    /// [`OpaqueButtonCodec`].
    pub fn with_codec(config: ClientConfig) -> Self {
        Self {
            config,
            _codec: PhantomData,
        }
    }

    fn unary_connection(&self) -> Result<TcpStream, ClientError> {
        let stream = TcpStream::connect(&self.config.server_addr).map_err(ClientError::ConnectionFailed)?;
        stream
            .set_read_timeout(Some(self.config.unary_deadline))
            .map_err(ClientError::Io)?;
        stream
            .set_write_timeout(Some(self.config.unary_deadline))
            .map_err(ClientError::Io)?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }

    fn call_unary(&self, request: Message) -> Result<Message, ClientError> {
        let mut stream = self.unary_connection()?;
        write_frame_sync(&mut stream, &request)?;
        let response = read_frame_sync(&mut stream).map_err(|e| match e {
            netplay_proto::ProtoError::Io(io)
                if io.kind() == std::io::ErrorKind::WouldBlock
                    || io.kind() == std::io::ErrorKind::TimedOut =>
            {
                ClientError::UnaryTimeout(self.config.unary_deadline)
            }
            other => ClientError::Protocol(other),
        })?;
        Ok(response)
    }

    #[instrument(skip(self))]
    pub fn ping(&self) -> Result<(), ClientError> {
        match self.call_unary(Message::Ping(PingRequest))? {
            Message::Pong(_) => Ok(()),
            _ => Err(ClientError::UnexpectedMessage),
        }
    }

    #[instrument(skip(self, rom_file_md5))]
    pub fn make_console(
        &self,
        console_title: impl Into<String>,
        rom_name: impl Into<String>,
        rom_file_md5: [u8; 16],
    ) -> Result<u64, ClientError> {
        let request = Message::MakeConsoleRequest(MakeConsoleRequest {
            console_title: console_title.into(),
            rom_name: rom_name.into(),
            rom_file_md5,
        });
        match self.call_unary(request)? {
            Message::MakeConsoleResponse(MakeConsoleResponse {
                status: MakeConsoleStatus::Success,
                console_id,
            }) => Ok(console_id),
            Message::MakeConsoleResponse(MakeConsoleResponse { status, .. }) => {
                Err(ClientError::MakeConsoleFailed(status))
            }
            _ => Err(ClientError::UnexpectedMessage),
        }
    }

    #[instrument(skip(self, rom_file_md5))]
    pub fn plug_controllers(
        &self,
        console_id: u64,
        rom_file_md5: [u8; 16],
        delay_frames: i32,
        requested_ports: Vec<Port>,
    ) -> Result<PlugControllerGrant, ClientError> {
        let request = Message::PlugControllerRequest(PlugControllerRequest {
            console_id,
            rom_file_md5,
            delay_frames,
            requested_ports,
        });
        match self.call_unary(request)? {
            Message::PlugControllerResponse(PlugControllerResponse {
                console_id: resp_console_id,
                status: PlugControllerStatus::Success,
                ..
            }) if resp_console_id != console_id => Err(ClientError::UnexpectedMessage),
            Message::PlugControllerResponse(PlugControllerResponse {
                status: PlugControllerStatus::Success,
                client_id,
                ports,
                ..
            }) => Ok(PlugControllerGrant {
                console_id,
                client_id,
                ports,
            }),
            Message::PlugControllerResponse(PlugControllerResponse { status, .. }) => {
                Err(ClientError::PlugControllerFailed(status))
            }
            _ => Err(ClientError::UnexpectedMessage),
        }
    }

    #[instrument(skip(self))]
    pub fn start_game(&self, console_id: u64) -> Result<(), ClientError> {
        let request = Message::StartGameRequest(StartGameRequest { console_id });
        match self.call_unary(request)? {
            Message::StartGameResponse(StartGameResponse {
                status: StartGameStatus::Success,
            }) => Ok(()),
            Message::StartGameResponse(StartGameResponse { status }) => {
                Err(ClientError::StartGameFailed(status))
            }
            _ => Err(ClientError::UnexpectedMessage),
        }
    }

    /// Open the long-lived event-stream connection for a grant obtained
    /// from [`Self::plug_controllers`], and block until the server starts
    /// the game.
    pub fn open_event_stream(
        &self,
        grant: &PlugControllerGrant,
    ) -> Result<(ClientStreamHandler<C>, Vec<ConnectedPort>), ClientError> {
        let write_stream =
            TcpStream::connect(&self.config.server_addr).map_err(ClientError::ConnectionFailed)?;
        write_stream.set_nodelay(true).ok();
        // No read timeout on the event-stream connection: it's meant to
        // block indefinitely until StreamStartGame/StopConsole, an I/O
        // error, or try_cancel().
        write_stream.set_read_timeout(None).map_err(ClientError::Io)?;
        let read_stream = write_stream.try_clone().map_err(ClientError::Io)?;

        let handler = ClientStreamHandler::<C>::new(
            write_stream,
            read_stream,
            grant.console_id,
            grant.client_id,
            grant.ports.clone(),
        );
        handler.ready_and_wait_for_console_start()?;
        let connected_ports = handler.connected_ports();
        Ok((handler, connected_ports))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_nonzero_unary_deadline() {
        let config = ClientConfig::new("127.0.0.1:0");
        assert!(config.unary_deadline > Duration::ZERO);
    }
}
