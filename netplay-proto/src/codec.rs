use std::io::{Read, Write};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    constants::{HEADER_LEN, TCP_LEN_PREFIX},
    error::ProtoError,
    header::Header,
    limits::{max_payload_for, MAX_TCP_FRAME},
    messages::{
        ClientReady, InvalidData, KeyPressBatch, MakeConsoleRequest, MakeConsoleResponse, Message,
        PingRequest, PingResponse, PlugControllerRequest, PlugControllerResponse,
        ShutDownServerRequest, ShutDownServerResponse, StartGameRequest, StartGameResponse,
        StopConsole, StreamStartGame,
    },
    msg_id::MsgId,
};

fn encode_payload(msg: &Message) -> Result<Vec<u8>, ProtoError> {
    Ok(match msg {
        Message::Ping(m) => postcard::to_stdvec(m)?,
        Message::Pong(m) => postcard::to_stdvec(m)?,
        Message::MakeConsoleRequest(m) => postcard::to_stdvec(m)?,
        Message::MakeConsoleResponse(m) => postcard::to_stdvec(m)?,
        Message::PlugControllerRequest(m) => postcard::to_stdvec(m)?,
        Message::PlugControllerResponse(m) => postcard::to_stdvec(m)?,
        Message::StartGameRequest(m) => postcard::to_stdvec(m)?,
        Message::StartGameResponse(m) => postcard::to_stdvec(m)?,
        Message::ShutDownServerRequest(m) => postcard::to_stdvec(m)?,
        Message::ShutDownServerResponse(m) => postcard::to_stdvec(m)?,
        Message::ClientReady(m) => postcard::to_stdvec(m)?,
        Message::KeyPressBatch(m) => postcard::to_stdvec(m)?,
        Message::StreamStartGame(m) => postcard::to_stdvec(m)?,
        Message::StopConsole(m) => postcard::to_stdvec(m)?,
        Message::InvalidData(m) => postcard::to_stdvec(m)?,
    })
}

/// Decode a payload given the [`MsgId`] carried by its header.
pub fn decode_payload(msg_id: MsgId, payload: &[u8]) -> Result<Message, ProtoError> {
    Ok(match msg_id {
        MsgId::Ping => Message::Ping(postcard::from_bytes::<PingRequest>(payload)?),
        MsgId::Pong => Message::Pong(postcard::from_bytes::<PingResponse>(payload)?),
        MsgId::MakeConsoleRequest => {
            Message::MakeConsoleRequest(postcard::from_bytes::<MakeConsoleRequest>(payload)?)
        }
        MsgId::MakeConsoleResponse => {
            Message::MakeConsoleResponse(postcard::from_bytes::<MakeConsoleResponse>(payload)?)
        }
        MsgId::PlugControllerRequest => Message::PlugControllerRequest(postcard::from_bytes::<
            PlugControllerRequest,
        >(payload)?),
        MsgId::PlugControllerResponse => Message::PlugControllerResponse(postcard::from_bytes::<
            PlugControllerResponse,
        >(payload)?),
        MsgId::StartGameRequest => {
            Message::StartGameRequest(postcard::from_bytes::<StartGameRequest>(payload)?)
        }
        MsgId::StartGameResponse => {
            Message::StartGameResponse(postcard::from_bytes::<StartGameResponse>(payload)?)
        }
        MsgId::ShutDownServerRequest => {
            Message::ShutDownServerRequest(postcard::from_bytes::<ShutDownServerRequest>(payload)?)
        }
        MsgId::ShutDownServerResponse => Message::ShutDownServerResponse(postcard::from_bytes::<
            ShutDownServerResponse,
        >(payload)?),
        MsgId::ClientReady => Message::ClientReady(postcard::from_bytes::<ClientReady>(payload)?),
        MsgId::KeyPressBatch => {
            Message::KeyPressBatch(postcard::from_bytes::<KeyPressBatch>(payload)?)
        }
        MsgId::StreamStartGame => {
            Message::StreamStartGame(postcard::from_bytes::<StreamStartGame>(payload)?)
        }
        MsgId::StopConsole => Message::StopConsole(postcard::from_bytes::<StopConsole>(payload)?),
        MsgId::InvalidData => Message::InvalidData(postcard::from_bytes::<InvalidData>(payload)?),
    })
}

/// Encode a message as `[Header][Payload]`, without the outer TCP length
/// prefix. Used by tests and by callers that manage their own framing.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtoError> {
    let msg_id = msg.msg_id();
    let payload = encode_payload(msg)?;
    if payload.len() > max_payload_for(msg_id) {
        return Err(ProtoError::PayloadTooLarge(payload.len()));
    }

    let mut header = Header::new(msg_id.as_u8());
    header.payload_len = payload.len() as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    let mut hbuf = [0u8; HEADER_LEN];
    header.encode_into(&mut hbuf);
    out.extend_from_slice(&hbuf);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode `[Header][Payload]` (no outer length prefix) into a [`Message`].
pub fn decode_frame(frame: &[u8]) -> Result<Message, ProtoError> {
    let (header, payload) = Header::decode(frame)?;
    let msg_id = MsgId::from_u8(header.msg_id).ok_or(ProtoError::UnknownMsgId(header.msg_id))?;
    decode_payload(msg_id, payload)
}

/// Write one message to a blocking stream as
/// `[u32 LE frame_len][Header][Payload]`.
pub fn write_frame_sync<W: Write>(w: &mut W, msg: &Message) -> Result<(), ProtoError> {
    let frame = encode_frame(msg)?;
    let len = frame.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&frame)?;
    w.flush()?;
    Ok(())
}

/// Read one message from a blocking stream framed by [`write_frame_sync`].
pub fn read_frame_sync<R: Read>(r: &mut R) -> Result<Message, ProtoError> {
    let mut len_buf = [0u8; TCP_LEN_PREFIX];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_TCP_FRAME {
        return Err(ProtoError::FrameTooLarge(len));
    }

    let mut frame = vec![0u8; len];
    r.read_exact(&mut frame)?;
    decode_frame(&frame)
}

/// Write one message to an async stream, same wire format as
/// [`write_frame_sync`].
pub async fn write_frame_async<W: tokio::io::AsyncWrite + Unpin>(
    w: &mut W,
    msg: &Message,
) -> Result<(), ProtoError> {
    let frame = encode_frame(msg)?;
    let len = frame.len() as u32;
    w.write_all(&len.to_le_bytes()).await?;
    w.write_all(&frame).await?;
    w.flush().await?;
    Ok(())
}

/// Read one message from an async stream framed by [`write_frame_async`].
pub async fn read_frame_async<R: tokio::io::AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Message, ProtoError> {
    let mut len_buf = [0u8; TCP_LEN_PREFIX];
    r.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_TCP_FRAME {
        return Err(ProtoError::FrameTooLarge(len));
    }

    let mut frame = vec![0u8; len];
    r.read_exact(&mut frame).await?;
    decode_frame(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MakeConsoleStatus, PingRequest};

    #[test]
    fn round_trips_through_encode_decode_frame() {
        let msg = Message::MakeConsoleResponse(MakeConsoleResponse {
            status: MakeConsoleStatus::Success,
            console_id: 42,
        });
        let frame = encode_frame(&msg).unwrap();
        let decoded = decode_frame(&frame).unwrap();
        match decoded {
            Message::MakeConsoleResponse(r) => {
                assert_eq!(r.console_id, 42);
                assert_eq!(r.status, MakeConsoleStatus::Success);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn sync_write_then_read_round_trips() {
        let msg = Message::Ping(PingRequest);
        let mut buf = Vec::new();
        write_frame_sync(&mut buf, &msg).unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_frame_sync(&mut cursor).unwrap();
        assert!(matches!(decoded, Message::Ping(_)));
    }

    #[test]
    fn oversized_declared_frame_len_is_rejected_before_allocating() {
        let mut buf = Vec::new();
        let huge = (MAX_TCP_FRAME as u32) + 1;
        buf.extend_from_slice(&huge.to_le_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        assert!(matches!(
            read_frame_sync(&mut cursor),
            Err(ProtoError::FrameTooLarge(_))
        ));
    }
}
