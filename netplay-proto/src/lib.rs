//! Wire protocol for the netplay coordination core: framing, message
//! types, and size limits shared by the server and client crates.

pub mod button_codec;
pub mod codec;
pub mod constants;
pub mod error;
pub mod header;
pub mod limits;
pub mod messages;
pub mod msg_id;

pub use button_codec::{ButtonCodec, OpaqueButtonCodec};
pub use error::ProtoError;
pub use header::Header;
pub use messages::Message;
pub use msg_id::MsgId;
