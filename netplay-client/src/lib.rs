//! Client-side coordination core: a blocking frame-ordered input queue,
//! a long-lived event-stream handler, and the unary control-plane calls
//! that set up a console and its bound controllers.
//!
//! Deliberately synchronous/thread-based rather than async: the calling
//! emulator thread expects `InputQueue::get` to be an ordinary blocking
//! call on its own stack, not a future it has to drive.

pub mod client;
pub mod config;
pub mod error;
pub mod input_queue;
pub mod stream_handler;

pub use client::{NetplayClient, PlugControllerGrant};
pub use config::ClientConfig;
pub use error::ClientError;
pub use input_queue::{GetError, GetTimeout, InputQueue, PutError};
pub use stream_handler::{
    ClientStreamHandler, GetButtonsError, HandlerStatus, PutButtonsError, ReadUntilError,
    ReadUntilOutcome, TimingEvent, Timings,
};
