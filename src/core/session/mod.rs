//! Per-connection session: the stream manager and its supporting tables.

pub mod background;
pub mod events;
pub mod invocation;
pub mod manager;
pub mod rendezvous;

pub use background::{DeferredReplies, ResultCache, TaskTable};
pub use invocation::InvocationRegister;
pub use manager::{
    AudioChunk, DEFAULT_EXTERNAL_DATA_TIMEOUT, OutboundMessage, SessionError, SessionResult,
    SessionSettings, SessionStreamManager,
};
pub use rendezvous::{ExternalData, PendingExternalData, Rendezvous, RendezvousError};
