// Transport module — the reliable-UDP contract the relay consumes

pub mod abstraction;
pub mod local;

pub use abstraction::{
    EncapsulatedMessage, Reliability, SendFlags, SessionId, TransportDriver, TransportError,
    TransportEvent,
};
pub use local::{LocalTransport, RecordedSend};
