// basalt-core — transport relay layer for a Bedrock-protocol game proxy
//
// The relay sits between a reliable-UDP transport and the upstream game
// sessions: transport events in, framed encapsulations out, with a 512-byte
// batching policy on the way down.

pub mod packet;
pub mod relay;
pub mod session;
pub mod transport;

pub use packet::{Batch, GamePacket, BATCH_PACKET_ID, BATCH_THRESHOLD, FRAME_BYTE};
pub use relay::{Advertisement, RelayController, DEFAULT_DISCONNECT_REASON};
pub use session::{SessionFactory, SessionRegistry, UpstreamSession};
pub use transport::{
    EncapsulatedMessage, LocalTransport, RecordedSend, Reliability, SendFlags, SessionId,
    TransportDriver, TransportError, TransportEvent,
};
