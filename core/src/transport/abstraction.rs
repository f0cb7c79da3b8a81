//! Transport abstraction layer for basalt
//!
//! The reliable-UDP transport (connection lifecycle, retransmission,
//! acknowledgement tracking) lives outside this crate. These are the types
//! and the contract through which the relay consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque token naming a transport-level peer connection.
///
/// Issued by the transport, never by this layer; stable for the lifetime of
/// the connection.
pub type SessionId = String;

/// Delivery guarantee requested for an encapsulated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Reliability {
    /// Fire-and-forget datagram
    Unreliable = 0,
    /// Unreliable, but stale arrivals are dropped
    UnreliableSequenced = 1,
    /// Retransmitted until acknowledged, delivered in order
    ReliableOrdered = 2,
}

impl Reliability {
    /// Convert from the wire discriminant
    pub fn from_u8(value: u8) -> Result<Self, TransportError> {
        match value {
            0 => Ok(Reliability::Unreliable),
            1 => Ok(Reliability::UnreliableSequenced),
            2 => Ok(Reliability::ReliableOrdered),
            other => Err(TransportError::InvalidReliability(other)),
        }
    }

    /// Convert to the wire discriminant
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Bit flags handed to the transport with each send.
///
/// Two concerns are composed here: whether the transport must track an
/// acknowledgement for the message, and how the message is scheduled
/// (immediate vs normal). The transport consumes the bits opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFlags(u8);

impl SendFlags {
    /// The transport must report an acknowledgement for this message
    pub const NEED_ACK: u8 = 0b0000_1000;
    /// Skip the normal send queue and flush on submission
    pub const PRIORITY_IMMEDIATE: u8 = 0b0000_0001;
    /// Default scheduling
    pub const PRIORITY_NORMAL: u8 = 0b0000_0000;

    /// Flags from raw bits, as delivered by the transport
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Flag set for an outbound game packet: acknowledgement required plus
    /// the requested scheduling priority.
    pub fn for_game_packet(immediate: bool) -> Self {
        let priority = if immediate {
            Self::PRIORITY_IMMEDIATE
        } else {
            Self::PRIORITY_NORMAL
        };
        Self(Self::NEED_ACK | priority)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn needs_ack(&self) -> bool {
        self.0 & Self::NEED_ACK != 0
    }

    pub fn is_immediate(&self) -> bool {
        self.0 & Self::PRIORITY_IMMEDIATE != 0
    }
}

impl fmt::Display for SendFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SendFlags {{ ack: {}, priority: {} }}",
            self.needs_ack(),
            if self.is_immediate() { "immediate" } else { "normal" }
        )
    }
}

/// A transport-framed unit: payload plus delivery-guarantee metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncapsulatedMessage {
    /// Raw payload bytes, framing byte included
    pub payload: Vec<u8>,
    /// Requested delivery guarantee
    pub reliability: Reliability,
    /// Whether the transport must track an acknowledgement
    pub need_ack: bool,
    /// Sequence index for ordered-reliable messages. Always 0 at this layer;
    /// ordering beyond reliability is the transport's business.
    pub message_index: u32,
}

impl EncapsulatedMessage {
    /// Encapsulation for an outbound game packet: reliable-ordered,
    /// acknowledgement required, sequence index 0.
    pub fn reliable_ordered(payload: Vec<u8>) -> Self {
        Self {
            payload,
            reliability: Reliability::ReliableOrdered,
            need_ack: true,
            message_index: 0,
        }
    }
}

/// Events delivered by the transport into the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransportEvent {
    /// A peer connection came up
    SessionOpened {
        identifier: SessionId,
        address: String,
        port: u16,
        client_token: u64,
    },
    /// A peer connection went away
    SessionClosed {
        identifier: SessionId,
        reason: String,
    },
    /// An encapsulated message arrived for a session
    Encapsulated {
        identifier: SessionId,
        message: EncapsulatedMessage,
        flags: SendFlags,
    },
    /// An unconnected datagram arrived
    Raw {
        address: String,
        port: u16,
        payload: Vec<u8>,
    },
    /// The transport confirmed delivery of a tracked message
    Ack { identifier: SessionId, ack_id: u32 },
    /// A transport option changed
    Option { name: String, value: String },
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::SessionOpened {
                identifier,
                address,
                port,
                ..
            } => write!(
                f,
                "SessionOpened {{ identifier: {}, peer: {}:{} }}",
                identifier, address, port
            ),
            TransportEvent::SessionClosed { identifier, reason } => write!(
                f,
                "SessionClosed {{ identifier: {}, reason: {} }}",
                identifier, reason
            ),
            TransportEvent::Encapsulated {
                identifier,
                message,
                ..
            } => write!(
                f,
                "Encapsulated {{ identifier: {}, payload_len: {} }}",
                identifier,
                message.payload.len()
            ),
            TransportEvent::Raw {
                address,
                port,
                payload,
            } => write!(
                f,
                "Raw {{ peer: {}:{}, payload_len: {} }}",
                address,
                port,
                payload.len()
            ),
            TransportEvent::Ack { identifier, ack_id } => {
                write!(f, "Ack {{ identifier: {}, ack_id: {} }}", identifier, ack_id)
            }
            TransportEvent::Option { name, value } => {
                write!(f, "Option {{ name: {}, value: {} }}", name, value)
            }
        }
    }
}

/// Errors surfaced by the transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Transport already shut down")]
    Closed,

    #[error("Shutdown failed: {0}")]
    ShutdownFailed(String),

    #[error("Invalid reliability: {0}")]
    InvalidReliability(u8),
}

/// The reliable-UDP transport, consumed through this contract only.
///
/// Implementations must be callable from any thread; none of these methods
/// may block. Retransmission, congestion and reconnection are entirely the
/// implementation's business — the relay performs fire-and-forget submission.
pub trait TransportDriver: Send + Sync {
    /// Queue an encapsulated message toward a peer.
    fn send(
        &self,
        identifier: &str,
        message: EncapsulatedMessage,
        flags: SendFlags,
    ) -> Result<(), TransportError>;

    /// Administrative close: terminate the peer connection with a reason.
    fn close_session(&self, identifier: &str, reason: &str) -> Result<(), TransportError>;

    /// Publish a transport option, e.g. the server-list advertisement.
    fn send_option(&self, name: &str, value: &str);

    /// Release the transport resource. No events are delivered afterward.
    fn shutdown(&self) -> Result<(), TransportError>;

    /// Next pending event, if any. Never blocks waiting for one.
    fn poll_event(&self) -> Option<TransportEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_conversion() {
        assert_eq!(Reliability::Unreliable.as_u8(), 0);
        assert_eq!(Reliability::UnreliableSequenced.as_u8(), 1);
        assert_eq!(Reliability::ReliableOrdered.as_u8(), 2);

        assert_eq!(
            Reliability::from_u8(2).unwrap(),
            Reliability::ReliableOrdered
        );
        assert!(Reliability::from_u8(7).is_err());
    }

    #[test]
    fn test_send_flags_composition() {
        let flags = SendFlags::for_game_packet(true);
        assert!(flags.needs_ack());
        assert!(flags.is_immediate());

        let flags = SendFlags::for_game_packet(false);
        assert!(flags.needs_ack());
        assert!(!flags.is_immediate());

        assert_eq!(
            SendFlags::for_game_packet(true).bits(),
            SendFlags::NEED_ACK | SendFlags::PRIORITY_IMMEDIATE
        );
    }

    #[test]
    fn test_send_flags_from_bits_roundtrip() {
        let flags = SendFlags::from_bits(SendFlags::NEED_ACK);
        assert!(flags.needs_ack());
        assert!(!flags.is_immediate());
        assert_eq!(flags.bits(), SendFlags::NEED_ACK);
    }

    #[test]
    fn test_reliable_ordered_defaults() {
        let message = EncapsulatedMessage::reliable_ordered(vec![0xFE, 0x01]);
        assert_eq!(message.reliability, Reliability::ReliableOrdered);
        assert!(message.need_ack);
        assert_eq!(message.message_index, 0);
        assert_eq!(message.payload, vec![0xFE, 0x01]);
    }

    #[test]
    fn test_event_display() {
        let event = TransportEvent::SessionOpened {
            identifier: "raknet:1".into(),
            address: "10.0.0.1".into(),
            port: 19132,
            client_token: 42,
        };
        let display = format!("{}", event);
        assert!(display.contains("SessionOpened"));
        assert!(display.contains("10.0.0.1:19132"));
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = TransportEvent::Encapsulated {
            identifier: "raknet:1".into(),
            message: EncapsulatedMessage::reliable_ordered(vec![0xFE, 0x01, 0x02]),
            flags: SendFlags::for_game_packet(false),
        };

        let serialized = bincode::serialize(&event).expect("serialization failed");
        let deserialized: TransportEvent =
            bincode::deserialize(&serialized).expect("deserialization failed");

        match deserialized {
            TransportEvent::Encapsulated {
                identifier,
                message,
                flags,
            } => {
                assert_eq!(identifier, "raknet:1");
                assert_eq!(message.payload, vec![0xFE, 0x01, 0x02]);
                assert!(flags.needs_ack());
            }
            other => panic!("wrong event type after deserialization: {}", other),
        }
    }
}
