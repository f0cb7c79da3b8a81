//! Application packet contract and wire framing.
//!
//! The concrete packet schema lives upstream of this crate; the relay only
//! needs a packet to encode itself and answer two scheduling questions.

pub mod batch;
pub mod framing;

pub use batch::{Batch, BATCH_PACKET_ID, BATCH_THRESHOLD};
pub use framing::{frame, strip_frame, FRAME_BYTE};

use anyhow::Result;

/// An application-level game packet, as the relay sees it.
pub trait GamePacket: Send + Sync {
    /// Encode to wire bytes, excluding the transport framing byte.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Whether this packet forces immediate delivery regardless of caller
    /// intent.
    fn wants_immediate(&self) -> bool {
        false
    }

    /// Whether this packet is a batch container. Batches are exempt from the
    /// size-threshold wrapping, so the batching decision is this one boolean.
    fn is_batch(&self) -> bool {
        false
    }
}
