//! Batch container packet.
//!
//! Aggregates encoded packets into one transmission unit. The send path wraps
//! any non-batch packet whose encoded form exceeds [`BATCH_THRESHOLD`] in a
//! batch; the container itself is exempt from that check by construction.

use super::GamePacket;
use anyhow::{bail, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

/// Wire id of the batch container packet.
pub const BATCH_PACKET_ID: u8 = 0x06;

/// Encoded size above which a non-batch packet must travel batched: 512 bytes.
/// Fixed, not configurable at runtime.
pub const BATCH_THRESHOLD: usize = 512;

/// Container aggregating already-encoded packets.
///
/// Members are stored as encoded bodies; the container never re-encodes them.
/// Encoded form: `[BATCH_PACKET_ID]` followed by the zlib deflate of
/// `[u32 BE length][body]` for each member.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    bodies: Vec<Vec<u8>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a single encoded packet body — the oversized-packet send path.
    pub fn wrapping(body: Vec<u8>) -> Self {
        Self { bodies: vec![body] }
    }

    /// Append another encoded packet body.
    pub fn push(&mut self, body: Vec<u8>) {
        self.bodies.push(body);
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl GamePacket for Batch {
    fn encode(&self) -> Result<Vec<u8>> {
        let mut plain = Vec::new();
        for body in &self.bodies {
            if body.len() > u32::MAX as usize {
                bail!("batch member too large: {} bytes", body.len());
            }
            plain.extend_from_slice(&(body.len() as u32).to_be_bytes());
            plain.extend_from_slice(body);
        }

        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(plain.len() / 2 + 16),
            Compression::default(),
        );
        encoder.write_all(&plain)?;
        let compressed = encoder.finish()?;

        let mut out = Vec::with_capacity(compressed.len() + 1);
        out.push(BATCH_PACKET_ID);
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn is_batch(&self) -> bool {
        true
    }
}
