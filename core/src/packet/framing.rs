//! Wire framing for application-protocol payloads.
//!
//! Every game packet travelling inside an encapsulation starts with exactly
//! one marker byte; receivers strip it before the payload reaches the packet
//! decoder.

/// Leading byte marking a payload as an application-protocol packet.
pub const FRAME_BYTE: u8 = 0xFE;

/// Prepend the framing byte to an encoded packet body.
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(FRAME_BYTE);
    out.extend_from_slice(body);
    out
}

/// Strip exactly one leading framing byte.
///
/// Returns `None` for an empty payload, so stripping never underflows; the
/// caller treats that as a drop.
pub fn strip_frame(payload: &[u8]) -> Option<&[u8]> {
    payload.split_first().map(|(_, rest)| rest)
}
