//! Reassembly of multi-frame payloads.
//!
//! Long strings arrive as a run of frames that all carry the same opcode
//! (or its `_END` twin on the last one). Only the first byte of each frame
//! is protocol; the rest is payload.

/// Append the payload of `frame` to `acc`.
///
/// A frame with no payload leaves `acc` untouched, so `None` stays `None`.
pub fn merge(acc: Option<Vec<u8>>, frame: &[u8]) -> Option<Vec<u8>> {
    if frame.len() <= 1 {
        return acc;
    }
    let payload = &frame[1..];
    match acc {
        None => Some(payload.to_vec()),
        Some(mut data) => {
            data.extend_from_slice(payload);
            Some(data)
        }
    }
}

/// Accumulator for one text field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reassembler {
    data: Option<Vec<u8>>,
}

impl Reassembler {
    /// An empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame, opcode byte included.
    pub fn push(&mut self, frame: &[u8]) {
        self.data = merge(self.data.take(), frame);
    }

    /// Take the accumulated payload and reset. Empty when nothing carried
    /// payload.
    pub fn take(&mut self) -> Vec<u8> {
        self.data.take().unwrap_or_default()
    }

    /// Discard whatever has been collected.
    pub fn reset(&mut self) {
        self.data = None;
    }

    /// Whether no payload has been collected since the last reset.
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }
}
