//! Outbound side of a frame-oriented connection.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Sink for outbound frames.
///
/// Frames are whole protocol messages; implementations must preserve
/// their boundaries.
pub trait Transport {
    /// Queue one frame for sending.
    fn send(&mut self, frame: Vec<u8>) -> io::Result<()>;

    /// Close the connection. Further sends fail.
    fn close(&mut self);
}

#[derive(Debug, Default)]
struct MemoryLog {
    sent: Vec<Vec<u8>>,
    closed: bool,
}

/// In-process transport that records every frame.
///
/// Clones share the same log, so a test can keep one handle while the
/// engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every frame sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.log().sent.clone()
    }

    /// Drain the recorded frames.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.log().sent)
    }

    pub fn is_closed(&self) -> bool {
        self.log().closed
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, frame: Vec<u8>) -> io::Result<()> {
        let mut log = self.log();
        if log.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport closed"));
        }
        log.sent.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.log().closed = true;
    }
}
