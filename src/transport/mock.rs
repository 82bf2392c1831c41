//! Mock transport for testing.
//!
//! Records every written report instead of sending it over Bluetooth, so the
//! protocol engine can be exercised without a console.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Transport, TransportError};

/// In-memory transport. Clones share the same recording.
#[derive(Clone, Debug)]
pub struct MockTransport {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    connected: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a connected mock transport.
    pub fn new() -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(AtomicBool::new(true)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        info!("[MOCK TRANSPORT] Channel {}", if connected { "OPEN" } else { "CLOSED" });
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with `WriteFailed`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of every report written so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().clone()
    }

    /// Drain the recorded reports.
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn write_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<u8>>> {
        self.written.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("mock write failure".to_string()));
        }
        debug!(
            "[MOCK TRANSPORT] WRITE {} bytes: id=0x{:02X}",
            bytes.len(),
            bytes.get(1).copied().unwrap_or(0)
        );
        self.lock().push(bytes.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
