//! Byte-stream transport abstraction
//!
//! The protocol engine does not talk to a Bluetooth stack directly. Whatever
//! owns the HID interrupt channel implements [`Transport`] for the outbound
//! direction and feeds inbound reports to the engine.

pub mod mock;

pub use mock::MockTransport;

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Channel is not connected")]
    NotConnected,

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Outbound half of the HID interrupt channel
pub trait Transport: Send + Sync + 'static {
    /// Send one complete report. Must not interleave with other writes.
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Whether the channel is currently open
    fn is_connected(&self) -> bool;
}

impl<T: Transport> Transport for Arc<T> {
    fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        T::write(self, bytes)
    }

    fn is_connected(&self) -> bool {
        T::is_connected(self)
    }
}
