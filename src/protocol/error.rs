//! Protocol error types

use thiserror::Error;

use crate::protocol::types::{Button, ControllerKind, StickSide, SubCommand};
use crate::transport::TransportError;

/// Reasons an inbound or outbound report buffer is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReport {
    #[error("invalid magic byte: expected 0x{expected:02X}, found 0x{found:02X}")]
    InvalidMagic { expected: u8, found: u8 },

    #[error("report is {actual} bytes, needs at least {min}")]
    TooShort { actual: usize, min: usize },

    #[error("unknown report id 0x{0:02X}")]
    UnknownReportId(u8),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed report: {0}")]
    MalformedReport(#[from] MalformedReport),

    #[error("Button {button} is not available on the {kind}")]
    UnsupportedButton { button: Button, kind: ControllerKind },

    #[error("{side:?} stick is not available on the {kind}")]
    UnsupportedStick { side: StickSide, kind: ControllerKind },

    #[error("Range error: offset 0x{offset:X} + length 0x{length:X} exceeds 0x{limit:X}")]
    RangeError { offset: usize, length: usize, limit: usize },

    #[error("Unsupported argument 0x{argument:02X} for sub command {sub_command:?}")]
    UnsupportedArgument { sub_command: SubCommand, argument: u8 },

    #[error("Stick force {0} is outside [0, 1]")]
    InvalidForce(f32),

    #[error("Transport unavailable")]
    TransportUnavailable,

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Flash image is 0x{actual:X} bytes, expected 0x{expected:X}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Failed to read flash image: {0}")]
    Io(#[from] std::io::Error),

    #[error("No async runtime available to drive periodic reports")]
    RuntimeUnavailable,
}

impl From<TransportError> for ProtocolError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotConnected => ProtocolError::TransportUnavailable,
            other => ProtocolError::Transport(other),
        }
    }
}
