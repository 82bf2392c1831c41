//! Switch controller emulation protocol
//!
//! This module provides the controller side of the Bluetooth HID protocol:
//! - Input/output report codecs
//! - Simulated SPI flash with stick calibration
//! - Button and analog stick state
//! - The sub command state machine and periodic report sender

pub mod constants;
pub mod types;
pub mod error;
pub mod flash;
pub mod buttons;
pub mod stick;
pub mod state;
pub mod report;
pub mod engine;

// Re-export commonly used items
pub use types::*;
pub use error::{MalformedReport, ProtocolError};
pub use flash::FlashMemory;
pub use buttons::ButtonState;
pub use stick::{StickCalibration, StickState};
pub use state::ControllerState;
pub use report::{InputReport, OutputReport, TriggerButton};
pub use engine::{ControllerProtocol, ProtocolPhase, ProtocolSettings, SessionEvent};
