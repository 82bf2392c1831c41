//! joycontrol-rs: Nintendo Switch controller emulation
//!
//! This library impersonates a Pro Controller or Joy-Con at the Bluetooth HID
//! application layer. The Bluetooth stack itself is abstracted behind the
//! [`transport::Transport`] trait; everything above it (report codecs, SPI
//! flash, button/stick state and the sub command state machine) lives here.

pub mod config;
pub mod host_cache;
pub mod protocol;
pub mod quick_action;
pub mod session;
pub mod transport;

// Re-export commonly used items
pub use config::Config;
pub use host_cache::HostCache;
pub use protocol::{Button, ControllerKind, ControllerProtocol, SessionEvent, StickDirection, StickSide};
pub use quick_action::QuickAction;
pub use session::{ControllerSession, SessionError};
pub use transport::{MockTransport, Transport};
