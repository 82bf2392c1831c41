//! Protocol type definitions
//!
//! Controller variants, logical buttons, stick presets and the id spaces of
//! the two report families.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Controller variant, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    JoyConL,
    JoyConR,
    #[default]
    ProController,
}

impl ControllerKind {
    /// Identifier byte reported in the device info reply
    pub fn device_id(self) -> u8 {
        match self {
            ControllerKind::JoyConL => 0x01,
            ControllerKind::JoyConR => 0x02,
            ControllerKind::ProController => 0x03,
        }
    }

    /// Human readable name (also used as the Bluetooth device name)
    pub fn name(self) -> &'static str {
        match self {
            ControllerKind::JoyConL => "Joy-Con (L)",
            ControllerKind::JoyConR => "Joy-Con (R)",
            ControllerKind::ProController => "Pro Controller",
        }
    }

    pub fn has_stick(self, side: StickSide) -> bool {
        match side {
            StickSide::Left => matches!(self, ControllerKind::ProController | ControllerKind::JoyConL),
            StickSide::Right => matches!(self, ControllerKind::ProController | ControllerKind::JoyConR),
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical controller button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Y, X, B, A,
    R,
    #[serde(rename = "zr")]
    ZR,
    L,
    #[serde(rename = "zl")]
    ZL,
    Minus, Plus, Home, Capture,
    RightStick, LeftStick,
    Down, Up, Right, Left,
    // Side buttons, meaning depends on which Joy-Con is emulated
    #[serde(rename = "sr")]
    SR,
    #[serde(rename = "sl")]
    SL,
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which analog stick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StickSide {
    Left,
    Right,
}

/// Directional stick presets (8-way + center)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickDirection {
    Center,
    Top,
    TopRight,
    Right,
    BottomRight,
    Bottom,
    BottomLeft,
    Left,
    TopLeft,
}

impl StickDirection {
    /// The eight outer directions, clockwise from the top
    pub const CLOCKWISE: [StickDirection; 8] = [
        StickDirection::Top,
        StickDirection::TopRight,
        StickDirection::Right,
        StickDirection::BottomRight,
        StickDirection::Bottom,
        StickDirection::BottomLeft,
        StickDirection::Left,
        StickDirection::TopLeft,
    ];

    /// Unit displacement per axis: (horizontal, vertical), each in {-1, 0, 1}
    pub(crate) fn axes(self) -> (i8, i8) {
        match self {
            StickDirection::Center => (0, 0),
            StickDirection::Top => (0, 1),
            StickDirection::TopRight => (1, 1),
            StickDirection::Right => (1, 0),
            StickDirection::BottomRight => (1, -1),
            StickDirection::Bottom => (0, -1),
            StickDirection::BottomLeft => (-1, -1),
            StickDirection::Left => (-1, 0),
            StickDirection::TopLeft => (-1, 1),
        }
    }
}

/// Sub commands embedded in output reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubCommand {
    RequestDeviceInfo,
    SetInputReportMode,
    TriggerButtonsElapsedTime,
    SetHciState,
    SetShipmentState,
    SpiFlashRead,
    SetNfcIrMcuConfig,
    SetNfcIrMcuState,
    SetPlayerLights,
    Enable6AxisSensor,
    EnableVibration,
}

impl SubCommand {
    pub fn id(self) -> u8 {
        match self {
            SubCommand::RequestDeviceInfo => 0x02,
            SubCommand::SetInputReportMode => 0x03,
            SubCommand::TriggerButtonsElapsedTime => 0x04,
            SubCommand::SetHciState => 0x06,
            SubCommand::SetShipmentState => 0x08,
            SubCommand::SpiFlashRead => 0x10,
            SubCommand::SetNfcIrMcuConfig => 0x21,
            SubCommand::SetNfcIrMcuState => 0x22,
            SubCommand::SetPlayerLights => 0x30,
            SubCommand::Enable6AxisSensor => 0x40,
            SubCommand::EnableVibration => 0x48,
        }
    }

    /// Classify a raw sub command id, `None` for ids this controller does not implement
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x02 => Some(SubCommand::RequestDeviceInfo),
            0x03 => Some(SubCommand::SetInputReportMode),
            0x04 => Some(SubCommand::TriggerButtonsElapsedTime),
            0x06 => Some(SubCommand::SetHciState),
            0x08 => Some(SubCommand::SetShipmentState),
            0x10 => Some(SubCommand::SpiFlashRead),
            0x21 => Some(SubCommand::SetNfcIrMcuConfig),
            0x22 => Some(SubCommand::SetNfcIrMcuState),
            0x30 => Some(SubCommand::SetPlayerLights),
            0x40 => Some(SubCommand::Enable6AxisSensor),
            0x48 => Some(SubCommand::EnableVibration),
            _ => None,
        }
    }
}

/// Output report ids (console -> controller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputReportId {
    SubCommand,
    RumbleOnly,
    RequestIrNfcMcu,
}

impl OutputReportId {
    pub fn id(self) -> u8 {
        match self {
            OutputReportId::SubCommand => 0x01,
            OutputReportId::RumbleOnly => 0x10,
            OutputReportId::RequestIrNfcMcu => 0x11,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(OutputReportId::SubCommand),
            0x10 => Some(OutputReportId::RumbleOnly),
            0x11 => Some(OutputReportId::RequestIrNfcMcu),
            _ => None,
        }
    }
}

/// Input report shapes (controller -> console)
///
/// All shapes share one fixed-size buffer; they differ in the prefix that is
/// actually transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputReportId {
    /// Only sent to elicit a response during the handshake
    Empty,
    /// Button/stick status plus a sub command reply
    Standard,
    /// Button/stick status plus 6-axis data, used in full mode
    Imu,
    /// Button/stick status plus the NFC/IR payload region
    NfcIr,
}

impl InputReportId {
    pub fn id(self) -> u8 {
        match self {
            InputReportId::Empty => 0x00,
            InputReportId::Standard => 0x21,
            InputReportId::Imu => 0x30,
            InputReportId::NfcIr => 0x31,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(InputReportId::Empty),
            0x21 => Some(InputReportId::Standard),
            0x30 => Some(InputReportId::Imu),
            0x31 => Some(InputReportId::NfcIr),
            _ => None,
        }
    }

    /// Number of leading buffer bytes put on the wire
    pub fn transmit_len(self) -> usize {
        match self {
            InputReportId::Imu => 14,
            InputReportId::NfcIr => 363,
            InputReportId::Empty | InputReportId::Standard => 51,
        }
    }

    /// Whether the console may request this shape as a continuous report mode
    pub fn is_full_mode(self) -> bool {
        matches!(self, InputReportId::Imu | InputReportId::NfcIr)
    }
}
