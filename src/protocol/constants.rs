//! Switch controller protocol constants
//!
//! This module contains the fixed values of the Bluetooth HID protocol:
//! - Report magic bytes and buffer sizes
//! - Input report field offsets
//! - SPI flash layout (stick calibration blocks)
//! - Sub command acknowledgement bytes
//! - Timing defaults

use std::time::Duration;

// ============================================================================
// Report framing
// ============================================================================

/// Leading byte of every input report (controller -> console)
pub const INPUT_REPORT_MAGIC: u8 = 0xA1;

/// Leading byte of every output report (console -> controller)
pub const OUTPUT_REPORT_MAGIC: u8 = 0xA2;

/// Size of the internal input report buffer
pub const INPUT_REPORT_SIZE: usize = 364;

/// Size of a default output report buffer
pub const OUTPUT_REPORT_SIZE: usize = 50;

// ============================================================================
// Input report offsets
// ============================================================================

pub const INPUT_REPORT_ID_INDEX: usize = 1;
pub const INPUT_TIMER_INDEX: usize = 2;
pub const INPUT_MISC_INDEX: usize = 3;
pub const INPUT_BUTTONS_INDEX: usize = 4;
pub const INPUT_LEFT_STICK_INDEX: usize = 7;
pub const INPUT_RIGHT_STICK_INDEX: usize = 10;
pub const INPUT_VIBRATOR_INDEX: usize = 13;
pub const INPUT_ACK_INDEX: usize = 14;
pub const INPUT_REPLY_TO_INDEX: usize = 15;

/// First byte of the sub command reply payload
pub const INPUT_REPLY_DATA_INDEX: usize = 16;

/// Last byte (inclusive) of a standard report
pub const INPUT_STANDARD_LAST_INDEX: usize = 50;

/// Last byte (inclusive) of the 6-axis block in IMU reports
pub const INPUT_IMU_LAST_INDEX: usize = 49;

/// First byte of the NFC/IR payload region
pub const INPUT_NFC_IR_DATA_INDEX: usize = 50;

/// Battery level + connection info
pub const MISC_BATTERY_CONNECTION: u8 = 0x8E;

/// Vibrator input placeholder
pub const VIBRATOR_PLACEHOLDER: u8 = 0x80;

// ============================================================================
// Output report offsets
// ============================================================================

pub const OUTPUT_REPORT_ID_INDEX: usize = 1;
pub const OUTPUT_TIMER_INDEX: usize = 2;
pub const OUTPUT_RUMBLE_INDEX: usize = 3;
pub const OUTPUT_RUMBLE_LEN: usize = 8;
pub const OUTPUT_SUB_COMMAND_INDEX: usize = 11;
pub const OUTPUT_SUB_COMMAND_DATA_INDEX: usize = 12;

// ============================================================================
// SPI flash layout
// ============================================================================

/// Size of the simulated SPI flash (512 KiB)
pub const FLASH_SIZE: usize = 0x80000;

/// Value of an erased flash byte
pub const FLASH_BLANK_BYTE: u8 = 0xFF;

/// Length of a packed stick calibration block
pub const STICK_CALIBRATION_LEN: usize = 9;

pub const FACTORY_LEFT_STICK_CALIBRATION_OFFSET: usize = 0x603D;
pub const FACTORY_RIGHT_STICK_CALIBRATION_OFFSET: usize = 0x6046;

pub const USER_LEFT_STICK_MAGIC_OFFSET: usize = 0x8010;
pub const USER_LEFT_STICK_CALIBRATION_OFFSET: usize = 0x8012;
pub const USER_RIGHT_STICK_MAGIC_OFFSET: usize = 0x801B;
pub const USER_RIGHT_STICK_CALIBRATION_OFFSET: usize = 0x801D;

/// Marks a present user calibration block
pub const USER_CALIBRATION_MAGIC: [u8; 2] = [0xB2, 0xA1];

pub const FACTORY_LEFT_STICK_CALIBRATION: [u8; STICK_CALIBRATION_LEN] =
    [0x00, 0x07, 0x70, 0x00, 0x08, 0x80, 0x00, 0x07, 0x70];

pub const FACTORY_RIGHT_STICK_CALIBRATION: [u8; STICK_CALIBRATION_LEN] =
    [0x00, 0x08, 0x80, 0x00, 0x07, 0x70, 0x00, 0x07, 0x70];

/// Largest payload a single SPI flash read may request
pub const SPI_READ_MAX_SIZE: u8 = 0x1D;

// ============================================================================
// Sub command replies
// ============================================================================

pub const ACK_DEFAULT: u8 = 0x80;
pub const ACK_DEVICE_INFO: u8 = 0x82;
pub const ACK_TRIGGER_ELAPSED_TIME: u8 = 0x83;
pub const ACK_SPI_FLASH_READ: u8 = 0x90;
pub const ACK_NFC_IR_MCU_CONFIG: u8 = 0xA0;

pub const DEFAULT_FIRMWARE_VERSION: [u8; 2] = [0x04, 0x00];

/// Elapsed time reported for the pairing trigger buttons. The console assigns a
/// player slot once it sees this value.
pub const PAIRING_TRIGGER_ELAPSED_MS: u32 = 3000;

/// Placeholder reply to the NFC/IR MCU configuration request
pub const NFC_IR_MCU_CONFIG_REPLY: [u8; 34] = [
    0x01, 0x00, 0xFF, 0x00, 0x08, 0x00, 0x1B, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xC8,
];

// ============================================================================
// Timing Constants
// ============================================================================

/// Periodic input report cadence in full mode (~66 Hz)
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(15);

/// Empty reports sent when the interrupt channel opens
pub const DEFAULT_HANDSHAKE_NUDGES: usize = 10;

/// Default hold time of a press-then-release button push (milliseconds)
pub const DEFAULT_BUTTON_PUSH_MS: u64 = 100;
