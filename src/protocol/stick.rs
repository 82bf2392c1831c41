//! Calibrated analog stick model
//!
//! Positions are two unsigned 12-bit axes. Direction presets move from the
//! calibration center toward the calibrated extremes, scaled by a force factor.

use log::trace;

use crate::protocol::constants::STICK_CALIBRATION_LEN;
use crate::protocol::error::ProtocolError;
use crate::protocol::types::StickDirection;

/// Largest value of a 12-bit axis
pub const STICK_AXIS_MAX: u16 = 0xFFF;

/// Stick calibration: center plus the reach above and below it on each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickCalibration {
    pub h_center: u16,
    pub v_center: u16,
    pub h_max_above_center: u16,
    pub v_max_above_center: u16,
    pub h_max_below_center: u16,
    pub v_max_below_center: u16,
}

/// Low 12-bit value of a nibble-packed pair, starting at `b[i]`
fn unpack_h(b: &[u8; STICK_CALIBRATION_LEN], i: usize) -> u16 {
    ((u16::from(b[i + 1]) << 8) & 0xF00) | u16::from(b[i])
}

/// High 12-bit value of a nibble-packed pair, starting at `b[i]`
fn unpack_v(b: &[u8; STICK_CALIBRATION_LEN], i: usize) -> u16 {
    (u16::from(b[i + 2]) << 4) | (u16::from(b[i + 1]) >> 4)
}

impl StickCalibration {
    /// Unpack a left stick block: max above, center, max below
    pub fn from_left_bytes(b: &[u8; STICK_CALIBRATION_LEN]) -> Self {
        Self {
            h_max_above_center: unpack_h(b, 0),
            v_max_above_center: unpack_v(b, 0),
            h_center: unpack_h(b, 3),
            v_center: unpack_v(b, 3),
            h_max_below_center: unpack_h(b, 6),
            v_max_below_center: unpack_v(b, 6),
        }
    }

    /// Unpack a right stick block: center, max below, max above
    pub fn from_right_bytes(b: &[u8; STICK_CALIBRATION_LEN]) -> Self {
        Self {
            h_center: unpack_h(b, 0),
            v_center: unpack_v(b, 0),
            h_max_below_center: unpack_h(b, 3),
            v_max_below_center: unpack_v(b, 3),
            h_max_above_center: unpack_h(b, 6),
            v_max_above_center: unpack_v(b, 6),
        }
    }
}

/// Current stick position bound to its calibration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickState {
    h: u16,
    v: u16,
    calibration: StickCalibration,
}

impl StickState {
    /// New stick resting at the calibration center
    pub fn new(calibration: StickCalibration) -> Self {
        Self {
            h: calibration.h_center & STICK_AXIS_MAX,
            v: calibration.v_center & STICK_AXIS_MAX,
            calibration,
        }
    }

    pub fn calibration(&self) -> &StickCalibration {
        &self.calibration
    }

    pub fn h(&self) -> u16 {
        self.h
    }

    pub fn v(&self) -> u16 {
        self.v
    }

    pub fn set_h(&mut self, value: u16) -> Result<(), ProtocolError> {
        self.h = check_axis(value)?;
        Ok(())
    }

    pub fn set_v(&mut self, value: u16) -> Result<(), ProtocolError> {
        self.v = check_axis(value)?;
        Ok(())
    }

    pub fn set_center(&mut self) {
        self.h = self.calibration.h_center & STICK_AXIS_MAX;
        self.v = self.calibration.v_center & STICK_AXIS_MAX;
    }

    /// Move to a direction preset. `force` in [0, 1] scales the displacement.
    pub fn set_position(&mut self, direction: StickDirection, force: f32) -> Result<(), ProtocolError> {
        if !(0.0..=1.0).contains(&force) {
            return Err(ProtocolError::InvalidForce(force));
        }

        let cal = self.calibration;
        let (dh, dv) = direction.axes();
        self.h = displace(cal.h_center, dh, cal.h_max_above_center, cal.h_max_below_center, force);
        self.v = displace(cal.v_center, dv, cal.v_max_above_center, cal.v_max_below_center, force);
        trace!("Stick {:?} force {:.2} -> h={} v={}", direction, force, self.h, self.v);
        Ok(())
    }

    /// Both axes within `radius` of the calibration center
    pub fn is_center(&self, radius: u16) -> bool {
        self.h.abs_diff(self.calibration.h_center) <= radius
            && self.v.abs_diff(self.calibration.v_center) <= radius
    }

    /// Pack into the 3-byte HID stick format
    pub fn to_bytes(&self) -> [u8; 3] {
        [
            (self.h & 0xFF) as u8,
            ((self.h >> 8) as u8 & 0x0F) | (((self.v & 0x0F) as u8) << 4),
            (self.v >> 4) as u8,
        ]
    }

    /// Inverse of [`StickState::to_bytes`]: `(h, v)`
    pub fn decode(bytes: [u8; 3]) -> (u16, u16) {
        let h = u16::from(bytes[0]) | (u16::from(bytes[1] & 0x0F) << 8);
        let v = (u16::from(bytes[1]) >> 4) | (u16::from(bytes[2]) << 4);
        (h, v)
    }
}

fn check_axis(value: u16) -> Result<u16, ProtocolError> {
    if value > STICK_AXIS_MAX {
        return Err(ProtocolError::RangeError {
            offset: 0,
            length: usize::from(value),
            limit: usize::from(STICK_AXIS_MAX),
        });
    }
    Ok(value)
}

fn displace(center: u16, sign: i8, above: u16, below: u16, force: f32) -> u16 {
    let value = match sign {
        1 => f32::from(center) + force * f32::from(above),
        -1 => f32::from(center) - force * f32::from(below),
        _ => f32::from(center),
    };
    (value as i32).clamp(0, i32::from(STICK_AXIS_MAX)) as u16
}
