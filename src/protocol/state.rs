//! Live state of one virtual controller

use crate::protocol::buttons::ButtonState;
use crate::protocol::error::ProtocolError;
use crate::protocol::flash::FlashMemory;
use crate::protocol::stick::{StickCalibration, StickState};
use crate::protocol::types::{ControllerKind, StickSide};

/// Buttons plus whichever sticks the variant has
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    kind: ControllerKind,
    pub buttons: ButtonState,
    left_stick: Option<StickState>,
    right_stick: Option<StickState>,
}

impl ControllerState {
    /// Build the state with stick calibration taken from flash
    pub fn new(kind: ControllerKind, flash: &FlashMemory) -> Self {
        let left_stick = kind.has_stick(StickSide::Left).then(|| {
            StickState::new(StickCalibration::from_left_bytes(&flash.left_stick_calibration()))
        });
        let right_stick = kind.has_stick(StickSide::Right).then(|| {
            StickState::new(StickCalibration::from_right_bytes(&flash.right_stick_calibration()))
        });

        Self {
            kind,
            buttons: ButtonState::new(kind),
            left_stick,
            right_stick,
        }
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn stick(&self, side: StickSide) -> Result<&StickState, ProtocolError> {
        let stick = match side {
            StickSide::Left => self.left_stick.as_ref(),
            StickSide::Right => self.right_stick.as_ref(),
        };
        stick.ok_or(ProtocolError::UnsupportedStick { side, kind: self.kind })
    }

    pub fn stick_mut(&mut self, side: StickSide) -> Result<&mut StickState, ProtocolError> {
        let kind = self.kind;
        let stick = match side {
            StickSide::Left => self.left_stick.as_mut(),
            StickSide::Right => self.right_stick.as_mut(),
        };
        stick.ok_or(ProtocolError::UnsupportedStick { side, kind })
    }

    /// Packed stick bytes, zeros for a stick the variant lacks
    pub fn stick_bytes(&self, side: StickSide) -> [u8; 3] {
        self.stick(side).map(StickState::to_bytes).unwrap_or([0; 3])
    }
}
