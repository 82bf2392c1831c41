//! Bit-packed button vector
//!
//! ```text
//!    Byte     0         1         2         3         4         5         6         7
//!    0        Y         X         B         A         SR        SL        R         ZR
//!    1        Minus     Plus      R Stick   L Stick   Home      Capture
//!    2        Down      Up        Right     Left      SR        SL        L         ZL
//! ```
//!
//! SR/SL live in byte 0 on the right Joy-Con and in byte 2 on the left one.

use log::trace;

use crate::protocol::error::ProtocolError;
use crate::protocol::types::{Button, ControllerKind};

const PRO_CONTROLLER_BUTTONS: &[Button] = &[
    Button::Y, Button::X, Button::B, Button::A, Button::R, Button::ZR,
    Button::Minus, Button::Plus, Button::RightStick, Button::LeftStick, Button::Home, Button::Capture,
    Button::Down, Button::Up, Button::Right, Button::Left, Button::L, Button::ZL,
];

const JOYCON_R_BUTTONS: &[Button] = &[
    Button::Y, Button::X, Button::B, Button::A, Button::SR, Button::SL, Button::R, Button::ZR,
    Button::Plus, Button::RightStick, Button::Home,
];

const JOYCON_L_BUTTONS: &[Button] = &[
    Button::Minus, Button::LeftStick, Button::Capture,
    Button::Down, Button::Up, Button::Right, Button::Left, Button::SR, Button::SL, Button::L, Button::ZL,
];

/// (byte index, bit index) of a button for a controller variant
fn bit_position(kind: ControllerKind, button: Button) -> Option<(usize, u8)> {
    if !ButtonState::available_buttons(kind).contains(&button) {
        return None;
    }

    let position = match button {
        Button::Y => (0, 0),
        Button::X => (0, 1),
        Button::B => (0, 2),
        Button::A => (0, 3),
        Button::R => (0, 6),
        Button::ZR => (0, 7),

        Button::Minus => (1, 0),
        Button::Plus => (1, 1),
        Button::RightStick => (1, 2),
        Button::LeftStick => (1, 3),
        Button::Home => (1, 4),
        Button::Capture => (1, 5),

        Button::Down => (2, 0),
        Button::Up => (2, 1),
        Button::Right => (2, 2),
        Button::Left => (2, 3),
        Button::L => (2, 6),
        Button::ZL => (2, 7),

        Button::SR | Button::SL => {
            let byte = if kind == ControllerKind::JoyConR { 0 } else { 2 };
            let bit = if button == Button::SR { 4 } else { 5 };
            (byte, bit)
        }
    };
    Some(position)
}

/// Button state of one virtual controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    kind: ControllerKind,
    bytes: [u8; 3],
}

impl ButtonState {
    /// All buttons released
    pub fn new(kind: ControllerKind) -> Self {
        Self { kind, bytes: [0; 3] }
    }

    /// Buttons that exist on the given controller variant
    pub fn available_buttons(kind: ControllerKind) -> &'static [Button] {
        match kind {
            ControllerKind::ProController => PRO_CONTROLLER_BUTTONS,
            ControllerKind::JoyConR => JOYCON_R_BUTTONS,
            ControllerKind::JoyConL => JOYCON_L_BUTTONS,
        }
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    /// Press or release a button
    pub fn set(&mut self, button: Button, pressed: bool) -> Result<(), ProtocolError> {
        let (byte, bit) = self.locate(button)?;
        let current = self.bytes[byte] >> bit & 1 != 0;
        if current != pressed {
            self.bytes[byte] ^= 1 << bit;
            trace!("Button {} -> {} (byte {} = 0x{:02X})", button, pressed, byte, self.bytes[byte]);
        }
        Ok(())
    }

    pub fn get(&self, button: Button) -> Result<bool, ProtocolError> {
        let (byte, bit) = self.locate(button)?;
        Ok(self.bytes[byte] >> bit & 1 != 0)
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        self.bytes
    }

    /// Release all buttons
    pub fn reset(&mut self) {
        self.bytes = [0; 3];
    }

    fn locate(&self, button: Button) -> Result<(usize, u8), ProtocolError> {
        bit_position(self.kind, button).ok_or(ProtocolError::UnsupportedButton {
            button,
            kind: self.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_BUTTONS: &[Button] = &[
        Button::Y, Button::X, Button::B, Button::A, Button::R, Button::ZR, Button::L, Button::ZL,
        Button::Minus, Button::Plus, Button::Home, Button::Capture, Button::RightStick,
        Button::LeftStick, Button::Down, Button::Up, Button::Right, Button::Left, Button::SR,
        Button::SL,
    ];

    const ALL_KINDS: [ControllerKind; 3] = [
        ControllerKind::ProController,
        ControllerKind::JoyConL,
        ControllerKind::JoyConR,
    ];

    fn as_u32(bytes: [u8; 3]) -> u32 {
        u32::from(bytes[0]) | u32::from(bytes[1]) << 8 | u32::from(bytes[2]) << 16
    }

    #[test]
    fn test_set_changes_only_the_intended_bit() {
        for kind in ALL_KINDS {
            for &button in ButtonState::available_buttons(kind) {
                let mut state = ButtonState::new(kind);
                state.set(button, true).unwrap();
                assert!(state.get(button).unwrap(), "{:?} {:?}", kind, button);
                assert_eq!(as_u32(state.to_bytes()).count_ones(), 1, "{:?} {:?}", kind, button);

                // all other legal buttons still released
                for &other in ButtonState::available_buttons(kind) {
                    if other != button {
                        assert!(!state.get(other).unwrap());
                    }
                }
            }
        }
    }

    #[test]
    fn test_bit_layout_matches_wire_format() {
        let mut pro = ButtonState::new(ControllerKind::ProController);
        pro.set(Button::ZR, true).unwrap();
        pro.set(Button::Capture, true).unwrap();
        pro.set(Button::Down, true).unwrap();
        assert_eq!(pro.to_bytes(), [0x80, 0x20, 0x01]);

        let mut right = ButtonState::new(ControllerKind::JoyConR);
        right.set(Button::SR, true).unwrap();
        right.set(Button::SL, true).unwrap();
        assert_eq!(right.to_bytes(), [0x30, 0x00, 0x00]);

        let mut left = ButtonState::new(ControllerKind::JoyConL);
        left.set(Button::SR, true).unwrap();
        left.set(Button::ZL, true).unwrap();
        assert_eq!(left.to_bytes(), [0x00, 0x00, 0x90]);
    }

    #[test]
    fn test_illegal_buttons_rejected_for_every_kind() {
        for kind in ALL_KINDS {
            let legal = ButtonState::available_buttons(kind);
            let mut state = ButtonState::new(kind);
            for &button in ALL_BUTTONS.iter().filter(|b| !legal.contains(b)) {
                assert!(matches!(
                    state.set(button, true),
                    Err(ProtocolError::UnsupportedButton { .. })
                ));
                assert!(state.get(button).is_err());
            }
            assert_eq!(state.to_bytes(), [0, 0, 0]);
        }
    }

    #[test]
    fn test_known_illegal_buttons() {
        let mut pro = ButtonState::new(ControllerKind::ProController);
        assert!(pro.set(Button::SR, true).is_err());
        let mut right = ButtonState::new(ControllerKind::JoyConR);
        assert!(right.set(Button::Minus, true).is_err());
        assert!(right.set(Button::Capture, true).is_err());
        let mut left = ButtonState::new(ControllerKind::JoyConL);
        assert!(left.set(Button::Home, true).is_err());
        assert!(left.set(Button::A, true).is_err());
    }

    #[test]
    fn test_set_is_idempotent_and_reset_clears() {
        let mut state = ButtonState::new(ControllerKind::ProController);
        state.set(Button::A, true).unwrap();
        state.set(Button::A, true).unwrap();
        assert!(state.get(Button::A).unwrap());
        state.set(Button::A, false).unwrap();
        state.set(Button::A, false).unwrap();
        assert!(!state.get(Button::A).unwrap());

        state.set(Button::B, true).unwrap();
        state.set(Button::Home, true).unwrap();
        state.reset();
        assert_eq!(state.to_bytes(), [0, 0, 0]);
    }
}
