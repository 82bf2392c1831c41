//! Input and output report codecs
//!
//! Input reports (controller -> console) live in one fixed 364-byte buffer;
//! the report id decides how much of it goes on the wire. Output reports
//! (console -> controller) are decoded from whatever the transport delivered.
//!
//! Standard input report layout:
//!
//! ```text
//!   0      0xA1
//!   1      report id
//!   2      rolling timer
//!   3      battery / connection (0x8E)
//!   4-6    button vector
//!   7-9    left stick
//!   10-12  right stick
//!   13     vibrator (0x80)
//!   14     ack
//!   15     echoed sub command id
//!   16-50  sub command reply payload
//! ```

use crate::protocol::constants::*;
use crate::protocol::error::{MalformedReport, ProtocolError};
use crate::protocol::types::{ControllerKind, InputReportId, OutputReportId, SubCommand};

/// Upper bound (exclusive) of an elapsed time value in milliseconds
pub const MAX_TRIGGER_ELAPSED_MS: u32 = 10 * 0xFFFF;

/// Buttons whose press duration is reported by `triggerButtonsElapsedTime`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerButton {
    L,
    R,
    ZL,
    ZR,
    SL,
    SR,
    Home,
}

impl TriggerButton {
    fn reply_offset(self) -> usize {
        match self {
            TriggerButton::L => 0,
            TriggerButton::R => 2,
            TriggerButton::ZL => 4,
            TriggerButton::ZR => 6,
            TriggerButton::SL => 8,
            TriggerButton::SR => 10,
            TriggerButton::Home => 12,
        }
    }
}

/// Controller -> console report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputReport {
    id: InputReportId,
    data: [u8; INPUT_REPORT_SIZE],
}

impl InputReport {
    /// Blank report of the given shape: only magic and id set
    pub fn new(id: InputReportId) -> Self {
        let mut data = [0u8; INPUT_REPORT_SIZE];
        data[0] = INPUT_REPORT_MAGIC;
        data[INPUT_REPORT_ID_INDEX] = id.id();
        Self { id, data }
    }

    /// Report sent during the handshake to elicit sub commands
    pub fn empty() -> Self {
        Self::new(InputReportId::Empty)
    }

    /// Status report carrying a sub command reply
    pub fn standard() -> Self {
        Self::with_status(InputReportId::Standard)
    }

    /// Status report for the continuous (full) report modes
    pub fn full_mode(id: InputReportId) -> Self {
        Self::with_status(id)
    }

    fn with_status(id: InputReportId) -> Self {
        let mut report = Self::new(id);
        report.data[INPUT_MISC_INDEX] = MISC_BATTERY_CONNECTION;
        report.data[INPUT_VIBRATOR_INDEX] = VIBRATOR_PLACEHOLDER;
        report
    }

    /// Decode a received input report
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 2 {
            return Err(MalformedReport::TooShort { actual: bytes.len(), min: 2 }.into());
        }
        if bytes[0] != INPUT_REPORT_MAGIC {
            return Err(MalformedReport::InvalidMagic {
                expected: INPUT_REPORT_MAGIC,
                found: bytes[0],
            }
            .into());
        }
        let id = InputReportId::from_id(bytes[INPUT_REPORT_ID_INDEX])
            .ok_or(MalformedReport::UnknownReportId(bytes[INPUT_REPORT_ID_INDEX]))?;
        if bytes.len() < id.transmit_len() {
            return Err(MalformedReport::TooShort {
                actual: bytes.len(),
                min: id.transmit_len(),
            }
            .into());
        }

        let mut data = [0u8; INPUT_REPORT_SIZE];
        let len = bytes.len().min(INPUT_REPORT_SIZE);
        data[..len].copy_from_slice(&bytes[..len]);
        Ok(Self { id, data })
    }

    pub fn id(&self) -> InputReportId {
        self.id
    }

    pub fn timer(&self) -> u8 {
        self.data[INPUT_TIMER_INDEX]
    }

    pub fn set_timer(&mut self, timer: u8) {
        self.data[INPUT_TIMER_INDEX] = timer;
    }

    pub fn misc(&self) -> u8 {
        self.data[INPUT_MISC_INDEX]
    }

    pub fn buttons(&self) -> [u8; 3] {
        self.field3(INPUT_BUTTONS_INDEX)
    }

    pub fn set_buttons(&mut self, buttons: [u8; 3]) {
        self.data[INPUT_BUTTONS_INDEX..INPUT_BUTTONS_INDEX + 3].copy_from_slice(&buttons);
    }

    pub fn left_stick(&self) -> [u8; 3] {
        self.field3(INPUT_LEFT_STICK_INDEX)
    }

    pub fn set_left_stick(&mut self, stick: [u8; 3]) {
        self.data[INPUT_LEFT_STICK_INDEX..INPUT_LEFT_STICK_INDEX + 3].copy_from_slice(&stick);
    }

    pub fn right_stick(&self) -> [u8; 3] {
        self.field3(INPUT_RIGHT_STICK_INDEX)
    }

    pub fn set_right_stick(&mut self, stick: [u8; 3]) {
        self.data[INPUT_RIGHT_STICK_INDEX..INPUT_RIGHT_STICK_INDEX + 3].copy_from_slice(&stick);
    }

    pub fn ack(&self) -> u8 {
        self.data[INPUT_ACK_INDEX]
    }

    pub fn set_ack(&mut self, ack: u8) {
        self.data[INPUT_ACK_INDEX] = ack;
    }

    /// Sub command id this report answers
    pub fn reply_to(&self) -> u8 {
        self.data[INPUT_REPLY_TO_INDEX]
    }

    pub fn set_reply_to(&mut self, sub_command: SubCommand) {
        self.data[INPUT_REPLY_TO_INDEX] = sub_command.id();
    }

    /// Sub command reply payload (bytes 16-50)
    pub fn reply_data(&self) -> &[u8] {
        &self.data[INPUT_REPLY_DATA_INDEX..=INPUT_STANDARD_LAST_INDEX]
    }

    /// Write ack + echoed sub command id, leaving the payload zeroed
    pub fn set_sub_command_reply(&mut self, ack: u8, sub_command: SubCommand) {
        self.clear_sub_command();
        self.set_ack(ack);
        self.set_reply_to(sub_command);
    }

    /// Copy a payload into the reply region
    pub fn set_reply_data(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        self.write_at(INPUT_REPLY_DATA_INDEX, payload, INPUT_STANDARD_LAST_INDEX + 1)
    }

    /// Zero the ack, echo and reply payload (bytes 14-50)
    pub fn clear_sub_command(&mut self) {
        self.data[INPUT_ACK_INDEX..=INPUT_STANDARD_LAST_INDEX].fill(0);
    }

    /// 6-axis sensor block (bytes 14-49). Motion data is not synthesised, the block stays zeroed.
    pub fn clear_6axis_data(&mut self) {
        self.data[INPUT_ACK_INDEX..=INPUT_IMU_LAST_INDEX].fill(0);
    }

    /// NFC/IR payload region (bytes 50-362)
    pub fn set_nfc_ir_data(&mut self, payload: &[u8]) -> Result<(), ProtocolError> {
        self.write_at(
            INPUT_NFC_IR_DATA_INDEX,
            payload,
            InputReportId::NfcIr.transmit_len(),
        )
    }

    /// Device info reply (0x02)
    pub fn sub_0x02_device_info(
        &mut self,
        firmware_version: [u8; 2],
        kind: ControllerKind,
        mac: [u8; 6],
    ) {
        self.set_sub_command_reply(ACK_DEVICE_INFO, SubCommand::RequestDeviceInfo);
        let d = INPUT_REPLY_DATA_INDEX;
        self.data[d..d + 2].copy_from_slice(&firmware_version);
        self.data[d + 2] = kind.device_id();
        self.data[d + 3] = 0x02;
        self.data[d + 4..d + 10].copy_from_slice(&mac);
        self.data[d + 10] = 0x01;
        self.data[d + 11] = 0x00;
    }

    /// Trigger buttons elapsed time reply (0x04). Values are milliseconds.
    pub fn sub_0x04_trigger_buttons_elapsed_time(
        &mut self,
        elapsed: &[(TriggerButton, u32)],
    ) -> Result<(), ProtocolError> {
        if let Some((_, ms)) = elapsed.iter().find(|(_, ms)| *ms >= MAX_TRIGGER_ELAPSED_MS) {
            return Err(ProtocolError::RangeError {
                offset: 0,
                length: *ms as usize,
                limit: MAX_TRIGGER_ELAPSED_MS as usize,
            });
        }

        self.set_sub_command_reply(ACK_TRIGGER_ELAPSED_TIME, SubCommand::TriggerButtonsElapsedTime);
        for (button, ms) in elapsed {
            // wire unit is 10 ms
            let value = ((ms / 10) as u16).to_le_bytes();
            let offset = INPUT_REPLY_DATA_INDEX + button.reply_offset();
            self.data[offset..offset + 2].copy_from_slice(&value);
        }
        Ok(())
    }

    /// SPI flash read reply (0x10): offset, size, then the data itself
    pub fn sub_0x10_spi_flash_read(&mut self, offset: u32, data: &[u8]) -> Result<(), ProtocolError> {
        let size = u8::try_from(data.len())
            .ok()
            .filter(|size| *size <= SPI_READ_MAX_SIZE)
            .ok_or(ProtocolError::UnsupportedArgument {
                sub_command: SubCommand::SpiFlashRead,
                argument: data.len().min(0xFF) as u8,
            })?;

        self.set_sub_command_reply(ACK_SPI_FLASH_READ, SubCommand::SpiFlashRead);
        let d = INPUT_REPLY_DATA_INDEX;
        self.data[d..d + 4].copy_from_slice(&offset.to_le_bytes());
        self.data[d + 4] = size;
        self.data[d + 5..d + 5 + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// NFC/IR MCU configuration reply (0x21)
    pub fn sub_0x21_nfc_ir_mcu_config(&mut self) {
        self.set_sub_command_reply(ACK_NFC_IR_MCU_CONFIG, SubCommand::SetNfcIrMcuConfig);
        let d = INPUT_REPLY_DATA_INDEX;
        self.data[d..d + NFC_IR_MCU_CONFIG_REPLY.len()].copy_from_slice(&NFC_IR_MCU_CONFIG_REPLY);
    }

    /// Bytes put on the wire for this report shape
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.id.transmit_len()]
    }

    fn field3(&self, index: usize) -> [u8; 3] {
        [self.data[index], self.data[index + 1], self.data[index + 2]]
    }

    fn write_at(&mut self, start: usize, payload: &[u8], end: usize) -> Result<(), ProtocolError> {
        if start + payload.len() > end {
            return Err(ProtocolError::RangeError {
                offset: start,
                length: payload.len(),
                limit: end,
            });
        }
        self.data[start..start + payload.len()].copy_from_slice(payload);
        Ok(())
    }
}

/// Console -> controller report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputReport {
    data: Vec<u8>,
}

impl OutputReport {
    /// Zeroed 50-byte report with magic and id set
    pub fn new(id: OutputReportId) -> Self {
        let mut data = vec![0u8; OUTPUT_REPORT_SIZE];
        data[0] = OUTPUT_REPORT_MAGIC;
        data[OUTPUT_REPORT_ID_INDEX] = id.id();
        Self { data }
    }

    /// Decode a received output report
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < 2 {
            return Err(MalformedReport::TooShort { actual: bytes.len(), min: 2 }.into());
        }
        if bytes[0] != OUTPUT_REPORT_MAGIC {
            return Err(MalformedReport::InvalidMagic {
                expected: OUTPUT_REPORT_MAGIC,
                found: bytes[0],
            }
            .into());
        }
        let id = OutputReportId::from_id(bytes[OUTPUT_REPORT_ID_INDEX])
            .ok_or(MalformedReport::UnknownReportId(bytes[OUTPUT_REPORT_ID_INDEX]))?;
        if id == OutputReportId::SubCommand && bytes.len() <= OUTPUT_SUB_COMMAND_INDEX {
            return Err(MalformedReport::TooShort {
                actual: bytes.len(),
                min: OUTPUT_SUB_COMMAND_INDEX + 1,
            }
            .into());
        }
        Ok(Self { data: bytes.to_vec() })
    }

    pub fn report_id(&self) -> OutputReportId {
        // validated on construction
        OutputReportId::from_id(self.data[OUTPUT_REPORT_ID_INDEX]).unwrap_or(OutputReportId::SubCommand)
    }

    /// 4-bit packet counter
    pub fn timer(&self) -> u8 {
        self.byte(OUTPUT_TIMER_INDEX) & 0x0F
    }

    pub fn set_timer(&mut self, timer: u8) {
        self.data[OUTPUT_TIMER_INDEX] = timer & 0x0F;
    }

    pub fn rumble(&self) -> &[u8] {
        let end = (OUTPUT_RUMBLE_INDEX + OUTPUT_RUMBLE_LEN).min(self.data.len());
        &self.data[OUTPUT_RUMBLE_INDEX.min(end)..end]
    }

    pub fn set_rumble(&mut self, rumble: [u8; OUTPUT_RUMBLE_LEN]) {
        self.data[OUTPUT_RUMBLE_INDEX..OUTPUT_RUMBLE_INDEX + OUTPUT_RUMBLE_LEN].copy_from_slice(&rumble);
    }

    /// Raw sub command id, only for sub command reports
    pub fn sub_command_id(&self) -> Option<u8> {
        if self.report_id() != OutputReportId::SubCommand {
            return None;
        }
        self.data.get(OUTPUT_SUB_COMMAND_INDEX).copied()
    }

    /// Sub command payload (byte 12 onwards)
    pub fn sub_command_data(&self) -> &[u8] {
        self.data.get(OUTPUT_SUB_COMMAND_DATA_INDEX..).unwrap_or(&[])
    }

    pub fn set_sub_command(&mut self, sub_command: SubCommand) {
        self.data[OUTPUT_SUB_COMMAND_INDEX] = sub_command.id();
    }

    /// Copy a payload after the sub command id, growing the buffer if needed
    pub fn set_sub_command_data(&mut self, payload: &[u8]) {
        let end = OUTPUT_SUB_COMMAND_DATA_INDEX + payload.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[OUTPUT_SUB_COMMAND_DATA_INDEX..end].copy_from_slice(payload);
    }

    /// Encode an SPI flash read request
    pub fn sub_0x10_spi_flash_read(&mut self, offset: u32, size: u8) -> Result<(), ProtocolError> {
        if size > SPI_READ_MAX_SIZE {
            return Err(ProtocolError::UnsupportedArgument {
                sub_command: SubCommand::SpiFlashRead,
                argument: size,
            });
        }
        if offset as usize + size as usize > FLASH_SIZE {
            return Err(ProtocolError::RangeError {
                offset: offset as usize,
                length: size as usize,
                limit: FLASH_SIZE,
            });
        }

        self.set_sub_command(SubCommand::SpiFlashRead);
        let mut payload = [0u8; 5];
        payload[..4].copy_from_slice(&offset.to_le_bytes());
        payload[4] = size;
        self.set_sub_command_data(&payload);
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn byte(&self, index: usize) -> u8 {
        self.data.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_report_rejects_bad_magic() {
        let mut bytes = InputReport::standard().bytes().to_vec();
        for magic in [0x00, 0xA2, 0xFF] {
            bytes[0] = magic;
            assert!(matches!(
                InputReport::from_bytes(&bytes),
                Err(ProtocolError::MalformedReport(MalformedReport::InvalidMagic { found, .. })) if found == magic
            ));
        }
    }

    #[test]
    fn test_output_report_rejects_bad_magic() {
        let mut bytes = OutputReport::new(OutputReportId::SubCommand).bytes().to_vec();
        for magic in [0x00, 0xA1, 0x42] {
            bytes[0] = magic;
            assert!(matches!(
                OutputReport::from_bytes(&bytes),
                Err(ProtocolError::MalformedReport(MalformedReport::InvalidMagic { .. }))
            ));
        }
    }

    #[test]
    fn test_output_report_rejects_short_and_unknown() {
        assert!(matches!(
            OutputReport::from_bytes(&[0xA2]),
            Err(ProtocolError::MalformedReport(MalformedReport::TooShort { .. }))
        ));
        assert!(matches!(
            OutputReport::from_bytes(&[0xA2, 0x01, 0x00]),
            Err(ProtocolError::MalformedReport(MalformedReport::TooShort { .. }))
        ));
        assert!(matches!(
            OutputReport::from_bytes(&[0xA2, 0x7F, 0x00]),
            Err(ProtocolError::MalformedReport(MalformedReport::UnknownReportId(0x7F)))
        ));
        // rumble-only reports carry no sub command
        let rumble = OutputReport::from_bytes(&[0xA2, 0x10, 0x03]).unwrap();
        assert_eq!(rumble.report_id(), OutputReportId::RumbleOnly);
        assert_eq!(rumble.timer(), 3);
        assert_eq!(rumble.sub_command_id(), None);
    }

    #[test]
    fn test_standard_report_header() {
        let report = InputReport::standard();
        let bytes = report.bytes();
        assert_eq!(bytes.len(), 51);
        assert_eq!(bytes[0], 0xA1);
        assert_eq!(bytes[1], 0x21);
        assert_eq!(bytes[3], 0x8E);
        assert_eq!(bytes[13], 0x80);
    }

    #[test]
    fn test_report_shapes_transmit_prefix() {
        assert_eq!(InputReport::empty().bytes().len(), 51);
        assert_eq!(InputReport::empty().bytes()[1], 0x00);
        assert_eq!(InputReport::full_mode(InputReportId::Imu).bytes().len(), 14);
        assert_eq!(InputReport::full_mode(InputReportId::NfcIr).bytes().len(), 363);
    }

    #[test]
    fn test_device_info_reply() {
        let mut report = InputReport::standard();
        report.sub_0x02_device_info([0x04, 0x00], ControllerKind::JoyConR, [1, 2, 3, 4, 5, 6]);
        assert_eq!(report.ack(), 0x82);
        assert_eq!(report.reply_to(), 0x02);
        assert_eq!(
            &report.reply_data()[..12],
            &[0x04, 0x00, 0x02, 0x02, 1, 2, 3, 4, 5, 6, 0x01, 0x00]
        );
    }

    #[test]
    fn test_trigger_elapsed_time_reply() {
        let mut report = InputReport::standard();
        report
            .sub_0x04_trigger_buttons_elapsed_time(&[(TriggerButton::L, 3000), (TriggerButton::R, 3000)])
            .unwrap();
        assert_eq!(report.ack(), 0x83);
        assert_eq!(report.reply_to(), 0x04);
        // 3000 ms / 10 = 300 = 0x012C
        assert_eq!(&report.reply_data()[..4], &[0x2C, 0x01, 0x2C, 0x01]);
        assert_eq!(&report.reply_data()[4..14], &[0; 10]);

        assert!(report
            .sub_0x04_trigger_buttons_elapsed_time(&[(TriggerButton::Home, MAX_TRIGGER_ELAPSED_MS)])
            .is_err());
    }

    #[test]
    fn test_spi_flash_read_reply() {
        let mut report = InputReport::standard();
        report.sub_0x10_spi_flash_read(0x6046, &[9, 8, 7]).unwrap();
        assert_eq!(report.ack(), 0x90);
        assert_eq!(report.reply_to(), 0x10);
        assert_eq!(&report.reply_data()[..8], &[0x46, 0x60, 0x00, 0x00, 3, 9, 8, 7]);

        assert!(report.sub_0x10_spi_flash_read(0, &[0u8; 0x1E]).is_err());
    }

    #[test]
    fn test_nfc_ir_payload_bounds() {
        let mut report = InputReport::full_mode(InputReportId::NfcIr);
        assert!(report.set_nfc_ir_data(&[0xAB; 313]).is_ok());
        assert_eq!(report.bytes()[362], 0xAB);
        assert!(report.set_nfc_ir_data(&[0xAB; 314]).is_err());
    }

    #[test]
    fn test_decode_input_report() {
        let mut report = InputReport::standard();
        report.set_timer(0x42);
        report.set_buttons([0x01, 0x02, 0x04]);
        report.set_left_stick([0x00, 0x08, 0x80]);
        let decoded = InputReport::from_bytes(report.bytes()).unwrap();
        assert_eq!(decoded.id(), InputReportId::Standard);
        assert_eq!(decoded.timer(), 0x42);
        assert_eq!(decoded.buttons(), [0x01, 0x02, 0x04]);
        assert_eq!(decoded.left_stick(), [0x00, 0x08, 0x80]);
        assert_eq!(decoded.misc(), 0x8E);
    }

    #[test]
    fn test_spi_flash_read_request() {
        let mut request = OutputReport::new(OutputReportId::SubCommand);
        request.set_timer(0x1F);
        request.sub_0x10_spi_flash_read(0x603D, 9).unwrap();
        let bytes = request.bytes();
        assert_eq!(bytes.len(), 50);
        assert_eq!(bytes[2], 0x0F);
        assert_eq!(bytes[11], 0x10);
        assert_eq!(&bytes[12..17], &[0x3D, 0x60, 0x00, 0x00, 0x09]);

        assert!(matches!(
            request.sub_0x10_spi_flash_read(0, 0x1E),
            Err(ProtocolError::UnsupportedArgument { argument: 0x1E, .. })
        ));
        assert!(matches!(
            request.sub_0x10_spi_flash_read(0x7FFFF, 2),
            Err(ProtocolError::RangeError { .. })
        ));
    }
}
