//! Controller protocol state machine
//!
//! Receives output reports from the console, answers sub commands, and once
//! the console asks for a continuous report mode, streams input reports on a
//! fixed interval.
//!
//! All mutable session state (rolling timer, report mode, controller state)
//! sits behind a single mutex, and transport writes happen while holding it.
//! The reply path, the periodic sender and user input therefore never
//! interleave partial updates or partial writes.

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::protocol::constants::*;
use crate::protocol::error::{MalformedReport, ProtocolError};
use crate::protocol::flash::FlashMemory;
use crate::protocol::report::{InputReport, OutputReport, TriggerButton};
use crate::protocol::state::ControllerState;
use crate::protocol::types::{
    Button, ControllerKind, InputReportId, OutputReportId, StickDirection, StickSide, SubCommand,
};
use crate::transport::{Transport, TransportError};

/// Tunables of one protocol session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    /// Cadence of the periodic full-mode reports
    pub report_interval: Duration,
    /// Empty reports sent when the channel opens
    pub handshake_nudges: usize,
    pub firmware_version: [u8; 2],
    /// Controller address, reported big-endian in the device info reply
    pub mac_address: [u8; 6],
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            report_interval: DEFAULT_REPORT_INTERVAL,
            handshake_nudges: DEFAULT_HANDSHAKE_NUDGES,
            firmware_version: DEFAULT_FIRMWARE_VERSION,
            mac_address: [0; 6],
        }
    }
}

/// Protocol state machine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolPhase {
    /// Answering individual sub commands only
    Idle,
    /// Periodic reports are being streamed
    FullReportMode,
    /// Terminal, nothing is written anymore
    Disconnected,
}

/// Notifications for whoever drives the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    /// The console assigned a player slot, user input is accepted from now on
    Ready,
    ConnectionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Closed,
}

struct SessionState {
    timer: u8,
    mode: Option<InputReportId>,
    phase: ProtocolPhase,
    controller: ControllerState,
    periodic: Option<CancellationToken>,
    last_sent: Option<Instant>,
}

struct Shared<T: Transport> {
    kind: ControllerKind,
    flash: FlashMemory,
    transport: T,
    settings: ProtocolSettings,
    state: Mutex<SessionState>,
    readiness: watch::Sender<Readiness>,
    events: Option<Sender<SessionEvent>>,
}

/// Protocol engine for one connection. Clones share the same session.
pub struct ControllerProtocol<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ControllerProtocol<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> ControllerProtocol<T> {
    /// Create the engine for a freshly opened channel
    pub fn new(
        kind: ControllerKind,
        flash: FlashMemory,
        transport: T,
        settings: ProtocolSettings,
        events: Option<Sender<SessionEvent>>,
    ) -> Self {
        let controller = ControllerState::new(kind, &flash);
        let (readiness, _) = watch::channel(Readiness::Pending);

        Self {
            shared: Arc::new(Shared {
                kind,
                flash,
                transport,
                settings,
                state: Mutex::new(SessionState {
                    timer: 0,
                    mode: None,
                    phase: ProtocolPhase::Idle,
                    controller,
                    periodic: None,
                    last_sent: None,
                }),
                readiness,
                events,
            }),
        }
    }

    pub fn kind(&self) -> ControllerKind {
        self.shared.kind
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.shared.settings
    }

    pub fn flash(&self) -> &FlashMemory {
        &self.shared.flash
    }

    pub fn phase(&self) -> ProtocolPhase {
        self.lock().phase
    }

    /// Active continuous report mode, if any
    pub fn input_report_mode(&self) -> Option<InputReportId> {
        self.lock().mode
    }

    /// Value the next written report will carry
    pub fn timer(&self) -> u8 {
        self.lock().timer
    }

    // ========================================================================
    // Connection lifecycle
    // ========================================================================

    /// The interrupt channel is open: nudge the console into talking to us.
    ///
    /// A failed nudge is logged and skipped, the remaining ones are still sent.
    pub fn connection_made(&self) {
        let nudges = self.shared.settings.handshake_nudges;
        info!("{} channel open, sending {} empty reports", self.shared.kind, nudges);
        self.emit(SessionEvent::Connected);

        let failed = (0..nudges)
            .filter(|_| self.write(&mut InputReport::empty()).is_err())
            .count();
        if failed > 0 {
            warn!("{} of {} handshake reports were dropped", failed, nudges);
        }
    }

    /// Tear down: stop the periodic sender and clear the report mode, then notify
    pub fn connection_lost(&self) {
        {
            let mut state = self.lock();
            if state.phase == ProtocolPhase::Disconnected {
                return;
            }
            state.phase = ProtocolPhase::Disconnected;
            state.mode = None;
            if let Some(token) = state.periodic.take() {
                token.cancel();
                debug!("Periodic input reports cancelled");
            }
        }

        // input is no longer accepted, even if the console had set the lights
        self.shared.readiness.send_replace(Readiness::Closed);
        info!("Connection lost");
        self.emit(SessionEvent::ConnectionLost);
    }

    /// Wait until the console has assigned a player slot.
    ///
    /// Fails with `TransportUnavailable` once the connection is gone, whether
    /// it went away before or after the slot was assigned.
    pub async fn wait_ready(&self) -> Result<(), ProtocolError> {
        let mut receiver = self.shared.readiness.subscribe();
        let readiness = receiver
            .wait_for(|readiness| *readiness != Readiness::Pending)
            .await
            .map(|readiness| *readiness)
            .unwrap_or(Readiness::Closed);
        match readiness {
            Readiness::Ready => Ok(()),
            _ => Err(ProtocolError::TransportUnavailable),
        }
    }

    /// Ready and still connected
    pub fn is_ready(&self) -> bool {
        *self.shared.readiness.borrow() == Readiness::Ready
    }

    // ========================================================================
    // Inbound reports
    // ========================================================================

    /// Transport callback: handle one inbound report, logging and dropping it on error
    pub fn report_received(&self, bytes: &[u8]) {
        if let Err(e) = self.handle_report(bytes) {
            warn!("Dropping output report: {}", e);
        }
    }

    /// Handle one inbound report
    pub fn handle_report(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let report = OutputReport::from_bytes(bytes)?;
        match report.report_id() {
            OutputReportId::SubCommand => self.handle_sub_command(&report),
            OutputReportId::RumbleOnly => {
                trace!("Rumble report, timer {}", report.timer());
                Ok(())
            }
            other => {
                info!("Output report {:?} not implemented", other);
                Ok(())
            }
        }
    }

    fn handle_sub_command(&self, report: &OutputReport) -> Result<(), ProtocolError> {
        let id = report.sub_command_id().ok_or(MalformedReport::TooShort {
            actual: report.bytes().len(),
            min: OUTPUT_SUB_COMMAND_INDEX + 1,
        })?;
        let Some(sub_command) = SubCommand::from_id(id) else {
            info!("Sub command 0x{:02X} not implemented, no reply", id);
            return Ok(());
        };
        info!("Received sub command {:?}", sub_command);

        let data = report.sub_command_data();
        let mut reply = InputReport::standard();

        match sub_command {
            SubCommand::RequestDeviceInfo => {
                reply.sub_0x02_device_info(
                    self.shared.settings.firmware_version,
                    self.shared.kind,
                    self.shared.settings.mac_address,
                );
            }
            SubCommand::SetShipmentState
            | SubCommand::Enable6AxisSensor
            | SubCommand::EnableVibration => {
                reply.set_sub_command_reply(ACK_DEFAULT, sub_command);
            }
            SubCommand::SpiFlashRead => {
                if data.len() < 5 {
                    return Err(MalformedReport::TooShort {
                        actual: report.bytes().len(),
                        min: OUTPUT_SUB_COMMAND_DATA_INDEX + 5,
                    }
                    .into());
                }
                let offset = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                let size = data[4];
                if size > SPI_READ_MAX_SIZE {
                    return Err(ProtocolError::UnsupportedArgument {
                        sub_command,
                        argument: size,
                    });
                }
                let content = self.shared.flash.read(offset as usize, usize::from(size))?;
                debug!("SPI flash read 0x{:05X} (+{})", offset, size);
                reply.sub_0x10_spi_flash_read(offset, content)?;
            }
            SubCommand::TriggerButtonsElapsedTime => {
                let elapsed = match self.shared.kind {
                    ControllerKind::ProController => [
                        (TriggerButton::L, PAIRING_TRIGGER_ELAPSED_MS),
                        (TriggerButton::R, PAIRING_TRIGGER_ELAPSED_MS),
                    ],
                    ControllerKind::JoyConL | ControllerKind::JoyConR => [
                        (TriggerButton::SL, PAIRING_TRIGGER_ELAPSED_MS),
                        (TriggerButton::SR, PAIRING_TRIGGER_ELAPSED_MS),
                    ],
                };
                reply.sub_0x04_trigger_buttons_elapsed_time(&elapsed)?;
            }
            SubCommand::SetNfcIrMcuConfig => {
                reply.sub_0x21_nfc_ir_mcu_config();
            }
            SubCommand::SetNfcIrMcuState => match argument(report)? {
                0x00 | 0x01 => reply.set_sub_command_reply(ACK_DEFAULT, sub_command),
                other => {
                    return Err(ProtocolError::UnsupportedArgument {
                        sub_command,
                        argument: other,
                    })
                }
            },
            SubCommand::SetInputReportMode => {
                let requested = argument(report)?;
                match InputReportId::from_id(requested).filter(|mode| mode.is_full_mode()) {
                    Some(mode) => self.set_input_report_mode(mode)?,
                    None => {
                        info!("Input report mode 0x{:02X} not implemented, no reply", requested);
                        return Ok(());
                    }
                }
                reply.set_sub_command_reply(ACK_DEFAULT, sub_command);
            }
            SubCommand::SetPlayerLights => {
                reply.set_sub_command_reply(ACK_DEFAULT, sub_command);
                self.write(&mut reply)?;
                self.mark_ready();
                return Ok(());
            }
            SubCommand::SetHciState => {
                info!("Console requested HCI state change, disconnecting");
                self.connection_lost();
                return Ok(());
            }
        }

        self.write(&mut reply)
    }

    fn mark_ready(&self) {
        let newly_ready = self.shared.readiness.send_if_modified(|readiness| {
            if *readiness == Readiness::Pending {
                *readiness = Readiness::Ready;
                true
            } else {
                false
            }
        });
        if newly_ready {
            info!("Player lights set, {} ready for input", self.shared.kind);
            self.emit(SessionEvent::Ready);
        }
    }

    // ========================================================================
    // Periodic reports
    // ========================================================================

    fn set_input_report_mode(&self, mode: InputReportId) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        if state.phase == ProtocolPhase::Disconnected {
            debug!("Ignoring report mode change on a closed session");
            return Ok(());
        }
        if state.mode == Some(mode) {
            info!("Already in input report mode {:?}", mode);
            return Ok(());
        }

        if state.periodic.is_none() {
            let handle = Handle::try_current().map_err(|_| ProtocolError::RuntimeUnavailable)?;
            let token = CancellationToken::new();
            let interval = self.shared.settings.report_interval;
            handle.spawn(run_periodic(Arc::downgrade(&self.shared), token.clone(), interval));
            state.periodic = Some(token);
            info!("Started periodic input reports every {:?}", interval);
        }

        info!("Input report mode set to {:?}", mode);
        state.mode = Some(mode);
        state.phase = ProtocolPhase::FullReportMode;
        Ok(())
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Refresh status fields from the live state, stamp the timer, and send.
    ///
    /// Skipped (not an error) once the channel is gone.
    pub fn write(&self, report: &mut InputReport) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        self.shared.write_locked(&mut state, report)
    }

    // ========================================================================
    // Controller input
    // ========================================================================

    pub fn set_button(&self, button: Button, pressed: bool) -> Result<(), ProtocolError> {
        self.lock().controller.buttons.set(button, pressed)
    }

    /// Set several buttons at once. Nothing changes if any of them is illegal.
    pub fn set_buttons(&self, buttons: &[Button], pressed: bool) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        let mut updated = state.controller.buttons.clone();
        for &button in buttons {
            updated.set(button, pressed)?;
        }
        state.controller.buttons = updated;
        Ok(())
    }

    pub fn button(&self, button: Button) -> Result<bool, ProtocolError> {
        self.lock().controller.buttons.get(button)
    }

    pub fn reset_buttons(&self) {
        self.lock().controller.buttons.reset();
    }

    pub fn set_stick(
        &self,
        side: StickSide,
        direction: StickDirection,
        force: f32,
    ) -> Result<(), ProtocolError> {
        self.lock().controller.stick_mut(side)?.set_position(direction, force)
    }

    pub fn set_stick_raw(&self, side: StickSide, h: u16, v: u16) -> Result<(), ProtocolError> {
        let mut state = self.lock();
        let stick = state.controller.stick_mut(side)?;
        let mut updated = stick.clone();
        updated.set_h(h)?;
        updated.set_v(v)?;
        *stick = updated;
        Ok(())
    }

    pub fn center_stick(&self, side: StickSide) -> Result<(), ProtocolError> {
        self.lock().controller.stick_mut(side)?.set_center();
        Ok(())
    }

    /// Snapshot of the live controller state
    pub fn controller_state(&self) -> ControllerState {
        self.lock().controller.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.shared.lock()
    }

    fn emit(&self, event: SessionEvent) {
        self.shared.emit(event);
    }
}

impl<T: Transport> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        let Some(sender) = &self.events else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Session event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Session event {:?} dropped, no listener", event);
            }
        }
    }

    fn write_locked(
        &self,
        state: &mut SessionState,
        report: &mut InputReport,
    ) -> Result<(), ProtocolError> {
        if state.phase == ProtocolPhase::Disconnected || !self.transport.is_connected() {
            debug!("Channel closed, skipping {:?} report", report.id());
            return Ok(());
        }

        report.set_buttons(state.controller.buttons.to_bytes());
        report.set_left_stick(state.controller.stick_bytes(StickSide::Left));
        report.set_right_stick(state.controller.stick_bytes(StickSide::Right));
        report.set_timer(state.timer);

        match self.transport.write(report.bytes()) {
            Ok(()) => {
                trace!("Sent {:?} report, timer {}", report.id(), state.timer);
                state.timer = state.timer.wrapping_add(1);
                state.last_sent = Some(Instant::now());
                Ok(())
            }
            Err(TransportError::NotConnected) => {
                debug!("Channel closed during write, skipping {:?} report", report.id());
                Ok(())
            }
            Err(e) => {
                error!("Failed to write {:?} report: {}", report.id(), e);
                Err(e.into())
            }
        }
    }

    fn periodic_tick(&self, interval: Duration) {
        let mut state = self.lock();
        if state.phase != ProtocolPhase::FullReportMode {
            return;
        }
        let Some(mode) = state.mode else {
            return;
        };
        if state.last_sent.is_some_and(|last| last.elapsed() < interval) {
            return;
        }

        // NFC/IR payload stays zero-filled
        let mut report = InputReport::full_mode(mode);
        if mode == InputReportId::Imu {
            report.clear_6axis_data();
        }
        if let Err(e) = self.write_locked(&mut state, &mut report) {
            warn!("Periodic report failed: {}", e);
        }
    }
}

/// Send full-mode reports until cancelled or the session is dropped
async fn run_periodic<T: Transport>(
    shared: Weak<Shared<T>>,
    token: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.periodic_tick(interval);
            }
        }
    }
    debug!("Periodic input reports stopped");
}

/// First payload byte of a sub command
fn argument(report: &OutputReport) -> Result<u8, ProtocolError> {
    report.sub_command_data().first().copied().ok_or_else(|| {
        MalformedReport::TooShort {
            actual: report.bytes().len(),
            min: OUTPUT_SUB_COMMAND_DATA_INDEX + 1,
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crossbeam_channel::unbounded;

    fn init_logger() {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(log::LevelFilter::Debug)
            .try_init();
    }

    fn new_protocol(kind: ControllerKind) -> (ControllerProtocol<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let settings = ProtocolSettings {
            mac_address: [0x98, 0xB6, 0xE9, 0x01, 0x02, 0x03],
            ..ProtocolSettings::default()
        };
        let protocol = ControllerProtocol::new(kind, FlashMemory::new(), transport.clone(), settings, None);
        (protocol, transport)
    }

    fn sub_command(sub_command: SubCommand, payload: &[u8]) -> Vec<u8> {
        let mut report = OutputReport::new(OutputReportId::SubCommand);
        report.set_sub_command(sub_command);
        report.set_sub_command_data(payload);
        report.bytes().to_vec()
    }

    #[test]
    fn test_handshake_sends_empty_reports() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        protocol.connection_made();

        let written = transport.take_written();
        assert_eq!(written.len(), DEFAULT_HANDSHAKE_NUDGES);
        for (i, report) in written.iter().enumerate() {
            assert_eq!(report.len(), 51);
            assert_eq!(report[0], 0xA1);
            assert_eq!(report[1], 0x00);
            assert_eq!(report[2], i as u8);
        }
        assert_eq!(protocol.phase(), ProtocolPhase::Idle);
    }

    #[test]
    fn test_device_info_reply() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::JoyConL);
        protocol
            .handle_report(&sub_command(SubCommand::RequestDeviceInfo, &[]))
            .unwrap();

        let written = transport.take_written();
        assert_eq!(written.len(), 1);
        let reply = InputReport::from_bytes(&written[0]).unwrap();
        assert_eq!(reply.ack(), 0x82);
        assert_eq!(reply.reply_to(), 0x02);
        assert_eq!(
            &reply.reply_data()[..12],
            &[0x04, 0x00, 0x01, 0x02, 0x98, 0xB6, 0xE9, 0x01, 0x02, 0x03, 0x01, 0x00]
        );
    }

    #[test]
    fn test_trigger_elapsed_time_depends_on_variant() {
        init_logger();
        let (pro, transport) = new_protocol(ControllerKind::ProController);
        pro.handle_report(&sub_command(SubCommand::TriggerButtonsElapsedTime, &[]))
            .unwrap();
        let reply = InputReport::from_bytes(&transport.take_written()[0]).unwrap();
        assert_eq!(reply.ack(), 0x83);
        assert_eq!(&reply.reply_data()[..4], &[0x2C, 0x01, 0x2C, 0x01]);
        assert_eq!(&reply.reply_data()[8..12], &[0, 0, 0, 0]);

        let (joycon, transport) = new_protocol(ControllerKind::JoyConR);
        joycon
            .handle_report(&sub_command(SubCommand::TriggerButtonsElapsedTime, &[]))
            .unwrap();
        let reply = InputReport::from_bytes(&transport.take_written()[0]).unwrap();
        assert_eq!(&reply.reply_data()[..4], &[0, 0, 0, 0]);
        assert_eq!(&reply.reply_data()[8..12], &[0x2C, 0x01, 0x2C, 0x01]);
    }

    #[test]
    fn test_simple_acks() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        for sub in [
            SubCommand::SetShipmentState,
            SubCommand::Enable6AxisSensor,
            SubCommand::EnableVibration,
        ] {
            protocol.handle_report(&sub_command(sub, &[0x01])).unwrap();
            let reply = InputReport::from_bytes(&transport.take_written()[0]).unwrap();
            assert_eq!(reply.ack(), 0x80);
            assert_eq!(reply.reply_to(), sub.id());
        }

        protocol
            .handle_report(&sub_command(SubCommand::SetNfcIrMcuConfig, &[]))
            .unwrap();
        let reply = InputReport::from_bytes(&transport.take_written()[0]).unwrap();
        assert_eq!(reply.ack(), 0xA0);
        assert_eq!(&reply.reply_data()[..34], &NFC_IR_MCU_CONFIG_REPLY);
    }

    #[test]
    fn test_nfc_ir_mcu_state_arguments() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        for arg in [0x00, 0x01] {
            protocol
                .handle_report(&sub_command(SubCommand::SetNfcIrMcuState, &[arg]))
                .unwrap();
        }
        assert_eq!(transport.take_written().len(), 2);

        let result = protocol.handle_report(&sub_command(SubCommand::SetNfcIrMcuState, &[0x05]));
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedArgument { argument: 0x05, .. })
        ));
        assert_eq!(transport.write_count(), 0);
    }

    #[test]
    fn test_spi_flash_read_errors() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);

        let too_big = sub_command(SubCommand::SpiFlashRead, &[0x00, 0x60, 0x00, 0x00, 0x1E]);
        assert!(matches!(
            protocol.handle_report(&too_big),
            Err(ProtocolError::UnsupportedArgument { .. })
        ));

        let out_of_range = sub_command(SubCommand::SpiFlashRead, &[0xFC, 0xFF, 0x07, 0x00, 0x08]);
        assert!(matches!(
            protocol.handle_report(&out_of_range),
            Err(ProtocolError::RangeError { .. })
        ));

        // dropped reports leave the session untouched
        protocol.report_received(&out_of_range);
        assert_eq!(transport.write_count(), 0);
        assert_eq!(protocol.phase(), ProtocolPhase::Idle);
        assert_eq!(protocol.timer(), 0);
    }

    #[test]
    fn test_unknown_sub_command_has_no_reply() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        let mut report = OutputReport::new(OutputReportId::SubCommand);
        report.set_sub_command_data(&[]);
        let mut bytes = report.bytes().to_vec();
        bytes[OUTPUT_SUB_COMMAND_INDEX] = 0x38;
        assert!(protocol.handle_report(&bytes).is_ok());
        assert_eq!(transport.write_count(), 0);
    }

    #[test]
    fn test_malformed_reports_rejected() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        let mut bytes = sub_command(SubCommand::RequestDeviceInfo, &[]);
        bytes[0] = 0xA1;
        assert!(matches!(
            protocol.handle_report(&bytes),
            Err(ProtocolError::MalformedReport(_))
        ));
        assert!(protocol.handle_report(&[]).is_err());
        assert_eq!(transport.write_count(), 0);
    }

    #[test]
    fn test_player_lights_signals_ready_once() {
        init_logger();
        let (sender, receiver) = unbounded();
        let transport = MockTransport::new();
        let protocol = ControllerProtocol::new(
            ControllerKind::ProController,
            FlashMemory::new(),
            transport.clone(),
            ProtocolSettings::default(),
            Some(sender),
        );

        assert!(!protocol.is_ready());
        protocol
            .handle_report(&sub_command(SubCommand::SetPlayerLights, &[0x01]))
            .unwrap();
        protocol
            .handle_report(&sub_command(SubCommand::SetPlayerLights, &[0x01]))
            .unwrap();
        assert!(protocol.is_ready());
        assert_eq!(transport.write_count(), 2);

        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events, vec![SessionEvent::Ready]);
    }

    #[test]
    fn test_report_mode_without_runtime_fails() {
        init_logger();
        let (protocol, _transport) = new_protocol(ControllerKind::ProController);
        let result = protocol.handle_report(&sub_command(SubCommand::SetInputReportMode, &[0x30]));
        assert!(matches!(result, Err(ProtocolError::RuntimeUnavailable)));
        assert_eq!(protocol.input_report_mode(), None);
    }

    #[test]
    fn test_unsupported_report_mode_is_ignored() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        protocol
            .handle_report(&sub_command(SubCommand::SetInputReportMode, &[0x3F]))
            .unwrap();
        assert_eq!(protocol.input_report_mode(), None);
        assert_eq!(transport.write_count(), 0);
    }

    #[test]
    fn test_write_refreshes_live_state() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        protocol.set_button(Button::A, true).unwrap();
        protocol
            .set_stick(StickSide::Left, StickDirection::Right, 1.0)
            .unwrap();

        let mut report = InputReport::standard();
        protocol.write(&mut report).unwrap();

        let sent = InputReport::from_bytes(&transport.take_written()[0]).unwrap();
        assert_eq!(sent.buttons(), [0x08, 0x00, 0x00]);
        let (h, v) = crate::protocol::stick::StickState::decode(sent.left_stick());
        assert_eq!((h, v), (2048 + 1792, 2048));
        assert_eq!(sent.right_stick(), [0x00, 0x08, 0x80]);
    }

    #[test]
    fn test_set_buttons_is_atomic() {
        let (protocol, _transport) = new_protocol(ControllerKind::JoyConR);
        let result = protocol.set_buttons(&[Button::A, Button::Minus], true);
        assert!(matches!(result, Err(ProtocolError::UnsupportedButton { .. })));
        assert!(!protocol.button(Button::A).unwrap());

        protocol.set_buttons(&[Button::A, Button::SR], true).unwrap();
        assert!(protocol.button(Button::A).unwrap());
        assert!(protocol.button(Button::SR).unwrap());
        protocol.reset_buttons();
        assert!(!protocol.button(Button::SR).unwrap());
    }

    #[test]
    fn test_missing_stick_rejected() {
        let (protocol, _transport) = new_protocol(ControllerKind::JoyConL);
        assert!(matches!(
            protocol.set_stick(StickSide::Right, StickDirection::Top, 1.0),
            Err(ProtocolError::UnsupportedStick { .. })
        ));
        assert!(protocol.set_stick_raw(StickSide::Right, 0, 0).is_err());

        assert!(protocol.set_stick_raw(StickSide::Left, 100, 0x1000).is_err());
        let state = protocol.controller_state();
        assert!(state.stick(StickSide::Left).unwrap().is_center(0));
    }

    #[test]
    fn test_hci_state_disconnects() {
        init_logger();
        let (sender, receiver) = unbounded();
        let transport = MockTransport::new();
        let protocol = ControllerProtocol::new(
            ControllerKind::ProController,
            FlashMemory::new(),
            transport.clone(),
            ProtocolSettings::default(),
            Some(sender),
        );

        protocol
            .handle_report(&sub_command(SubCommand::SetHciState, &[0x00]))
            .unwrap();
        assert_eq!(protocol.phase(), ProtocolPhase::Disconnected);
        assert_eq!(transport.write_count(), 0);
        assert_eq!(receiver.try_recv(), Ok(SessionEvent::ConnectionLost));

        // terminal: later writes are skipped
        protocol.write(&mut InputReport::standard()).unwrap();
        assert_eq!(transport.write_count(), 0);
    }

    #[tokio::test]
    async fn test_ready_revoked_on_disconnect() {
        init_logger();
        let (protocol, _transport) = new_protocol(ControllerKind::ProController);
        protocol
            .handle_report(&sub_command(SubCommand::SetPlayerLights, &[0x01]))
            .unwrap();
        assert!(protocol.is_ready());
        assert!(protocol.wait_ready().await.is_ok());

        protocol
            .handle_report(&sub_command(SubCommand::SetHciState, &[0x00]))
            .unwrap();
        assert!(!protocol.is_ready());
        assert!(matches!(
            protocol.wait_ready().await,
            Err(ProtocolError::TransportUnavailable)
        ));

        // lights after teardown do not revive the session
        protocol
            .handle_report(&sub_command(SubCommand::SetPlayerLights, &[0x01]))
            .unwrap();
        assert!(!protocol.is_ready());
    }

    /// Fails the first `failures` writes, then records like the mock
    struct FlakyTransport {
        inner: MockTransport,
        failures: std::sync::atomic::AtomicUsize,
    }

    impl Transport for FlakyTransport {
        fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
            use std::sync::atomic::Ordering;
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::WriteFailed("link busy".into()));
            }
            self.inner.write(bytes)
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }
    }

    #[test]
    fn test_handshake_survives_failed_nudge() {
        init_logger();
        let recorder = MockTransport::new();
        let transport = FlakyTransport {
            inner: recorder.clone(),
            failures: std::sync::atomic::AtomicUsize::new(1),
        };
        let protocol = ControllerProtocol::new(
            ControllerKind::ProController,
            FlashMemory::new(),
            transport,
            ProtocolSettings::default(),
            None,
        );
        protocol.connection_made();

        let written = recorder.take_written();
        assert_eq!(written.len(), DEFAULT_HANDSHAKE_NUDGES - 1);
        // the failed nudge did not consume a timer value
        assert_eq!(written[0][2], 0);
        assert_eq!(protocol.timer(), (DEFAULT_HANDSHAKE_NUDGES - 1) as u8);
        assert_eq!(protocol.phase(), ProtocolPhase::Idle);
    }

    #[test]
    fn test_full_event_channel_drops_event() {
        init_logger();
        let (sender, receiver) = crossbeam_channel::bounded(1);
        let protocol = ControllerProtocol::new(
            ControllerKind::ProController,
            FlashMemory::new(),
            MockTransport::new(),
            ProtocolSettings::default(),
            Some(sender),
        );
        protocol.connection_made();
        protocol
            .handle_report(&sub_command(SubCommand::SetPlayerLights, &[0x01]))
            .unwrap();

        // readiness does not depend on the event being delivered
        assert!(protocol.is_ready());
        let events: Vec<_> = receiver.try_iter().collect();
        assert_eq!(events, vec![SessionEvent::Connected]);
    }

    #[test]
    fn test_write_failure_keeps_timer() {
        init_logger();
        let (protocol, transport) = new_protocol(ControllerKind::ProController);
        transport.set_fail_writes(true);
        assert!(matches!(
            protocol.write(&mut InputReport::standard()),
            Err(ProtocolError::Transport(TransportError::WriteFailed(_)))
        ));
        assert_eq!(protocol.timer(), 0);

        transport.set_fail_writes(false);
        transport.set_connected(false);
        assert!(protocol.write(&mut InputReport::standard()).is_ok());
        assert_eq!(protocol.timer(), 0);
    }

    #[tokio::test]
    async fn test_wait_ready_fails_after_disconnect() {
        let (protocol, _transport) = new_protocol(ControllerKind::ProController);
        protocol.connection_lost();
        assert!(matches!(
            protocol.wait_ready().await,
            Err(ProtocolError::TransportUnavailable)
        ));
    }
}
