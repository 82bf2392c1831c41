//! Controller session
//!
//! One session object per emulated controller. It owns the protocol engine of
//! the current connection, receives the transport's lifecycle notifications,
//! and offers the button/stick API used by a front-end and by quick actions.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::host_cache::HostCache;
use crate::protocol::{
    Button, ControllerKind, ControllerProtocol, FlashMemory, ProtocolError, ProtocolPhase,
    ProtocolSettings, SessionEvent, StickDirection, StickSide,
};
use crate::quick_action::{ActionStep, QuickAction};
use crate::transport::Transport;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No console connected")]
    NotConnected,

    #[error("At least one button is required")]
    NoButtons,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cancelled")]
    Cancelled,
}

/// Pending release of a button push
#[derive(Debug)]
pub struct PushHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PushHandle {
    /// Drop the scheduled release, the buttons stay pressed
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the release (or cancellation) to happen
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            warn!("Button release task failed: {}", e);
        }
    }
}

/// Session for one emulated controller
pub struct ControllerSession<T: Transport> {
    kind: ControllerKind,
    flash: FlashMemory,
    settings: ProtocolSettings,
    button_push: Duration,
    protocol: Mutex<Option<ControllerProtocol<T>>>,
    console: Mutex<Option<String>>,
    host_cache: Option<Mutex<HostCache>>,
    event_sender: Sender<SessionEvent>,
    event_receiver: Receiver<SessionEvent>,
}

impl<T: Transport> ControllerSession<T> {
    pub fn new(
        kind: ControllerKind,
        flash: FlashMemory,
        settings: ProtocolSettings,
        button_push: Duration,
    ) -> Self {
        let (event_sender, event_receiver) = bounded(100);
        Self {
            kind,
            flash,
            settings,
            button_push,
            protocol: Mutex::new(None),
            console: Mutex::new(None),
            host_cache: None,
            event_sender,
            event_receiver,
        }
    }

    /// Remember every console that connects
    pub fn with_host_cache(mut self, cache: HostCache) -> Self {
        info!("Loaded {} known consoles", cache.len());
        self.host_cache = Some(Mutex::new(cache));
        self
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    /// Get the event receiver (for front-end event processing)
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.event_receiver.clone()
    }

    /// Protocol engine of the current connection
    pub fn protocol(&self) -> Option<ControllerProtocol<T>> {
        lock(&self.protocol).clone()
    }

    /// Address of the connected console
    pub fn console(&self) -> Option<String> {
        lock(&self.console).clone()
    }

    /// A protocol is installed and the console has not torn it down
    pub fn is_connected(&self) -> bool {
        self.current().is_ok()
    }

    pub fn known_consoles(&self) -> Option<HostCache> {
        self.host_cache.as_ref().map(|cache| lock(cache).clone())
    }

    // ========================================================================
    // Transport notifications
    // ========================================================================

    /// The interrupt channel to `console` is open.
    ///
    /// A fresh protocol engine (and ready signal) is created for every connection.
    pub fn channel_opened(&self, transport: T, console: &str) -> ControllerProtocol<T> {
        if let Some(previous) = lock(&self.protocol).take() {
            warn!("Channel reopened without close, dropping previous connection");
            previous.connection_lost();
        }

        info!("Interrupt channel connected to {}", console);
        *lock(&self.console) = Some(console.to_string());
        self.remember_console(console);

        let protocol = ControllerProtocol::new(
            self.kind,
            self.flash.clone(),
            transport,
            self.settings.clone(),
            Some(self.event_sender.clone()),
        );
        *lock(&self.protocol) = Some(protocol.clone());
        protocol.connection_made();
        protocol
    }

    /// Inbound report from the console
    pub fn data_received(&self, bytes: &[u8]) {
        match self.protocol() {
            Some(protocol) => protocol.report_received(bytes),
            None => warn!("Received {} bytes without an open channel", bytes.len()),
        }
    }

    /// The interrupt channel closed
    pub fn channel_closed(&self) {
        match lock(&self.protocol).take() {
            Some(protocol) => protocol.connection_lost(),
            None => {
                debug!("Channel closed before a protocol was created");
                let _ = self.event_sender.try_send(SessionEvent::ConnectionLost);
            }
        }
    }

    /// Wait until the console accepts input
    pub async fn wait_ready(&self) -> Result<(), SessionError> {
        let protocol = self.current()?;
        protocol.wait_ready().await?;
        Ok(())
    }

    // ========================================================================
    // Controller input
    // ========================================================================

    pub fn press_buttons(&self, buttons: &[Button]) -> Result<(), SessionError> {
        if buttons.is_empty() {
            return Err(SessionError::NoButtons);
        }
        debug!("Press {:?}", buttons);
        self.current()?.set_buttons(buttons, true)?;
        Ok(())
    }

    pub fn release_buttons(&self, buttons: &[Button]) -> Result<(), SessionError> {
        if buttons.is_empty() {
            return Err(SessionError::NoButtons);
        }
        debug!("Release {:?}", buttons);
        self.current()?.set_buttons(buttons, false)?;
        Ok(())
    }

    /// Press now, release after the configured push duration
    pub fn push_buttons(&self, buttons: &[Button]) -> Result<PushHandle, SessionError> {
        self.push_buttons_for(buttons, self.button_push)
    }

    /// Press now, release after at least `hold`
    pub fn push_buttons_for(&self, buttons: &[Button], hold: Duration) -> Result<PushHandle, SessionError> {
        let handle = Handle::try_current().map_err(|_| ProtocolError::RuntimeUnavailable)?;
        self.press_buttons(buttons)?;

        let protocol = self.current()?;
        let buttons = buttons.to_vec();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task = handle.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    debug!("Release of {:?} cancelled", buttons);
                }
                _ = tokio::time::sleep(hold) => {
                    if let Err(e) = protocol.set_buttons(&buttons, false) {
                        warn!("Failed to release {:?}: {}", buttons, e);
                    }
                }
            }
        });

        Ok(PushHandle { token, task })
    }

    /// Move a stick to a direction preset at full force
    pub fn stick_pushed(&self, side: StickSide, direction: StickDirection) -> Result<(), SessionError> {
        self.stick_pushed_with_force(side, direction, 1.0)
    }

    pub fn stick_pushed_with_force(
        &self,
        side: StickSide,
        direction: StickDirection,
        force: f32,
    ) -> Result<(), SessionError> {
        debug!("Stick {:?} -> {:?} ({:.2})", side, direction, force);
        self.current()?.set_stick(side, direction, force)?;
        Ok(())
    }

    /// Play a quick action. Stops early when `token` is cancelled.
    pub async fn run_quick_action(
        &self,
        action: &QuickAction,
        token: &CancellationToken,
    ) -> Result<(), SessionError> {
        let protocol = self.current()?;
        let steps = action.expanded_steps();
        info!("Running quick action '{}' ({} steps)", action.name, steps.len());

        for step in &steps {
            if let Err(e) = apply_step(&protocol, step) {
                if let Err(restore) = restore_step(&protocol, step) {
                    warn!("Failed to restore after step error: {}", restore);
                }
                return Err(e.into());
            }
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(SessionError::Cancelled),
                _ = tokio::time::sleep(step.duration()) => Ok(()),
            };
            restore_step(&protocol, step)?;

            if let Err(e) = outcome {
                info!("Quick action '{}' cancelled", action.name);
                return Err(e);
            }
        }

        info!("Quick action '{}' finished", action.name);
        Ok(())
    }

    /// Live protocol, `NotConnected` once the console has torn it down
    fn current(&self) -> Result<ControllerProtocol<T>, SessionError> {
        self.protocol()
            .filter(|protocol| protocol.phase() != ProtocolPhase::Disconnected)
            .ok_or(SessionError::NotConnected)
    }

    fn remember_console(&self, console: &str) {
        let Some(cache) = &self.host_cache else {
            return;
        };
        let mut cache = lock(cache);
        if let Err(e) = cache.remember(console, None) {
            warn!("Failed to cache console {}: {}", console, e);
            return;
        }
        if let Err(e) = cache.save() {
            warn!("Failed to save console cache: {}", e);
        }
    }
}

fn apply_step<T: Transport>(protocol: &ControllerProtocol<T>, step: &ActionStep) -> Result<(), ProtocolError> {
    if let (Some(side), Some(direction)) = (step.stick, step.direction) {
        protocol.set_stick(side, direction, step.force)?;
    }
    if !step.buttons.is_empty() {
        protocol.set_buttons(&step.buttons, true)?;
    }
    Ok(())
}

/// Release the step's buttons and re-centre its stick. Both are attempted, the first error wins.
fn restore_step<T: Transport>(protocol: &ControllerProtocol<T>, step: &ActionStep) -> Result<(), ProtocolError> {
    let released = if step.buttons.is_empty() {
        Ok(())
    } else {
        protocol.set_buttons(&step.buttons, false)
    };
    let centered = match step.stick {
        Some(side) => protocol.center_stick(side),
        None => Ok(()),
    };
    released.and(centered)
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
