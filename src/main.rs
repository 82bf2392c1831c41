//! joycontrol-rs demo application
//!
//! Plays both sides of a pairing over the in-memory mock transport: a scripted
//! console sends the sub commands a real Switch sends while pairing, the
//! emulated controller answers them, then the first configured quick action
//! is played back while the periodic reports are streamed.
//!
//! Usage: joycontrol-rs [config.toml]

use anyhow::Context;
use joycontrol_rs::protocol::constants::{
    FACTORY_LEFT_STICK_CALIBRATION_OFFSET, FACTORY_RIGHT_STICK_CALIBRATION_OFFSET,
    STICK_CALIBRATION_LEN,
};
use joycontrol_rs::protocol::{InputReportId, OutputReport, OutputReportId, SubCommand};
use joycontrol_rs::{Config, ControllerSession, HostCache, MockTransport, QuickAction, StickSide};
use log::info;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CONSOLE_ADDRESS: &str = "7C:BB:8A:00:00:01";

/// The exchange a console runs right after the interrupt channel opens
fn pairing_script() -> anyhow::Result<Vec<OutputReport>> {
    let mut script = Vec::new();
    let mut request = |sub_command: SubCommand, payload: &[u8]| {
        let mut report = OutputReport::new(OutputReportId::SubCommand);
        report.set_timer(script.len() as u8);
        report.set_sub_command(sub_command);
        report.set_sub_command_data(payload);
        script.push(report);
    };

    request(SubCommand::RequestDeviceInfo, &[]);
    request(SubCommand::SetShipmentState, &[0x00]);
    request(SubCommand::SetInputReportMode, &[InputReportId::Imu.id()]);
    request(SubCommand::TriggerButtonsElapsedTime, &[]);
    request(SubCommand::EnableVibration, &[0x01]);
    request(SubCommand::Enable6AxisSensor, &[0x01]);
    request(SubCommand::SetPlayerLights, &[0x01]);

    for offset in [FACTORY_LEFT_STICK_CALIBRATION_OFFSET, FACTORY_RIGHT_STICK_CALIBRATION_OFFSET] {
        let mut report = OutputReport::new(OutputReportId::SubCommand);
        report.sub_0x10_spi_flash_read(offset as u32, STICK_CALIBRATION_LEN as u8)?;
        // the console reads calibration before it sets the player lights
        script.insert(script.len() - 1, report);
    }
    Ok(script)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== joycontrol-rs demo ===");
    println!();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::load_default().context("loading configs/default.toml")?,
    };
    let settings = &config.settings;
    let flash = settings.load_flash().context("loading SPI flash image")?;

    let session = ControllerSession::<MockTransport>::new(
        settings.controller,
        flash,
        settings.protocol_settings()?,
        settings.button_push_duration(),
    )
    .with_host_cache(HostCache::load());
    let events = session.events();

    println!("Emulating a {} ({})", settings.controller, settings.mac_address);

    // Channel open: the controller nudges the console with empty reports
    let transport = MockTransport::new();
    let protocol = session.channel_opened(transport.clone(), CONSOLE_ADDRESS);

    for report in pairing_script()? {
        session.data_received(report.bytes());
    }

    tokio::time::timeout(Duration::from_secs(5), session.wait_ready())
        .await
        .context("console never set the player lights")??;
    println!("✓ Paired, player slot assigned");
    println!("  Report mode: {:?}", protocol.input_report_mode());

    let action = config
        .quick_actions
        .first()
        .cloned()
        .unwrap_or_else(|| QuickAction::circle(StickSide::Left));
    println!("Running quick action '{}' ({:?})", action.name, action.total_duration());
    session
        .run_quick_action(&action, &CancellationToken::new())
        .await?;

    let push = session.push_buttons(&[joycontrol_rs::Button::A])?;
    push.wait().await;

    session.channel_closed();

    let written = transport.written();
    let periodic = written
        .iter()
        .filter(|r| r.get(1) == Some(&InputReportId::Imu.id()))
        .count();
    info!("Controller wrote {} reports ({} periodic)", written.len(), periodic);

    println!();
    println!("Session events: {:?}", events.try_iter().collect::<Vec<_>>());
    if let Some(console) = session.known_consoles().and_then(|c| c.most_recent().cloned()) {
        println!("Last console: {}", console.address);
    }

    Ok(())
}
