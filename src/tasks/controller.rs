use std::time::Instant;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bluetooth::SimulatedGateway;
use crate::events::{ControlCommand, KeyEvent, PlatformChange, PlatformEvent, SliderEvent};
use crate::presentation::Presenter;
use crate::session::VolumeSession;
use crate::sound::{PlayingQuery, SimulatedSound};

/// Session wired to the in-process platform backends.
pub type DaemonSession<P> = VolumeSession<SimulatedSound, SimulatedGateway, P>;

/// Drive the session from control commands, platform notifications and its
/// own timers until cancelled or every control sender is dropped.
///
/// All handlers run on this one task, so each completes before the next
/// event is looked at. The session is handed back after deinitialization.
pub async fn run<P: Presenter>(
    mut session: DaemonSession<P>,
    mut commands: mpsc::Receiver<ControlCommand>,
    mut platform: mpsc::UnboundedReceiver<PlatformEvent>,
    cancel: CancellationToken,
) -> Result<DaemonSession<P>> {
    info!("volume controller running");
    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut session, command, Instant::now()),
                None => {
                    info!("control channel closed");
                    break;
                }
            },
            Some(event) = platform.recv() => {
                debug!(?event, "platform event");
                session.on_platform_event(event, Instant::now());
            }
            _ = wait_until(deadline) => session.fire_due(Instant::now()),
        }
    }
    session.deinitialize();
    info!("volume controller stopped");
    Ok(session)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

pub fn handle_command<P: Presenter>(
    session: &mut DaemonSession<P>,
    command: ControlCommand,
    now: Instant,
) {
    match command {
        ControlCommand::ShowVolume => {
            session.show_request(now);
        }
        ControlCommand::Hide => {
            session.hide();
        }
        ControlCommand::Pause => session.pause(),
        ControlCommand::Key { key, pressed } => session.on_key(KeyEvent { key, pressed }, now),
        ControlCommand::SliderDragStart => session.on_slider(SliderEvent::DragStart, now),
        ControlCommand::SliderChanged { value } => {
            session.on_slider(SliderEvent::Changed { value }, now)
        }
        ControlCommand::SliderDragStop { value } => {
            session.on_slider(SliderEvent::DragStop { value }, now)
        }
        ControlCommand::SettingsClicked => session.on_settings_clicked(),
        ControlCommand::Platform { change } => apply_change(session, change, now),
    }
}

/// Changes with a backing store go through the simulated services, which
/// notify the session the same way the real platform would. Pure signals
/// are delivered directly.
fn apply_change<P: Presenter>(session: &mut DaemonSession<P>, change: PlatformChange, now: Instant) {
    let signal = match change {
        PlatformChange::Level { stream, level } => {
            session.sound_mut().external_set_level(stream, level);
            None
        }
        PlatformChange::ActiveStream { stream } => {
            session
                .sound_mut()
                .set_playing(PlayingQuery::Playing(stream));
            None
        }
        PlatformChange::Preference { flag, value } => {
            session.sound_mut().external_set_preference(flag, value);
            None
        }
        PlatformChange::Route { route } => {
            session.sound_mut().set_route(route);
            None
        }
        PlatformChange::Sco { opened } => {
            session.gateway_mut().set_sco(opened);
            None
        }
        PlatformChange::PeerGain { gain } => {
            session.gateway_mut().peer_set_gain(gain);
            None
        }
        PlatformChange::IdleLock { engaged } => Some(PlatformEvent::IdleLockChanged { engaged }),
        PlatformChange::VolumeKeyOwner { owner } => {
            Some(PlatformEvent::VolumeKeyOwnerChanged { owner })
        }
        PlatformChange::LcdOff => Some(PlatformEvent::LcdOff),
        PlatformChange::AllSoundsOff { enabled } => Some(PlatformEvent::AllSoundsOff { enabled }),
        PlatformChange::Rotation { angle } => Some(PlatformEvent::RotationChanged { angle }),
    };
    if let Some(event) = signal {
        session.on_platform_event(event, now);
    }
}
