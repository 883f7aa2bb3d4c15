//! Volume popup daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use humantime::format_duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use volume_popup::bluetooth::SimulatedGateway;
use volume_popup::config::Configuration;
use volume_popup::events::{ControlCommand, PlatformEvent};
use volume_popup::presentation::LogPresenter;
use volume_popup::session::{Viewport, VolumeSession};
use volume_popup::sound::SimulatedSound;
use volume_popup::tasks::{control_socket, controller};

#[derive(Debug, Parser)]
#[command(name = "volume-popup", version, about = "Volume control popup daemon")]
struct Args {
    /// Path to YAML config; built-in defaults are used when omitted
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Override the control socket path from the config
    #[arg(long = "control-socket", value_name = "PATH")]
    control_socket: Option<PathBuf>,
    /// Popup viewport width in pixels
    #[arg(long, default_value_t = 720)]
    width: u32,
    /// Popup viewport height in pixels
    #[arg(long, default_value_t = 1280)]
    height: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // init tracing (RUST_LOG controls level, default = info)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let Args {
        config,
        control_socket,
        width,
        height,
    } = Args::parse();

    let mut cfg = match &config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    }
    .validated()
    .context("invalid configuration values")?;
    if let Some(path) = control_socket {
        cfg.control_socket = path;
    }
    tracing::info!(
        socket = %cfg.control_socket.display(),
        popup_timeout = %format_duration(cfg.timing.popup_timeout),
        key_repeat = %format_duration(cfg.timing.key_repeat_interval),
        earphone_ceiling = cfg.safety.earphone_ceiling,
        warning_threshold = cfg.safety.warning_threshold,
        "configuration loaded"
    );

    let (command_tx, command_rx) = mpsc::channel::<ControlCommand>(64); // socket/signals -> controller
    let (platform_tx, platform_rx) = mpsc::unbounded_channel::<PlatformEvent>(); // services -> controller

    let sound = SimulatedSound::new(&cfg.platform).with_notifier(platform_tx.clone());
    let gateway = SimulatedGateway::new(cfg.platform.sco_opened, cfg.platform.speaker_gain)
        .with_notifier(platform_tx);
    let mut session = VolumeSession::new(&cfg, sound, gateway, LogPresenter::new());
    session.initialize(Viewport { width, height });

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let control = command_tx.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tracing::info!("SIGUSR1 received; showing volume");
                            if let Err(err) = control.send(ControlCommand::ShowVolume).await {
                                tracing::warn!("failed to forward show request: {err}");
                                break;
                            }
                        }
                    }
                },
                Err(err) => tracing::warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();

    // Control socket
    tasks.spawn({
        let path = cfg.control_socket.clone();
        let cancel = cancel.clone();
        async move {
            control_socket::run(path, command_tx, cancel)
                .await
                .context("control socket task failed")
        }
    });

    if let Err(err) = controller::run(session, command_rx, platform_rx, cancel.clone())
        .await
        .context("controller failed")
    {
        tracing::error!("{err:?}");
    }
    // Ensure other tasks are asked to stop
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    Ok(())
}
