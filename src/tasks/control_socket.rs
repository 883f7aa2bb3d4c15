use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::events::ControlCommand;

/// Parse one line of the control protocol. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<ControlCommand>, Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Create the socket's parent directory, drop a stale socket file and bind.
pub async fn bind(path: &Path) -> Result<UnixListener, Error> {
    if path.file_name().is_none() {
        return Err(Error::Socket(format!(
            "{} does not name a socket file",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(path).await? {
        tokio::fs::remove_file(path).await?;
    }
    let listener = UnixListener::bind(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o660))?;
    }
    Ok(listener)
}

/// Accept clients until cancelled, forwarding each parsed command.
pub async fn run(
    path: PathBuf,
    commands: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = bind(&path)
        .await
        .with_context(|| format!("failed to bind control socket {}", path.display()))?;
    info!(socket = %path.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let commands = commands.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_client(stream, commands, cancel).await {
                            warn!("control client failed: {err}");
                        }
                    });
                }
                Err(err) => warn!("failed to accept control connection: {err}"),
            },
        }
    }

    if let Err(err) = tokio::fs::remove_file(&path).await {
        debug!("failed to remove control socket: {err}");
    }
    info!("control socket closed");
    Ok(())
}

async fn handle_client(
    stream: UnixStream,
    commands: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        match parse_command(&line) {
            Ok(Some(command)) => {
                debug!(?command, "control command received");
                if commands.send(command).await.is_err() {
                    return Err(Error::Socket("controller is gone".into()));
                }
            }
            Ok(None) => {}
            Err(err) => warn!(line = %line, "ignoring malformed control command: {err}"),
        }
    }
}
