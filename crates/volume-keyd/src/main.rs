use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use evdev::{Device, EventSummary, KeyCode};
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "volume-keyd",
    about = "Forwards hardware volume keys to the volume popup daemon"
)]
struct Args {
    /// Input device path (evdev). Auto-detects when omitted.
    #[arg(long)]
    device: Option<PathBuf>,

    /// Debounce window applied to press/release transitions of one key (milliseconds).
    #[arg(long, default_value_t = 20)]
    debounce_ms: u64,

    /// Volume popup control socket.
    #[arg(long, default_value = "/run/volume-popup/control.sock")]
    control_socket: PathBuf,

    /// Logging level (error|warn|info|debug|trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let (mut device, path) = open_device(&args)?;
    set_nonblocking(&device)
        .with_context(|| format!("failed to set {} non-blocking", path.display()))?;
    info!(device = %path.display(), "listening for volume key events");

    let mut debouncer = Debouncer::new(Duration::from_millis(args.debounce_ms));
    let mut forwarder = Forwarder::new(args.control_socket.clone());

    loop {
        for (key, pressed) in debouncer.handle_timeout(Instant::now()) {
            forward(&mut forwarder, key, pressed);
        }

        let idle = match device.fetch_events() {
            Ok(events) => {
                let mut handled = false;
                for event in events {
                    handled = true;
                    let EventSummary::Key(_, code, value) = event.destructure() else {
                        continue;
                    };
                    let Some(key) = Key::from_code(code) else {
                        continue;
                    };
                    // 2 is the kernel autorepeat; the daemon runs its own repeat timers.
                    let pressed = match value {
                        1 => true,
                        0 => false,
                        _ => continue,
                    };
                    if let Some(pressed) = debouncer.on_transition(key, pressed, Instant::now()) {
                        forward(&mut forwarder, key, pressed);
                    }
                }
                !handled
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => true,
            Err(err) => return Err(err).with_context(|| "failed reading input events"),
        };

        if idle {
            let sleep_for = debouncer
                .time_until_deadline(Instant::now())
                .unwrap_or(Duration::from_millis(10));
            if !sleep_for.is_zero() {
                thread::sleep(sleep_for.min(Duration::from_millis(10)));
            }
        }
    }
}

fn set_nonblocking(device: &Device) -> Result<()> {
    let current = fcntl(device.as_fd(), FcntlArg::F_GETFL).context("F_GETFL failed")?;
    let mut flags = OFlag::from_bits_retain(current);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(device.as_fd(), FcntlArg::F_SETFL(flags)).context("F_SETFL failed")?;
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .parse(level)
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Directories searched when no device is given, with the rule a node name
/// must satisfy. Stable `by-path` links come first.
const SEARCH_DIRS: [(&str, NameMatch); 2] = [
    ("/dev/input/by-path", NameMatch::Contains("event")),
    ("/dev/input", NameMatch::Prefix("event")),
];

#[derive(Debug, Clone, Copy)]
enum NameMatch {
    Contains(&'static str),
    Prefix(&'static str),
}

impl NameMatch {
    fn matches(self, name: &str) -> bool {
        match self {
            NameMatch::Contains(needle) => name.contains(needle),
            NameMatch::Prefix(prefix) => name.starts_with(prefix),
        }
    }
}

fn open_device(args: &Args) -> Result<(Device, PathBuf)> {
    if let Some(path) = &args.device {
        let device =
            Device::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        ensure_volume_keys(&device, path)?;
        return Ok((device, path.clone()));
    }

    for (dir, name_match) in SEARCH_DIRS {
        if let Some(found) = first_volume_device(Path::new(dir), name_match)? {
            return Ok(found);
        }
    }
    bail!("no input devices advertising KEY_VOLUMEUP found");
}

/// Lowest-sorting node in `dir` that reports both volume keys.
fn first_volume_device(dir: &Path, name_match: NameMatch) -> Result<Option<(Device, PathBuf)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list {}", dir.display()));
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|kind| !kind.is_dir()))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name_match.matches(name))
        })
        .collect();
    paths.sort();

    for path in paths {
        if let Some(device) = open_volume_device(&path)? {
            return Ok(Some((device, path)));
        }
    }
    Ok(None)
}

fn open_volume_device(path: &Path) -> Result<Option<Device>> {
    let device = match Device::open(path) {
        Ok(device) => device,
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            warn!(device = %path.display(), "no permission to read device");
            return Ok(None);
        }
        Err(err) => return Err(err).with_context(|| format!("failed to open {}", path.display())),
    };
    match ensure_volume_keys(&device, path) {
        Ok(()) => Ok(Some(device)),
        Err(err) => {
            debug!(device = %path.display(), "{}", err);
            Ok(None)
        }
    }
}

fn ensure_volume_keys(device: &Device, path: &Path) -> Result<()> {
    let Some(keys) = device.supported_keys() else {
        bail!("{} does not advertise any keys", path.display());
    };
    if !keys.contains(KeyCode::KEY_VOLUMEUP) || !keys.contains(KeyCode::KEY_VOLUMEDOWN) {
        bail!("{} does not support the volume keys", path.display());
    }
    Ok(())
}

/// Keys forwarded to the daemon, named the way its control protocol spells them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Key {
    VolumeUp,
    VolumeDown,
    Mute,
    Cancel,
    Back,
}

impl Key {
    fn from_code(code: KeyCode) -> Option<Self> {
        match code {
            KeyCode::KEY_VOLUMEUP => Some(Key::VolumeUp),
            KeyCode::KEY_VOLUMEDOWN => Some(Key::VolumeDown),
            KeyCode::KEY_MUTE => Some(Key::Mute),
            KeyCode::KEY_CANCEL | KeyCode::KEY_ESC => Some(Key::Cancel),
            KeyCode::KEY_BACK => Some(Key::Back),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
enum Command {
    Key { key: Key, pressed: bool },
}

/// Last state forwarded for one key and any change held back behind it.
#[derive(Debug, Default, Clone, Copy)]
struct KeyState {
    sent: bool,
    sent_at: Option<Instant>,
    held: Option<bool>,
}

/// Per-key debounce.
///
/// The first edge is forwarded at once. Edges arriving within the window
/// after it are held, and when the window closes the latest held state is
/// forwarded if it differs from what was sent. A bounce that returns to the
/// sent state is swallowed; a real change is never lost.
struct Debouncer {
    window: Duration,
    keys: HashMap<Key, KeyState>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            keys: HashMap::new(),
        }
    }

    /// Returns the state to forward now, if any.
    fn on_transition(&mut self, key: Key, pressed: bool, now: Instant) -> Option<bool> {
        let window = self.window;
        let state = self.keys.entry(key).or_default();
        let settling = state
            .sent_at
            .is_some_and(|at| now.saturating_duration_since(at) < window);
        if settling {
            debug!(?key, pressed, "transition held until the debounce window closes");
            state.held = Some(pressed);
            return None;
        }

        state.held = None;
        if state.sent == pressed {
            debug!(?key, pressed, "duplicate transition");
            return None;
        }
        state.sent = pressed;
        state.sent_at = Some(now);
        Some(pressed)
    }

    /// Release held states whose window has closed.
    fn handle_timeout(&mut self, now: Instant) -> Vec<(Key, bool)> {
        let window = self.window;
        let mut ready = Vec::new();
        for (key, state) in &mut self.keys {
            let Some(at) = state.sent_at else {
                continue;
            };
            if now.saturating_duration_since(at) < window {
                continue;
            }
            let Some(held) = state.held.take() else {
                continue;
            };
            if held == state.sent {
                debug!(?key, "bounce settled back; nothing to forward");
                continue;
            }
            state.sent = held;
            state.sent_at = Some(now);
            ready.push((*key, held));
        }
        ready
    }

    fn time_until_deadline(&self, now: Instant) -> Option<Duration> {
        self.keys
            .values()
            .filter(|state| state.held.is_some())
            .filter_map(|state| state.sent_at)
            .map(|at| (at + self.window).saturating_duration_since(now))
            .min()
    }
}

/// Holds one connection to the control socket and reconnects lazily, so
/// presses and releases reach the daemon in order on a single stream.
struct Forwarder {
    socket: PathBuf,
    stream: Option<UnixStream>,
}

impl Forwarder {
    fn new(socket: PathBuf) -> Self {
        Self {
            socket,
            stream: None,
        }
    }

    fn send(&mut self, command: &Command) -> Result<()> {
        let mut line = serde_json::to_vec(command).context("failed to encode key command")?;
        line.push(b'\n');

        if let Some(stream) = self.stream.as_mut() {
            match stream.write_all(&line) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!("control connection lost ({err}); reconnecting");
                    self.stream = None;
                }
            }
        }

        let mut stream = UnixStream::connect(&self.socket).with_context(|| {
            format!(
                "failed to connect to control socket at {}",
                self.socket.display()
            )
        })?;
        stream
            .write_all(&line)
            .context("failed to send key command")?;
        self.stream = Some(stream);
        Ok(())
    }
}

fn forward(forwarder: &mut Forwarder, key: Key, pressed: bool) {
    debug!(?key, pressed, "forwarding key");
    if let Err(err) = forwarder.send(&Command::Key { key, pressed }) {
        error!(?err, ?key, "failed to forward key");
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, Debouncer, Forwarder, Key, NameMatch, SEARCH_DIRS};
    use evdev::KeyCode;
    use std::io::{BufRead, BufReader};
    use std::os::unix::net::UnixListener;
    use std::time::{Duration, Instant};

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn only_volume_keys_are_mapped() {
        assert_eq!(Key::from_code(KeyCode::KEY_VOLUMEUP), Some(Key::VolumeUp));
        assert_eq!(Key::from_code(KeyCode::KEY_ESC), Some(Key::Cancel));
        assert_eq!(Key::from_code(KeyCode::KEY_POWER), None);
    }

    #[test]
    fn search_accepts_only_event_nodes() {
        let (_, by_path) = SEARCH_DIRS[0];
        let (_, raw) = SEARCH_DIRS[1];
        assert!(by_path.matches("platform-gpio-keys-event"));
        assert!(!by_path.matches("platform-gpio-keys-mouse"));
        assert!(raw.matches("event3"));
        assert!(!raw.matches("mouse0"));
        assert!(!NameMatch::Prefix("event").matches("by-event"));
    }

    #[test]
    fn quick_tap_release_is_delivered_after_the_window() {
        let mut debouncer = Debouncer::new(ms(20));
        let start = Instant::now();

        assert_eq!(debouncer.on_transition(Key::VolumeUp, true, start), Some(true));
        assert_eq!(
            debouncer.on_transition(Key::VolumeUp, false, start + ms(15)),
            None
        );
        assert_eq!(
            debouncer.time_until_deadline(start + ms(15)),
            Some(ms(5))
        );
        assert!(debouncer.handle_timeout(start + ms(19)).is_empty());
        assert_eq!(
            debouncer.handle_timeout(start + ms(20)),
            vec![(Key::VolumeUp, false)]
        );

        assert_eq!(
            debouncer.on_transition(Key::VolumeUp, true, start + ms(500)),
            Some(true)
        );
    }

    #[test]
    fn bounce_back_to_the_sent_state_is_swallowed() {
        let mut debouncer = Debouncer::new(ms(20));
        let start = Instant::now();

        assert_eq!(debouncer.on_transition(Key::Mute, true, start), Some(true));
        assert_eq!(debouncer.on_transition(Key::Mute, false, start + ms(5)), None);
        assert_eq!(debouncer.on_transition(Key::Mute, true, start + ms(10)), None);
        assert!(debouncer.handle_timeout(start + ms(30)).is_empty());
        assert_eq!(debouncer.time_until_deadline(start + ms(30)), None);

        assert_eq!(
            debouncer.on_transition(Key::Mute, false, start + ms(100)),
            Some(false)
        );
    }

    #[test]
    fn keys_are_debounced_independently() {
        let mut debouncer = Debouncer::new(ms(20));
        let start = Instant::now();

        assert_eq!(debouncer.on_transition(Key::VolumeUp, true, start), Some(true));
        assert_eq!(
            debouncer.on_transition(Key::VolumeDown, true, start + ms(5)),
            Some(true)
        );
        assert_eq!(
            debouncer.on_transition(Key::VolumeDown, true, start + ms(100)),
            None,
            "repeated state is not forwarded twice"
        );
    }

    #[test]
    fn commands_use_the_daemon_wire_format() -> anyhow::Result<()> {
        let encoded = serde_json::to_string(&Command::Key {
            key: Key::VolumeDown,
            pressed: false,
        })?;
        assert_eq!(
            encoded,
            r#"{"command":"key","key":"volume-down","pressed":false}"#
        );
        Ok(())
    }

    #[test]
    fn forwarder_writes_one_line_per_transition() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let socket = temp_dir.path().join("control.sock");
        let listener = UnixListener::bind(&socket)?;

        let mut forwarder = Forwarder::new(socket);
        forwarder.send(&Command::Key {
            key: Key::VolumeUp,
            pressed: true,
        })?;
        forwarder.send(&Command::Key {
            key: Key::VolumeUp,
            pressed: false,
        })?;

        let (stream, _) = listener.accept()?;
        let mut lines = BufReader::new(stream).lines();
        assert_eq!(
            lines.next().transpose()?.as_deref(),
            Some(r#"{"command":"key","key":"volume-up","pressed":true}"#)
        );
        assert_eq!(
            lines.next().transpose()?.as_deref(),
            Some(r#"{"command":"key","key":"volume-up","pressed":false}"#)
        );
        Ok(())
    }
}
