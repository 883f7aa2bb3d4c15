use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::events::{AudioRoute, StreamType};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Unix socket accepting newline-delimited JSON control commands.
    pub control_socket: PathBuf,
    /// Whether key presses while an alarm is the active stream show the popup.
    pub alarm_popup_enabled: bool,
    /// Pop the popup when another client changes the displayed stream while hidden.
    pub show_on_external_change: bool,
    pub timing: Timing,
    pub safety: SafetyConfig,
    /// Initial state of the simulated platform services.
    pub platform: PlatformSeed,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.timing.validate()?;
        self.safety.validate()?;
        self.platform.validate()?;
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            control_socket: PathBuf::from("/run/volume-popup/control.sock"),
            alarm_popup_enabled: true,
            show_on_external_change: false,
            timing: Timing::default(),
            safety: SafetyConfig::default(),
            platform: PlatformSeed::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Timing {
    /// Inactivity window before the popup hides itself.
    #[serde(with = "humantime_serde")]
    pub popup_timeout: Duration,
    /// Auto-hide window after a Bluetooth peer changes its speaker gain.
    #[serde(with = "humantime_serde")]
    pub bluetooth_display_timeout: Duration,
    /// Delay before a held volume key starts repeating.
    #[serde(with = "humantime_serde")]
    pub key_repeat_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub key_repeat_interval: Duration,
    /// How often a live slider drag is pushed to the sound service.
    #[serde(with = "humantime_serde")]
    pub slider_sample_interval: Duration,
}

impl Timing {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.popup_timeout.is_zero(),
            "timing.popup-timeout must be positive"
        );
        ensure!(
            !self.bluetooth_display_timeout.is_zero(),
            "timing.bluetooth-display-timeout must be positive"
        );
        ensure!(
            !self.key_repeat_delay.is_zero(),
            "timing.key-repeat-delay must be positive"
        );
        ensure!(
            !self.key_repeat_interval.is_zero(),
            "timing.key-repeat-interval must be positive"
        );
        ensure!(
            !self.slider_sample_interval.is_zero(),
            "timing.slider-sample-interval must be positive"
        );
        ensure!(
            self.key_repeat_interval <= self.key_repeat_delay,
            "timing.key-repeat-interval must not exceed timing.key-repeat-delay"
        );
        Ok(())
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            popup_timeout: Duration::from_secs(3),
            bluetooth_display_timeout: Duration::from_secs(3),
            key_repeat_delay: Duration::from_millis(500),
            key_repeat_interval: Duration::from_millis(100),
            slider_sample_interval: Duration::from_millis(200),
        }
    }
}

/// Hearing-safety limits for media played through earphones.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SafetyConfig {
    /// Media level is clamped to this value when output switches to earphones.
    pub earphone_ceiling: u32,
    /// The warning banner is shown while the media level is above this value.
    pub warning_threshold: u32,
}

impl SafetyConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.warning_threshold >= self.earphone_ceiling,
            "safety.warning-threshold must be >= safety.earphone-ceiling"
        );
        Ok(())
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            earphone_ceiling: 9,
            warning_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StreamSeed {
    pub level: u32,
    pub step: u32,
}

impl Default for StreamSeed {
    fn default() -> Self {
        Self { level: 7, step: 15 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PlatformSeed {
    pub active_stream: StreamType,
    pub route: AudioRoute,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub idle_locked: bool,
    pub sco_opened: bool,
    pub speaker_gain: u32,
    /// Streams missing here start at [`StreamSeed::default`].
    pub streams: BTreeMap<StreamType, StreamSeed>,
}

impl PlatformSeed {
    pub fn stream(&self, stream: StreamType) -> StreamSeed {
        self.streams.get(&stream).copied().unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        for (stream, seed) in &self.streams {
            ensure!(seed.step > 0, "platform.streams.{stream}.step must be positive");
            ensure!(
                seed.level <= seed.step,
                "platform.streams.{stream}.level must not exceed its step"
            );
        }
        Ok(())
    }
}

impl Default for PlatformSeed {
    fn default() -> Self {
        Self {
            active_stream: StreamType::Ringtone,
            route: AudioRoute::Speaker,
            sound_enabled: true,
            vibration_enabled: false,
            idle_locked: false,
            sco_opened: false,
            speaker_gain: 7,
            streams: BTreeMap::new(),
        }
    }
}
