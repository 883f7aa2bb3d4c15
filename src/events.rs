use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical audio stream a volume level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamType {
    System,
    Notification,
    Alarm,
    Ringtone,
    Media,
    Call,
    ExtAndroid,
    ExtJava,
}

impl StreamType {
    pub const ALL: [StreamType; 8] = [
        StreamType::System,
        StreamType::Notification,
        StreamType::Alarm,
        StreamType::Ringtone,
        StreamType::Media,
        StreamType::Call,
        StreamType::ExtAndroid,
        StreamType::ExtJava,
    ];

    /// Collapse platform stream types into the ones the popup displays.
    ///
    /// `System` is shown as `Ringtone`; every other type stays distinct.
    pub fn normalized(self) -> Self {
        match self {
            StreamType::System => StreamType::Ringtone,
            other => other,
        }
    }

    /// Streams whose audibility is governed by the sound/vibration profile.
    pub fn follows_sound_profile(self) -> bool {
        matches!(
            self,
            StreamType::Ringtone | StreamType::Notification | StreamType::System
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamType::System => "system",
            StreamType::Notification => "notification",
            StreamType::Alarm => "alarm",
            StreamType::Ringtone => "ringtone",
            StreamType::Media => "media",
            StreamType::Call => "call",
            StreamType::ExtAndroid => "ext-android",
            StreamType::ExtJava => "ext-java",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output device the platform is currently playing through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AudioRoute {
    #[default]
    Speaker,
    Receiver,
    Earphone,
    Bluetooth,
}

/// The two persisted sound-profile booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferenceFlag {
    SoundEnabled,
    VibrationEnabled,
}

/// Who currently owns the hardware volume keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeKeyOwner {
    #[default]
    Popup,
    OtherApp,
    Settings,
}

/// Hardware keys the popup listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeKey {
    VolumeUp,
    VolumeDown,
    Mute,
    Cancel,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: VolumeKey,
    pub pressed: bool,
}

/// Gestures reported by the presentation layer's slider widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SliderEvent {
    DragStart,
    Changed { value: f64 },
    DragStop { value: f64 },
}

/// Normalized input handed to the session state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    VolumeUp,
    VolumeDown,
    Mute,
    KeyReleased(VolumeKey),
    Hide,
    SliderDragStart,
    SliderSet(f64),
    SliderDragStop(f64),
}

/// Out-of-band notifications from the platform services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PlatformEvent {
    LevelChanged { stream: StreamType, level: u32 },
    PreferencesChanged,
    RouteChanged { route: AudioRoute },
    IdleLockChanged { engaged: bool },
    VolumeKeyOwnerChanged { owner: VolumeKeyOwner },
    LcdOff,
    AllSoundsOff { enabled: bool },
    ScoStateChanged { opened: bool },
    SpeakerGainChanged { gain: u32 },
    RotationChanged { angle: i32 },
}

/// Changes injected into the simulated platform backend over the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "kebab-case")]
pub enum PlatformChange {
    Level { stream: StreamType, level: u32 },
    ActiveStream { stream: StreamType },
    Preference { flag: PreferenceFlag, value: bool },
    Route { route: AudioRoute },
    IdleLock { engaged: bool },
    VolumeKeyOwner { owner: VolumeKeyOwner },
    LcdOff,
    AllSoundsOff { enabled: bool },
    Sco { opened: bool },
    PeerGain { gain: u32 },
    Rotation { angle: i32 },
}

/// Commands accepted on the daemon control socket, one JSON object per line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlCommand {
    ShowVolume,
    Hide,
    Pause,
    Key {
        key: VolumeKey,
        pressed: bool,
    },
    SliderDragStart,
    SliderChanged {
        value: f64,
    },
    SliderDragStop {
        value: f64,
    },
    SettingsClicked,
    Platform {
        #[serde(flatten)]
        change: PlatformChange,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_collapses_to_ringtone() {
        assert_eq!(StreamType::System.normalized(), StreamType::Ringtone);
        assert_eq!(
            StreamType::Notification.normalized(),
            StreamType::Notification
        );
        assert_eq!(StreamType::Media.normalized(), StreamType::Media);
    }

    #[test]
    fn control_commands_parse_from_json() {
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"command":"key","key":"volume-up","pressed":true}"#).unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Key {
                key: VolumeKey::VolumeUp,
                pressed: true
            }
        );

        let cmd: ControlCommand =
            serde_json::from_str(r#"{"command":"slider-drag-stop","value":4.6}"#).unwrap();
        assert_eq!(cmd, ControlCommand::SliderDragStop { value: 4.6 });

        let cmd: ControlCommand = serde_json::from_str(
            r#"{"command":"platform","change":"level","stream":"media","level":5}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ControlCommand::Platform {
                change: PlatformChange::Level {
                    stream: StreamType::Media,
                    level: 5
                }
            }
        );
    }
}
