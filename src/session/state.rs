use crate::events::{AudioRoute, StreamType, VolumeKeyOwner};
use crate::presentation::{Orientation, ShowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Hidden,
    Visible,
}

/// Re-entrancy guard around the show and hide sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transition {
    #[default]
    Idle,
    Launching,
    Deleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Mutable state of the popup, owned by [`super::VolumeSession`].
#[derive(Debug, Clone)]
pub struct SessionState {
    pub visibility: Visibility,
    pub transition: Transition,
    /// Stream latched at show time.
    pub current_stream: StreamType,
    pub current_angle: i32,
    pub viewport: Viewport,
    pub playing_device: AudioRoute,
    pub warning_visible: bool,
    /// Set once the banner has been shown for the current over-threshold episode.
    pub warning_seen: bool,
    /// An earphone clamp could not be committed and is retried on the next refresh.
    pub clamp_pending: bool,
    pub idle_locked: bool,
    pub key_owner: VolumeKeyOwner,
    pub all_sounds_off: bool,
    /// Media level saved by the mute key, restored by the next press.
    pub media_muted_level: Option<u32>,
    /// The vibrate-mode pulse already played; cleared when leaving vibrate.
    pub vibration_pulsed: bool,
    /// Live slider position while a drag is in progress.
    pub slider_position: Option<f64>,
    pub last_shown: Option<ShowState>,
}

impl SessionState {
    pub fn new(idle_locked: bool, playing_device: AudioRoute) -> Self {
        Self {
            visibility: Visibility::Hidden,
            transition: Transition::Idle,
            current_stream: StreamType::Ringtone,
            current_angle: 0,
            viewport: Viewport::default(),
            playing_device,
            warning_visible: false,
            warning_seen: false,
            clamp_pending: false,
            idle_locked,
            key_owner: VolumeKeyOwner::Popup,
            all_sounds_off: false,
            media_muted_level: None,
            vibration_pulsed: false,
            slider_position: None,
            last_shown: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    pub fn is_launching(&self) -> bool {
        self.transition == Transition::Launching
    }

    pub fn is_deleting(&self) -> bool {
        self.transition == Transition::Deleting
    }

    pub fn orientation(&self) -> Orientation {
        Orientation::from_angle(self.current_angle)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(false, AudioRoute::Speaker)
    }
}
