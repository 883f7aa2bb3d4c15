use tracing::info;

use crate::events::StreamType;

/// Icon family shown next to the slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconClass {
    Sound,
    Vibrate,
    Mute,
    Media,
    Call,
    Notification,
    NotificationVibrate,
    NotificationMute,
}

impl IconClass {
    pub fn for_stream(stream: StreamType, sound: bool, vibration: bool) -> Self {
        match stream {
            StreamType::Ringtone | StreamType::System => {
                if sound {
                    IconClass::Sound
                } else if vibration {
                    IconClass::Vibrate
                } else {
                    IconClass::Mute
                }
            }
            StreamType::Notification => {
                if sound {
                    IconClass::Notification
                } else if vibration {
                    IconClass::NotificationVibrate
                } else {
                    IconClass::NotificationMute
                }
            }
            StreamType::Media | StreamType::Alarm => IconClass::Media,
            StreamType::Call => IconClass::Call,
            StreamType::ExtAndroid | StreamType::ExtJava => IconClass::Sound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn from_angle(angle: i32) -> Self {
        match angle.rem_euclid(360) {
            90 | 270 => Orientation::Landscape,
            _ => Orientation::Portrait,
        }
    }
}

/// Everything the presentation layer needs to draw the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowState {
    pub stream: StreamType,
    pub level: u32,
    pub step: u32,
    pub muted: bool,
    pub vibrating: bool,
    pub bt_opened: bool,
    pub slider_enabled: bool,
    pub icon: IconClass,
}

/// Rendering side of the popup. Implementations draw; they never decide.
pub trait Presenter {
    /// False until the popup window exists; intents are dropped before that.
    fn window_ready(&self) -> bool;

    fn show(&mut self, state: &ShowState);

    fn hide(&mut self);

    fn set_warning(&mut self, visible: bool, orientation: Orientation);
}

/// Presenter that renders to the log. Used by the daemon when no toolkit is attached.
#[derive(Debug, Default)]
pub struct LogPresenter {
    ready: bool,
    visible: bool,
}

impl LogPresenter {
    pub fn new() -> Self {
        Self {
            ready: true,
            visible: false,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

impl Presenter for LogPresenter {
    fn window_ready(&self) -> bool {
        self.ready
    }

    fn show(&mut self, state: &ShowState) {
        self.visible = true;
        info!(
            stream = %state.stream,
            level = state.level,
            step = state.step,
            muted = state.muted,
            vibrating = state.vibrating,
            bt_opened = state.bt_opened,
            slider_enabled = state.slider_enabled,
            icon = ?state.icon,
            "popup"
        );
    }

    fn hide(&mut self) {
        self.visible = false;
        info!("popup hidden");
    }

    fn set_warning(&mut self, visible: bool, orientation: Orientation) {
        info!(visible, ?orientation, "safety volume warning");
    }
}

/// A single call made on a [`RecordingPresenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Show(ShowState),
    Hide,
    Warning {
        visible: bool,
        orientation: Orientation,
    },
}

/// Presenter that records every directive, for driving the session in tests.
#[derive(Debug)]
pub struct RecordingPresenter {
    pub ready: bool,
    directives: Vec<Directive>,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self {
            ready: true,
            directives: Vec::new(),
        }
    }
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn take(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.directives)
    }

    pub fn last_shown(&self) -> Option<ShowState> {
        self.directives.iter().rev().find_map(|d| match d {
            Directive::Show(state) => Some(*state),
            _ => None,
        })
    }

    pub fn hide_count(&self) -> usize {
        self.directives
            .iter()
            .filter(|d| matches!(d, Directive::Hide))
            .count()
    }
}

impl Presenter for RecordingPresenter {
    fn window_ready(&self) -> bool {
        self.ready
    }

    fn show(&mut self, state: &ShowState) {
        self.directives.push(Directive::Show(*state));
    }

    fn hide(&mut self) {
        self.directives.push(Directive::Hide);
    }

    fn set_warning(&mut self, visible: bool, orientation: Orientation) {
        self.directives.push(Directive::Warning {
            visible,
            orientation,
        });
    }
}
