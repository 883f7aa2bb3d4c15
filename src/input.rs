use tracing::debug;

use crate::events::{Intent, KeyEvent, SliderEvent, VolumeKey};

/// Which input source currently owns the displayed level.
///
/// Hardware keys and the slider are mutually exclusive: while one owns the
/// level, events from the other are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputOwner {
    #[default]
    None,
    Key(VolumeKey),
    Slider,
}

/// Normalizes raw key and slider events into session intents.
#[derive(Debug, Default)]
pub struct InputTracker {
    owner: InputOwner,
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> InputOwner {
        self.owner
    }

    pub fn pressing(&self) -> bool {
        matches!(self.owner, InputOwner::Key(_))
    }

    pub fn touching(&self) -> bool {
        self.owner == InputOwner::Slider
    }

    /// Drop any ownership, e.g. when the popup is torn down mid-gesture.
    pub fn reset(&mut self) {
        self.owner = InputOwner::None;
    }

    pub fn on_key(&mut self, event: KeyEvent) -> Option<Intent> {
        let KeyEvent { key, pressed } = event;
        if matches!(key, VolumeKey::Cancel | VolumeKey::Back) {
            // Dismiss keys act on release and never take ownership.
            return (!pressed).then_some(Intent::Hide);
        }

        if pressed {
            match self.owner {
                InputOwner::Slider => {
                    debug!(?key, "slider owns the level; key press dropped");
                    None
                }
                InputOwner::Key(held) if held == key => {
                    debug!(?key, "repeated key-down suppressed");
                    None
                }
                _ => {
                    self.owner = InputOwner::Key(key);
                    Some(match key {
                        VolumeKey::VolumeUp => Intent::VolumeUp,
                        VolumeKey::VolumeDown => Intent::VolumeDown,
                        _ => Intent::Mute,
                    })
                }
            }
        } else {
            match self.owner {
                InputOwner::Slider => {
                    debug!(?key, "slider owns the level; key release dropped");
                    None
                }
                InputOwner::Key(held) if held == key => {
                    self.owner = InputOwner::None;
                    Some(Intent::KeyReleased(key))
                }
                _ => Some(Intent::KeyReleased(key)),
            }
        }
    }

    pub fn on_slider(&mut self, event: SliderEvent) -> Option<Intent> {
        match event {
            SliderEvent::DragStart => {
                if self.pressing() {
                    debug!("hardware key held; slider drag dropped");
                    return None;
                }
                self.owner = InputOwner::Slider;
                Some(Intent::SliderDragStart)
            }
            SliderEvent::Changed { value } => self.touching().then_some(Intent::SliderSet(value)),
            SliderEvent::DragStop { value } => {
                if !self.touching() {
                    debug!("drag stop without an active drag dropped");
                    return None;
                }
                self.owner = InputOwner::None;
                Some(Intent::SliderDragStop(value))
            }
        }
    }
}
