//! Pure level and sound-profile arithmetic used by the session.

use crate::events::{AudioRoute, StreamType};

/// The two preference booleans read as one three-state profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundMode {
    Sound,
    Vibrate,
    Mute,
}

impl SoundMode {
    pub fn from_flags(sound_enabled: bool, vibration_enabled: bool) -> Self {
        match (sound_enabled, vibration_enabled) {
            (true, _) => SoundMode::Sound,
            (false, true) => SoundMode::Vibrate,
            (false, false) => SoundMode::Mute,
        }
    }

    /// `(sound_enabled, vibration_enabled)` for this mode.
    pub fn flags(self) -> (bool, bool) {
        match self {
            SoundMode::Sound => (true, false),
            SoundMode::Vibrate => (false, true),
            SoundMode::Mute => (false, false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Result of one level adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub level: u32,
    /// Set when the sound profile has to change.
    pub mode: Option<SoundMode>,
    /// Play the vibration pulse for entering vibrate mode.
    pub pulse: bool,
}

impl StepOutcome {
    fn level(level: u32) -> Self {
        Self {
            level,
            mode: None,
            pulse: false,
        }
    }
}

/// One step in `direction`, saturating at `0` and `step`.
pub fn step_level(direction: Direction, level: u32, step: u32) -> u32 {
    let level = level.min(step);
    match direction {
        Direction::Up => (level + 1).min(step),
        Direction::Down => level.saturating_sub(1),
    }
}

/// First press of a volume key on the ringtone stream.
///
/// Up walks mute -> vibrate -> sound; down walks sound -> vibrate when the
/// level reaches zero and never leaves vibrate or mute on its own.
pub fn ringtone_press(direction: Direction, mode: SoundMode, level: u32, step: u32) -> StepOutcome {
    match (direction, mode) {
        (Direction::Up, SoundMode::Mute) => StepOutcome {
            level,
            mode: Some(SoundMode::Vibrate),
            pulse: true,
        },
        (Direction::Up, SoundMode::Vibrate) => StepOutcome {
            level: step_level(Direction::Up, level, step),
            mode: Some(SoundMode::Sound),
            pulse: false,
        },
        (Direction::Up, SoundMode::Sound) => StepOutcome::level(step_level(direction, level, step)),
        (Direction::Down, SoundMode::Sound) => sound_down(level, step),
        (Direction::Down, _) => StepOutcome::level(level),
    }
}

/// Held-key repeat on the ringtone stream. Repeating up from silence goes
/// straight to sound; repeating down stops once silent.
pub fn ringtone_repeat(direction: Direction, mode: SoundMode, level: u32, step: u32) -> StepOutcome {
    match (direction, mode) {
        (Direction::Up, SoundMode::Sound) => StepOutcome::level(step_level(direction, level, step)),
        (Direction::Up, _) => StepOutcome {
            level: step_level(direction, level, step),
            mode: Some(SoundMode::Sound),
            pulse: false,
        },
        (Direction::Down, SoundMode::Sound) => sound_down(level, step),
        (Direction::Down, _) => StepOutcome::level(level),
    }
}

fn sound_down(level: u32, step: u32) -> StepOutcome {
    let level = level.min(step);
    match level {
        0 => StepOutcome::level(0),
        1 => StepOutcome {
            level: 0,
            mode: Some(SoundMode::Vibrate),
            pulse: true,
        },
        _ => StepOutcome::level(level - 1),
    }
}

/// Committing a slider value: any non-zero value on a profile stream turns
/// sound back on; zero turns it off and puts the ringtone into vibrate.
pub fn slider_commit(stream: StreamType, value: u32, mode: SoundMode) -> StepOutcome {
    if stream == StreamType::Media {
        return StepOutcome::level(value);
    }
    if value > 0 {
        StepOutcome {
            level: value,
            mode: (mode != SoundMode::Sound).then_some(SoundMode::Sound),
            pulse: false,
        }
    } else if stream == StreamType::Ringtone {
        StepOutcome {
            level: 0,
            mode: Some(SoundMode::Vibrate),
            pulse: true,
        }
    } else {
        StepOutcome {
            level: 0,
            mode: (mode == SoundMode::Sound).then_some(SoundMode::Mute),
            pulse: false,
        }
    }
}

/// The mute key: anything audible or vibrating goes silent, silence goes
/// back to sound.
pub fn mute_toggle(mode: SoundMode) -> SoundMode {
    match mode {
        SoundMode::Mute => SoundMode::Sound,
        SoundMode::Sound | SoundMode::Vibrate => SoundMode::Mute,
    }
}

/// Round a continuous slider position half-up into `0..=step`.
pub fn round_slider(value: f64, step: u32) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let rounded = (value + 0.5).floor();
    if rounded >= f64::from(step) {
        step
    } else {
        rounded as u32
    }
}

/// Level the media stream must be clamped to after a route change, if any.
pub fn safety_clamp(
    stream: StreamType,
    previous: AudioRoute,
    route: AudioRoute,
    level: u32,
    ceiling: u32,
) -> Option<u32> {
    let entered_earphone = route == AudioRoute::Earphone && previous != AudioRoute::Earphone;
    (entered_earphone && stream == StreamType::Media && level > ceiling).then_some(ceiling)
}

/// Whether the hearing-safety banner condition holds.
pub fn warning_due(stream: StreamType, route: AudioRoute, level: u32, threshold: u32) -> bool {
    stream == StreamType::Media && route == AudioRoute::Earphone && level > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_at_max_is_a_no_op() {
        assert_eq!(step_level(Direction::Up, 15, 15), 15);
        assert_eq!(step_level(Direction::Down, 0, 15), 0);
        assert_eq!(step_level(Direction::Up, 20, 15), 15);
    }

    #[test]
    fn ringtone_up_walks_the_mute_ladder() {
        let out = ringtone_press(Direction::Up, SoundMode::Mute, 4, 15);
        assert_eq!(out.level, 4);
        assert_eq!(out.mode, Some(SoundMode::Vibrate));
        assert!(out.pulse);

        let out = ringtone_press(Direction::Up, SoundMode::Vibrate, 4, 15);
        assert_eq!(out.level, 5);
        assert_eq!(out.mode, Some(SoundMode::Sound));
        assert!(!out.pulse);
    }

    #[test]
    fn ringtone_down_to_zero_enters_vibrate() {
        let out = ringtone_press(Direction::Down, SoundMode::Sound, 1, 15);
        assert_eq!(
            out,
            StepOutcome {
                level: 0,
                mode: Some(SoundMode::Vibrate),
                pulse: true
            }
        );
        let out = ringtone_press(Direction::Down, SoundMode::Vibrate, 0, 15);
        assert_eq!(out, StepOutcome::level(0));
    }

    #[test]
    fn repeat_up_from_silence_restores_sound() {
        let out = ringtone_repeat(Direction::Up, SoundMode::Mute, 0, 15);
        assert_eq!(out.level, 1);
        assert_eq!(out.mode, Some(SoundMode::Sound));
    }

    #[test]
    fn mute_toggle_silences_vibrate_too() {
        assert_eq!(mute_toggle(SoundMode::Vibrate), SoundMode::Mute);
        assert_eq!(mute_toggle(SoundMode::Sound), SoundMode::Mute);
        assert_eq!(mute_toggle(SoundMode::Mute), SoundMode::Sound);
    }

    #[test]
    fn slider_values_round_half_up() {
        assert_eq!(round_slider(4.49, 15), 4);
        assert_eq!(round_slider(4.5, 15), 5);
        assert_eq!(round_slider(-0.3, 15), 0);
        assert_eq!(round_slider(15.4, 15), 15);
        assert_eq!(round_slider(f64::NAN, 15), 0);
    }

    #[test]
    fn slider_zero_on_ringtone_vibrates() {
        let out = slider_commit(StreamType::Ringtone, 0, SoundMode::Sound);
        assert_eq!(out.mode, Some(SoundMode::Vibrate));
        assert!(out.pulse);

        let out = slider_commit(StreamType::Notification, 3, SoundMode::Mute);
        assert_eq!(out.mode, Some(SoundMode::Sound));

        let out = slider_commit(StreamType::Media, 0, SoundMode::Mute);
        assert_eq!(out, StepOutcome::level(0));
    }

    #[test]
    fn clamp_only_when_entering_earphone() {
        use AudioRoute::*;
        assert_eq!(safety_clamp(StreamType::Media, Speaker, Earphone, 10, 9), Some(9));
        assert_eq!(safety_clamp(StreamType::Media, Earphone, Earphone, 10, 9), None);
        assert_eq!(safety_clamp(StreamType::Media, Speaker, Earphone, 9, 9), None);
        assert_eq!(safety_clamp(StreamType::Ringtone, Speaker, Earphone, 12, 9), None);
    }
}
