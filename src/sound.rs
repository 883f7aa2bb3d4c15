use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::config::PlatformSeed;
use crate::events::{AudioRoute, PlatformEvent, PreferenceFlag, StreamType};

/// Failure reported by a platform service call.
///
/// Callers treat every variant as "skip this action for the current cycle".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("{service} call failed: {reason}")]
    CallFailed {
        service: &'static str,
        reason: String,
    },
    #[error("level {level} outside 0..={step} for {stream}")]
    OutOfRange {
        stream: StreamType,
        level: u32,
        step: u32,
    },
    #[error("no volume information for {0}")]
    UnknownStream(StreamType),
}

/// Haptic and audible cues the sound service can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    /// Short tick played after a level change.
    VolumeKey,
    /// Vibration pulse played when entering vibrate mode.
    Vibration,
    /// Confirmation after toggling mute back to sound.
    General,
}

/// Contract of the platform volume service as seen by the session.
pub trait SoundPolicy {
    fn level(&self, stream: StreamType) -> Result<u32, PlatformError>;

    /// Callers clamp to `0..=step` first; out-of-range values are rejected.
    fn set_level(&mut self, stream: StreamType, level: u32) -> Result<(), PlatformError>;

    fn step(&self, stream: StreamType) -> Result<u32, PlatformError>;

    /// The stream currently playing, already normalized. Never fails: "nothing
    /// playing" and query errors resolve to `Ringtone`.
    fn active_stream(&self) -> StreamType;

    fn preference(&self, flag: PreferenceFlag) -> Result<bool, PlatformError>;

    fn set_preference(&mut self, flag: PreferenceFlag, value: bool) -> Result<(), PlatformError>;

    fn playing_device(&self) -> Result<AudioRoute, PlatformError>;

    fn play_feedback(&mut self, kind: FeedbackKind);
}

/// Raw answer of the platform "currently playing" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayingQuery {
    Playing(StreamType),
    NoInstance,
    CaptureOnly,
    Failed,
}

pub fn normalize_playing(query: PlayingQuery) -> StreamType {
    match query {
        PlayingQuery::Playing(stream) => stream.normalized(),
        PlayingQuery::NoInstance | PlayingQuery::CaptureOnly => StreamType::Ringtone,
        PlayingQuery::Failed => {
            warn!("failed to query the playing stream; assuming ringtone");
            StreamType::Ringtone
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreamVolume {
    level: u32,
    step: u32,
}

/// In-memory stand-in for the platform volume daemon.
///
/// Every accepted `set_level` is echoed back as a `LevelChanged`
/// notification, the same way the real daemon reports changes made by any
/// client, including this one.
#[derive(Debug)]
pub struct SimulatedSound {
    streams: BTreeMap<StreamType, StreamVolume>,
    playing: PlayingQuery,
    sound_enabled: bool,
    vibration_enabled: bool,
    route: AudioRoute,
    notifier: Option<UnboundedSender<PlatformEvent>>,
    failing_reads: Vec<StreamType>,
    failing_writes: u32,
    feedback: Vec<FeedbackKind>,
}

impl SimulatedSound {
    pub fn new(seed: &PlatformSeed) -> Self {
        let mut streams = BTreeMap::new();
        for stream in StreamType::ALL {
            let volume = seed.stream(stream);
            streams.insert(
                stream,
                StreamVolume {
                    level: volume.level.min(volume.step),
                    step: volume.step,
                },
            );
        }
        Self {
            streams,
            playing: PlayingQuery::Playing(seed.active_stream),
            sound_enabled: seed.sound_enabled,
            vibration_enabled: seed.vibration_enabled,
            route: seed.route,
            notifier: None,
            failing_reads: Vec::new(),
            failing_writes: 0,
            feedback: Vec::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: UnboundedSender<PlatformEvent>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn set_playing(&mut self, query: PlayingQuery) {
        self.playing = query;
    }

    pub fn set_route(&mut self, route: AudioRoute) {
        self.route = route;
        self.notify(PlatformEvent::RouteChanged { route });
    }

    /// Change a level on behalf of another client and notify listeners.
    pub fn external_set_level(&mut self, stream: StreamType, level: u32) {
        if let Some(volume) = self.streams.get_mut(&stream) {
            volume.level = level.min(volume.step);
            let level = volume.level;
            self.notify(PlatformEvent::LevelChanged { stream, level });
        }
    }

    /// Change a preference on behalf of another client and notify listeners.
    pub fn external_set_preference(&mut self, flag: PreferenceFlag, value: bool) {
        self.store_preference(flag, value);
        self.notify(PlatformEvent::PreferencesChanged);
    }

    /// Make reads of `stream` fail until cleared.
    pub fn fail_reads_for(&mut self, stream: StreamType) {
        self.failing_reads.push(stream);
    }

    pub fn clear_failures(&mut self) {
        self.failing_reads.clear();
        self.failing_writes = 0;
    }

    /// Reject the next `count` level writes.
    pub fn fail_next_writes(&mut self, count: u32) {
        self.failing_writes = count;
    }

    pub fn feedback(&self) -> &[FeedbackKind] {
        &self.feedback
    }

    pub fn take_feedback(&mut self) -> Vec<FeedbackKind> {
        std::mem::take(&mut self.feedback)
    }

    fn store_preference(&mut self, flag: PreferenceFlag, value: bool) {
        match flag {
            PreferenceFlag::SoundEnabled => self.sound_enabled = value,
            PreferenceFlag::VibrationEnabled => self.vibration_enabled = value,
        }
    }

    fn notify(&self, event: PlatformEvent) {
        if let Some(tx) = &self.notifier {
            if tx.send(event).is_err() {
                debug!(?event, "platform listener gone; dropping notification");
            }
        }
    }

    fn volume(&self, stream: StreamType) -> Result<StreamVolume, PlatformError> {
        if self.failing_reads.contains(&stream) {
            return Err(PlatformError::CallFailed {
                service: "sound-manager",
                reason: format!("read of {stream} rejected"),
            });
        }
        self.streams
            .get(&stream)
            .copied()
            .ok_or(PlatformError::UnknownStream(stream))
    }
}

impl SoundPolicy for SimulatedSound {
    fn level(&self, stream: StreamType) -> Result<u32, PlatformError> {
        self.volume(stream).map(|v| v.level)
    }

    fn set_level(&mut self, stream: StreamType, level: u32) -> Result<(), PlatformError> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(PlatformError::CallFailed {
                service: "sound-manager",
                reason: format!("write of {stream} rejected"),
            });
        }
        let volume = self
            .streams
            .get_mut(&stream)
            .ok_or(PlatformError::UnknownStream(stream))?;
        if level > volume.step {
            return Err(PlatformError::OutOfRange {
                stream,
                level,
                step: volume.step,
            });
        }
        volume.level = level;
        self.notify(PlatformEvent::LevelChanged { stream, level });
        Ok(())
    }

    fn step(&self, stream: StreamType) -> Result<u32, PlatformError> {
        self.volume(stream).map(|v| v.step)
    }

    fn active_stream(&self) -> StreamType {
        normalize_playing(self.playing)
    }

    fn preference(&self, flag: PreferenceFlag) -> Result<bool, PlatformError> {
        Ok(match flag {
            PreferenceFlag::SoundEnabled => self.sound_enabled,
            PreferenceFlag::VibrationEnabled => self.vibration_enabled,
        })
    }

    fn set_preference(&mut self, flag: PreferenceFlag, value: bool) -> Result<(), PlatformError> {
        self.store_preference(flag, value);
        self.notify(PlatformEvent::PreferencesChanged);
        Ok(())
    }

    fn playing_device(&self) -> Result<AudioRoute, PlatformError> {
        Ok(self.route)
    }

    fn play_feedback(&mut self, kind: FeedbackKind) {
        debug!(?kind, "play feedback");
        self.feedback.push(kind);
    }
}
