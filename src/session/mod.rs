//! The volume popup state machine.
//!
//! Every stimulus (key, slider gesture, platform notification, timer expiry)
//! enters through one `on_*` method and runs to completion before the next
//! one is handled. Platform failures never propagate out of a handler: the
//! affected action is logged and skipped for this cycle.

pub mod policy;
pub mod state;

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::bluetooth::{BluetoothBridge, BluetoothGateway};
use crate::config::{Configuration, SafetyConfig, Timing};
use crate::events::{
    AudioRoute, Intent, KeyEvent, PlatformEvent, PreferenceFlag, SliderEvent, StreamType,
    VolumeKey, VolumeKeyOwner,
};
use crate::input::InputTracker;
use crate::presentation::{IconClass, Presenter, ShowState};
use crate::sound::{FeedbackKind, PlatformError, SoundPolicy};
use crate::timers::{TimerSet, TimerSlot};

use self::policy::{Direction, SoundMode, StepOutcome};
pub use self::state::{SessionState, Transition, Viewport, Visibility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stepping {
    Press,
    Repeat,
}

pub struct VolumeSession<S, B, P> {
    timing: Timing,
    safety: SafetyConfig,
    alarm_popup_enabled: bool,
    show_on_external_change: bool,
    sound: S,
    gateway: B,
    presenter: P,
    state: SessionState,
    timers: TimerSet,
    input: InputTracker,
    bridge: BluetoothBridge,
}

impl<S, B, P> VolumeSession<S, B, P>
where
    S: SoundPolicy,
    B: BluetoothGateway,
    P: Presenter,
{
    pub fn new(config: &Configuration, sound: S, gateway: B, presenter: P) -> Self {
        let playing_device = sound.playing_device().unwrap_or_default();
        let sco_open = gateway.is_sco_opened().unwrap_or(false);
        Self {
            timing: config.timing,
            safety: config.safety,
            alarm_popup_enabled: config.alarm_popup_enabled,
            show_on_external_change: config.show_on_external_change,
            sound,
            gateway,
            presenter,
            state: SessionState::new(config.platform.idle_locked, playing_device),
            timers: TimerSet::new(),
            input: InputTracker::new(),
            bridge: BluetoothBridge::new(sco_open),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    pub fn sound(&self) -> &S {
        &self.sound
    }

    pub fn sound_mut(&mut self) -> &mut S {
        &mut self.sound
    }

    pub fn gateway(&self) -> &B {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut B {
        &mut self.gateway
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn bridge(&self) -> &BluetoothBridge {
        &self.bridge
    }

    pub fn is_visible(&self) -> bool {
        self.state.is_visible()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    // ----- lifecycle -----

    pub fn initialize(&mut self, viewport: Viewport) {
        self.state.viewport = viewport;
        match self.sound.playing_device() {
            Ok(route) => self.state.playing_device = route,
            Err(err) => warn!(%err, "failed to read the playing device"),
        }
        if let Err(err) = self.bridge.sync(&self.gateway) {
            warn!(%err, "failed to read bluetooth SCO state");
        }
        info!(
            width = viewport.width,
            height = viewport.height,
            route = ?self.state.playing_device,
            sco_open = self.bridge.sco_open(),
            "volume session initialized"
        );
    }

    pub fn pause(&mut self) {
        if self.state.is_visible() {
            self.hide();
        }
    }

    pub fn deinitialize(&mut self) {
        self.hide();
        self.timers.cancel_all();
        self.input.reset();
        info!("volume session deinitialized");
    }

    /// Platform request to show the current volume.
    pub fn show_request(&mut self, now: Instant) -> bool {
        if self.state.idle_locked {
            debug!("idle lock engaged; show request ignored");
            return false;
        }
        self.show(now)
    }

    // ----- inputs -----

    pub fn on_key(&mut self, event: KeyEvent, now: Instant) {
        if !self.presenter.window_ready() {
            debug!(?event, "popup window not ready; key dropped");
            return;
        }
        if let Some(intent) = self.input.on_key(event) {
            self.dispatch(intent, now);
        }
    }

    pub fn on_slider(&mut self, event: SliderEvent, now: Instant) {
        if !self.state.is_visible() {
            debug!(?event, "slider event while hidden dropped");
            return;
        }
        if let Some(intent) = self.input.on_slider(event) {
            self.dispatch(intent, now);
        }
    }

    pub fn on_settings_clicked(&mut self) {
        info!("settings requested; handing off and hiding popup");
        self.hide();
    }

    pub fn on_platform_event(&mut self, event: PlatformEvent, now: Instant) {
        match event {
            PlatformEvent::LevelChanged { stream, level } => {
                self.level_changed(stream.normalized(), level, now)
            }
            PlatformEvent::PreferencesChanged => {
                match self.mode() {
                    Ok(SoundMode::Vibrate) => {}
                    Ok(_) => self.state.vibration_pulsed = false,
                    Err(err) => warn!(%err, "failed to read sound preferences"),
                }
                self.present();
            }
            PlatformEvent::RouteChanged { route } => {
                debug!(?route, "route change notified");
                self.refresh();
            }
            PlatformEvent::IdleLockChanged { engaged } => {
                self.state.idle_locked = engaged;
                if engaged {
                    info!("idle lock engaged; hiding popup");
                    self.hide();
                }
            }
            PlatformEvent::VolumeKeyOwnerChanged { owner } => {
                self.state.key_owner = owner;
                if owner == VolumeKeyOwner::OtherApp {
                    info!("another app took the volume keys; hiding popup");
                    self.hide();
                }
            }
            PlatformEvent::LcdOff => {
                self.hide();
            }
            PlatformEvent::AllSoundsOff { enabled } => {
                self.state.all_sounds_off = enabled;
                self.present();
            }
            PlatformEvent::ScoStateChanged { opened } => {
                self.bridge.on_sco_state(opened);
                self.present();
            }
            PlatformEvent::SpeakerGainChanged { gain } => self.peer_gain_changed(gain, now),
            PlatformEvent::RotationChanged { angle } => {
                self.state.current_angle = angle;
                if self.state.warning_visible {
                    self.presenter.set_warning(true, self.state.orientation());
                }
            }
        }
    }

    pub fn on_timer(&mut self, slot: TimerSlot, now: Instant) {
        match slot {
            TimerSlot::PopupAutohide | TimerSlot::BluetoothDisplay => {
                debug!(?slot, "auto-hide");
                self.hide();
            }
            TimerSlot::ShortUp => self.repeat_tick(slot, Direction::Up, now),
            TimerSlot::ShortDown => self.repeat_tick(slot, Direction::Down, now),
            TimerSlot::SliderSample => self.slider_sample(now),
        }
    }

    /// Run every timer whose deadline has passed.
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(slot) = self.timers.pop_due(now) {
            self.on_timer(slot, now);
        }
    }

    fn dispatch(&mut self, intent: Intent, now: Instant) {
        match intent {
            Intent::VolumeUp => self.volume_key(Direction::Up, now),
            Intent::VolumeDown => self.volume_key(Direction::Down, now),
            Intent::Mute => self.mute_key(now),
            Intent::KeyReleased(key) => self.key_released(key, now),
            Intent::Hide => {
                self.hide();
            }
            Intent::SliderDragStart => self.drag_start(now),
            Intent::SliderSet(value) => self.state.slider_position = Some(value),
            Intent::SliderDragStop(value) => self.drag_stop(value, now),
        }
    }

    // ----- show / hide -----

    fn show(&mut self, now: Instant) -> bool {
        match self.state.transition {
            Transition::Deleting => {
                debug!("hide in progress; show rejected");
                return false;
            }
            Transition::Launching => {
                debug!("show already in progress; request dropped");
                return false;
            }
            Transition::Idle => {}
        }
        if !self.presenter.window_ready() {
            debug!("popup window not ready; show skipped");
            return false;
        }

        self.state.transition = Transition::Launching;
        let stream = self.sound.active_stream();
        if self.state.idle_locked && stream != StreamType::Media {
            debug!(%stream, "idle lock engaged; only media may show");
            self.state.transition = Transition::Idle;
            if self.state.is_visible() {
                self.hide();
            }
            return false;
        }

        if let Err(err) = self.bridge.sync(&self.gateway) {
            warn!(%err, "failed to read bluetooth SCO state");
        }
        self.state.current_stream = stream;
        // Clamp before the first frame so an unclamped level is never drawn.
        self.enforce_safety_ceiling();
        let shown = match self.compose(stream) {
            Ok(shown) => shown,
            Err(err) => {
                warn!(%err, %stream, "failed to read volume; show skipped");
                self.state.transition = Transition::Idle;
                return false;
            }
        };
        self.push(shown);
        if !self.state.is_visible() {
            info!(%stream, level = shown.level, step = shown.step, "popup shown");
        }
        self.state.visibility = Visibility::Visible;
        self.refresh();
        self.timers
            .arm(TimerSlot::PopupAutohide, self.timing.popup_timeout, now);
        self.state.transition = Transition::Idle;
        true
    }

    /// Hide the popup and cancel every pending timer. Returns false when
    /// there was nothing to hide or a hide is already running.
    pub fn hide(&mut self) -> bool {
        if self.state.is_deleting() {
            debug!("hide already in progress");
            return false;
        }
        if !self.state.is_visible() && !self.state.is_launching() {
            debug!("popup already hidden");
            return false;
        }
        self.state.transition = Transition::Deleting;
        self.timers.cancel_all();
        self.input.reset();
        self.state.slider_position = None;
        if self.state.warning_visible {
            self.state.warning_visible = false;
            self.presenter.set_warning(false, self.state.orientation());
        }
        self.presenter.hide();
        self.bridge.reset_display();
        self.state.visibility = Visibility::Hidden;
        self.state.last_shown = None;
        self.state.transition = Transition::Idle;
        debug!("popup hidden");
        true
    }

    // ----- keys -----

    fn keys_available(&self) -> bool {
        if self.state.key_owner == VolumeKeyOwner::Settings {
            debug!("volume keys owned by settings; press dropped");
            return false;
        }
        true
    }

    fn volume_key(&mut self, direction: Direction, now: Instant) {
        if !self.keys_available() {
            return;
        }
        if self.sound.active_stream() == StreamType::Alarm && !self.alarm_popup_enabled {
            debug!("volume popup disabled for alarms; press dropped");
            return;
        }
        if !self.show(now) {
            return;
        }
        self.state.media_muted_level = None;
        self.adjust(direction, Stepping::Press);

        let (slot, opposite) = match direction {
            Direction::Up => (TimerSlot::ShortUp, TimerSlot::ShortDown),
            Direction::Down => (TimerSlot::ShortDown, TimerSlot::ShortUp),
        };
        self.timers.cancel(opposite);
        self.timers.arm(slot, self.timing.key_repeat_delay, now);
    }

    fn key_released(&mut self, key: VolumeKey, now: Instant) {
        match key {
            VolumeKey::VolumeUp => self.timers.cancel(TimerSlot::ShortUp),
            VolumeKey::VolumeDown => self.timers.cancel(TimerSlot::ShortDown),
            _ => {}
        }
        if self.state.is_visible() && !self.input.touching() {
            self.timers
                .arm(TimerSlot::PopupAutohide, self.timing.popup_timeout, now);
        }
    }

    fn repeat_tick(&mut self, slot: TimerSlot, direction: Direction, now: Instant) {
        if !self.state.is_visible() {
            debug!(?slot, "popup hidden; repeat stopped");
            return;
        }
        let interval = self.timing.key_repeat_interval;
        if self.input.touching() {
            self.timers.arm(slot, interval, now);
            return;
        }
        self.timers.cancel(TimerSlot::SliderSample);
        if self.adjust(direction, Stepping::Repeat) {
            self.timers.arm(slot, interval, now);
            self.timers
                .arm(TimerSlot::PopupAutohide, self.timing.popup_timeout, now);
        }
    }

    /// One level step on the displayed stream. Returns false when the step
    /// was skipped because the platform could not be read.
    fn adjust(&mut self, direction: Direction, stepping: Stepping) -> bool {
        let stream = self.state.current_stream;
        if self.bridge.routes(stream) {
            if let Err(err) = self.adjust_bluetooth(direction) {
                warn!(%err, "bluetooth gain change skipped");
                return false;
            }
        } else {
            let (level, step, mode) = match self.read_stream(stream) {
                Ok(read) => read,
                Err(err) => {
                    warn!(%err, %stream, "volume step skipped");
                    return false;
                }
            };
            match stream {
                StreamType::Notification if mode != SoundMode::Sound => {
                    debug!("notifications are silent; level unchanged");
                    if stepping == Stepping::Press {
                        self.sound.play_feedback(FeedbackKind::Vibration);
                    }
                    self.present();
                    return true;
                }
                StreamType::Ringtone => {
                    let outcome = match stepping {
                        Stepping::Press => policy::ringtone_press(direction, mode, level, step),
                        Stepping::Repeat => policy::ringtone_repeat(direction, mode, level, step),
                    };
                    self.apply(stream, level, outcome);
                }
                _ => {
                    let target = policy::step_level(direction, level, step);
                    if target != level {
                        self.commit_level(stream, target);
                    }
                }
            }
        }

        self.present();
        self.update_warning();
        if stepping == Stepping::Press && stream != StreamType::Alarm && !self.state.all_sounds_off
        {
            self.sound.play_feedback(FeedbackKind::VolumeKey);
        }
        true
    }

    fn adjust_bluetooth(&mut self, direction: Direction) -> Result<(), PlatformError> {
        let gain = self.bridge.gain(&self.gateway)?;
        let step = self.sound.step(StreamType::Call)?;
        let target = policy::step_level(direction, gain, step);
        if target != gain {
            self.bridge.request_gain(&mut self.gateway, target)?;
        }
        Ok(())
    }

    fn mute_key(&mut self, now: Instant) {
        if !self.keys_available() {
            return;
        }
        if self.state.idle_locked {
            debug!("idle lock engaged; mute key swallowed");
            return;
        }
        if !self.show(now) {
            return;
        }
        let stream = self.state.current_stream;
        if stream == StreamType::Media {
            self.toggle_media_mute();
        } else {
            self.toggle_profile_mute(stream);
        }
        self.present();
        self.update_warning();
    }

    fn toggle_media_mute(&mut self) {
        match self.state.media_muted_level.take() {
            Some(saved) => {
                if !self.commit_level(StreamType::Media, saved) {
                    self.state.media_muted_level = Some(saved);
                }
            }
            None => match self.sound.level(StreamType::Media) {
                Ok(level) => {
                    if self.commit_level(StreamType::Media, 0) {
                        self.state.media_muted_level = Some(level);
                    }
                }
                Err(err) => warn!(%err, "failed to read media level; mute skipped"),
            },
        }
    }

    fn toggle_profile_mute(&mut self, stream: StreamType) {
        let mode = match self.mode() {
            Ok(mode) => mode,
            Err(err) => {
                warn!(%err, "failed to read sound preferences; mute skipped");
                return;
            }
        };
        let next = policy::mute_toggle(mode);
        self.set_mode(next);
        if next != SoundMode::Sound {
            return;
        }
        match self.sound.level(stream) {
            Ok(0) => {
                self.commit_level(stream, 1);
            }
            Ok(_) => {}
            Err(err) => warn!(%err, %stream, "failed to read level after unmute"),
        }
        if !self.state.all_sounds_off {
            self.sound.play_feedback(FeedbackKind::General);
        }
    }

    // ----- slider -----

    fn drag_start(&mut self, now: Instant) {
        self.timers.cancel(TimerSlot::PopupAutohide);
        self.state.slider_position = None;
        self.timers.arm(
            TimerSlot::SliderSample,
            self.timing.slider_sample_interval,
            now,
        );
    }

    fn slider_sample(&mut self, now: Instant) {
        if !self.input.touching() {
            return;
        }
        if let Some(value) = self.state.slider_position {
            self.commit_slider(value, false);
        }
        self.timers.arm(
            TimerSlot::SliderSample,
            self.timing.slider_sample_interval,
            now,
        );
    }

    fn drag_stop(&mut self, value: f64, now: Instant) {
        self.timers.cancel(TimerSlot::SliderSample);
        self.state.slider_position = None;
        self.commit_slider(value, true);
        self.timers
            .arm(TimerSlot::PopupAutohide, self.timing.popup_timeout, now);
    }

    /// Push a slider position to the platform. `final_commit` is the drag
    /// stop; samples taken mid-drag skip unchanged values and feedback.
    fn commit_slider(&mut self, value: f64, final_commit: bool) {
        let stream = self.state.current_stream;
        if self.bridge.routes(stream) {
            let gain = match self.sound.step(StreamType::Call) {
                Ok(step) => policy::round_slider(value, step),
                Err(err) => {
                    warn!(%err, "failed to read call step; slider commit skipped");
                    return;
                }
            };
            if let Err(err) = self.bridge.request_gain(&mut self.gateway, gain) {
                warn!(%err, "bluetooth gain request failed");
            }
            self.present();
            return;
        }

        let (level, step, mode) = match self.read_stream(stream) {
            Ok(read) => read,
            Err(err) => {
                warn!(%err, %stream, "slider commit skipped");
                return;
            }
        };
        let target = policy::round_slider(value, step);
        if !final_commit && target == level {
            return;
        }
        let outcome = policy::slider_commit(stream, target, mode);
        if let Some(mode) = outcome.mode {
            self.set_mode(mode);
        }
        if outcome.level > 0 {
            self.state.vibration_pulsed = false;
        }
        if !self.commit_level(stream, outcome.level)
            && stream == StreamType::Media
            && self.state.playing_device == AudioRoute::Earphone
        {
            // Loud media over earphones is refused by the service.
            self.commit_level(stream, self.safety.earphone_ceiling.min(step));
        }
        if outcome.pulse {
            self.pulse_vibration();
        }
        if final_commit
            && outcome.level > 0
            && stream != StreamType::Alarm
            && !self.state.all_sounds_off
        {
            self.sound.play_feedback(FeedbackKind::VolumeKey);
        }
        self.present();
        self.update_warning();
    }

    // ----- platform notifications -----

    fn level_changed(&mut self, stream: StreamType, level: u32, now: Instant) {
        if self.state.is_visible() {
            if stream != self.state.current_stream {
                debug!(%stream, level, "background stream changed; ignored");
                return;
            }
            debug!(%stream, level, "displayed stream changed");
            self.refresh();
        } else if self.show_on_external_change && stream == self.sound.active_stream() {
            debug!(%stream, level, "external change while hidden");
            self.show(now);
        }
    }

    fn peer_gain_changed(&mut self, gain: u32, now: Instant) {
        self.bridge.on_peer_gain(gain);
        if let Err(err) = self.bridge.sync(&self.gateway) {
            warn!(%err, "failed to read bluetooth SCO state");
        }
        if !self.bridge.routes(self.sound.active_stream()) {
            debug!(gain, "peer gain changed outside a bluetooth call");
            return;
        }
        if self.state.is_visible() && self.state.current_stream == StreamType::Call {
            self.present();
        } else if !self.show(now) {
            return;
        }
        self.timers.arm(
            TimerSlot::BluetoothDisplay,
            self.timing.bluetooth_display_timeout,
            now,
        );
    }

    /// Passive refresh: safety clamp, display, warning banner. Never touches
    /// the auto-hide timer.
    fn refresh(&mut self) {
        self.enforce_safety_ceiling();
        self.present();
        self.update_warning();
    }

    fn enforce_safety_ceiling(&mut self) {
        let route = match self.sound.playing_device() {
            Ok(route) => route,
            Err(err) => {
                warn!(%err, "failed to read the playing device");
                return;
            }
        };
        let previous = std::mem::replace(&mut self.state.playing_device, route);
        if previous != route {
            info!(?previous, ?route, "audio route changed");
        }
        if route != AudioRoute::Earphone {
            self.state.clamp_pending = false;
            return;
        }

        let stream = if self.state.is_visible() {
            self.state.current_stream
        } else {
            self.sound.active_stream()
        };
        if stream != StreamType::Media {
            return;
        }
        let ceiling = self.safety.earphone_ceiling;
        let level = match self.sound.level(StreamType::Media) {
            Ok(level) => level,
            Err(err) => {
                warn!(%err, "failed to read media level for the safety check");
                if previous != route {
                    self.state.clamp_pending = true;
                }
                return;
            }
        };
        let due = policy::safety_clamp(stream, previous, route, level, ceiling)
            .or_else(|| (self.state.clamp_pending && level > ceiling).then_some(ceiling));
        let Some(ceiling) = due else {
            self.state.clamp_pending = false;
            return;
        };
        match self.sound.set_level(StreamType::Media, ceiling) {
            Ok(()) => {
                info!(level, ceiling, "media level clamped for earphone output");
                self.state.clamp_pending = false;
            }
            Err(err) => {
                warn!(%err, "earphone safety clamp failed; retrying on next refresh");
                self.state.clamp_pending = true;
            }
        }
    }

    fn update_warning(&mut self) {
        if !self.state.is_visible() {
            return;
        }
        let stream = self.state.current_stream;
        let due = if stream == StreamType::Media {
            match self.sound.level(stream) {
                Ok(level) => policy::warning_due(
                    stream,
                    self.state.playing_device,
                    level,
                    self.safety.warning_threshold,
                ),
                Err(err) => {
                    warn!(%err, "failed to read media level for the warning banner");
                    return;
                }
            }
        } else {
            false
        };

        if due {
            if !self.state.warning_seen {
                self.state.warning_seen = true;
                self.state.warning_visible = true;
                self.presenter.set_warning(true, self.state.orientation());
            }
        } else {
            self.state.warning_seen = false;
            if self.state.warning_visible {
                self.state.warning_visible = false;
                self.presenter.set_warning(false, self.state.orientation());
            }
        }
    }

    // ----- helpers -----

    fn mode(&self) -> Result<SoundMode, PlatformError> {
        let sound = self.sound.preference(PreferenceFlag::SoundEnabled)?;
        let vibration = self.sound.preference(PreferenceFlag::VibrationEnabled)?;
        Ok(SoundMode::from_flags(sound, vibration))
    }

    fn read_stream(&self, stream: StreamType) -> Result<(u32, u32, SoundMode), PlatformError> {
        let level = self.sound.level(stream)?;
        let step = self.sound.step(stream)?;
        Ok((level, step, self.mode()?))
    }

    fn set_mode(&mut self, mode: SoundMode) {
        let (sound, vibration) = mode.flags();
        for (flag, value) in [
            (PreferenceFlag::SoundEnabled, sound),
            (PreferenceFlag::VibrationEnabled, vibration),
        ] {
            if let Err(err) = self.sound.set_preference(flag, value) {
                warn!(%err, ?flag, value, "failed to store sound preference");
            }
        }
        if mode != SoundMode::Vibrate {
            self.state.vibration_pulsed = false;
        }
        debug!(?mode, "sound mode changed");
    }

    fn apply(&mut self, stream: StreamType, level: u32, outcome: StepOutcome) {
        if let Some(mode) = outcome.mode {
            self.set_mode(mode);
        }
        if outcome.level != level {
            self.commit_level(stream, outcome.level);
        }
        if outcome.pulse {
            self.pulse_vibration();
        }
    }

    fn commit_level(&mut self, stream: StreamType, level: u32) -> bool {
        match self.sound.set_level(stream, level) {
            Ok(()) => {
                debug!(%stream, level, "level committed");
                true
            }
            Err(err) => {
                warn!(%err, %stream, level, "failed to set level");
                false
            }
        }
    }

    /// At most one pulse per entry into vibrate mode.
    fn pulse_vibration(&mut self) {
        if self.state.vibration_pulsed {
            debug!("vibration already pulsed for this vibrate entry");
            return;
        }
        self.state.vibration_pulsed = true;
        self.sound.play_feedback(FeedbackKind::Vibration);
    }

    fn compose(&self, stream: StreamType) -> Result<ShowState, PlatformError> {
        let mode = self.mode()?;
        let (mut level, step) = if self.bridge.routes(stream) {
            (
                self.bridge.gain(&self.gateway)?,
                self.sound.step(StreamType::Call)?,
            )
        } else {
            (self.sound.level(stream)?, self.sound.step(stream)?)
        };
        if stream == StreamType::Media && self.state.clamp_pending {
            level = level.min(self.safety.earphone_ceiling);
        }
        let silent = stream.follows_sound_profile() && mode != SoundMode::Sound;
        if silent {
            level = 0;
        }
        let level = level.min(step);
        Ok(ShowState {
            stream,
            level,
            step,
            muted: self.state.all_sounds_off || silent || level == 0,
            vibrating: silent && mode == SoundMode::Vibrate,
            bt_opened: self.bridge.sco_open(),
            slider_enabled: !(stream == StreamType::Notification && silent),
            icon: IconClass::for_stream(
                stream,
                mode == SoundMode::Sound && !self.state.all_sounds_off,
                mode == SoundMode::Vibrate,
            ),
        })
    }

    /// Redraw the visible popup from the platform. Skipped mid-drag so the
    /// slider is never yanked from under the finger.
    fn present(&mut self) {
        if !self.state.is_visible() || self.input.touching() {
            return;
        }
        match self.compose(self.state.current_stream) {
            Ok(shown) => self.push(shown),
            Err(err) => warn!(%err, "refresh skipped"),
        }
    }

    fn push(&mut self, shown: ShowState) {
        if self.state.last_shown == Some(shown) {
            return;
        }
        self.presenter.show(&shown);
        self.state.last_shown = Some(shown);
    }
}
