use std::time::{Duration, Instant};

use volume_popup::bluetooth::SimulatedGateway;
use volume_popup::config::{Configuration, StreamSeed};
use volume_popup::events::{
    KeyEvent, PlatformEvent, PreferenceFlag, SliderEvent, StreamType, VolumeKey, VolumeKeyOwner,
};
use volume_popup::presentation::{IconClass, RecordingPresenter};
use volume_popup::session::VolumeSession;
use volume_popup::sound::{FeedbackKind, SimulatedSound, SoundPolicy};
use volume_popup::timers::TimerSlot;

type Session = VolumeSession<SimulatedSound, SimulatedGateway, RecordingPresenter>;

fn session_from(config: Configuration) -> Session {
    let sound = SimulatedSound::new(&config.platform);
    let gateway = SimulatedGateway::new(config.platform.sco_opened, config.platform.speaker_gain);
    VolumeSession::new(&config, sound, gateway, RecordingPresenter::new())
}

fn config(stream: StreamType, level: u32) -> Configuration {
    let mut config = Configuration::default();
    config.platform.active_stream = stream;
    config
        .platform
        .streams
        .insert(stream, StreamSeed { level, step: 15 });
    config
}

fn tap(s: &mut Session, key: VolumeKey, at: Instant) {
    s.on_key(KeyEvent { key, pressed: true }, at);
    s.on_key(
        KeyEvent {
            key,
            pressed: false,
        },
        at + Duration::from_millis(50),
    );
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

#[test]
fn silent_notification_shows_zero_and_only_vibrates() {
    let t0 = Instant::now();
    let mut cfg = config(StreamType::Notification, 6);
    cfg.platform.sound_enabled = false;
    cfg.platform.vibration_enabled = true;
    let mut s = session_from(cfg);

    tap(&mut s, VolumeKey::VolumeUp, t0);

    assert!(s.is_visible());
    assert_eq!(s.sound().level(StreamType::Notification).unwrap(), 6);
    let shown = s.presenter().last_shown().unwrap();
    assert_eq!(shown.level, 0);
    assert!(!shown.slider_enabled);
    assert!(shown.vibrating);
    assert_eq!(shown.icon, IconClass::NotificationVibrate);
    assert_eq!(s.sound().feedback(), &[FeedbackKind::Vibration]);
}

#[test]
fn alarm_presses_are_dropped_when_the_alarm_popup_is_disabled() {
    let t0 = Instant::now();
    let mut cfg = config(StreamType::Alarm, 5);
    cfg.alarm_popup_enabled = false;
    let mut s = session_from(cfg);

    tap(&mut s, VolumeKey::VolumeUp, t0);
    assert!(!s.is_visible());
    assert_eq!(s.sound().level(StreamType::Alarm).unwrap(), 5);

    let mut s = session_from(config(StreamType::Alarm, 5));
    tap(&mut s, VolumeKey::VolumeUp, t0);
    assert!(s.is_visible());
    assert_eq!(s.sound().level(StreamType::Alarm).unwrap(), 6);
    assert!(
        !s.sound().feedback().contains(&FeedbackKind::VolumeKey),
        "alarm changes play no key tick"
    );
}

#[test]
fn media_mute_key_restores_the_saved_level() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Media, 8));

    tap(&mut s, VolumeKey::Mute, t0);
    assert_eq!(s.sound().level(StreamType::Media).unwrap(), 0);
    assert_eq!(s.state().media_muted_level, Some(8));
    assert!(s.presenter().last_shown().unwrap().muted);

    tap(&mut s, VolumeKey::Mute, t0 + ms(200));
    assert_eq!(s.sound().level(StreamType::Media).unwrap(), 8);
    assert_eq!(s.state().media_muted_level, None);
    assert_eq!(s.presenter().last_shown().unwrap().level, 8);
}

#[test]
fn volume_key_forgets_the_saved_media_level() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Media, 8));

    tap(&mut s, VolumeKey::Mute, t0);
    tap(&mut s, VolumeKey::VolumeUp, t0 + ms(200));
    assert_eq!(s.sound().level(StreamType::Media).unwrap(), 1);
    assert_eq!(s.state().media_muted_level, None);

    tap(&mut s, VolumeKey::Mute, t0 + ms(400));
    assert_eq!(s.sound().level(StreamType::Media).unwrap(), 0);
    assert_eq!(s.state().media_muted_level, Some(1));
}

#[test]
fn ringtone_mute_key_toggles_the_profile() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 0));

    tap(&mut s, VolumeKey::Mute, t0);
    assert!(!s.sound().preference(PreferenceFlag::SoundEnabled).unwrap());
    assert!(!s.sound().preference(PreferenceFlag::VibrationEnabled).unwrap());
    assert_eq!(s.presenter().last_shown().unwrap().icon, IconClass::Mute);
    s.sound_mut().take_feedback();

    tap(&mut s, VolumeKey::Mute, t0 + ms(200));
    assert!(s.sound().preference(PreferenceFlag::SoundEnabled).unwrap());
    // Unmuting a silent ringtone lifts it to the first audible step.
    assert_eq!(s.sound().level(StreamType::Ringtone).unwrap(), 1);
    assert_eq!(s.sound().feedback(), &[FeedbackKind::General]);
}

#[test]
fn slider_to_zero_puts_the_ringtone_into_vibrate() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 5));
    s.show_request(t0);

    s.on_slider(SliderEvent::DragStart, t0 + ms(10));
    s.on_slider(SliderEvent::DragStop { value: 0.3 }, t0 + ms(20));
    assert_eq!(s.sound().level(StreamType::Ringtone).unwrap(), 0);
    assert!(!s.sound().preference(PreferenceFlag::SoundEnabled).unwrap());
    assert!(s.sound().preference(PreferenceFlag::VibrationEnabled).unwrap());
    assert_eq!(s.sound().feedback(), &[FeedbackKind::Vibration]);
    assert!(s.presenter().last_shown().unwrap().vibrating);

    s.on_slider(SliderEvent::DragStart, t0 + ms(100));
    s.on_slider(SliderEvent::DragStop { value: 6.5 }, t0 + ms(110));
    assert_eq!(s.sound().level(StreamType::Ringtone).unwrap(), 7);
    assert!(s.sound().preference(PreferenceFlag::SoundEnabled).unwrap());
    assert!(!s.state().vibration_pulsed);
}

#[test]
fn slider_is_ignored_while_hidden() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Media, 5));

    s.on_slider(SliderEvent::DragStart, t0);
    s.on_slider(SliderEvent::DragStop { value: 12.0 }, t0 + ms(10));
    assert_eq!(s.sound().level(StreamType::Media).unwrap(), 5);
    assert!(!s.is_visible());
}

#[test]
fn bluetooth_call_gain_is_shown_optimistically() {
    let t0 = Instant::now();
    let mut cfg = config(StreamType::Call, 7);
    cfg.platform.sco_opened = true;
    cfg.platform.speaker_gain = 4;
    let mut s = session_from(cfg);

    tap(&mut s, VolumeKey::VolumeUp, t0);
    assert_eq!(s.gateway().requests(), &[5]);
    let shown = s.presenter().last_shown().unwrap();
    assert_eq!(shown.level, 5);
    assert!(shown.bt_opened);
    // The handset call level is untouched while the peer owns the gain.
    assert_eq!(s.sound().level(StreamType::Call).unwrap(), 7);

    s.on_platform_event(PlatformEvent::ScoStateChanged { opened: false }, t0 + ms(100));
    let shown = s.presenter().last_shown().unwrap();
    assert_eq!(shown.level, 7);
    assert!(!shown.bt_opened);
}

#[test]
fn peer_gain_change_pops_the_popup_for_a_while() {
    let t0 = Instant::now();
    let mut cfg = config(StreamType::Call, 7);
    cfg.platform.sco_opened = true;
    cfg.platform.speaker_gain = 4;
    let mut s = session_from(cfg);

    s.gateway_mut().peer_set_gain(9);
    s.on_platform_event(PlatformEvent::SpeakerGainChanged { gain: 9 }, t0);
    assert!(s.is_visible());
    assert!(s.timers().is_armed(TimerSlot::BluetoothDisplay));
    assert_eq!(s.presenter().last_shown().unwrap().level, 9);

    s.fire_due(t0 + ms(3000));
    assert!(!s.is_visible());
}

#[test]
fn peer_gain_outside_a_call_is_ignored() {
    let t0 = Instant::now();
    let mut cfg = config(StreamType::Media, 7);
    cfg.platform.sco_opened = true;
    let mut s = session_from(cfg);

    s.on_platform_event(PlatformEvent::SpeakerGainChanged { gain: 2 }, t0);
    assert!(!s.is_visible());
}

#[test]
fn all_sounds_off_reports_muted_and_suppresses_ticks() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 5));
    s.show_request(t0);

    s.on_platform_event(PlatformEvent::AllSoundsOff { enabled: true }, t0);
    assert!(s.presenter().last_shown().unwrap().muted);

    tap(&mut s, VolumeKey::VolumeUp, t0 + ms(100));
    assert_eq!(s.sound().level(StreamType::Ringtone).unwrap(), 6);
    assert!(s.sound().feedback().is_empty());
}

#[test]
fn dismissal_signals_hide_the_popup() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 5));

    s.on_key(
        KeyEvent {
            key: VolumeKey::VolumeUp,
            pressed: true,
        },
        t0,
    );
    s.on_key(
        KeyEvent {
            key: VolumeKey::Back,
            pressed: true,
        },
        t0 + ms(10),
    );
    assert!(s.is_visible(), "dismiss keys act on release");
    s.on_key(
        KeyEvent {
            key: VolumeKey::Back,
            pressed: false,
        },
        t0 + ms(20),
    );
    assert!(!s.is_visible());
    assert!(!s.timers().is_armed(TimerSlot::ShortUp));

    s.show_request(t0 + ms(100));
    s.on_platform_event(PlatformEvent::LcdOff, t0 + ms(110));
    assert!(!s.is_visible());

    s.show_request(t0 + ms(200));
    s.on_settings_clicked();
    assert!(!s.is_visible());

    s.show_request(t0 + ms(300));
    s.on_platform_event(
        PlatformEvent::VolumeKeyOwnerChanged {
            owner: VolumeKeyOwner::OtherApp,
        },
        t0 + ms(310),
    );
    assert!(!s.is_visible());

    s.show_request(t0 + ms(400));
    s.pause();
    assert!(!s.is_visible());
    assert_eq!(s.presenter().hide_count(), 5);
}

#[test]
fn external_preference_change_redraws_the_popup() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 5));
    s.show_request(t0);
    assert_eq!(s.presenter().last_shown().unwrap().level, 5);

    s.sound_mut()
        .external_set_preference(PreferenceFlag::SoundEnabled, false);
    s.on_platform_event(PlatformEvent::PreferencesChanged, t0 + ms(10));
    let shown = s.presenter().last_shown().unwrap();
    assert_eq!(shown.level, 0);
    assert!(shown.muted);
}

#[test]
fn external_change_while_hidden_shows_only_when_enabled() {
    let t0 = Instant::now();
    let change = PlatformEvent::LevelChanged {
        stream: StreamType::Media,
        level: 3,
    };

    let mut s = session_from(config(StreamType::Media, 5));
    s.on_platform_event(change, t0);
    assert!(!s.is_visible());

    let mut cfg = config(StreamType::Media, 5);
    cfg.show_on_external_change = true;
    let mut s = session_from(cfg);
    s.sound_mut().external_set_level(StreamType::Media, 3);
    s.on_platform_event(change, t0);
    assert!(s.is_visible());
    assert_eq!(s.presenter().last_shown().unwrap().level, 3);
}

#[test]
fn unready_window_drops_keys() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 5));
    s.presenter_mut().ready = false;

    tap(&mut s, VolumeKey::VolumeUp, t0);
    assert!(!s.show_request(t0));
    assert!(!s.is_visible());
    assert_eq!(s.sound().level(StreamType::Ringtone).unwrap(), 5);
}

#[test]
fn failed_read_aborts_the_show_without_wedging() {
    let t0 = Instant::now();
    let mut s = session_from(config(StreamType::Ringtone, 5));

    s.sound_mut().fail_reads_for(StreamType::Ringtone);
    assert!(!s.show_request(t0));
    assert!(!s.state().is_launching());

    s.sound_mut().clear_failures();
    assert!(s.show_request(t0 + ms(10)));
    assert_eq!(s.presenter().last_shown().unwrap().level, 5);
}

#[test]
fn deinitialize_leaves_nothing_armed() {
    let t0 = Instant::now();
    let mut s = session_from(Configuration::default());

    s.on_key(
        KeyEvent {
            key: VolumeKey::VolumeDown,
            pressed: true,
        },
        t0,
    );
    s.deinitialize();
    assert!(s.next_deadline().is_none());
    assert!(!s.is_visible());
}
