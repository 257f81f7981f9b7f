//! End-to-end session behaviour against recording fakes
//!
//! Every test drives time explicitly, so none of them sleep.

use mirrorplay::controls::{ControlsState, Overlay};
use mirrorplay::engine::{EngineEvent, RecordedCommand};
use mirrorplay::episodes::Episode;
use mirrorplay::gesture::{TouchSample, Viewport};
use mirrorplay::resume::{
    parse_stored_position, storage_key, HistoryEntry, JsonFileStore, KeyValueStore, MemoryStore, HISTORY_KEY,
};
use mirrorplay::tracks::{RawDetectedTrack, TrackKind};
use mirrorplay::{Config, PlayerEvent, PlayerSession};
use mirrorplay_integration_tests::{
    content, harness, harness_with, loaded, ms, progress, stored_record, stream, touch, FlakyStore, Harness,
    CONTENT_KEY,
};
use std::sync::Arc;
use std::time::Instant;

fn right_x() -> f64 {
    Viewport::default().width * 0.75
}

fn left_x() -> f64 {
    Viewport::default().width * 0.25
}

fn mid_y() -> f64 {
    Viewport::default().height / 2.0
}

fn harness_resuming_at(position: f64) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store
        .set(&storage_key(CONTENT_KEY), &stored_record(position))
        .unwrap();
    harness_with(Config::default(), store)
}

fn controls_changes(h: &Harness) -> Vec<ControlsState> {
    h.events
        .all()
        .into_iter()
        .filter_map(|e| match e {
            PlayerEvent::ControlsChanged { state } => Some(state),
            _ => None,
        })
        .collect()
}

#[test]
fn test_resume_seeks_exactly_once() {
    let mut h = harness_resuming_at(30.0);
    let t0 = Instant::now();

    h.mount(t0);
    // Nothing reaches the engine before it has loaded
    assert!(h.log.seeks().is_empty());

    h.engine(ms(t0, 800), loaded(120.0));
    assert_eq!(
        h.log.commands(),
        vec![
            RecordedCommand::SetVolume(1.0),
            RecordedCommand::Load(stream().primary_uri),
            RecordedCommand::Play,
            RecordedCommand::Seek(30.0),
        ]
    );

    // A spurious second Loaded must not seek again
    h.engine(ms(t0, 900), loaded(120.0));
    assert_eq!(h.log.seeks(), vec![30.0]);
    assert_eq!(h.session.authoritative_position(), 30.0);
}

#[test]
fn test_resume_lookup_after_load() {
    let mut h = harness_resuming_at(45.0);
    let t0 = Instant::now();

    let lookup = h.session.mount(t0, false);
    h.engine(ms(t0, 500), loaded(120.0));
    assert!(h.log.seeks().is_empty());

    let stored = lookup.run();
    assert_eq!(stored, Some(45.0));
    h.session.resume_lookup_completed(ms(t0, 700), stored);
    assert_eq!(h.log.seeks(), vec![45.0]);
}

#[test]
fn test_position_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    let t0 = Instant::now();

    {
        let store = Arc::new(JsonFileStore::open(&path).unwrap());
        let mut h = harness_with(Config::default(), store);
        h.mount(t0);
        h.engine(t0, loaded(1200.0));
        h.engine(ms(t0, 1000), progress(1.0));
        h.session.seek(600.0, ms(t0, 2000)).unwrap();
        h.session.close(ms(t0, 7000));
    }

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let raw = store.get(HISTORY_KEY).unwrap().unwrap();
    let history: Vec<HistoryEntry> = serde_json::from_str(&raw).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, CONTENT_KEY);
    assert_eq!(history[0].progress, 600.0);

    let mut h = harness_with(Config::default(), store);
    h.mount(ms(t0, 10_000));
    h.engine(ms(t0, 10_500), loaded(1200.0));
    assert_eq!(h.log.seeks(), vec![600.0]);
}

#[test]
fn test_resume_threshold() {
    for (stored, expected) in [(94.0, vec![94.0]), (96.0, vec![])] {
        let mut h = harness_resuming_at(stored);
        let t0 = Instant::now();
        h.mount(t0);
        h.engine(ms(t0, 100), loaded(100.0));
        assert_eq!(h.log.seeks(), expected, "stored position {}", stored);
    }
}

#[test]
fn test_stale_ticks_do_not_move_position() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.session.seek(60.0, ms(t0, 1000)).unwrap();
    h.engine(ms(t0, 1100), progress(12.0));
    assert_eq!(h.session.authoritative_position(), 60.0);
    assert_eq!(h.session.state().position_seconds, 0.0);

    h.engine(ms(t0, 1300), progress(60.4));
    assert_eq!(h.session.state().position_seconds, 60.4);
    assert_eq!(h.session.authoritative_position(), 60.4);
}

#[test]
fn test_two_taps_150ms_apart_make_one_double_tap() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.touches(touch::two_taps(right_x(), mid_y(), ms(t0, 1000), 150));
    h.session.poll(ms(t0, 3000));

    assert_eq!(h.log.seeks(), vec![10.0]);
    assert!(controls_changes(&h).is_empty());
    assert_eq!(h.session.controls_state(), ControlsState::Hidden);
}

#[test]
fn test_two_taps_400ms_apart_make_two_single_taps() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.touches(touch::two_taps(right_x(), mid_y(), ms(t0, 1000), 400));
    h.session.poll(ms(t0, 1000 + 450 + 300));

    assert!(h.log.seeks().is_empty());
    assert_eq!(
        controls_changes(&h),
        vec![ControlsState::Shown, ControlsState::Hidden]
    );
}

#[test]
fn test_double_tap_left_skips_back() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));
    h.engine(ms(t0, 100), progress(42.0));

    h.touches(touch::two_taps(left_x(), mid_y(), ms(t0, 1000), 150));
    assert_eq!(h.log.seeks(), vec![32.0]);

    // A second double tap builds on the pending target, not the last tick
    h.touches(touch::two_taps(left_x(), mid_y(), ms(t0, 1500), 150));
    assert_eq!(h.log.seeks(), vec![32.0, 22.0]);
}

#[test]
fn test_auto_hide_keeps_a_single_deadline() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.touches(touch::tap(400.0, mid_y(), t0));
    let shown_at = ms(t0, 350);
    h.session.poll(shown_at);
    assert_eq!(h.session.controls_state(), ControlsState::Shown);
    assert_eq!(h.session.next_deadline(), Some(ms(t0, 350 + 4000)));

    // Interactions push the one deadline back instead of adding timers
    h.session.seek(20.0, ms(t0, 1350)).unwrap();
    h.session.seek(40.0, ms(t0, 2350)).unwrap();
    assert_eq!(h.session.next_deadline(), Some(ms(t0, 2350 + 4000)));

    h.session.poll(ms(t0, 4350));
    assert_eq!(h.session.controls_state(), ControlsState::Shown);

    h.session.poll(ms(t0, 6350));
    assert_eq!(h.session.controls_state(), ControlsState::Hidden);
    assert_eq!(
        controls_changes(&h),
        vec![ControlsState::Shown, ControlsState::Hidden]
    );
    assert_eq!(h.session.next_deadline(), None);
}

#[test]
fn test_auto_hide_waits_while_paused() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.session.pause(ms(t0, 100)).unwrap();
    h.touches(touch::tap(400.0, mid_y(), ms(t0, 200)));
    h.session.poll(ms(t0, 600));
    assert_eq!(h.session.controls_state(), ControlsState::Shown);
    assert_eq!(h.session.next_deadline(), None);

    h.session.poll(ms(t0, 60_000));
    assert_eq!(h.session.controls_state(), ControlsState::Shown);

    h.session.play(ms(t0, 61_000)).unwrap();
    h.session.poll(ms(t0, 64_999));
    assert_eq!(h.session.controls_state(), ControlsState::Shown);
    h.session.poll(ms(t0, 65_000));
    assert_eq!(h.session.controls_state(), ControlsState::Hidden);
}

#[test]
fn test_settings_suppress_auto_hide() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);

    h.session.open_settings(t0);
    assert_eq!(h.session.overlay(), Overlay::Settings);
    h.session.poll(ms(t0, 30_000));
    assert_eq!(h.session.overlay(), Overlay::Settings);

    h.session.close_settings(ms(t0, 30_000));
    assert_eq!(h.session.overlay(), Overlay::Controls);
    h.session.poll(ms(t0, 34_000));
    assert_eq!(h.session.overlay(), Overlay::None);
}

#[test]
fn test_lock_swallows_gestures() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.session.lock(t0);
    assert_eq!(h.session.overlay(), Overlay::None);

    h.touches(touch::two_taps(right_x(), mid_y(), ms(t0, 100), 150));
    h.touches(touch::vertical_drag(right_x(), 300.0, 100.0, 5, ms(t0, 500)));
    assert!(h.log.seeks().is_empty());
    assert_eq!(h.session.state().volume, 1.0);
    assert_eq!(h.session.overlay(), Overlay::UnlockButton);

    // The unlock button fades three seconds after the last touch
    h.session.poll(ms(t0, 500 + 3000));
    assert_eq!(h.session.overlay(), Overlay::None);

    h.session.unlock(ms(t0, 4000));
    assert_eq!(h.session.overlay(), Overlay::Controls);
}

#[test]
fn test_vertical_drags() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    // Right half drives volume; dragging down by 100px lowers it by 0.5
    h.touches(touch::vertical_drag(right_x(), 100.0, 200.0, 4, t0));
    assert!((h.session.state().volume - 0.5).abs() < 1e-4);

    // Volume never leaves [0, 1]
    h.touches(touch::vertical_drag(right_x(), 50.0, 380.0, 10, ms(t0, 1000)));
    assert_eq!(h.session.state().volume, 0.0);
    assert_eq!(h.log.commands().last(), Some(&RecordedCommand::SetVolume(0.0)));

    // Left half drives brightness
    h.touches(touch::vertical_drag(left_x(), 300.0, 260.0, 2, ms(t0, 2000)));
    assert!((h.session.state().brightness - 0.7).abs() < 1e-4);
}

#[test]
fn test_failing_store_does_not_interrupt_playback() {
    let store = Arc::new(FlakyStore::new());
    store.set_failing(true);
    let mut h = harness_with(Config::default(), store.clone());
    let t0 = Instant::now();

    h.mount(t0);
    h.engine(t0, loaded(120.0));
    for second in 1..=12u64 {
        h.engine(ms(t0, second * 1000), progress(second as f64));
    }

    assert_eq!(h.session.state().position_seconds, 12.0);
    assert!(h.session.state().last_error.is_none());
    // Throttled even while failing: t=1s, 6s, 11s
    assert_eq!(store.failed_writes(), 3);

    store.set_failing(false);
    h.engine(ms(t0, 16_000), progress(16.0));
    let raw = store.get(&storage_key(CONTENT_KEY)).unwrap().unwrap();
    assert_eq!(parse_stored_position(&raw), Some(16.0));
}

#[test]
fn test_progress_saves_are_throttled() {
    let store = Arc::new(MemoryStore::new());
    let mut h = harness_with(Config::default(), store.clone());
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.engine(ms(t0, 1000), progress(1.0));
    h.engine(ms(t0, 5999), progress(5.9));
    let raw = store.get(&storage_key(CONTENT_KEY)).unwrap().unwrap();
    assert_eq!(parse_stored_position(&raw), Some(1.0));

    h.engine(ms(t0, 6000), progress(6.0));
    let raw = store.get(&storage_key(CONTENT_KEY)).unwrap().unwrap();
    assert_eq!(parse_stored_position(&raw), Some(6.0));
}

#[test]
fn test_close_saves_and_reverts_chrome() {
    let store = Arc::new(MemoryStore::new());
    let mut h = harness_with(Config::default(), store.clone());
    let t0 = Instant::now();
    h.mount(t0);
    assert!(h.session.is_fullscreen());
    assert!(!h.chrome.is_reverted());

    h.engine(t0, loaded(120.0));
    h.engine(ms(t0, 1000), progress(1.0));
    h.engine(ms(t0, 7000), progress(7.0));
    h.engine(ms(t0, 9000), progress(9.0));
    h.touches(touch::tap(400.0, mid_y(), ms(t0, 9000)));

    h.session.close(ms(t0, 12_500));
    assert!(h.chrome.is_reverted());
    assert_eq!(h.session.next_deadline(), None);
    let raw = store.get(&storage_key(CONTENT_KEY)).unwrap().unwrap();
    assert_eq!(parse_stored_position(&raw), Some(9.0));

    assert!(h.session.play(ms(t0, 13_000)).is_err());
    assert_eq!(h.events.count(|e| matches!(e, PlayerEvent::Closed)), 1);
}

#[test]
fn test_dropping_session_reverts_chrome() {
    let Harness {
        mut session, chrome, ..
    } = harness();
    session.mount(Instant::now(), false);
    assert!(!chrome.is_reverted());

    drop(session);
    assert!(chrome.is_reverted());
}

#[test]
fn test_detected_tracks_merge_without_duplicates() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    assert_eq!(h.session.tracks().tracks().len(), 1);

    let detected = vec![
        RawDetectedTrack {
            kind: TrackKind::Audio,
            index: 0,
            title: None,
            language: Some("English".to_string()),
            is_default: true,
        },
        RawDetectedTrack {
            kind: TrackKind::Audio,
            index: 1,
            title: Some("Commentary".to_string()),
            language: Some("en".to_string()),
            is_default: false,
        },
        RawDetectedTrack {
            kind: TrackKind::Text,
            index: 2,
            title: None,
            language: None,
            is_default: false,
        },
    ];
    let loaded_with_tracks = EngineEvent::Loaded {
        duration_seconds: 120.0,
        detected_tracks: detected.clone(),
    };
    h.engine(t0, loaded_with_tracks.clone());

    let labels: Vec<_> = h
        .session
        .tracks()
        .tracks()
        .iter()
        .map(|t| t.label.clone())
        .collect();
    assert_eq!(labels, vec!["English", "Commentary", "Track 3"]);

    // Reported again: nothing new
    h.engine(ms(t0, 100), loaded_with_tracks);
    assert_eq!(h.session.tracks().tracks().len(), 3);

    // Text may be switched off, audio may not
    assert!(h.session.select_track(TrackKind::Text, None).is_ok());
    assert!(h.session.select_track(TrackKind::Audio, None).is_err());
    assert_eq!(
        h.log.commands().last(),
        Some(&RecordedCommand::SelectTrack(TrackKind::Text, None))
    );
}

#[test]
fn test_engine_error_then_retry() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));
    h.engine(ms(t0, 1000), progress(25.0));

    h.engine(
        ms(t0, 2000),
        EngineEvent::Error {
            message: "403 from mirror".to_string(),
        },
    );
    assert!(h.session.state().is_failed());
    assert!(h.session.play(ms(t0, 2100)).is_err());

    // Late events from the dead engine are ignored
    h.engine(ms(t0, 2200), progress(26.0));
    assert_eq!(h.session.state().position_seconds, 25.0);

    h.session.retry(ms(t0, 3000)).unwrap();
    assert_eq!(h.log.instances(), 2);
    h.engine(ms(t0, 3500), loaded(120.0));
    assert!(h.session.state().last_error.is_none());
    assert_eq!(
        h.log.last_instance_commands(),
        vec![
            RecordedCommand::SetVolume(1.0),
            RecordedCommand::Load(stream().primary_uri),
            RecordedCommand::Seek(25.0),
            RecordedCommand::Play,
        ]
    );
}

#[test]
fn test_pip_swallows_touches() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.engine(t0, loaded(120.0));

    h.session.enter_pip(t0);
    assert_eq!(h.session.overlay(), Overlay::None);
    h.touches(touch::two_taps(right_x(), mid_y(), ms(t0, 100), 150));
    assert!(h.log.seeks().is_empty());

    h.session.exit_pip(ms(t0, 1000));
    assert!(h.session.is_fullscreen());
    assert!(!h.chrome.is_reverted());
}

#[test]
fn test_next_episode_rolls_over_seasons() {
    let all = vec![
        Episode::new("s1e1", 1, 1),
        Episode::new("s1e2", 1, 2),
        Episode::new("s2e1", 2, 1),
    ];

    let session = PlayerSession::builder(content(), stream())
        .with_engine_factory(Box::new(mirrorplay::engine::RecordingEngineFactory::new()))
        .with_episode(all[1].clone())
        .build()
        .unwrap();
    assert_eq!(session.next_episode(&all).map(|e| e.id.as_str()), Some("s2e1"));

    let last = PlayerSession::builder(content(), stream())
        .with_engine_factory(Box::new(mirrorplay::engine::RecordingEngineFactory::new()))
        .with_episode(all[2].clone())
        .build()
        .unwrap();
    assert!(last.next_episode(&all).is_none());
}

#[test]
fn test_touch_on_closed_session_is_ignored() {
    let mut h = harness();
    let t0 = Instant::now();
    h.mount(t0);
    h.session.close(t0);

    h.session.handle_touch(TouchSample::down(400.0, 200.0, ms(t0, 10)));
    h.session.handle_touch(TouchSample::up(400.0, 200.0, ms(t0, 60)));
    assert_eq!(h.session.next_deadline(), None);
}
