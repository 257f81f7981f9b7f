//! Session driver: channel input, timers and background resume lookup

use mirrorplay::controls::ControlsState;
use mirrorplay::engine::RecordedCommand;
use mirrorplay::gesture::{SkipDirection, TouchSample};
use mirrorplay::player::event_channel;
use mirrorplay::resume::{parse_stored_position, storage_key, KeyValueStore, MemoryStore};
use mirrorplay::{Config, PlayerEvent, SessionCommand, SessionDriver};
use mirrorplay_integration_tests::{harness_with, loaded, progress, stored_record, CONTENT_KEY};
use std::sync::Arc;
use std::time::Duration;

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_tap_resolves_on_the_driver_clock() {
    let h = harness_with(Config::default(), Arc::new(MemoryStore::new()));
    let mut session = h.session;
    let (handler, mut events) = event_channel();
    session.subscribe(Box::new(handler));

    let handle = SessionDriver::spawn(session);
    handle.engine_event(loaded(120.0)).await.unwrap();

    let start = tokio::time::Instant::now().into_std();
    handle.touch(TouchSample::down(300.0, 200.0, start)).await.unwrap();
    handle
        .touch(TouchSample::up(300.0, 200.0, start + Duration::from_millis(40)))
        .await
        .unwrap();

    // Still inside the double-tap window
    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    let mut shown = false;
    while let Ok(event) = events.try_recv() {
        shown |= matches!(event, PlayerEvent::ControlsChanged { .. });
    }
    assert!(!shown);

    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let PlayerEvent::ControlsChanged { state } = event {
            states.push(state);
        }
    }
    assert_eq!(states, vec![ControlsState::Shown]);

    let session = handle.close().await.unwrap();
    assert!(session.is_closed());
}

#[tokio::test]
async fn test_progress_and_close_persist_position() {
    let mut config = Config::default();
    config.resume.save_interval_ms = 20;
    let store = Arc::new(MemoryStore::new());
    let h = harness_with(config, store.clone());
    let log = h.log.clone();

    let handle = SessionDriver::spawn(h.session);
    handle.engine_event(loaded(300.0)).await.unwrap();

    // Saves start once the background lookup has come back
    for _ in 0..50 {
        handle.engine_event(progress(1.0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        if store.get(&storage_key(CONTENT_KEY)).unwrap().is_some() {
            break;
        }
    }

    for second in 2..=8u64 {
        handle.engine_event(progress(second as f64)).await.unwrap();
    }
    handle
        .command(SessionCommand::Skip(SkipDirection::Forward))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let session = handle.close().await.unwrap();
    assert_eq!(log.seeks(), vec![18.0]);
    assert_eq!(session.authoritative_position(), 18.0);

    let raw = store.get(&storage_key(CONTENT_KEY)).unwrap().unwrap();
    assert_eq!(parse_stored_position(&raw), Some(18.0));
}

#[tokio::test]
async fn test_resume_through_driver() {
    let store = Arc::new(MemoryStore::new());
    store
        .set(&storage_key(CONTENT_KEY), &stored_record(42.0))
        .unwrap();
    let h = harness_with(Config::default(), store);
    let log = h.log.clone();

    let handle = SessionDriver::spawn(h.session);
    handle.engine_event(loaded(600.0)).await.unwrap();
    for _ in 0..50 {
        if !log.seeks().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.engine_event(loaded(600.0)).await.unwrap();

    handle.close().await.unwrap();
    assert_eq!(log.seeks(), vec![42.0]);
}

#[tokio::test(start_paused = true)]
async fn test_commands_after_close_fail() {
    let h = harness_with(Config::default(), Arc::new(MemoryStore::new()));
    let log = h.log.clone();
    let handle = SessionDriver::spawn(h.session);
    let sender = handle.sender();

    handle.engine_event(loaded(60.0)).await.unwrap();
    handle.command(SessionCommand::Pause).await.unwrap();
    handle.close().await.unwrap();

    assert!(sender
        .send(mirrorplay::SessionInput::Command(SessionCommand::Play))
        .await
        .is_err());
    assert_eq!(log.commands().last(), Some(&RecordedCommand::Pause));
}
