//! Engine contract checks with mockall
//!
//! `MediaEngine` takes borrowed arguments, so the mock sits behind a small
//! owned-argument trait and a forwarding wrapper.

use mirrorplay::engine::{AdapterPhase, EngineEvent, EngineFactory, MediaEngine, MediaSource};
use mirrorplay::tracks::{Track, TrackId, TrackKind};
use mirrorplay::utils::error::{PlayerError, Result};
use mirrorplay::{PlayerEvent, PlayerSession};
use mirrorplay_integration_tests::{content, loaded, ms, progress, stream, EventLog};
use mockall::predicate::eq;
use mockall::{automock, Sequence};
use std::collections::VecDeque;
use std::time::Instant;

#[automock]
trait Engine {
    fn load(&mut self, uri: String) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn seek(&mut self, to_seconds: f64) -> Result<()>;
    fn set_rate(&mut self, rate: f32) -> Result<()>;
    fn set_volume(&mut self, volume: f32) -> Result<()>;
    fn select_track(&mut self, kind: TrackKind, id: Option<TrackId>) -> Result<()>;
}

struct Mocked(MockEngine);

impl MediaEngine for Mocked {
    fn load(&mut self, source: &MediaSource) -> Result<()> {
        self.0.load(source.uri.clone())
    }

    fn play(&mut self) -> Result<()> {
        self.0.play()
    }

    fn pause(&mut self) -> Result<()> {
        self.0.pause()
    }

    fn seek(&mut self, to_seconds: f64) -> Result<()> {
        self.0.seek(to_seconds)
    }

    fn set_rate(&mut self, rate: f32) -> Result<()> {
        self.0.set_rate(rate)
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.0.set_volume(volume)
    }

    fn select_track(&mut self, kind: TrackKind, track: Option<&Track>) -> Result<()> {
        self.0.select_track(kind, track.map(|t| t.id.clone()))
    }
}

/// Hands out prepared mocks in order
struct MockFactory {
    engines: VecDeque<MockEngine>,
}

impl EngineFactory for MockFactory {
    fn create(&mut self) -> Result<Box<dyn MediaEngine>> {
        self.engines
            .pop_front()
            .map(|engine| Box::new(Mocked(engine)) as Box<dyn MediaEngine>)
            .ok_or_else(|| PlayerError::Engine("No engine left".to_string()))
    }
}

fn session_with(engines: Vec<MockEngine>) -> (PlayerSession, EventLog) {
    let events = EventLog::default();
    let session = PlayerSession::builder(content(), stream())
        .with_engine_factory(Box::new(MockFactory {
            engines: engines.into(),
        }))
        .with_event_handler(Box::new(events.clone()))
        .build()
        .unwrap();
    (session, events)
}

/// Engine that accepts the initial volume and one load of the primary source
fn loading_engine(seq: &mut Sequence) -> MockEngine {
    let primary = stream().primary_uri;
    let mut engine = MockEngine::new();
    engine
        .expect_set_volume()
        .with(eq(1.0f32))
        .times(1)
        .in_sequence(seq)
        .returning(|_| Ok(()));
    engine
        .expect_load()
        .withf(move |uri| *uri == primary)
        .times(1)
        .in_sequence(seq)
        .returning(|_| Ok(()));
    engine
}

#[test]
fn test_load_failure_then_retry_with_fresh_engine() {
    let mut broken = MockEngine::new();
    broken.expect_set_volume().returning(|_| Ok(()));
    broken
        .expect_load()
        .times(1)
        .returning(|_| Err(PlayerError::Load("connection refused".to_string())));
    broken.expect_play().never();

    let mut seq = Sequence::new();
    let mut fresh = loading_engine(&mut seq);
    fresh.expect_play().times(1).in_sequence(&mut seq).returning(|| Ok(()));
    fresh.expect_seek().never();

    let (mut session, events) = session_with(vec![broken, fresh]);
    let t0 = Instant::now();

    session.mount(t0, false);
    assert!(session.state().is_failed());
    assert_eq!(session.engine_phase(), AdapterPhase::Failed);
    assert_eq!(
        events.count(|e| matches!(e, PlayerEvent::Error { fatal: true, .. })),
        1
    );

    session.retry(ms(t0, 1000)).unwrap();
    assert!(!session.state().is_failed());
    session.handle_engine_event(ms(t0, 1500), loaded(90.0));
    assert_eq!(session.engine_phase(), AdapterPhase::Ready);
    assert_eq!(events.count(|e| matches!(e, PlayerEvent::Retrying)), 1);
}

#[test]
fn test_runtime_error_drops_engine_and_retry_continues() {
    let mut seq = Sequence::new();
    let mut first = loading_engine(&mut seq);
    first.expect_play().times(1).in_sequence(&mut seq).returning(|| Ok(()));
    // Nothing reaches the failed engine
    first.expect_seek().never();
    first.expect_pause().never();

    let mut seq2 = Sequence::new();
    let mut second = loading_engine(&mut seq2);
    second
        .expect_seek()
        .with(eq(25.0))
        .times(1)
        .in_sequence(&mut seq2)
        .returning(|_| Ok(()));
    second.expect_play().times(1).in_sequence(&mut seq2).returning(|| Ok(()));

    let (mut session, _events) = session_with(vec![first, second]);
    let t0 = Instant::now();

    session.mount(t0, false);
    session.resume_lookup_completed(t0, None);
    session.handle_engine_event(ms(t0, 500), loaded(90.0));
    session.handle_engine_event(ms(t0, 1000), progress(25.0));

    session.handle_engine_event(
        ms(t0, 2000),
        EngineEvent::Error {
            message: "decoder crashed".to_string(),
        },
    );
    assert!(session.seek(50.0, ms(t0, 2100)).is_err());
    assert!(session.pause(ms(t0, 2200)).is_err());

    session.retry(ms(t0, 3000)).unwrap();
    session.handle_engine_event(ms(t0, 3400), loaded(90.0));
    assert_eq!(session.authoritative_position(), 25.0);
}

#[test]
fn test_track_rejection_is_not_fatal() {
    let mut seq = Sequence::new();
    let mut engine = loading_engine(&mut seq);
    engine.expect_play().times(1).in_sequence(&mut seq).returning(|| Ok(()));
    engine
        .expect_select_track()
        .withf(|kind, id| *kind == TrackKind::Audio && id.is_some())
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    engine.expect_pause().times(1).in_sequence(&mut seq).returning(|| Ok(()));

    let (mut session, events) = session_with(vec![engine]);
    let t0 = Instant::now();
    session.mount(t0, false);
    session.handle_engine_event(ms(t0, 300), loaded(90.0));

    let english = session
        .tracks()
        .of_kind(TrackKind::Audio)
        .next()
        .map(|t| t.id.clone())
        .unwrap();
    session.select_track(TrackKind::Audio, Some(&english)).unwrap();
    session.handle_engine_event(
        ms(t0, 400),
        EngineEvent::TrackRejected {
            kind: TrackKind::Audio,
            track_id: english.clone(),
            reason: "unsupported codec".to_string(),
        },
    );

    let error = session.state().last_error.clone().unwrap();
    assert!(!error.fatal);
    assert_eq!(events.count(|e| matches!(e, PlayerEvent::TrackRejected { .. })), 1);
    assert_eq!(session.tracks().selection().get(TrackKind::Audio), Some(&english));

    // Playback carries on
    session.pause(ms(t0, 500)).unwrap();
}
