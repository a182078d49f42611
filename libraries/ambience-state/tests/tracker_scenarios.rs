//! Tracker behaviour over simulated time

use ambience_core::types::{DiscreteState, MapKind, MountType, TelemetrySample, TimeOfDay};
use ambience_core::TelemetrySource;
use ambience_state::{LockProbe, ManualClock, StateTracker, TrackerEvent, TrackerSettings};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::advance;

#[derive(Default)]
struct FakeTelemetry {
    sample: Mutex<Option<TelemetrySample>>,
}

impl FakeTelemetry {
    fn set(&self, sample: Option<TelemetrySample>) {
        *self.sample.lock().unwrap() = sample;
    }

    fn update(&self, f: impl FnOnce(&mut TelemetrySample)) {
        let mut guard = self.sample.lock().unwrap();
        let sample = guard.get_or_insert_with(TelemetrySample::default);
        f(sample);
    }
}

impl TelemetrySource for FakeTelemetry {
    fn sample(&self) -> Option<TelemetrySample> {
        self.sample.lock().unwrap().clone()
    }
}

#[derive(Clone, Default)]
struct FakeProbe(Arc<AtomicBool>);

impl LockProbe for FakeProbe {
    fn is_locked(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn in_game(map_kind: MapKind, map_id: u32) -> TelemetrySample {
    TelemetrySample {
        process_running: true,
        in_game: true,
        focused: true,
        map_id,
        map_kind,
        camera_z: 50.0,
        process_id: Some(4242),
        ..TelemetrySample::default()
    }
}

fn setup(sample: TelemetrySample) -> (Arc<FakeTelemetry>, FakeProbe, StateTracker) {
    let telemetry = Arc::new(FakeTelemetry::default());
    telemetry.set(Some(sample));
    let probe = FakeProbe::default();
    let tracker = StateTracker::new(telemetry.clone(), TrackerSettings::default())
        .with_probe(Box::new(probe.clone()));
    (telemetry, probe, tracker)
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Tick every 200ms for `total`, asserting the state never changes
async fn hold(tracker: &mut StateTracker, total: Duration, expected: DiscreteState) {
    let step = Duration::from_millis(200);
    let mut elapsed = Duration::ZERO;
    while elapsed + step < total {
        advance(step).await;
        elapsed += step;
        assert_eq!(tracker.tick().state, expected, "after {elapsed:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_in_game_settles_to_ambient() {
    let (_telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);
}

#[tokio::test(start_paused = true)]
async fn test_not_running_is_none() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    tracker.tick();
    telemetry.update(|s| s.process_running = false);
    assert_eq!(tracker.tick().state, DiscreteState::None);
}

#[tokio::test(start_paused = true)]
async fn test_combat_exit_on_public_map_holds_short() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    tracker.tick();

    telemetry.update(|s| s.in_combat = true);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);

    telemetry.update(|s| s.in_combat = false);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);
    hold(&mut tracker, Duration::from_millis(3250), DiscreteState::Battle).await;

    advance(Duration::from_millis(400)).await;
    assert_eq!(tracker.tick().state, DiscreteState::StandBy);
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);
}

#[tokio::test(start_paused = true)]
async fn test_combat_exit_on_instance_holds_long() {
    for kind in [MapKind::Instance, MapKind::WvW, MapKind::PublicMini] {
        let (telemetry, _probe, mut tracker) = setup(in_game(kind, 900));
        tracker.tick();

        telemetry.update(|s| s.in_combat = true);
        tracker.tick();
        telemetry.update(|s| s.in_combat = false);
        assert_eq!(tracker.tick().state, DiscreteState::Battle);

        hold(&mut tracker, Duration::from_millis(20250), DiscreteState::Battle).await;
        advance(Duration::from_millis(400)).await;
        assert_eq!(tracker.tick().state, DiscreteState::StandBy, "{kind:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_combat_reentry_cancels_exit_timer() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    telemetry.update(|s| s.in_combat = true);
    tracker.tick();
    telemetry.update(|s| s.in_combat = false);
    tracker.tick();

    advance(Duration::from_secs(3)).await;
    telemetry.update(|s| s.in_combat = true);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);
    telemetry.update(|s| s.in_combat = false);
    tracker.tick();

    // The old deadline would have expired here
    advance(Duration::from_secs(1)).await;
    assert_eq!(tracker.tick().state, DiscreteState::Battle);
}

#[tokio::test(start_paused = true)]
async fn test_dismount_during_combat_exit_keeps_battle() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    telemetry.update(|s| s.mount = Some(MountType::Raptor));
    assert_eq!(tracker.tick().state, DiscreteState::Mounted);

    telemetry.update(|s| s.in_combat = true);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);
    telemetry.update(|s| s.in_combat = false);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);

    // Mount exit does not cut the combat hold short
    advance(Duration::from_secs(1)).await;
    telemetry.update(|s| s.mount = None);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);
    hold(&mut tracker, Duration::from_millis(2250), DiscreteState::Battle).await;

    advance(Duration::from_millis(400)).await;
    assert_eq!(tracker.tick().state, DiscreteState::StandBy);
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);
}

#[tokio::test(start_paused = true)]
async fn test_still_mounted_after_combat_exit_returns_to_mounted() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    telemetry.update(|s| {
        s.mount = Some(MountType::Griffon);
        s.in_combat = true;
    });
    assert_eq!(tracker.tick().state, DiscreteState::Battle);
    telemetry.update(|s| s.in_combat = false);
    tracker.tick();

    hold(&mut tracker, Duration::from_millis(3250), DiscreteState::Battle).await;
    advance(Duration::from_millis(400)).await;
    assert_eq!(tracker.tick().state, DiscreteState::StandBy);
    assert_eq!(tracker.tick().state, DiscreteState::Mounted);
}

#[tokio::test(start_paused = true)]
async fn test_defeated_beats_battle_and_respects_probe_interval() {
    let (telemetry, probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    telemetry.update(|s| s.in_combat = true);
    assert_eq!(tracker.tick().state, DiscreteState::Battle);

    probe.0.store(true, Ordering::SeqCst);
    advance(Duration::from_millis(50)).await;
    // Probed less than 200ms ago
    assert_eq!(tracker.tick().state, DiscreteState::Battle);

    advance(Duration::from_millis(200)).await;
    assert_eq!(tracker.tick().state, DiscreteState::Defeated);

    probe.0.store(false, Ordering::SeqCst);
    telemetry.update(|s| s.in_combat = false);
    advance(Duration::from_millis(200)).await;
    assert_eq!(tracker.tick().state, DiscreteState::StandBy);
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);
}

#[tokio::test(start_paused = true)]
async fn test_map_change_resets_to_none() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    telemetry.update(|s| s.in_combat = true);
    tracker.tick();
    telemetry.update(|s| s.in_combat = false);
    tracker.tick();

    telemetry.update(|s| s.map_id = 16);
    assert_eq!(tracker.tick().state, DiscreteState::None);
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);
}

#[tokio::test(start_paused = true)]
async fn test_lost_focus_forces_standby() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    tracker.tick();
    telemetry.update(|s| s.focused = false);
    assert_eq!(tracker.tick().state, DiscreteState::StandBy);
    telemetry.update(|s| s.focused = true);
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_failure_keeps_last_sample() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    telemetry.update(|s| s.mount = Some(MountType::Raptor));
    assert_eq!(tracker.tick().state, DiscreteState::Mounted);

    telemetry.set(None);
    let snapshot = tracker.tick();
    assert_eq!(snapshot.state, DiscreteState::Mounted);
    assert_eq!(snapshot.mount, Some(MountType::Raptor));
}

#[tokio::test(start_paused = true)]
async fn test_mount_eligibility_by_map() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Instance, 900));
    telemetry.update(|s| s.mount = Some(MountType::Griffon));
    assert_eq!(tracker.tick().state, DiscreteState::Ambient);

    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::GuildHall, 1068));
    telemetry.update(|s| s.mount = Some(MountType::Griffon));
    assert_eq!(tracker.tick().state, DiscreteState::Mounted);

    telemetry.update(|s| s.mount = None);
    assert_eq!(tracker.tick().state, DiscreteState::StandBy);
}

#[tokio::test(start_paused = true)]
async fn test_competitive_map() {
    let (_telemetry, _probe, mut tracker) = setup(in_game(MapKind::PvP, 350));
    assert_eq!(tracker.tick().state, DiscreteState::Competitive);
}

#[tokio::test(start_paused = true)]
async fn test_submerged_notifies_on_change_only() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    let mut rx = tracker.subscribe();
    tracker.tick();
    drain(&mut rx);

    telemetry.update(|s| s.camera_z = -10.0);
    tracker.tick();
    tracker.tick();
    tracker.tick();
    let events = drain(&mut rx);
    assert_eq!(events, vec![TrackerEvent::SubmergedChanged { submerged: true }]);
    assert!(tracker.is_submerged());

    telemetry.update(|s| s.camera_z = 3.0);
    tracker.tick();
    assert_eq!(
        drain(&mut rx),
        vec![TrackerEvent::SubmergedChanged { submerged: false }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_state_changed_events() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    let mut rx = tracker.subscribe();
    tracker.tick();
    telemetry.update(|s| s.in_combat = true);
    tracker.tick();

    let changes: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, TrackerEvent::StateChanged { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![
            TrackerEvent::StateChanged {
                from: DiscreteState::None,
                to: DiscreteState::Ambient
            },
            TrackerEvent::StateChanged {
                from: DiscreteState::Ambient,
                to: DiscreteState::Battle
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_day_cycle_changes_with_clock() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 40, 0).unwrap(),
    ));
    let (_telemetry, _probe, tracker) = setup(in_game(MapKind::Public, 15));
    let mut tracker = tracker.with_clock(clock.clone());
    let mut rx = tracker.subscribe();

    assert_eq!(tracker.tick().time_of_day, TimeOfDay::Day);
    clock.set_utc(Utc.with_ymd_and_hms(2024, 5, 1, 1, 50, 0).unwrap());
    assert_eq!(tracker.tick().time_of_day, TimeOfDay::Night);
    assert!(drain(&mut rx).contains(&TrackerEvent::DayCycleChanged {
        time_of_day: TimeOfDay::Night
    }));
}

#[tokio::test(start_paused = true)]
async fn test_watch_tracks_latest_snapshot() {
    let (telemetry, _probe, mut tracker) = setup(in_game(MapKind::Public, 15));
    let watch = tracker.watch();
    telemetry.update(|s| s.in_combat = true);
    tracker.tick();
    assert_eq!(watch.borrow().state, DiscreteState::Battle);
    assert_eq!(watch.borrow().process_id, Some(4242));
}
