//! Discrete game-state tracker
//!
//! Each [`tick`](StateTracker::tick) samples telemetry and derives one
//! [`DiscreteState`] plus the orthogonal submerged flag and time of day.
//!
//! Priority, highest first: Defeated > Battle > Mounted > Competitive >
//! Ambient > StandBy/None. Entering combat is immediate; leaving it is
//! debounced by a short timer on open-world maps and a long one on
//! instanced, WvW and mini maps.

use crate::clock::{Clock, SystemClock};
use crate::events::{TrackerEvent, TrackerSnapshot};
use crate::lock_probe::{FileLockProbe, LockProbe, NeverLocked};
use ambience_core::types::{DiscreteState, TelemetrySample, TimeOfDay};
use ambience_core::{ModuleConfig, TelemetrySource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    pub combat_exit_short: Duration,
    pub combat_exit_long: Duration,
    pub lock_probe_interval: Duration,
    /// Losing focus forces StandBy
    pub mute_when_in_background: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from(&ModuleConfig::default())
    }
}

impl From<&ModuleConfig> for TrackerSettings {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            combat_exit_short: Duration::from_millis(config.combat_exit_short_ms),
            combat_exit_long: Duration::from_millis(config.combat_exit_long_ms),
            lock_probe_interval: Duration::from_millis(config.lock_probe_interval_ms),
            mute_when_in_background: config.mute_when_in_background,
        }
    }
}

pub struct StateTracker {
    telemetry: Arc<dyn TelemetrySource>,
    probe: Box<dyn LockProbe>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,

    last_sample: Option<TelemetrySample>,
    last_map_id: Option<u32>,
    combat_exit_deadline: Option<Instant>,
    last_probe_at: Option<Instant>,
    locked: bool,

    state: DiscreteState,
    submerged: bool,
    time_of_day: TimeOfDay,

    events: broadcast::Sender<TrackerEvent>,
    snapshot: watch::Sender<TrackerSnapshot>,
}

impl StateTracker {
    pub fn new(telemetry: Arc<dyn TelemetrySource>, settings: TrackerSettings) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let time_of_day = TimeOfDay::from_utc(clock.utc_now());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (snapshot, _) = watch::channel(TrackerSnapshot {
            time_of_day,
            ..TrackerSnapshot::default()
        });
        Self {
            telemetry,
            probe: Box::new(NeverLocked),
            clock,
            settings,
            last_sample: None,
            last_map_id: None,
            combat_exit_deadline: None,
            last_probe_at: None,
            locked: false,
            state: DiscreteState::None,
            submerged: false,
            time_of_day,
            events,
            snapshot,
        }
    }

    /// Tracker configured from module settings, probing the configured sentinel
    pub fn from_config(telemetry: Arc<dyn TelemetrySource>, config: &ModuleConfig) -> Self {
        let tracker = Self::new(telemetry, TrackerSettings::from(config));
        match &config.defeated_lock_file {
            Some(path) => tracker.with_probe(Box::new(FileLockProbe::new(path))),
            None => tracker,
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn LockProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.time_of_day = TimeOfDay::from_utc(clock.utc_now());
        self.clock = clock;
        self
    }

    /// Typed event stream; dropping the receiver unsubscribes
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Latest snapshot, updated every tick
    pub fn watch(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn current_state(&self) -> DiscreteState {
        self.state
    }

    pub fn is_submerged(&self) -> bool {
        self.submerged
    }

    pub fn time_of_day(&self) -> TimeOfDay {
        self.time_of_day
    }

    /// Sample telemetry once and update state
    pub fn tick(&mut self) -> TrackerSnapshot {
        let now = self.clock.now();
        let sample = self.read_telemetry();

        self.update_orthogonal(&sample);
        self.evaluate(&sample, now);

        let snapshot = TrackerSnapshot {
            state: self.state,
            submerged: self.submerged,
            time_of_day: self.time_of_day,
            mount: sample.mount,
            map_kind: sample.map_kind,
            camera_z: sample.camera_z,
            focused: sample.focused,
            process_id: sample.process_id,
        };
        self.snapshot.send_replace(snapshot.clone());
        snapshot
    }

    /// Tick forever at `interval`
    pub async fn run(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick();
        }
    }

    fn read_telemetry(&mut self) -> TelemetrySample {
        match self.telemetry.sample() {
            Some(sample) => {
                self.last_sample = Some(sample.clone());
                sample
            }
            None => {
                debug!("telemetry read failed, keeping last sample");
                self.last_sample.clone().unwrap_or_default()
            }
        }
    }

    /// Submerged and day cycle are not debounced
    fn update_orthogonal(&mut self, sample: &TelemetrySample) {
        let submerged = sample.process_running && sample.in_game && sample.is_submerged();
        if submerged != self.submerged {
            self.submerged = submerged;
            debug!(submerged, "submerged changed");
            self.publish(TrackerEvent::SubmergedChanged { submerged });
        }

        let time_of_day = TimeOfDay::from_utc(self.clock.utc_now());
        if time_of_day != self.time_of_day {
            self.time_of_day = time_of_day;
            debug!(%time_of_day, "day cycle changed");
            self.publish(TrackerEvent::DayCycleChanged { time_of_day });
        }
    }

    fn evaluate(&mut self, sample: &TelemetrySample, now: Instant) {
        if !sample.process_running || !sample.in_game {
            self.reset_timers();
            self.set_state(DiscreteState::None);
            return;
        }

        let map_changed = self.last_map_id.is_some_and(|id| id != sample.map_id);
        self.last_map_id = Some(sample.map_id);
        if map_changed {
            self.reset_timers();
            self.set_state(DiscreteState::None);
            return;
        }

        if !sample.focused && self.settings.mute_when_in_background {
            self.reset_timers();
            self.set_state(DiscreteState::StandBy);
            return;
        }

        if self.probe_lock(now) {
            self.combat_exit_deadline = None;
            self.set_state(DiscreteState::Defeated);
            return;
        }
        if self.state == DiscreteState::Defeated {
            self.set_state(DiscreteState::StandBy);
            return;
        }

        if sample.in_combat {
            self.combat_exit_deadline = None;
            self.set_state(DiscreteState::Battle);
            return;
        }
        if self.state == DiscreteState::Battle {
            match self.combat_exit_deadline {
                None => {
                    let hold = if sample.map_kind.uses_long_combat_exit() {
                        self.settings.combat_exit_long
                    } else {
                        self.settings.combat_exit_short
                    };
                    debug!(?hold, "combat ended, holding battle state");
                    self.combat_exit_deadline = Some(now + hold);
                }
                Some(deadline) if now >= deadline => {
                    self.combat_exit_deadline = None;
                    self.set_state(DiscreteState::StandBy);
                }
                Some(_) => {}
            }
            return;
        }

        let mount_eligible =
            sample.mount.is_some() && sample.map_kind.allows_mount(sample.map_id);
        if mount_eligible {
            self.set_state(DiscreteState::Mounted);
            return;
        }
        if self.state == DiscreteState::Mounted {
            self.set_state(DiscreteState::StandBy);
            return;
        }

        if sample.map_kind.is_competitive() {
            self.set_state(DiscreteState::Competitive);
            return;
        }
        if self.state == DiscreteState::Competitive {
            self.set_state(DiscreteState::StandBy);
            return;
        }

        if self.state.is_silent() {
            self.set_state(DiscreteState::Ambient);
        }
    }

    /// Re-probe the sentinel at most once per probe interval
    fn probe_lock(&mut self, now: Instant) -> bool {
        let due = self
            .last_probe_at
            .map_or(true, |at| now.duration_since(at) >= self.settings.lock_probe_interval);
        if due {
            self.last_probe_at = Some(now);
            self.locked = self.probe.is_locked();
        }
        self.locked
    }

    fn reset_timers(&mut self) {
        self.combat_exit_deadline = None;
        self.last_probe_at = None;
        self.locked = false;
    }

    fn set_state(&mut self, to: DiscreteState) {
        if to == self.state {
            return;
        }
        let from = std::mem::replace(&mut self.state, to);
        info!(%from, %to, "state changed");
        self.publish(TrackerEvent::StateChanged { from, to });
    }

    fn publish(&self, event: TrackerEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}
