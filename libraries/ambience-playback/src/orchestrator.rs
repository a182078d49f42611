//! State-driven orchestration
//!
//! Maps tracker events to sessions: picks and resolves tracks, hands off
//! between sessions with a crossfade, ducks the host game while music plays
//! and resumes playback that a fight or a defeat interrupted.
//!
//! The orchestrator is owned by one task. Loads run as separate tasks and
//! report back over a channel; a single-permit semaphore keeps at most one
//! of them in flight, and the permit travels with the result so it is
//! released only once the result has been handled (or dropped).

use crate::ducking::EasedHostVolume;
use crate::error::{PlaybackError, Result};
use crate::selection;
use ambience_core::types::{ContextKey, DiscreteState, MountType, Playlist, TimeOfDay, Track};
use ambience_core::{
    HostDucking, Levels, MetadataResolver, ModuleConfig, PersistenceStore, PipelineFactory,
    PlaybackPipeline, ScheduledTask, Session, SessionSetup,
};
use ambience_state::{TrackerEvent, TrackerSnapshot};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pause before an idle orchestrator tries again after a failed load
const IDLE_RETRY: Duration = Duration::from_secs(5);

/// Everything the orchestrator talks to, injected explicitly
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn PersistenceStore>,
    pub resolver: Arc<dyn MetadataResolver>,
    pub factory: Arc<dyn PipelineFactory>,
    pub ducking: Arc<dyn HostDucking>,
}

/// Playback interrupted by a fight or a defeat
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPlayback {
    pub track: Track,
    pub offset: Duration,
    pub saved_from: DiscreteState,
}

#[derive(Debug, Clone)]
struct Context {
    state: DiscreteState,
    mount: Option<MountType>,
    submerged: bool,
    camera_z: f32,
    time_of_day: TimeOfDay,
    process_id: Option<u32>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            state: DiscreteState::None,
            mount: None,
            submerged: false,
            camera_z: 1.0,
            time_of_day: TimeOfDay::default(),
            process_id: None,
        }
    }
}

struct Outgoing {
    pipeline: Box<dyn PlaybackPipeline>,
    teardown: ScheduledTask,
}

struct LoadResult {
    _permit: OwnedSemaphorePermit,
    key: ContextKey,
    ended_naturally: bool,
    newly_skipped: Vec<String>,
    outcome: Result<Box<dyn PlaybackPipeline>>,
}

pub struct Orchestrator {
    deps: Collaborators,
    config: ModuleConfig,
    context: Context,
    levels: Levels,
    active: Session,
    active_key: Option<ContextKey>,
    outgoing: Vec<Outgoing>,
    saved: Option<SavedPlayback>,
    skipped: HashSet<String>,
    paused: bool,
    load_guard: Arc<Semaphore>,
    results_tx: mpsc::UnboundedSender<LoadResult>,
    results_rx: Option<mpsc::UnboundedReceiver<LoadResult>>,
    retry_after: Option<Instant>,
    host_volume: EasedHostVolume,
}

impl Orchestrator {
    pub fn new(deps: Collaborators, config: ModuleConfig) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let host_volume = EasedHostVolume::new(Arc::clone(&deps.ducking), config.duck_ease());
        Self {
            levels: config.levels(),
            paused: config.paused,
            deps,
            config,
            context: Context::default(),
            active: Session::Idle,
            active_key: None,
            outgoing: Vec::new(),
            saved: None,
            skipped: HashSet::new(),
            load_guard: Arc::new(Semaphore::new(1)),
            results_tx,
            results_rx: Some(results_rx),
            retry_after: None,
            host_volume,
        }
    }

    pub fn active_track(&self) -> Option<&Track> {
        self.active.as_active().map(|p| p.track())
    }

    pub fn is_loading(&self) -> bool {
        self.load_guard.available_permits() == 0
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Sessions still holding a device: the active one plus any fading out
    pub fn live_sessions(&self) -> usize {
        let outgoing = self
            .outgoing
            .iter()
            .filter(|o| !o.teardown.is_finished())
            .count();
        outgoing + usize::from(!self.active.is_idle())
    }

    /// Tracks excluded for the rest of this session
    pub fn skipped(&self) -> &HashSet<String> {
        &self.skipped
    }

    pub fn saved(&self) -> Option<&SavedPlayback> {
        self.saved.as_ref()
    }

    fn current_key(&self) -> Option<ContextKey> {
        ContextKey::for_state(self.context.state, self.context.mount)
    }

    /// Take in the tracker's latest snapshot
    pub fn observe(&mut self, snapshot: &TrackerSnapshot) {
        self.context.mount = snapshot.mount;
        self.context.time_of_day = snapshot.time_of_day;

        if (snapshot.camera_z - self.context.camera_z).abs() > f32::EPSILON {
            self.context.camera_z = snapshot.camera_z;
            if let Some(active) = self.active.as_active() {
                active.set_camera_depth(snapshot.camera_z);
            }
        }

        if snapshot.process_id != self.context.process_id {
            self.context.process_id = snapshot.process_id;
            self.update_ducking();
        }
    }

    pub fn handle_event(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::StateChanged { to, .. } if to == self.context.state => {
                debug!(%to, "state already applied");
            }
            TrackerEvent::StateChanged { from, to } => self.on_state_changed(from, to),
            TrackerEvent::SubmergedChanged { submerged } => {
                self.context.submerged = submerged;
                if let Some(active) = self.active.as_active() {
                    active.set_submerged(submerged);
                }
            }
            TrackerEvent::DayCycleChanged { time_of_day } => {
                debug!(%time_of_day, "day cycle changed");
                self.context.time_of_day = time_of_day;
            }
        }
    }

    pub fn on_state_changed(&mut self, from: DiscreteState, to: DiscreteState) {
        info!(%from, %to, "state changed");
        self.context.state = to;

        if to.is_silent() {
            self.stop_active(false);
            return;
        }

        if self.config.play_to_completion && to != DiscreteState::Defeated {
            if let Some(active) = self.active.as_active() {
                if !active.has_ended() {
                    debug!(track = %active.track().external_id, "playing to completion");
                    return;
                }
            }
        }

        if from.is_calm() && to.is_interruptive() {
            self.save_current(from);
        }

        self.load_for_context();
    }

    /// Resume saved playback or pick a new track for the current state
    fn load_for_context(&mut self) {
        if self.paused {
            return;
        }
        if self.is_loading() {
            debug!("load in flight, request dropped");
            return;
        }

        let resume = if self.context.state.is_calm() {
            self.saved.take()
        } else {
            None
        };
        if let (Some(saved), Some(active)) = (&resume, self.active.as_active()) {
            if active.track().external_id == saved.track.external_id {
                debug!(track = %saved.track.external_id, "interrupted track still playing");
                return;
            }
        }

        if let Err(e) = self.request_load(resume, false) {
            debug!(error = %e, "load not started");
        }
    }

    fn save_current(&mut self, from: DiscreteState) {
        let Some(active) = self.active.as_active() else {
            return;
        };
        if active.has_ended() || active.is_disposing() {
            return;
        }
        let saved = SavedPlayback {
            track: active.track().clone(),
            offset: active.position(),
            saved_from: from,
        };
        debug!(track = %saved.track.external_id, offset = ?saved.offset, "saved interrupted playback");
        self.saved = Some(saved);
    }

    /// Start a load for the current context; dropped while another is in flight
    fn request_load(&mut self, resume: Option<SavedPlayback>, ended_naturally: bool) -> Result<()> {
        let Some(key) = self.current_key() else {
            return Ok(());
        };
        let permit = Arc::clone(&self.load_guard)
            .try_acquire_owned()
            .map_err(|_| PlaybackError::Busy)?;

        // Without a crossfade the old session must be gone before a new one exists
        let wait_for = if self.config.crossfade {
            None
        } else {
            self.active.take().map(|pipeline| {
                self.active_key = None;
                self.retire(pipeline, ended_naturally)
            })
        };

        let job = LoadJob {
            deps: self.deps.clone(),
            key,
            time_of_day: self.context.time_of_day,
            resume,
            excluded: self.skipped.clone(),
            setup: self.session_setup(),
            fade_in: self.config.fade_in(),
            max_attempts: self.config.max_consecutive_failures.max(1),
            wait_for,
        };
        debug!(%key, "load started");

        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let mut newly_skipped = Vec::new();
            let outcome = job.run(&mut newly_skipped).await;
            let _ = results.send(LoadResult {
                _permit: permit,
                key,
                ended_naturally,
                newly_skipped,
                outcome,
            });
        });
        Ok(())
    }

    fn session_setup(&self) -> SessionSetup {
        SessionSetup {
            levels: self.levels,
            submerged: self.context.submerged,
            camera_z: self.context.camera_z,
            end_offset: self.config.end_of_stream_offset(),
            device: self.config.output_device.clone(),
        }
    }

    fn handle_result(&mut self, result: LoadResult) {
        let LoadResult {
            _permit: permit,
            key,
            ended_naturally,
            newly_skipped,
            outcome,
        } = result;
        drop(permit);
        self.skipped.extend(newly_skipped);

        match outcome {
            Ok(pipeline) => {
                if self.paused {
                    debug!(%key, "discarding load while paused");
                    self.retire(pipeline, false);
                    return;
                }
                if self.current_key() != Some(key) {
                    debug!(%key, "discarding load for a stale context");
                    self.retire(pipeline, false);
                    self.load_for_context();
                    return;
                }

                pipeline.set_submerged(self.context.submerged);
                pipeline.set_camera_depth(self.context.camera_z);
                if let Some(previous) = self.active.take() {
                    self.retire(previous, ended_naturally);
                }

                info!(
                    %key,
                    track = %pipeline.track().external_id,
                    title = %pipeline.track().title,
                    "now playing"
                );
                self.active = Session::Active(pipeline);
                self.active_key = Some(key);
                self.retry_after = None;
                self.update_ducking();
            }
            Err(e) => {
                warn!(%key, error = %e, "load failed");
                self.retry_after = Some(Instant::now() + IDLE_RETRY);
                // Music from another context should not outlive a failed switch
                if self.current_key() == Some(key) && self.active_key != Some(key) {
                    self.stop_active(false);
                    return;
                }
                // Nor should a drained session keep the host ducked
                if self.active.as_active().is_some_and(|active| active.has_ended()) {
                    self.stop_active(true);
                }
            }
        }
    }

    /// Fade a session out and keep it until its teardown has run
    fn retire(&mut self, pipeline: Box<dyn PlaybackPipeline>, ended_naturally: bool) -> ScheduledTask {
        // Only one session may overlap the incoming one
        for older in &self.outgoing {
            older.teardown.run_now();
        }
        let teardown = pipeline.dispose(self.config.fade_out(ended_naturally));
        self.outgoing.push(Outgoing {
            pipeline,
            teardown: teardown.clone(),
        });
        teardown
    }

    fn stop_active(&mut self, ended_naturally: bool) {
        if let Some(pipeline) = self.active.take() {
            debug!(track = %pipeline.track().external_id, "stopping playback");
            self.retire(pipeline, ended_naturally);
        }
        self.active_key = None;
        self.update_ducking();
    }

    fn update_ducking(&mut self) {
        let playing = !self.active.is_idle() && !self.paused;
        let target = if playing {
            self.config.host_duck_volume
        } else {
            1.0
        };
        self.host_volume.set_target(self.context.process_id, target);
    }

    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        info!("playback paused");
        self.paused = true;
        if let Some(active) = self.active.as_active() {
            active.pause();
        }
        self.update_ducking();
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        info!("playback resumed");
        self.paused = false;
        if let Some(active) = self.active.as_active() {
            active.resume();
        }
        self.update_ducking();
    }

    pub fn set_levels(&mut self, levels: Levels) {
        self.levels = levels;
        if let Some(active) = self.active.as_active() {
            active.set_levels(levels);
        }
        for outgoing in &self.outgoing {
            outgoing.pipeline.set_levels(levels);
        }
    }

    /// Periodic housekeeping
    pub fn tick(&mut self) {
        self.drain_results();
        self.outgoing.retain(|o| !o.teardown.is_finished());

        let Some(active) = self.active.as_active() else {
            self.load_when_idle();
            return;
        };

        if let Some(failure) = active.take_failure() {
            warn!(track = %active.track().external_id, %failure, "session failed, advancing");
            self.stop_active(false);
            self.load_when_idle();
            return;
        }

        let ended = active.poll_ended() || active.has_ended();
        if ended && !self.paused && !self.is_loading() && !self.backing_off() {
            debug!(track = %active.track().external_id, "track ending, loading next");
            if let Err(e) = self.request_load(None, true) {
                debug!(error = %e, "next track load not started");
            }
        }
    }

    fn load_when_idle(&mut self) {
        if self.paused || self.is_loading() || self.backing_off() {
            return;
        }
        if self.current_key().is_some() {
            if let Err(e) = self.request_load(None, false) {
                debug!(error = %e, "idle load not started");
            }
        }
    }

    fn backing_off(&self) -> bool {
        self.retry_after.is_some_and(|at| Instant::now() < at)
    }

    fn drain_results(&mut self) {
        let Some(mut results) = self.results_rx.take() else {
            return;
        };
        while let Ok(result) = results.try_recv() {
            self.handle_result(result);
        }
        self.results_rx = Some(results);
    }

    /// Handle load results until no load is in flight
    pub async fn settle(&mut self) {
        let Some(mut results) = self.results_rx.take() else {
            return;
        };
        while self.is_loading() {
            match results.recv().await {
                Some(result) => self.handle_result(result),
                None => break,
            }
        }
        self.results_rx = Some(results);
    }

    /// Stop playback, restore the host volume and wait for every teardown
    pub async fn shutdown(&mut self) {
        self.stop_active(false);
        for outgoing in self.outgoing.drain(..) {
            outgoing.teardown.wait().await;
        }
        self.host_volume.wait().await;
    }

    /// Drive the orchestrator from tracker output until the event stream closes
    ///
    /// `events` must be subscribed before the caller hands over `snapshots`;
    /// events buffered behind the initial resync are applied after it.
    pub async fn run(
        mut self,
        mut events: broadcast::Receiver<TrackerEvent>,
        snapshots: watch::Receiver<TrackerSnapshot>,
    ) {
        let Some(mut results) = self.results_rx.take() else {
            return;
        };
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Stream URLs from an earlier run have expired
        if let Err(e) = self.deps.store.clear_resolved_urls().await {
            warn!(error = %e, "failed to clear resolved stream urls");
        }
        self.resync(&snapshots);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        let snapshot = snapshots.borrow().clone();
                        self.observe(&snapshot);
                        self.handle_event(event);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "tracker events lagged, resyncing");
                        self.resync(&snapshots);
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(result) = results.recv() => self.handle_result(result),
                _ = interval.tick() => {
                    let snapshot = snapshots.borrow().clone();
                    self.observe(&snapshot);
                    self.tick();
                }
            }
        }

        info!("tracker closed, orchestrator stopping");
        self.results_rx = Some(results);
        self.shutdown().await;
    }

    fn resync(&mut self, snapshots: &watch::Receiver<TrackerSnapshot>) {
        let snapshot = snapshots.borrow().clone();
        self.observe(&snapshot);
        if snapshot.submerged != self.context.submerged {
            self.handle_event(TrackerEvent::SubmergedChanged {
                submerged: snapshot.submerged,
            });
        }
        if snapshot.state != self.context.state {
            self.on_state_changed(self.context.state, snapshot.state);
        }
    }
}

/// One load attempt chain, run off the orchestrator task
struct LoadJob {
    deps: Collaborators,
    key: ContextKey,
    time_of_day: TimeOfDay,
    resume: Option<SavedPlayback>,
    excluded: HashSet<String>,
    setup: SessionSetup,
    fade_in: Duration,
    max_attempts: u32,
    wait_for: Option<ScheduledTask>,
}

impl LoadJob {
    async fn run(mut self, newly_skipped: &mut Vec<String>) -> Result<Box<dyn PlaybackPipeline>> {
        if let Some(teardown) = self.wait_for.take() {
            teardown.wait().await;
        }

        let playlist = match self.deps.store.get_playlist(self.key).await? {
            Some(playlist) if playlist.enabled && !playlist.is_empty() => playlist,
            _ => return Err(PlaybackError::NoCandidate(self.key)),
        };

        let mut resume = self.resume.take().and_then(|saved| resumable(&playlist, saved));
        let mut last_error = PlaybackError::NoCandidate(self.key);

        for attempt in 1..=self.max_attempts {
            let (track, offset) = match resume.take() {
                Some((track, offset)) => (track, Some(offset)),
                None => match selection::choose(&playlist, self.time_of_day, &self.excluded) {
                    Some(track) => (track, None),
                    None => break,
                },
            };
            debug!(attempt, track = %track.external_id, ?offset, "trying track");

            let track = match self.ensure_resolved(track, newly_skipped).await {
                Ok(track) => track,
                Err(e) => {
                    last_error = e;
                    continue;
                }
            };

            let Session::Active(pipeline) = self.deps.factory.open(&track, self.setup.clone()).await
            else {
                self.excluded.insert(track.external_id.clone());
                last_error = PlaybackError::Pipeline(format!("no output session for {}", track.external_id));
                continue;
            };

            if let Some(offset) = offset {
                pipeline.seek(offset);
            }
            if pipeline.play(self.fade_in).await {
                return Ok(pipeline);
            }

            pipeline.dispose(Duration::ZERO);
            self.excluded.insert(track.external_id.clone());
            last_error = PlaybackError::Pipeline(format!("{} failed to start", track.external_id));
        }

        Err(last_error)
    }

    async fn ensure_resolved(&mut self, mut track: Track, newly_skipped: &mut Vec<String>) -> Result<Track> {
        if track.is_resolved() {
            return Ok(track);
        }

        match self.deps.resolver.resolve(&track.page_url).await {
            Ok(meta) => {
                track.apply_resolution(meta);
                if let Err(e) = self.deps.store.upsert_track(track.clone()).await {
                    warn!(track = %track.external_id, error = %e, "failed to store resolved track");
                }
                Ok(track)
            }
            Err(error) => {
                let id = track.external_id.clone();
                self.excluded.insert(id.clone());

                if error.is_rate_limited() {
                    info!(track = %id, "resolver rate limited, track stays eligible");
                } else {
                    warn!(track = %id, %error, "resolution failed");
                }
                if error.is_persistent() {
                    track.last_error = Some(error.clone());
                    if let Err(e) = self.deps.store.upsert_track(track).await {
                        warn!(track = %id, error = %e, "failed to store resolution error");
                    }
                }
                if error.skips_track() {
                    newly_skipped.push(id.clone());
                }
                Err(PlaybackError::Resolution { track: id, source: error })
            }
        }
    }
}

/// The saved track and offset, if the playlist still has it and the offset fits
fn resumable(playlist: &Playlist, saved: SavedPlayback) -> Option<(Track, Duration)> {
    let Some(track) = playlist
        .tracks
        .iter()
        .find(|t| t.external_id == saved.track.external_id)
    else {
        debug!(track = %saved.track.external_id, "saved track not in this playlist");
        return None;
    };
    if saved.offset > track.duration {
        debug!(offset = ?saved.offset, duration = ?track.duration, "saved offset out of range");
        return None;
    }
    Some((track.clone(), saved.offset))
}
