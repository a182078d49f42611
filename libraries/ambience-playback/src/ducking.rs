//! Eased host-game volume
//!
//! The game's own output is lowered while music plays and restored
//! afterwards. Level changes are always eased: a new target cancels the
//! running ease and starts from wherever the level currently is.

use ambience_core::HostDucking;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const STEP: Duration = Duration::from_millis(50);

pub struct EasedHostVolume {
    ducking: Arc<dyn HostDucking>,
    ease: Duration,
    process_id: Option<u32>,
    target: Option<f32>,
    /// Last level written to the host
    level: Arc<Mutex<f32>>,
    ease_task: Option<JoinHandle<()>>,
}

impl EasedHostVolume {
    pub fn new(ducking: Arc<dyn HostDucking>, ease: Duration) -> Self {
        Self {
            ducking,
            ease,
            process_id: None,
            target: None,
            level: Arc::new(Mutex::new(1.0)),
            ease_task: None,
        }
    }

    pub fn target(&self) -> Option<f32> {
        self.target
    }

    /// Wait for the running ease, if any, to reach its target
    pub async fn wait(&mut self) {
        if let Some(task) = self.ease_task.take() {
            let _ = task.await;
        }
    }

    /// Ease `process_id` towards `target`; repeated targets are ignored
    pub fn set_target(&mut self, process_id: Option<u32>, target: f32) {
        let target = target.clamp(0.0, 1.0);
        if self.target == Some(target) && self.process_id == process_id {
            return;
        }
        if self.process_id != process_id {
            // Fresh process, its level is unknown to us
            *self.level.lock().unwrap_or_else(PoisonError::into_inner) = 1.0;
        }
        self.target = Some(target);
        self.process_id = process_id;

        if let Some(task) = self.ease_task.take() {
            task.abort();
        }
        let Some(pid) = process_id else {
            return;
        };

        let last = *self.level.lock().unwrap_or_else(PoisonError::into_inner);
        let start = self.ducking.volume(pid).unwrap_or(last);
        debug!(pid, from = start, to = target, "easing host volume");

        let ducking = Arc::clone(&self.ducking);
        let level = Arc::clone(&self.level);
        let steps = (self.ease.as_millis() / STEP.as_millis()).max(1) as u32;
        self.ease_task = Some(tokio::spawn(async move {
            for i in 1..=steps {
                if steps > 1 {
                    tokio::time::sleep(STEP).await;
                }
                let value = start + (target - start) * (i as f32 / steps as f32);
                if let Err(e) = ducking.set_volume(pid, value) {
                    warn!(pid, error = %e, "failed to set host volume");
                    return;
                }
                *level.lock().unwrap_or_else(PoisonError::into_inner) = value;
            }
        }));
    }
}

impl Drop for EasedHostVolume {
    fn drop(&mut self) {
        if let Some(task) = self.ease_task.take() {
            task.abort();
        }
    }
}
