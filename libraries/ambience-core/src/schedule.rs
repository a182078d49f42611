//! Cancellable delayed jobs
//!
//! Used for deferred teardown after a fade-out. The job runs on the tokio
//! runtime once its deadline passes; handles can run it early, cancel it, or
//! await its completion. Dropping every handle does not cancel the job.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pending,
    RunNow,
    Cancel,
}

/// Handle to a job scheduled with [`ScheduledTask::schedule`]
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    control: Arc<watch::Sender<Command>>,
    done: watch::Receiver<bool>,
}

impl ScheduledTask {
    /// Run `job` after `delay` on the current tokio runtime.
    ///
    /// Outside a runtime the job runs on a plain thread and ignores
    /// [`cancel`](Self::cancel) and [`run_now`](Self::run_now).
    pub fn schedule<F>(delay: Duration, job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (control_tx, mut control_rx) = watch::channel(Command::Pending);
        let (done_tx, done_rx) = watch::channel(false);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                job();
                let _ = done_tx.send(true);
            });
            return Self {
                control: Arc::new(control_tx),
                done: done_rx,
            };
        };

        handle.spawn(async move {
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);

            let run = loop {
                tokio::select! {
                    () = &mut sleep => break true,
                    changed = control_rx.changed() => {
                        if changed.is_err() {
                            // All handles gone
                            (&mut sleep).await;
                            break true;
                        }
                        match *control_rx.borrow_and_update() {
                            Command::RunNow => break true,
                            Command::Cancel => break false,
                            Command::Pending => {}
                        }
                    }
                }
            };

            if run {
                job();
            }
            let _ = done_tx.send(true);
        });

        Self {
            control: Arc::new(control_tx),
            done: done_rx,
        }
    }

    /// A task that has already completed
    pub fn completed() -> Self {
        let (control_tx, _) = watch::channel(Command::Cancel);
        let (_, done_rx) = watch::channel(true);
        Self {
            control: Arc::new(control_tx),
            done: done_rx,
        }
    }

    /// Run the job immediately instead of waiting for the deadline
    pub fn run_now(&self) {
        self.control.send_replace(Command::RunNow);
    }

    /// Prevent the job from running if it has not started yet
    pub fn cancel(&self) {
        self.control.send_replace(Command::Cancel);
    }

    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the job ran or was cancelled
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // Sender lives until the task exits, after which the value is final
        let _ = done.wait_for(|finished| *finished).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let job_count = Arc::clone(&count);
        (count, move || {
            job_count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_deadline() {
        let (count, job) = counter();
        let task = ScheduledTask::schedule(Duration::from_secs(2), job);

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!task.is_finished());

        task.wait().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_skips_job() {
        let (count, job) = counter();
        let task = ScheduledTask::schedule(Duration::from_secs(2), job);
        task.cancel();
        task.wait().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now() {
        let (count, job) = counter();
        let task = ScheduledTask::schedule(Duration::from_secs(60), job);
        task.run_now();
        task.wait().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_still_runs() {
        let (count, job) = counter();
        drop(ScheduledTask::schedule(Duration::from_secs(1), job));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_is_finished() {
        let task = ScheduledTask::completed();
        assert!(task.is_finished());
        task.wait().await;
    }
}
