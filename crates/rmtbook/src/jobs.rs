//! Background jobs.
//!
//! Each [`JobKind`] runs on its own tokio interval until its [`JobHandle`]
//! is stopped. The same [`run_job_once`] entry point backs the loops, the
//! `jobs run` command, and the RMT's on-demand endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::notify::Mailer;
use crate::scheduling::{reset_stale_rescheduling, send_due_reminders};
use crate::storage::Storage;

/// A periodic job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Put abandoned rescheduling attempts back to their previous status.
    ResetStaleRescheduling,
    /// Email patients about upcoming booked appointments.
    SendReminders,
}

impl JobKind {
    /// Every job, in the order the loops start.
    pub const ALL: [Self; 2] = [Self::ResetStaleRescheduling, Self::SendReminders];
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResetStaleRescheduling => write!(f, "reset_stale_rescheduling"),
            Self::SendReminders => write!(f, "send_reminders"),
        }
    }
}

impl std::str::FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "reset_stale_rescheduling" => Ok(Self::ResetStaleRescheduling),
            "send_reminders" => Ok(Self::SendReminders),
            _ => Err(Error::not_found("job", s)),
        }
    }
}

/// What one job run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Which job ran.
    pub kind: JobKind,
    /// When it ran.
    pub ran_at: DateTime<Utc>,
    /// Appointments changed or emailed.
    pub affected: usize,
    /// Human-readable summary.
    pub summary: String,
}

/// Shared dependencies of the jobs.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Practice database.
    pub storage: Arc<Mutex<Storage>>,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Outgoing mail.
    pub mailer: Arc<dyn Mailer>,
}

/// Run one job to completion.
///
/// # Errors
///
/// Returns an error if the job's storage work fails.
pub async fn run_job_once(kind: JobKind, ctx: &JobContext, now: DateTime<Utc>) -> Result<JobReport> {
    let (affected, summary) = match kind {
        JobKind::ResetStaleRescheduling => {
            let reset = {
                let storage = ctx.storage.lock().await;
                reset_stale_rescheduling(&storage, &ctx.config, now)?
            };
            (
                reset.len(),
                format!("reset {} stale rescheduling appointment(s)", reset.len()),
            )
        }
        JobKind::SendReminders => {
            let summary =
                send_due_reminders(&ctx.storage, &ctx.config, ctx.mailer.as_ref(), now).await?;
            (
                summary.sent,
                format!(
                    "sent {} of {} due reminder(s), {} failed",
                    summary.sent, summary.due, summary.failed
                ),
            )
        }
    };

    debug!(job = %kind, affected, "Job finished");
    Ok(JobReport {
        kind,
        ran_at: now,
        affected,
        summary,
    })
}

/// A handle to stop a running job loop.
///
/// Cheap to clone; clones share the same stop signal.
#[derive(Debug, Clone)]
pub struct JobHandle {
    kind: JobKind,
    stop_signal: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl JobHandle {
    /// Create a handle for a job.
    #[must_use]
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            stop_signal: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// The job this handle controls.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Signal the loop to stop after its current run.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    async fn stopped(&self) {
        if !self.should_stop() {
            self.wake.notified().await;
        }
    }
}

/// Start a loop running `kind` every `period` until the returned handle is stopped.
///
/// The first run happens immediately.
#[must_use]
pub fn spawn_job_loop(kind: JobKind, ctx: JobContext, period: Duration) -> (JobHandle, JoinHandle<()>) {
    let handle = JobHandle::new(kind);
    let loop_handle = handle.clone();

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = %kind, period_secs = period.as_secs(), "Job loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = loop_handle.stopped() => break,
            }
            if loop_handle.should_stop() {
                break;
            }
            match run_job_once(kind, &ctx, Utc::now()).await {
                Ok(report) if report.affected > 0 => info!(job = %kind, "{}", report.summary),
                Ok(_) => {}
                Err(e) => error!(job = %kind, error = %e, "Job failed"),
            }
        }

        info!(job = %kind, "Job loop stopped");
    });

    (handle, task)
}

/// The set of running job loops.
#[derive(Debug, Default)]
pub struct JobManager {
    handles: Vec<JobHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl JobManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a loop for every job kind.
    #[must_use]
    pub fn start_all(ctx: &JobContext, period: Duration) -> Self {
        let mut manager = Self::new();
        for kind in JobKind::ALL {
            let (handle, task) = spawn_job_loop(kind, ctx.clone(), period);
            manager.add(handle, task);
        }
        manager
    }

    /// Track a running loop.
    pub fn add(&mut self, handle: JobHandle, task: JoinHandle<()>) {
        self.handles.push(handle);
        self.tasks.push(task);
    }

    /// Signal every loop to stop.
    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Stop every loop and wait for them to exit.
    pub async fn shutdown(self) {
        self.stop_all();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Job loop panicked");
            }
        }
    }

    /// Number of managed loops.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handles.len()
    }

    /// Whether any loop has not been signaled to stop.
    #[must_use]
    pub fn any_running(&self) -> bool {
        self.handles.iter().any(|h| !h.should_stop())
    }
}
