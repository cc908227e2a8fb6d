//! In-process job scheduler.
//!
//! Each configured job gets a tick loop that sleeps until the trigger's next
//! fire time and then spawns the job's run as its own task, so a slow run
//! never delays the next tick. Shutdown stops the tick loops only; runs
//! already in flight finish on their own.

use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use sportstream_bus::wait_for_shutdown;
use sportstream_core::duration::parse_duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{JobConfig, JobKind};
use crate::error::SchedulerError;
use crate::jobs::Job;

pub type JobId = Uuid;

/// Public view of a scheduled job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

// ── Triggers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Trigger {
    Interval(Duration),
    Cron(Box<Schedule>),
}

impl Trigger {
    pub fn from_config(job: &str, config: &JobConfig) -> Result<Self, SchedulerError> {
        let invalid = |reason: String| SchedulerError::InvalidTrigger {
            job: job.to_string(),
            reason,
        };
        match config.kind {
            JobKind::Duration => {
                let interval = parse_duration(&config.interval).map_err(|e| invalid(e.to_string()))?;
                if interval.is_zero() {
                    return Err(invalid("interval must be greater than zero".to_string()));
                }
                Ok(Self::Interval(interval))
            }
            JobKind::Cron => parse_cron(&config.interval, config.use_seconds)
                .map(|s| Self::Cron(Box::new(s)))
                .map_err(|e| invalid(format!("invalid cron '{}': {e}", config.interval))),
        }
    }

    /// Delay until the next fire and the wall-clock time it lands on.
    fn next_fire(&self, now: DateTime<Utc>) -> Option<(Duration, DateTime<Utc>)> {
        match self {
            Self::Interval(interval) => {
                let at = chrono::Duration::from_std(*interval).ok().map(|d| now + d)?;
                Some((*interval, at))
            }
            Self::Cron(schedule) => {
                let at = schedule.after(&now).next()?;
                let delay = (at - now).to_std().unwrap_or(Duration::ZERO);
                Some((delay, at))
            }
        }
    }
}

/// Parse a cron expression. Without `with_seconds` the expression is the
/// standard 5-field form and a `0` seconds field is prepended.
pub fn parse_cron(expr: &str, with_seconds: bool) -> Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if !with_seconds && parts.len() == 5 {
        let six_field = format!("0 {}", parts.join(" "));
        Schedule::from_str(&six_field)
    } else {
        Schedule::from_str(expr.trim())
    }
}

// ── Scheduled job ────────────────────────────────────────────────────

struct ScheduledJob {
    id: JobId,
    trigger: Trigger,
    job: Arc<dyn Job>,
    /// Tags from the job's configuration.
    tags: Vec<String>,
    last_run: RwLock<Option<DateTime<Utc>>>,
    next_run: RwLock<Option<DateTime<Utc>>>,
}

impl ScheduledJob {
    fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            name: self.job.name().to_string(),
            last_run: *self.last_run.read().unwrap_or_else(|p| p.into_inner()),
            next_run: *self.next_run.read().unwrap_or_else(|p| p.into_inner()),
            tags: self.tags(),
        }
    }

    /// Configured tags followed by any the job reports itself, without repeats.
    fn tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        for tag in self.job.tags() {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// Start one run in its own task.
    fn fire(&self) {
        *self.last_run.write().unwrap_or_else(|p| p.into_inner()) = Some(Utc::now());
        let job = Arc::clone(&self.job);
        tokio::spawn(async move { job.run().await });
    }

    fn set_next_run(&self, at: Option<DateTime<Utc>>) {
        *self.next_run.write().unwrap_or_else(|p| p.into_inner()) = at;
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

/// Tick loop handles plus the started flag. Registration and start both
/// hold this lock so a job never gets two loops.
#[derive(Default)]
struct TickLoops {
    started: bool,
    handles: Vec<JoinHandle<()>>,
}

pub struct Scheduler {
    jobs: RwLock<Vec<Arc<ScheduledJob>>>,
    tick_loops: Mutex<TickLoops>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            jobs: RwLock::new(Vec::new()),
            tick_loops: Mutex::new(TickLoops::default()),
            shutdown_tx,
        }
    }

    /// Register `job` with the trigger described by `config`. A disabled job
    /// is logged and skipped (`Ok(None)`).
    pub async fn configure(
        &self,
        job: Arc<dyn Job>,
        config: &JobConfig,
    ) -> Result<Option<JobId>, SchedulerError> {
        let name = job.name().to_string();
        if !config.enabled {
            info!(job = %name, "job disabled, not scheduling");
            return Ok(None);
        }

        let trigger = Trigger::from_config(&name, config)?;
        let scheduled = Arc::new(ScheduledJob {
            id: Uuid::new_v4(),
            trigger,
            job,
            tags: config.tags.clone(),
            last_run: RwLock::new(None),
            next_run: RwLock::new(None),
        });
        let id = scheduled.id;
        info!(job = %name, id = %id, kind = ?config.kind, interval = %config.interval, "job scheduled");

        let mut loops = self.tick_loops.lock().await;
        self.jobs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(Arc::clone(&scheduled));
        if loops.started {
            loops.handles.push(self.spawn_tick_loop(scheduled));
        }
        Ok(Some(id))
    }

    /// Start ticking every configured job.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut loops = self.tick_loops.lock().await;
        if loops.started {
            return Err(SchedulerError::AlreadyStarted);
        }
        loops.started = true;
        let jobs: Vec<_> = self.jobs.read().unwrap_or_else(|p| p.into_inner()).clone();
        for job in jobs {
            loops.handles.push(self.spawn_tick_loop(job));
        }
        info!(jobs = loops.handles.len(), "scheduler started");
        Ok(())
    }

    /// Stop all tick loops and wait for them to exit. Runs already in
    /// progress are not interrupted.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<_> = self.tick_loops.lock().await.handles.drain(..).collect();

        let mut failures = Vec::new();
        for handle in handles {
            if let Err(e) = handle.await {
                failures.push(e.to_string());
            }
        }
        if !failures.is_empty() {
            return Err(SchedulerError::Shutdown(failures.join("; ")));
        }
        info!("scheduler stopped");
        Ok(())
    }

    /// Snapshot of every registered job.
    pub fn list_jobs(&self) -> Result<Vec<JobInfo>, SchedulerError> {
        let jobs = self.jobs.read().unwrap_or_else(|p| p.into_inner());
        if jobs.is_empty() {
            return Err(SchedulerError::NotFound("no jobs scheduled".to_string()));
        }
        Ok(jobs.iter().map(|j| j.info()).collect())
    }

    /// Run the job with `id` immediately, outside its schedule.
    pub fn run_now(&self, id: JobId) -> Result<JobInfo, SchedulerError> {
        let job = self
            .jobs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;

        info!(job = %job.job.name(), id = %id, "running job on demand");
        job.fire();
        Ok(job.info())
    }

    fn spawn_tick_loop(&self, job: Arc<ScheduledJob>) -> JoinHandle<()> {
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let Some((delay, at)) = job.trigger.next_fire(Utc::now()) else {
                    warn!(job = %job.job.name(), "trigger has no upcoming fire time, stopping");
                    job.set_next_run(None);
                    break;
                };
                job.set_next_run(Some(at));

                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    _ = tokio::time::sleep(delay) => {
                        job.fire();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_config(kind: JobKind, interval: &str, use_seconds: bool) -> JobConfig {
        JobConfig {
            enabled: true,
            kind,
            interval: interval.to_string(),
            use_seconds,
            external_address: "http://localhost".to_string(),
            retry: Default::default(),
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_parse_cron_five_field_auto_prefix() {
        let schedule = parse_cron("0 * * * *", false).unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%M:%S").to_string(), "00:00");
    }

    #[test]
    fn test_parse_cron_with_seconds() {
        let schedule = parse_cron("*/10 * * * * *", true).unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
    }

    #[test]
    fn test_parse_cron_too_few_fields() {
        assert!(parse_cron("* * * *", true).is_err());
        assert!(parse_cron("* * * *", false).is_err());
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron", false).is_err());
    }

    #[test]
    fn test_trigger_from_duration() {
        let trigger = Trigger::from_config("poller", &job_config(JobKind::Duration, "30s", false)).unwrap();
        assert!(matches!(trigger, Trigger::Interval(d) if d == Duration::from_secs(30)));
    }

    #[test]
    fn test_trigger_rejects_zero_interval() {
        let err = Trigger::from_config("poller", &job_config(JobKind::Duration, "0s", false)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTrigger { .. }));
    }

    struct IdleJob;

    #[async_trait::async_trait]
    impl Job for IdleJob {
        fn name(&self) -> &str {
            "idle"
        }

        async fn run(&self) {}
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_configure_racing_start_spawns_one_loop() {
        for _ in 0..100 {
            let scheduler = Arc::new(Scheduler::new());
            let configure = {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move {
                    scheduler
                        .configure(Arc::new(IdleJob), &job_config(JobKind::Duration, "1h", false))
                        .await
                })
            };
            let start = {
                let scheduler = Arc::clone(&scheduler);
                tokio::spawn(async move { scheduler.start().await })
            };
            configure.await.unwrap().unwrap();
            start.await.unwrap().unwrap();

            assert_eq!(scheduler.tick_loops.lock().await.handles.len(), 1);
            scheduler.shutdown().await.unwrap();
        }
    }

    #[test]
    fn test_cron_trigger_next_fire_is_future() {
        let trigger = Trigger::from_config("poller", &job_config(JobKind::Cron, "*/5 * * * *", false)).unwrap();
        let now = Utc::now();
        let (_, at) = trigger.next_fire(now).unwrap();
        assert!(at > now);
    }
}
