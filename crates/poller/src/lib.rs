//! Scheduled poll-and-publish ingestion.
//!
//! [`scheduler::Scheduler`] fires [`jobs::Job`]s on cron or fixed-interval
//! triggers read from [`config::PollerConfig`]. The [`jobs::poll::PollJob`]
//! walks the upstream feed one page per run through [`retry::RetryPolicy`]
//! and republishes each page onto the bus.

pub mod api;
pub mod config;
pub mod error;
pub mod jobs;
pub mod retry;
pub mod scheduler;
pub mod upstream;

pub use config::{JobConfig, JobKind, PollerConfig, RetryConfig};
pub use error::{ConfigError, FetchError, PollError, SchedulerError};
pub use scheduler::{JobId, JobInfo, Scheduler, Trigger};
