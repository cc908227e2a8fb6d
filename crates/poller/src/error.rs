use sportstream_bus::BusError;
use thiserror::Error;

/// Errors loading or validating the jobs file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config error: {0}")]
    Invalid(String),
}

/// A single failed upstream request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected status code {0}")]
    Status(u16),

    #[error("reading response body failed: {0}")]
    Body(#[source] reqwest::Error),
}

impl FetchError {
    /// Status label for outgoing-request metrics.
    pub fn status_label(&self) -> String {
        match self {
            Self::Status(code) => code.to_string(),
            Self::Body(_) => "200".to_string(),
            Self::Transport(_) => "error".to_string(),
        }
    }
}

/// Why a poll run failed. The page cursor is never advanced on any of these.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("upstream fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("decoding upstream page failed: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("encoding article batch failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("publishing article batch failed: {0}")]
    Publish(#[source] BusError),

    #[error("building HTTP client failed: {0}")]
    Client(#[source] reqwest::Error),
}

impl PollError {
    /// Short reason label for the job-error counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch_error",
            Self::Decode(_) => "decode_error",
            Self::Encode(_) => "encode_error",
            Self::Publish(_) => "publish_error",
            Self::Client(_) => "client_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid trigger for job '{job}': {reason}")]
    InvalidTrigger { job: String, reason: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("scheduler already started")]
    AlreadyStarted,

    #[error("scheduler shutdown failed: {0}")]
    Shutdown(String),
}
