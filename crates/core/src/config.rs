use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Read `.env` into the process environment when present.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Environment lookup scoped to a profile: `{PROFILE}_{KEY}` wins over
/// `{KEY}`. Empty values count as unset.
#[derive(Debug, Clone, Copy)]
struct ProfiledEnv<'a> {
    profile: &'a str,
}

impl<'a> ProfiledEnv<'a> {
    fn new(profile: &'a str) -> Self {
        Self { profile }
    }

    fn lookup(key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn opt(&self, key: &str) -> Option<String> {
        if self.profile.is_empty() {
            return Self::lookup(key);
        }
        Self::lookup(&format!("{}_{key}", self.profile)).or_else(|| Self::lookup(key))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Unparseable values fall back to `default`.
    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Same grammar as job intervals ("5s", "1m30s").
    fn duration(&self, key: &str, default: Duration) -> Duration {
        self.opt(key)
            .and_then(|v| crate::duration::parse_duration(&v).ok())
            .unwrap_or(default)
    }
}

// ── Subject defaults ──────────────────────────────────────────

/// Subject the poller publishes normalized article batches to.
pub const DEFAULT_ARTICLES_SUBJECT: &str = "SPORTSTREAM.status.updated";

/// Subject the poller mirrors raw upstream pages to.
pub const DEFAULT_RAW_STATUS_SUBJECT: &str = "SPORTSTREAM.DOCKER.status.updated";

/// Durable stream covering every pipeline subject.
pub const DEFAULT_STREAM: &str = "SPORTSTREAM";

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upper-cased profile prefix, empty when none is active.
    pub profile: String,
    /// Deployment environment label (`local`, `staging`, ...).
    pub environment: String,
    pub server: ServerConfig,
    pub nats: NatsConfig,
    pub subjects: SubjectsConfig,
    pub consumer: ConsumerConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    /// Read the whole config from the environment. Call `load_dotenv()`
    /// first. `SPORTSTREAM_PROFILE=PROD` makes `PROD_<KEY>` take precedence
    /// over `<KEY>` for every setting.
    pub fn from_env() -> Self {
        let profile = ProfiledEnv::lookup("SPORTSTREAM_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Config for a named profile; `""` means no profile prefix.
    pub fn for_profile(profile: &str) -> Self {
        let profile = profile.to_uppercase();
        let env = ProfiledEnv::new(&profile);
        Self {
            environment: env.string("ENVIRONMENT", "local"),
            server: ServerConfig::from_env(env),
            nats: NatsConfig::from_env(env),
            subjects: SubjectsConfig::from_env(env),
            consumer: ConsumerConfig::from_env(env),
            postgres: PostgresConfig::from_env(env),
            profile,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Startup summary. Credentials are never logged.
    pub fn log_summary(&self) {
        tracing::info!(
            profile = self.profile_label(),
            environment = %self.environment,
            bind = %self.server.bind_addr(),
            "configuration loaded"
        );
        tracing::info!(
            url = %self.nats.url(),
            client = %self.nats.client_name,
            reconnect_wait = ?self.nats.reconnect_wait,
            "nats"
        );
        tracing::info!(
            stream = %self.consumer.stream,
            durable = %self.consumer.durable_name,
            consume = %self.consumer.subject,
            articles = %self.subjects.articles,
            raw = %self.subjects.raw_status,
            "subjects"
        );
        tracing::info!(
            host = %self.postgres.host,
            port = self.postgres.port,
            database = %self.postgres.database,
            "postgres"
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        Self {
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", 8080),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── NATS ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub host: String,
    pub port: u16,
    /// Client connection name reported to the server.
    pub client_name: String,
    /// Tick period of the connection monitor.
    pub reconnect_wait: Duration,
}

impl NatsConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        Self {
            host: env.string("NATS_HOST", "localhost"),
            port: env.parse("NATS_PORT", 4222),
            client_name: env.string("NATS_CLIENT_NAME", "sportstream"),
            reconnect_wait: env.duration("NATS_RECONNECT_WAIT", Duration::from_secs(5)),
        }
    }

    pub fn url(&self) -> String {
        format!("nats://{}:{}", self.host, self.port)
    }
}

// ── Subjects ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectsConfig {
    pub articles: String,
    pub raw_status: String,
}

impl SubjectsConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        Self {
            articles: env.string("NATS_ARTICLES_SUBJECT", DEFAULT_ARTICLES_SUBJECT),
            raw_status: env.string("NATS_RAW_STATUS_SUBJECT", DEFAULT_RAW_STATUS_SUBJECT),
        }
    }
}

impl Default for SubjectsConfig {
    fn default() -> Self {
        Self {
            articles: DEFAULT_ARTICLES_SUBJECT.to_string(),
            raw_status: DEFAULT_RAW_STATUS_SUBJECT.to_string(),
        }
    }
}

// ── Durable consumer ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub stream: String,
    /// Subjects bound to the stream when it has to be created.
    pub stream_subjects: Vec<String>,
    pub durable_name: String,
    pub subject: String,
    /// Delay before re-subscribing after the delivery stream ends.
    pub resubscribe_wait: Duration,
}

impl ConsumerConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        let stream = env.string("NATS_STREAM", DEFAULT_STREAM);
        let stream_subjects = env
            .opt("NATS_STREAM_SUBJECTS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_else(|| vec![format!("{stream}.>")]);
        Self {
            stream,
            stream_subjects,
            durable_name: env.string("NATS_CONSUMER_NAME", "article-worker"),
            subject: env.string("NATS_CONSUMER_SUBJECT", DEFAULT_ARTICLES_SUBJECT),
            resubscribe_wait: env.duration("NATS_RESUBSCRIBE_WAIT", Duration::from_secs(2)),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        Self {
            host: env.string("PG_HOST", "localhost"),
            port: env.parse("PG_PORT", 5432),
            database: env.string("PG_DATABASE", "sportstream"),
            username: env.opt("PG_USERNAME"),
            password: env.opt("PG_PASSWORD"),
            ssl_mode: env.string("PG_SSL_MODE", "prefer"),
            max_connections: env.parse("PG_MAX_CONNECTIONS", 10),
        }
    }

    /// Connection URL for sqlx. The user defaults to `postgres`.
    pub fn connection_string(&self) -> String {
        let PostgresConfig { host, port, database, ssl_mode, .. } = self;
        let user = self.username.as_deref().unwrap_or("postgres");
        let password = self.password.as_deref().unwrap_or_default();
        format!("postgres://{user}:{password}@{host}:{port}/{database}?sslmode={ssl_mode}")
    }
}
