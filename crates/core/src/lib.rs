pub mod config;
pub mod duration;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pagination;

pub use config::Config;
pub use error::*;
pub use metrics::Metrics;
pub use models::*;
