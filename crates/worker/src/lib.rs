//! Article ingestion worker.
//!
//! [`handler::ArticleMessageHandler`] decodes article batches delivered by
//! the durable consumer and hands them to [`service::ArticleService`], which
//! writes each one through the idempotent store writer.

pub mod error;
pub mod handler;
pub mod service;

pub use error::WorkerError;
pub use handler::ArticleMessageHandler;
pub use service::{ArticleService, BatchOutcome};
