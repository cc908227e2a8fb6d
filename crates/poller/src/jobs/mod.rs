pub mod poll;

use std::sync::Arc;

use async_trait::async_trait;

pub use poll::PollJob;

/// Work fired by the scheduler. A job never schedules itself; its failures
/// are handled inside `run` and never reach the scheduler.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    async fn run(&self);
}

#[async_trait]
impl<T: Job + ?Sized> Job for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn tags(&self) -> Vec<String> {
        (**self).tags()
    }

    async fn run(&self) {
        (**self).run().await
    }
}
