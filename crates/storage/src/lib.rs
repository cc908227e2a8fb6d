//! Article persistence: the sequence allocator, the article repository and
//! the idempotent writer that combines them.

pub mod articles;
pub mod db;
pub mod error;
pub mod memory;
pub mod sequence;
pub mod writer;

pub use articles::{ArticleReader, ArticleRecord, ArticleRepository, PgArticleRepository};
pub use db::init_pg_pool;
pub use error::StoreError;
pub use memory::InMemoryArticleStore;
pub use sequence::{PgSequenceAllocator, SequenceAllocator, ARTICLE_ID_COUNTER};
pub use writer::ArticleWriter;
