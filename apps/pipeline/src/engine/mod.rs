//! Generic execution core shared by every stage: batching, chunking,
//! response schemas and the deterministic reduction of partial results.

pub mod batching;
pub mod chunking;
pub mod reduce;
pub mod schema;

pub use batching::BatchProcessor;
pub use reduce::{reduce, PartialResult};
pub use schema::Schema;
