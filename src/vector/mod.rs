//! In-process vector search
//!
//! Exact nearest-neighbour search over entity embeddings. Used where the
//! graph store's own vector index is not available (tests, small local
//! datasets).

pub mod index;

pub use index::{cosine_similarity, VectorError, VectorIndex, VectorResult};
