//! Movie graph data model
//!
//! Entities as the core sees them. Ingestion owns creating and updating
//! them; the pipeline only reads.

pub mod entity;

pub use entity::Entity;
