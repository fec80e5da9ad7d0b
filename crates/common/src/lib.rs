//! Shared identifiers and value types used across the saga workspace.

pub mod types;

pub use types::{Metadata, SagaId};
