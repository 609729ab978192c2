//! Per-run workflow context
//!
//! This crate provides the mutable key/value context shared by the steps
//! of one workflow run: component manifests and a structured vars tree
//! persisted to a ConfigMap object, a durable string scratch area in the
//! same object, and a process-local memory store for ephemeral counters
//! and flags.
//!
//! Cluster access goes through the [`ConfigMapStore`] trait; the
//! [`InMemoryConfigStore`] implementation backs tests and the ephemeral
//! context mode.

pub mod context;
pub mod error;
pub mod memstore;
pub mod store;
pub mod util;
pub mod value;

pub use context::*;
pub use error::*;
pub use memstore::*;
pub use store::*;
pub use util::*;
pub use value::*;
