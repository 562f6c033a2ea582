//! tapfs core - session registry and operation attribution.
//!
//! This crate provides:
//! - The four operation classes and their conflict-collapsing merge rules
//! - Per-command sessions, each holding the paths it read, created,
//!   updated, and deleted
//! - The process-group registry with ancestor-walk resolution
//! - Process-tree helpers (`/proc` parent lookup, `getpgid`)

#![warn(missing_docs, rust_2018_idioms)]

pub mod ops;
pub mod proc;
pub mod registry;
pub mod session;

pub use ops::OpClass;
pub use registry::{RegistryError, SessionRegistry, BOOTSTRAP_PGID};
pub use session::{RecordedOps, Session};
