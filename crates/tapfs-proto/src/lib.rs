//! tapfs protocol - wire messages and the persisted record contract.
//!
//! This crate defines:
//! - The two RPC methods and their request/response bodies
//! - Length-prefixed JSON framing for the Unix-socket transport
//! - The `DepRecord` JSON object written per traced command, and loading
//!   of a directory of such records

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod framing;
pub mod messages;
pub mod record;

pub use framing::{read_message, write_message, WireError, MAX_FRAME_BYTES};
pub use messages::{Method, TraceRequest, TraceResponse};
pub use record::{load_dir, DepRecord, RecordError};

/// Reserved name of the socket symlink at the mount root. Wrapper clients
/// walk upward from their working directory looking for it.
pub const SOCKET_NAME: &str = ".tapfs";
