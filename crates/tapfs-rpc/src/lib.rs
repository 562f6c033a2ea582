//! tapfs RPC - the session protocol between the mount server and the
//! wrapper client.
//!
//! This crate provides:
//! - The Unix-socket `CommandServer` holding the attribution registry
//! - The dialing client for the two trace methods
//! - Socket discovery via the `.tapfs` symlink walk
//! - The runner that executes one traced shell command and persists its
//!   dependency record

#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod discover;
pub mod runner;
pub mod server;

pub use client::{RpcClient, RpcError};
pub use discover::{find_socket, DiscoverError};
pub use runner::{run_traced, RunError, RunOptions, RunOutcome};
pub use server::{serve, CommandServer, ServerHandle};
