//! Integration-test support for tapfs.
//!
//! The FUSE kernel boundary needs privileges that test environments rarely
//! have, so these tests drive the attribution engine and the session RPC
//! directly: the harness stands up a real Unix-socket server around a
//! shared registry, plus the temp directories a mount would own.

#![warn(missing_docs, rust_2018_idioms)]

pub mod harness;

pub use harness::TestServer;
