//! # Servers
//!
//! Library half of the `servers` crate. The binaries in this crate are thin
//! entry points; the logic they run lives here so it can be exercised by the
//! workspace's end-to-end tests.

#![forbid(unsafe_code)]

pub mod bridge_logic;
