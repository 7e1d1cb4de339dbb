//! # lib_common
//!
//! Shared building blocks for the gateway bridge. Each top-level module is
//! gated behind a cargo feature of the same name so that binaries only pull
//! in the dependencies they actually use.
//!
//! - **`retrieve`**: HTTP `ApiClient` used to call upstream gateways.
//! - **`utils`**: Terminal output cleanup and clock helpers.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "utils")]
pub mod utils;
