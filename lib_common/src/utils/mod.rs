//! # Utilities Module
//!
//! General-purpose helpers shared by the servers.
//!
//! - **`text`**: Cleanup of terminal-formatted output (ANSI escape stripping,
//!   trimming, truncated previews for logs).
//! - **`clock`**: Wall-clock timestamps in the units the wire protocols use.

/// Cleanup of terminal-formatted text.
pub mod text;
/// Wall-clock helpers.
pub mod clock;
