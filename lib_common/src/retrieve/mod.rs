//! # Data Retrieval Module
//!
//! This module provides a centralized location for the HTTP client used to
//! reach upstream services.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest`. It handles
//!   base URL joining, bearer authentication and JSON bodies, and hands the
//!   raw response body back to the caller so each integration decides how
//!   lenient its parsing should be.

/// Generic HTTP API client with bearer authentication and raw body capture.
pub mod ky_http;
