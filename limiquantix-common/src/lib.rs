//! # limiquantix Common
//!
//! Shared utilities for the limiquantix volume tooling.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use limiquantix_common::{init_logging_with_format, LogFormat};
//!
//! init_logging_with_format("info", LogFormat::Pretty).unwrap();
//! tracing::info!(volume_id = "rbd.vol1", "Volume attached");
//! ```

pub mod logging;

pub use logging::{init_logging, init_logging_json, init_logging_with_format, LogFormat};
