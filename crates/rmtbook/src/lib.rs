//! `rmtbook` - Booking and records for a single-practitioner massage therapy practice
//!
//! This library provides the appointment lifecycle, health-history and
//! receipt records, session authentication, and the JSON HTTP API that
//! patients and the RMT use.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod logging;
pub mod model;
pub mod notify;
pub mod scheduling;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use http::{build_router, serve, AppState};
pub use logging::init_logging;
pub use storage::{Storage, StorageStats};
