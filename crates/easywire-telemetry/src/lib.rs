#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(
    missing_docs,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]

//! Logging setup shared by easywire binaries and test suites.
//!
//! The safety layer only emits `tracing` events; this crate decides where they
//! go. Applications call [`init_logging`] once at startup, test suites call
//! [`init_test_logging`] as often as they like.

pub mod error;
pub mod init;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging, init_test_logging};
