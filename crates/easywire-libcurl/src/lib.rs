#![deny(unsafe_code)]
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

//! Safety layer over the libcurl easy interface.
//!
//! A [`Transfer`] owns one native easy handle. Options are set through typed
//! setters, callbacks are registered as ordinary Rust closures, and every
//! object the engine may hand back is pinned behind a registry token for as
//! long as the handle can reach it.

/// Status codes and debug message categories.
pub mod code;
/// Transfer defaults loaded from JSON or the environment.
pub mod config;
/// Engine seam with the native and loopback implementations.
#[allow(unsafe_code)]
pub mod engine;
/// Error types for the safety layer.
pub mod error;
/// Raw C-ABI declarations.
#[allow(unsafe_code, missing_docs)]
pub mod ffi;
mod global;
/// Copies between engine memory and owned buffers.
#[allow(unsafe_code)]
pub mod marshal;
/// Token registry pinning objects handed through the native boundary.
pub mod registry;
/// Owned native string lists.
#[allow(unsafe_code)]
pub mod slist;
#[allow(unsafe_code)]
mod trampoline;
/// Owned easy handle.
#[allow(unsafe_code)]
pub mod transfer;

pub use code::{CurlCode, InfoType};
pub use config::TransferConfig;
pub use engine::{Engine, LoopbackEngine, default_engine};
pub use error::{ConfigError, EasyError, EasyResult, RegistryError};
pub use registry::{Context, HandleRegistry, Token};
pub use slist::StringList;
pub use trampoline::{DebugCallback, Progress, ProgressCallback, ReadCallback, WriteCallback};
pub use transfer::Transfer;

#[cfg(feature = "libcurl")]
pub use engine::LibCurl;

/// Version banner of the default engine.
#[must_use]
pub fn version() -> String {
    default_engine().version()
}
