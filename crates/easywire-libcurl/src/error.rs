//! # Design
//!
//! - Centralize safety-layer error context with `thiserror`.
//! - Keep error messages constant; store operational context in fields.
//! - Engine status codes stay data (`CurlCode`); these errors only wrap them
//!   when a caller asks for a `Result`.

use thiserror::Error;

use crate::code::CurlCode;
use crate::registry::Token;

/// Errors raised by the transfer safety layer.
#[derive(Debug, Error)]
pub enum EasyError {
    /// The engine refused to create an easy handle.
    #[error("engine handle initialisation failed")]
    HandleInit {
        /// Engine that failed to allocate the handle.
        engine: &'static str,
    },
    /// Process-wide engine initialisation failed.
    #[error("engine global initialisation failed")]
    GlobalInit {
        /// Engine that failed to initialise.
        engine: &'static str,
        /// Status code reported by the engine.
        code: CurlCode,
    },
    /// A native call reported a failure status.
    #[error("native engine call failed")]
    Native {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Status code reported by the engine.
        code: CurlCode,
    },
    /// A string handed to the engine contained an interior NUL byte.
    #[error("string contains an interior NUL byte")]
    InvalidString {
        /// Field or operation the string was destined for.
        field: &'static str,
        /// Byte offset of the first NUL.
        position: usize,
    },
    /// The engine returned a null chain head when appending to a string list.
    #[error("string list append failed")]
    ListAppend {
        /// Number of elements already in the list.
        len: usize,
    },
}

/// Errors raised by the native handle registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The token was issued by this registry but has since been released.
    #[error("token used after release")]
    StaleToken {
        /// Offending token.
        token: Token,
    },
    /// The token was never issued by this registry.
    #[error("token not issued by this registry")]
    UnknownToken {
        /// Offending token.
        token: Token,
    },
}

/// Errors raised while loading transfer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading a configuration file failed.
    #[error("failed to read transfer configuration")]
    Read {
        /// Path of the file.
        path: std::path::PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Parsing a JSON configuration document failed.
    #[error("failed to parse transfer configuration")]
    Parse {
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// An environment variable held a value of the wrong shape.
    #[error("invalid configuration environment variable")]
    InvalidEnv {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Static reason describing the invalid value.
        reason: &'static str,
    },
}

/// Convenience alias for safety-layer results.
pub type EasyResult<T> = Result<T, EasyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn easy_error_messages_are_constant() {
        let cases = vec![
            (
                EasyError::HandleInit { engine: "loopback" },
                "engine handle initialisation failed",
            ),
            (
                EasyError::GlobalInit {
                    engine: "libcurl",
                    code: CurlCode::FAILED_INIT,
                },
                "engine global initialisation failed",
            ),
            (
                EasyError::Native {
                    operation: "perform",
                    code: CurlCode::WRITE_ERROR,
                },
                "native engine call failed",
            ),
            (
                EasyError::InvalidString {
                    field: "url",
                    position: 3,
                },
                "string contains an interior NUL byte",
            ),
            (EasyError::ListAppend { len: 2 }, "string list append failed"),
        ];

        for (err, message) in cases {
            assert_eq!(err.to_string(), message);
            assert!(err.source().is_none());
        }
    }

    #[test]
    fn config_error_exposes_source() {
        let err = ConfigError::Read {
            path: "transfer.json".into(),
            source: io::Error::other("io"),
        };
        assert_eq!(err.to_string(), "failed to read transfer configuration");
        assert!(err.source().is_some());
    }
}
