//! Status codes reported by the engine and the debug message categories.
//!
//! # Design
//! - Engine failures are values: every native call surfaces a `CurlCode`.
//! - Conversion into `Result` is opt-in through [`CurlCode::into_result`].
//! - Text descriptions come from the engine that produced the code.

use std::fmt::{self, Display, Formatter};

use crate::engine::Engine;
use crate::error::{EasyError, EasyResult};
use crate::ffi::{self, CURLcode, curl_infotype};

/// Status code returned by an engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct CurlCode(CURLcode);

impl CurlCode {
    /// Successful completion.
    pub const OK: Self = Self(ffi::CURLE_OK);
    /// The URL used an unsupported scheme.
    pub const UNSUPPORTED_PROTOCOL: Self = Self(ffi::CURLE_UNSUPPORTED_PROTOCOL);
    /// Early initialisation failed.
    pub const FAILED_INIT: Self = Self(ffi::CURLE_FAILED_INIT);
    /// The URL was missing or not properly formatted.
    pub const URL_MALFORMAT: Self = Self(ffi::CURLE_URL_MALFORMAT);
    /// The remote host could not be connected to.
    pub const COULDNT_CONNECT: Self = Self(ffi::CURLE_COULDNT_CONNECT);
    /// A write or header callback consumed a different byte count than delivered.
    pub const WRITE_ERROR: Self = Self(ffi::CURLE_WRITE_ERROR);
    /// The read callback returned an impossible length.
    pub const READ_ERROR: Self = Self(ffi::CURLE_READ_ERROR);
    /// The engine ran out of memory.
    pub const OUT_OF_MEMORY: Self = Self(ffi::CURLE_OUT_OF_MEMORY);
    /// A progress or read callback asked the engine to stop.
    pub const ABORTED_BY_CALLBACK: Self = Self(ffi::CURLE_ABORTED_BY_CALLBACK);
    /// An option value did not match the option's category.
    pub const BAD_FUNCTION_ARGUMENT: Self = Self(ffi::CURLE_BAD_FUNCTION_ARGUMENT);
    /// The engine does not know the option.
    pub const UNKNOWN_OPTION: Self = Self(ffi::CURLE_UNKNOWN_OPTION);

    /// Wrap a raw status code.
    pub const fn from_raw(raw: CURLcode) -> Self {
        Self(raw)
    }

    /// Raw numeric value as seen by the engine.
    #[must_use]
    pub const fn raw(self) -> CURLcode {
        self.0
    }

    /// Whether the code reports success.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        self.0 == ffi::CURLE_OK
    }

    /// Describe the code using the engine's own message table.
    #[must_use]
    pub fn describe_with(self, engine: &dyn Engine) -> String {
        engine.strerror(self.0)
    }

    /// Describe the code using the process default engine.
    #[must_use]
    pub fn description(self) -> String {
        self.describe_with(crate::engine::default_engine())
    }

    /// Convert into a `Result`, attributing failures to `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] when the code is not [`CurlCode::OK`].
    pub fn into_result(self, operation: &'static str) -> EasyResult<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(EasyError::Native {
                operation,
                code: self,
            })
        }
    }
}

impl Display for CurlCode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "CURLcode {}", self.0)
    }
}

/// Static message table used by engines without their own `strerror`.
#[must_use]
pub(crate) fn builtin_description(code: CURLcode) -> &'static str {
    match code {
        ffi::CURLE_OK => "No error",
        ffi::CURLE_UNSUPPORTED_PROTOCOL => "Unsupported protocol",
        ffi::CURLE_FAILED_INIT => "Failed initialization",
        ffi::CURLE_URL_MALFORMAT => "URL using bad/illegal format or missing URL",
        ffi::CURLE_COULDNT_RESOLVE_HOST => "Could not resolve hostname",
        ffi::CURLE_COULDNT_CONNECT => "Could not connect to server",
        ffi::CURLE_WRITE_ERROR => "Failed writing received data to disk/application",
        ffi::CURLE_READ_ERROR => "Failed to open/read local data from file/application",
        ffi::CURLE_OUT_OF_MEMORY => "Out of memory",
        ffi::CURLE_OPERATION_TIMEDOUT => "Timeout was reached",
        ffi::CURLE_SSL_CONNECT_ERROR => "SSL connect error",
        ffi::CURLE_ABORTED_BY_CALLBACK => "Operation was aborted by an application callback",
        ffi::CURLE_BAD_FUNCTION_ARGUMENT => "A libcurl function was given a bad argument",
        ffi::CURLE_UNKNOWN_OPTION => "An unknown option was passed in to libcurl",
        _ => "Unknown error",
    }
}

/// Category of a message delivered to the debug callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    /// Informational text.
    Text,
    /// Header data received from the peer.
    HeaderIn,
    /// Header data sent to the peer.
    HeaderOut,
    /// Protocol data received from the peer.
    DataIn,
    /// Protocol data sent to the peer.
    DataOut,
    /// TLS data received from the peer.
    SslDataIn,
    /// TLS data sent to the peer.
    SslDataOut,
    /// A category this wrapper does not know about.
    Other(curl_infotype),
}

impl InfoType {
    /// Map the engine's numeric category.
    #[must_use]
    pub const fn from_raw(raw: curl_infotype) -> Self {
        match raw {
            ffi::CURLINFO_TEXT => Self::Text,
            ffi::CURLINFO_HEADER_IN => Self::HeaderIn,
            ffi::CURLINFO_HEADER_OUT => Self::HeaderOut,
            ffi::CURLINFO_DATA_IN => Self::DataIn,
            ffi::CURLINFO_DATA_OUT => Self::DataOut,
            ffi::CURLINFO_SSL_DATA_IN => Self::SslDataIn,
            ffi::CURLINFO_SSL_DATA_OUT => Self::SslDataOut,
            other => Self::Other(other),
        }
    }
}
