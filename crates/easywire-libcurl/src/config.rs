//! Transfer defaults loaded from JSON documents or the environment.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::code::CurlCode;
use crate::error::{ConfigError, EasyError, EasyResult};
use crate::transfer::Transfer;

const ENV_USER_AGENT: &str = "EASYWIRE_USER_AGENT";
const ENV_FOLLOW_LOCATION: &str = "EASYWIRE_FOLLOW_LOCATION";
const ENV_VERBOSE: &str = "EASYWIRE_VERBOSE";
const ENV_CONNECT_TIMEOUT: &str = "EASYWIRE_CONNECT_TIMEOUT_SECS";
const ENV_TIMEOUT: &str = "EASYWIRE_TIMEOUT_SECS";
const ENV_NO_SIGNAL: &str = "EASYWIRE_NO_SIGNAL";
const ENV_COOKIE_FILE: &str = "EASYWIRE_COOKIE_FILE";

/// Options applied to every transfer created by an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransferConfig {
    /// `User-Agent` header value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Follow redirects.
    pub follow_location: bool,
    /// Emit debug trace messages.
    pub verbose: bool,
    /// Connection phase limit in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Whole transfer limit in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Keep the engine away from signal handlers.
    pub no_signal: bool,
    /// File cookies are read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_file: Option<String>,
}

impl TransferConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse { source })
    }

    /// Read and parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when its contents are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), "loaded transfer configuration");
        Ok(config)
    }

    /// Build from `EASYWIRE_*` environment variables; unset variables keep
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] when a variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self {
            user_agent: lookup(ENV_USER_AGENT),
            cookie_file: lookup(ENV_COOKIE_FILE),
            ..Self::default()
        };
        if let Some(value) = lookup(ENV_FOLLOW_LOCATION) {
            config.follow_location = parse_flag(ENV_FOLLOW_LOCATION, value)?;
        }
        if let Some(value) = lookup(ENV_VERBOSE) {
            config.verbose = parse_flag(ENV_VERBOSE, value)?;
        }
        if let Some(value) = lookup(ENV_NO_SIGNAL) {
            config.no_signal = parse_flag(ENV_NO_SIGNAL, value)?;
        }
        if let Some(value) = lookup(ENV_CONNECT_TIMEOUT) {
            config.connect_timeout_secs = Some(parse_seconds(ENV_CONNECT_TIMEOUT, value)?);
        }
        if let Some(value) = lookup(ENV_TIMEOUT) {
            config.timeout_secs = Some(parse_seconds(ENV_TIMEOUT, value)?);
        }
        Ok(config)
    }

    /// Forward every configured value to `transfer`.
    ///
    /// # Errors
    ///
    /// Returns [`EasyError::Native`] naming the first option the engine
    /// rejected; later options are not applied.
    pub fn apply(&self, transfer: &mut Transfer) -> EasyResult<()> {
        if let Some(agent) = &self.user_agent {
            check(transfer.user_agent(agent), "apply user agent")?;
        }
        check(
            transfer.follow_location(self.follow_location),
            "apply follow location",
        )?;
        check(transfer.verbose(self.verbose), "apply verbose")?;
        if let Some(secs) = self.connect_timeout_secs {
            check(
                transfer.connect_timeout(Duration::from_secs(secs)),
                "apply connect timeout",
            )?;
        }
        if let Some(secs) = self.timeout_secs {
            check(transfer.timeout(Duration::from_secs(secs)), "apply timeout")?;
        }
        check(transfer.no_signal(self.no_signal), "apply no signal")?;
        if let Some(path) = &self.cookie_file {
            check(transfer.cookie_file(path), "apply cookie file")?;
        }
        Ok(())
    }
}

fn check(code: CurlCode, operation: &'static str) -> Result<(), EasyError> {
    code.into_result(operation)
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value,
            reason: "expected a boolean flag",
        }),
    }
}

fn parse_seconds(key: &'static str, value: String) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value,
        reason: "expected whole seconds",
    })
}
