//! TOML session profiles for the `padlink` binary.
//!
//! A profile names one connection and how events are encoded for it:
//!
//! ```toml
//! [connection]
//! type = "TCP"
//!
//! [connection.config]
//! host = "127.0.0.1"
//! port = 9002
//! timeoutSecs = 5
//!
//! [session]
//! format = "csv"
//! ```
//!
//! `[connection.config]` uses the same camelCase keys as the JSON blob stored
//! next to a control pad.  The binary converts the table to JSON and hands it
//! to the [`ConnectionFactory`](crate::ConnectionFactory) unchanged, so a
//! profile can never describe a config the factory would not accept.
//!
//! The `[session]` table is optional.  Missing fields fall back to their serde
//! defaults: JSON encoding, and waiting for the transport's own connect timeout.

use std::path::{Path, PathBuf};

use padlink_core::{ConnectionType, DataFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for profile loading.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The profile file could not be read.
    #[error("could not read profile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse profile TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The `[connection.config]` table could not be rendered as JSON.
    #[error("failed to convert connection config to JSON: {0}")]
    Json(#[source] serde_json::Error),
}

// ── Profile schema ────────────────────────────────────────────────────────────

/// A parsed session profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub connection: ConnectionSection,
    #[serde(default)]
    pub session: SessionSection,
}

/// Which transport to use and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSection {
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    /// Transport settings, keyed exactly like the stored config JSON.
    #[serde(default)]
    pub config: toml::Table,
}

/// How the session encodes events and how long it waits for the link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub format: DataFormat,
    /// Extra bound on waiting for a connected state, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_wait_secs: Option<u64>,
}

impl Profile {
    /// Parses a profile from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the profile at `path`.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The connection settings as the compact JSON the factory expects.
    pub fn config_json(&self) -> Result<String, ProfileError> {
        serde_json::to_string(&self.connection.config).map_err(ProfileError::Json)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
