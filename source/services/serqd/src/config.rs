// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serq_sync::WaitConfig;
use thiserror::Error;

/// What the service does with a record whose opcode it does not know.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedPolicy {
    /// Consume the record without touching the device.
    #[default]
    Skip,
    /// Consume the record and report [`crate::ServiceError::UnsupportedOpcode`].
    Fault,
    /// Treat every opcode as a console write.
    Legacy,
}

/// Service configuration, usually read from a TOML file.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Policy for unknown opcodes.
    pub unsupported_opcode: UnsupportedPolicy,
    /// Return from `run` once the client closed the queue and it is drained.
    pub honor_close: bool,
    /// Compare both cursors on every poll and refuse to read past capacity.
    pub check_overflow: bool,
    /// Idle strategy between empty polls.
    pub wait: WaitConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            unsupported_opcode: UnsupportedPolicy::Skip,
            honor_close: true,
            check_overflow: cfg!(debug_assertions),
            wait: WaitConfig::default(),
        }
    }
}

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ServiceConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// An in-memory document is not valid TOML for [`ServiceConfig`].
    #[error("invalid config: {0}")]
    Invalid(#[from] toml::de::Error),
}

impl ServiceConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }

    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&data)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }
}
