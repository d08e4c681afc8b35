// SPDX-License-Identifier: Apache-2.0

//! Engine-wide configuration shared (read-only) by every source driver.

use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

use crate::sources::file::persistence::JsonFileDatabase;

/// Configuration syntax version that changed the file source `follow_freq` default.
pub const VERSION_3_0: ConfigVersion = ConfigVersion::new(3, 0);

/// Version assumed when a configuration does not declare one.
pub const CURRENT_CONFIG_VERSION: ConfigVersion = ConfigVersion::new(4, 8);

/// Default maximum message size in bytes.
pub const DEFAULT_LOG_MSG_SIZE: usize = 65536;

/// A configuration compatibility marker encoded as `0xMMmm`.
///
/// `3.0` is `0x0300`, `3.22` is `0x0316`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigVersion(u16);

impl ConfigVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self(((major as u16) << 8) | minor as u16)
    }

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u16 {
        self.0
    }

    pub fn major(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn minor(&self) -> u8 {
        (self.0 & 0xff) as u8
    }

    pub fn is_older_than(&self, other: ConfigVersion) -> bool {
        self.0 < other.0
    }
}

impl Default for ConfigVersion {
    fn default() -> Self {
        CURRENT_CONFIG_VERSION
    }
}

impl fmt::Display for ConfigVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl FromStr for ConfigVersion {
    type Err = String;

    /// Accepts either `major.minor` (`"3.0"`) or a raw hex value (`"0x0300"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u16::from_str_radix(hex, 16)
                .map(ConfigVersion)
                .map_err(|e| format!("invalid config version '{}': {}", s, e));
        }

        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid config version '{}', expected major.minor", s))?;
        let major: u8 = major
            .parse()
            .map_err(|e| format!("invalid config version '{}': {}", s, e))?;
        let minor: u8 = minor
            .parse()
            .map_err(|e| format!("invalid config version '{}': {}", s, e))?;
        Ok(ConfigVersion::new(major, minor))
    }
}

impl<'de> Deserialize<'de> for ConfigVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Global engine configuration.
///
/// Drivers borrow this during construction and initialization and never mutate it.
#[derive(Clone)]
pub struct GlobalConfig {
    /// Declared configuration compatibility version
    pub version: ConfigVersion,
    /// Default maximum message size for sources that do not set one
    pub log_msg_size: usize,
    /// Persistent state store used to save read positions
    pub state: JsonFileDatabase,
}

impl GlobalConfig {
    pub fn new(version: ConfigVersion) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: JsonFileDatabase) -> Self {
        self.state = state;
        self
    }

    pub fn is_version_older_than(&self, version: ConfigVersion) -> bool {
        self.version.is_older_than(version)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            log_msg_size: DEFAULT_LOG_MSG_SIZE,
            state: JsonFileDatabase::open_memory(),
        }
    }
}

impl fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("version", &self.version)
            .field("log_msg_size", &self.log_msg_size)
            .finish_non_exhaustive()
    }
}
