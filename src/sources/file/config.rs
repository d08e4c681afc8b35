// SPDX-License-Identifier: Apache-2.0

//! Configuration for the file source.

use std::fmt;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::bounded_channel::BoundedSender;
use crate::config::GlobalConfig;
use crate::sources::file::driver::FileSourceDriver;
use crate::sources::file::error::{Error, Result};
use crate::topology::LogMessage;

/// Default poll interval for ordinary growing files
pub const DEFAULT_FOLLOW_FREQ_MS: i64 = 1000;

/// `follow_freq` value that keeps the pre-3.0 "poll forever" behaviour
pub const LEGACY_FOLLOW_FREQ: i64 = -1;

/// Stats source kind reported by file sources
pub const STATS_SOURCE: &str = "file";

/// Interval between reopen attempts of a polled source.
///
/// Always a whole, positive number of milliseconds that fits `follow_freq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PollInterval(NonZeroU64);

impl PollInterval {
    pub fn from_millis(millis: i64) -> Option<Self> {
        u64::try_from(millis)
            .ok()
            .and_then(NonZeroU64::new)
            .map(PollInterval)
    }

    pub fn millis(&self) -> i64 {
        // from_millis only accepts values in i64 range
        i64::try_from(self.0.get()).unwrap_or(i64::MAX)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0.get())
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        PollInterval(NonZeroU64::MIN.saturating_add(DEFAULT_FOLLOW_FREQ_MS as u64 - 1))
    }
}

impl TryFrom<Duration> for PollInterval {
    type Error = String;

    fn try_from(interval: Duration) -> std::result::Result<Self, Self::Error> {
        if interval.subsec_nanos() % 1_000_000 != 0 {
            return Err(format!(
                "follow-freq must be a whole number of milliseconds, got {:?}",
                interval
            ));
        }
        i64::try_from(interval.as_millis())
            .ok()
            .and_then(PollInterval::from_millis)
            .ok_or_else(|| {
                format!(
                    "follow-freq must be between 1 and {} milliseconds, got {:?}",
                    i64::MAX,
                    interval
                )
            })
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// How a source keeps reading after reaching the end of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowMode {
    /// Pre-3.0 behaviour kept for old configurations (`follow_freq = -1`)
    Legacy,
    /// Open once and read continuously, no reopening (`follow_freq = 0`)
    Disabled,
    /// Reopen and seek at the given interval (`follow_freq > 0`)
    Poll(PollInterval),
}

impl FollowMode {
    pub fn from_millis(millis: i64) -> std::result::Result<Self, String> {
        match millis {
            LEGACY_FOLLOW_FREQ => Ok(FollowMode::Legacy),
            0 => Ok(FollowMode::Disabled),
            ms => PollInterval::from_millis(ms).map(FollowMode::Poll).ok_or_else(|| {
                format!(
                    "follow-freq must be -1, 0 or a positive number of milliseconds, got {}",
                    ms
                )
            }),
        }
    }

    /// The `follow_freq` value in milliseconds.
    pub fn millis(&self) -> i64 {
        match self {
            FollowMode::Legacy => LEGACY_FOLLOW_FREQ,
            FollowMode::Disabled => 0,
            FollowMode::Poll(interval) => interval.millis(),
        }
    }

    pub fn is_polling(&self) -> bool {
        matches!(self, FollowMode::Poll(_))
    }
}

impl Default for FollowMode {
    fn default() -> Self {
        FollowMode::Poll(PollInterval::default())
    }
}

impl fmt::Display for FollowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.millis())
    }
}

/// How consecutive lines are grouped into one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MultiLineMode {
    /// Every line is a message
    #[default]
    None,
    /// Lines starting with whitespace continue the previous message
    Indented,
    /// A message starts at `prefix`, text matching `garbage` is discarded
    PrefixGarbage,
    /// A message starts at `prefix` and ends at the suffix pattern
    PrefixSuffix,
    /// Built-in detection of common multi-line formats (stack traces)
    Smart,
}

impl MultiLineMode {
    /// Whether the mode reads the `prefix` and `garbage` patterns.
    pub fn uses_patterns(&self) -> bool {
        matches!(self, MultiLineMode::PrefixGarbage | MultiLineMode::PrefixSuffix)
    }
}

impl FromStr for MultiLineMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "none" => Ok(MultiLineMode::None),
            "indented" => Ok(MultiLineMode::Indented),
            "prefix-garbage" | "regexp" => Ok(MultiLineMode::PrefixGarbage),
            "prefix-suffix" => Ok(MultiLineMode::PrefixSuffix),
            "smart" => Ok(MultiLineMode::Smart),
            _ => Err(format!(
                "Invalid multi-line mode '{}'. Valid options: none, indented, prefix-garbage, prefix-suffix, smart",
                s
            )),
        }
    }
}

impl fmt::Display for MultiLineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MultiLineMode::None => "none",
            MultiLineMode::Indented => "indented",
            MultiLineMode::PrefixGarbage => "prefix-garbage",
            MultiLineMode::PrefixSuffix => "prefix-suffix",
            MultiLineMode::Smart => "smart",
        };
        f.write_str(s)
    }
}

/// Multi-line framing settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiLineOptions {
    pub mode: MultiLineMode,
    /// Pattern matching the first line of a message
    pub prefix: Option<String>,
    /// Pattern for discarded text (prefix-garbage) or the message end (prefix-suffix)
    pub garbage: Option<String>,
}

impl MultiLineOptions {
    pub fn new(mode: MultiLineMode) -> Self {
        Self {
            mode,
            prefix: None,
            garbage: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_garbage(mut self, garbage: impl Into<String>) -> Self {
        self.garbage = Some(garbage.into());
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref().filter(|p| !p.is_empty())
    }

    pub fn garbage(&self) -> Option<&str> {
        self.garbage.as_deref().filter(|g| !g.is_empty())
    }
}

/// Options handed to the file reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReaderOptions {
    follow: FollowMode,
    restore_state: bool,
    pub multi_line: MultiLineOptions,
    /// Maximum message size, inherited from the global configuration when unset
    pub max_msg_size: Option<usize>,
    /// Explicit persistence key replacing the generated one
    pub persist_name: Option<String>,
    pub stats_source: &'static str,
}

impl FileReaderOptions {
    pub fn follow(&self) -> FollowMode {
        self.follow
    }

    /// Position is only restored for sources that are reopened and seeked.
    pub fn restore_state(&self) -> bool {
        self.restore_state
    }

    pub fn set_follow(&mut self, follow: FollowMode) {
        self.follow = follow;
        self.restore_state = follow.is_polling();
    }

    /// Fill unset options from the global configuration.
    pub fn resolve(&mut self, cfg: &GlobalConfig) {
        self.max_msg_size.get_or_insert(cfg.log_msg_size);
    }

    pub fn max_msg_size(&self) -> usize {
        self.max_msg_size
            .unwrap_or(crate::config::DEFAULT_LOG_MSG_SIZE)
    }
}

impl Default for FileReaderOptions {
    fn default() -> Self {
        let follow = FollowMode::default();
        Self {
            follow,
            restore_state: follow.is_polling(),
            multi_line: MultiLineOptions::default(),
            max_msg_size: None,
            persist_name: None,
            stats_source: STATS_SOURCE,
        }
    }
}

/// Options handed to the file opener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileOpenerOptions {
    /// The path can only be opened with elevated privileges
    pub needs_privileges: bool,
    /// Read messages already in the kernel ring buffer when opening /dev/kmsg
    pub kmsg_read_existing: bool,
}

/// User-facing configuration of one file source
#[derive(Debug, Clone, Default)]
pub struct FileSourceConfig {
    /// File, device or kernel message path to read
    pub path: PathBuf,
    /// Source group name, used to tag metrics
    pub group: Option<String>,
    /// Explicit follow_freq in milliseconds; derived from the path when unset
    pub follow_freq: Option<i64>,
    /// Multi-line framing
    pub multi_line: MultiLineOptions,
    /// Explicit persistence key
    pub persist_name: Option<String>,
    /// Maximum message size in bytes
    pub max_msg_size: Option<usize>,
    /// Read existing /dev/kmsg messages on startup
    pub kmsg_read_existing: bool,
}

impl FileSourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("A file source path must be specified".to_string());
        }

        if let Some(follow_freq) = self.follow_freq {
            FollowMode::from_millis(follow_freq)?;
        }

        if self.max_msg_size == Some(0) {
            return Err("max-msg-size must be positive".to_string());
        }

        if self.persist_name.as_deref() == Some("") {
            return Err("persist-name cannot be empty".to_string());
        }

        Ok(())
    }

    /// Construct an uninitialized driver with these options applied.
    pub fn build_driver(
        &self,
        cfg: &GlobalConfig,
        output: Option<BoundedSender<LogMessage>>,
    ) -> Result<FileSourceDriver> {
        self.validate().map_err(Error::Config)?;

        let mut driver = FileSourceDriver::new(&self.path, cfg, self.group.clone(), output);
        if let Some(follow_freq) = self.follow_freq {
            let follow = FollowMode::from_millis(follow_freq).map_err(Error::Config)?;
            driver.set_follow(follow)?;
        }
        driver.set_multi_line(self.multi_line.clone())?;
        if let Some(persist_name) = &self.persist_name {
            driver.set_persist_name(persist_name.clone())?;
        }
        if let Some(max_msg_size) = self.max_msg_size {
            driver.set_max_msg_size(max_msg_size)?;
        }
        driver.set_kmsg_read_existing(self.kmsg_read_existing)?;

        Ok(driver)
    }
}
