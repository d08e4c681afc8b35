// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use crate::sources::file::config::{FileSourceConfig, MultiLineMode, MultiLineOptions};

/// Multi-line framing mode
#[derive(Copy, Clone, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MultiLineModeArg {
    /// Every line is a message
    #[default]
    None,
    /// Lines starting with whitespace continue the previous message
    Indented,
    /// Messages start at the prefix pattern, text matching the garbage pattern is dropped
    #[value(alias = "regexp")]
    #[serde(alias = "regexp")]
    PrefixGarbage,
    /// Messages start at the prefix pattern and end at the suffix pattern
    PrefixSuffix,
    /// Detect common multi-line formats such as stack traces
    Smart,
}

impl From<MultiLineModeArg> for MultiLineMode {
    fn from(m: MultiLineModeArg) -> Self {
        match m {
            MultiLineModeArg::None => MultiLineMode::None,
            MultiLineModeArg::Indented => MultiLineMode::Indented,
            MultiLineModeArg::PrefixGarbage => MultiLineMode::PrefixGarbage,
            MultiLineModeArg::PrefixSuffix => MultiLineMode::PrefixSuffix,
            MultiLineModeArg::Smart => MultiLineMode::Smart,
        }
    }
}

#[derive(Debug, Args, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSourceArgs {
    /// File, device or kernel message buffer to read (e.g. /var/log/messages, /proc/kmsg)
    #[arg(long, env = "FILESOURCE_PATH")]
    pub file_source_path: PathBuf,

    /// Source group name used to tag metrics
    #[arg(long, env = "FILESOURCE_GROUP")]
    pub file_source_group: Option<String>,

    /// Follow frequency in milliseconds: 0 reads continuously, -1 keeps legacy polling,
    /// a positive value polls at that interval. Derived from the path when unset.
    #[arg(long, env = "FILESOURCE_FOLLOW_FREQ", allow_hyphen_values = true)]
    pub file_source_follow_freq: Option<i64>,

    /// Multi-line mode: none, indented, prefix-garbage, prefix-suffix, smart
    #[arg(
        value_enum,
        long,
        env = "FILESOURCE_MULTI_LINE_MODE",
        default_value = "none"
    )]
    pub file_source_multi_line_mode: MultiLineModeArg,

    /// Regex matching the first line of a message (prefix-garbage and prefix-suffix modes)
    #[arg(long, env = "FILESOURCE_MULTI_LINE_PREFIX")]
    pub file_source_multi_line_prefix: Option<String>,

    /// Regex for discarded text (prefix-garbage) or the end of a message (prefix-suffix)
    #[arg(long, env = "FILESOURCE_MULTI_LINE_GARBAGE")]
    pub file_source_multi_line_garbage: Option<String>,

    /// Name used to key the saved read position instead of the generated one
    #[arg(long, env = "FILESOURCE_PERSIST_NAME")]
    pub file_source_persist_name: Option<String>,

    /// Maximum message size in bytes, defaults to the global log message size
    #[arg(long, env = "FILESOURCE_MAX_MSG_SIZE")]
    pub file_source_max_msg_size: Option<usize>,

    /// Read messages already in the /dev/kmsg ring buffer on startup
    #[arg(long, env = "FILESOURCE_KMSG_READ_EXISTING", default_value = "false")]
    pub file_source_kmsg_read_existing: bool,
}

impl FileSourceArgs {
    /// Build the source config from command line args
    pub fn build_config(&self) -> FileSourceConfig {
        let mut multi_line = MultiLineOptions::new(self.file_source_multi_line_mode.into());
        multi_line.prefix = self.file_source_multi_line_prefix.clone();
        multi_line.garbage = self.file_source_multi_line_garbage.clone();

        FileSourceConfig {
            path: self.file_source_path.clone(),
            group: self.file_source_group.clone(),
            follow_freq: self.file_source_follow_freq,
            multi_line,
            persist_name: self.file_source_persist_name.clone(),
            max_msg_size: self.file_source_max_msg_size,
            kmsg_read_existing: self.file_source_kmsg_read_existing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        source: FileSourceArgs,
    }

    #[test]
    fn test_parse_minimal() {
        let cli = TestCli::parse_from(["test", "--file-source-path", "/var/log/app.log"]);
        let config = cli.source.build_config();

        assert_eq!(config.path, PathBuf::from("/var/log/app.log"));
        assert_eq!(config.follow_freq, None);
        assert_eq!(config.multi_line.mode, MultiLineMode::None);
        assert!(!config.kmsg_read_existing);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_negative_follow_freq() {
        let cli = TestCli::parse_from([
            "test",
            "--file-source-path",
            "/var/log/app.log",
            "--file-source-follow-freq",
            "-1",
        ]);
        assert_eq!(cli.source.build_config().follow_freq, Some(-1));
    }

    #[test]
    fn test_parse_multi_line() {
        let cli = TestCli::parse_from([
            "test",
            "--file-source-path",
            "/var/log/app.log",
            "--file-source-multi-line-mode",
            "regexp",
            "--file-source-multi-line-prefix",
            "^\\[",
        ]);
        let config = cli.source.build_config();
        assert_eq!(config.multi_line.mode, MultiLineMode::PrefixGarbage);
        assert_eq!(config.multi_line.prefix(), Some("^\\["));
        assert_eq!(config.multi_line.garbage(), None);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let args: FileSourceArgs = serde_json::from_str(
            r#"{"file_source_path": "/dev/kmsg", "file_source_multi_line_mode": "prefix-suffix", "file_source_kmsg_read_existing": true}"#,
        )
        .unwrap();
        let config = args.build_config();

        assert_eq!(config.path, PathBuf::from("/dev/kmsg"));
        assert_eq!(config.multi_line.mode, MultiLineMode::PrefixSuffix);
        assert!(config.kmsg_read_existing);
        assert_eq!(config.persist_name, None);
    }
}
