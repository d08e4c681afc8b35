// SPDX-License-Identifier: Apache-2.0

//! The file source driver.
//!
//! A `FileSourceDriver` decides how its path is followed and opened, checks the
//! framing options, and owns the [`FileReader`] that does the reading. It
//! embeds a generic [`SourceDriver`] for the parts of the lifecycle shared with
//! every other source.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::bounded_channel::BoundedSender;
use crate::config::GlobalConfig;
use crate::diagnostics::LEGACY_FOLLOW_FREQ_WARNING;
use crate::sources::file::classify::FileClassification;
use crate::sources::file::config::{
    FileOpenerOptions, FileReaderOptions, FollowMode, MultiLineOptions, STATS_SOURCE,
};
use crate::sources::file::error::{Error, Result};
use crate::sources::file::follow::default_follow_mode;
use crate::sources::file::framing::validate_multi_line;
use crate::sources::file::opener::{FileOpener, OpenerKind, select_opener};
use crate::sources::file::reader::FileReader;
use crate::topology::pipe::Transition;
use crate::topology::{
    LogMessage, LogPipe, PathOptions, PipeGraph, PipeId, PipeState, SourceDriver, SourceQueue,
};

pub struct FileSourceDriver {
    base: SourceDriver,
    path: PathBuf,
    classification: FileClassification,
    reader_options: FileReaderOptions,
    opener_options: FileOpenerOptions,
    opener: Arc<dyn FileOpener>,
    reader: Option<FileReader>,
}

impl FileSourceDriver {
    /// Construct an uninitialized driver for `path`.
    ///
    /// The only I/O is a single `stat` of the path used to classify it.
    pub fn new(
        path: impl AsRef<Path>,
        cfg: &GlobalConfig,
        group: Option<String>,
        output: Option<BoundedSender<LogMessage>>,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        let classification = FileClassification::of(&path);
        let follow = default_follow_mode(cfg.version, classification, &LEGACY_FOLLOW_FREQ_WARNING);

        let mut reader_options = FileReaderOptions::default();
        reader_options.set_follow(follow);

        let mut opener_options = FileOpenerOptions::default();
        let opener = select_opener(follow, &path, &mut opener_options);

        let base = SourceDriver::new(STATS_SOURCE, group, output);
        debug!(
            pipe = %base.id(),
            path = %path.display(),
            classification = ?classification,
            continuous = classification.is_continuous(),
            follow_freq = follow.millis(),
            "Constructed file source driver"
        );

        Self {
            base,
            path,
            classification,
            reader_options,
            opener_options,
            opener,
            reader: None,
        }
    }

    fn ensure_configurable(&self, option: &str) -> Result<()> {
        match self.base.state() {
            PipeState::Uninitialized => Ok(()),
            state => Err(Error::Config(format!(
                "{}() cannot be changed on a file source that is {}",
                option, state
            ))),
        }
    }

    /// Override the derived follow mode. The opener is selected again.
    pub fn set_follow(&mut self, follow: FollowMode) -> Result<()> {
        self.ensure_configurable("follow-freq")?;

        self.reader_options.set_follow(follow);
        self.opener_options.needs_privileges = false;
        self.opener = select_opener(follow, &self.path, &mut self.opener_options);
        Ok(())
    }

    pub fn set_multi_line(&mut self, multi_line: MultiLineOptions) -> Result<()> {
        self.ensure_configurable("multi-line-mode")?;
        self.reader_options.multi_line = multi_line;
        Ok(())
    }

    pub fn set_persist_name(&mut self, persist_name: impl Into<String>) -> Result<()> {
        self.ensure_configurable("persist-name")?;

        let persist_name = persist_name.into();
        if persist_name.is_empty() {
            return Err(Error::Config("persist-name cannot be empty".to_string()));
        }
        self.reader_options.persist_name = Some(persist_name);
        Ok(())
    }

    pub fn set_max_msg_size(&mut self, max_msg_size: usize) -> Result<()> {
        self.ensure_configurable("log-msg-size")?;

        if max_msg_size == 0 {
            return Err(Error::Config("log-msg-size must be positive".to_string()));
        }
        self.reader_options.max_msg_size = Some(max_msg_size);
        Ok(())
    }

    pub fn set_kmsg_read_existing(&mut self, read_existing: bool) -> Result<()> {
        self.ensure_configurable("kmsg-read-existing")?;
        self.opener_options.kmsg_read_existing = read_existing;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn classification(&self) -> FileClassification {
        self.classification
    }

    pub fn follow(&self) -> FollowMode {
        self.reader_options.follow()
    }

    /// The resolved `follow_freq` in milliseconds
    pub fn follow_freq(&self) -> i64 {
        self.follow().millis()
    }

    pub fn restore_state(&self) -> bool {
        self.reader_options.restore_state()
    }

    pub fn needs_privileges(&self) -> bool {
        self.opener_options.needs_privileges
    }

    pub fn opener_kind(&self) -> OpenerKind {
        self.opener.kind()
    }

    pub fn reader_options(&self) -> &FileReaderOptions {
        &self.reader_options
    }

    pub fn group(&self) -> Option<&str> {
        self.base.group()
    }

    /// The reader, present from a successful init until free.
    pub fn reader(&self) -> Option<&FileReader> {
        self.reader.as_ref()
    }

    pub fn reader_mut(&mut self) -> Option<&mut FileReader> {
        self.reader.as_mut()
    }

    pub fn queue_handle(&self) -> Arc<SourceQueue> {
        self.base.queue_handle()
    }

    /// Release the driver together with its reader and opener.
    ///
    /// Allowed for a driver that is deinitialized or never initialized.
    pub fn free(mut self) -> Result<()> {
        if let Err(e) = self.base.free_method() {
            error!(
                pipe = %self.base.id(),
                path = %self.path.display(),
                error = %e,
                "Freeing file source in an unexpected state"
            );
            return Err(e.into());
        }

        debug!(
            pipe = %self.base.id(),
            path = %self.path.display(),
            had_reader = self.reader.is_some(),
            "Freed file source"
        );
        Ok(())
    }
}

impl LogPipe for FileSourceDriver {
    type Error = Error;

    fn id(&self) -> PipeId {
        self.base.id()
    }

    fn state(&self) -> PipeState {
        self.base.state()
    }

    fn init(&mut self, cfg: &GlobalConfig, graph: &mut PipeGraph) -> Result<()> {
        self.base.state().next(Transition::Init)?;

        if let Err(e) = validate_multi_line(&self.reader_options.multi_line) {
            error!(path = %self.path.display(), error = %e, "Invalid file source configuration");
            return Err(e);
        }

        // Resolved options are only kept once init succeeds
        let mut reader_options = self.reader_options.clone();
        reader_options.resolve(cfg);

        let mut reader = FileReader::new(
            &self.path,
            reader_options.clone(),
            self.opener_options,
            self.opener.clone(),
            self.base.queue_handle(),
        );
        graph.append(reader.id(), self.base.id())?;

        let initialized = reader
            .init(cfg, graph)
            .and_then(|()| self.base.init_method(cfg).map_err(Error::from));
        if let Err(e) = initialized {
            graph.unlink(reader.id());
            error!(
                path = %self.path.display(),
                opener = %self.opener.kind(),
                error = %e,
                "Error initializing file source"
            );
            return Err(e);
        }

        info!(
            pipe = %self.base.id(),
            reader = %reader.id(),
            path = %self.path.display(),
            follow_freq = self.follow_freq(),
            restore_state = self.restore_state(),
            needs_privileges = self.needs_privileges(),
            "File source initialized"
        );
        self.reader_options = reader_options;
        self.reader = Some(reader);
        Ok(())
    }

    fn deinit(&mut self, graph: &mut PipeGraph) -> Result<()> {
        self.base.state().next(Transition::Deinit)?;

        let reader_result = match self.reader.as_mut() {
            Some(reader) => {
                let result = reader.deinit(graph);
                graph.unlink(reader.id());
                result
            }
            None => Ok(()),
        };
        self.base.deinit_method()?;

        if let Err(e) = &reader_result {
            error!(
                path = %self.path.display(),
                error = %e,
                "Error deinitializing file reader"
            );
        }
        reader_result
    }

    fn queue(&self, msg: LogMessage, path_options: &PathOptions) {
        if !self.base.state().is_initialized() {
            debug!(
                path = %self.path.display(),
                state = %self.base.state(),
                "Dropping message queued to a file source that is not running"
            );
            return;
        }
        self.base.queue_method(msg, path_options);
    }

    fn persist_name(&self) -> Option<String> {
        self.reader.as_ref().and_then(|reader| reader.persist_name())
    }
}

impl fmt::Debug for FileSourceDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSourceDriver")
            .field("id", &self.base.id())
            .field("path", &self.path)
            .field("classification", &self.classification)
            .field("follow", &self.reader_options.follow())
            .field("opener", &self.opener.kind())
            .field("state", &self.base.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::bounded;
    use crate::config::ConfigVersion;
    use crate::sources::file::config::{MultiLineMode, PollInterval};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tracing_test::traced_test;

    fn log_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"first\nsecond\n").unwrap();
        file.flush().unwrap();
        file
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_kmsg_defaults() {
        let driver = FileSourceDriver::new("/proc/kmsg", &GlobalConfig::default(), None, None);

        assert_eq!(driver.classification(), FileClassification::ProcKmsg);
        assert_eq!(driver.follow_freq(), 0);
        assert!(driver.needs_privileges());
        assert!(!driver.restore_state());
        assert_eq!(driver.opener_kind(), OpenerKind::ProcKmsg);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_kmsg_alias_spellings_are_polled() {
        for path in ["/proc//kmsg", "/proc/./kmsg"] {
            let driver = FileSourceDriver::new(path, &GlobalConfig::default(), None, None);

            assert_ne!(driver.classification(), FileClassification::ProcKmsg);
            assert!(!driver.needs_privileges(), "{}", path);
            assert_eq!(driver.opener_kind(), OpenerKind::RegularFile, "{}", path);
        }
    }

    #[test]
    fn test_regular_file_defaults() {
        let driver =
            FileSourceDriver::new("/var/log/app.log", &GlobalConfig::default(), None, None);

        assert_eq!(driver.follow_freq(), 1000);
        assert!(!driver.needs_privileges());
        assert!(driver.restore_state());
        assert_eq!(driver.opener_kind(), OpenerKind::RegularFile);
        assert_eq!(driver.state(), PipeState::Uninitialized);
    }

    #[test]
    fn test_legacy_version_polls_every_path() {
        let cfg = GlobalConfig::new(ConfigVersion::new(2, 5));
        for path in ["/var/log/app.log", "/proc/kmsg", "/dev/null"] {
            let driver = FileSourceDriver::new(path, &cfg, None, None);
            assert_eq!(driver.follow_freq(), -1, "{}", path);
            assert!(!driver.restore_state());
        }
        assert!(LEGACY_FOLLOW_FREQ_WARNING.is_set());
    }

    #[test]
    fn test_device_node_is_read_continuously() {
        let driver = FileSourceDriver::new("/dev/null", &GlobalConfig::default(), None, None);
        assert_eq!(driver.classification(), FileClassification::DeviceNode);
        assert_eq!(driver.follow_freq(), 0);
        assert_eq!(driver.opener_kind(), OpenerKind::RegularFile);
    }

    #[test]
    fn test_follow_override_reselects_opener() {
        let mut driver = FileSourceDriver::new("/proc/kmsg", &GlobalConfig::default(), None, None);

        driver
            .set_follow(FollowMode::Poll(PollInterval::from_millis(200).unwrap()))
            .unwrap();
        assert_eq!(driver.follow_freq(), 200);
        assert!(driver.restore_state());
        assert!(!driver.needs_privileges());
        assert_eq!(driver.opener_kind(), OpenerKind::RegularFile);
    }

    #[test]
    fn test_init_and_deinit() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);

        assert_eq!(driver.persist_name(), None);
        driver.init(&cfg, &mut graph).unwrap();
        assert_eq!(driver.state(), PipeState::Initialized);

        let reader_id = driver.reader().map(|r| r.id()).unwrap();
        assert_eq!(graph.next_of(reader_id), Some(driver.id()));
        assert_eq!(graph.children_of(driver.id()), vec![reader_id]);

        let expected = format!("file_source_curpos({})", file.path().display());
        assert_eq!(driver.persist_name(), Some(expected.clone()));

        driver.deinit(&mut graph).unwrap();
        assert_eq!(driver.state(), PipeState::Deinitialized);
        assert!(graph.is_empty());
        assert_eq!(driver.persist_name(), Some(expected));

        driver.free().unwrap();
    }

    #[test]
    fn test_double_init_rejected() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);

        driver.init(&cfg, &mut graph).unwrap();
        let err = driver.init(&cfg, &mut graph).unwrap_err();
        assert!(matches!(err, Error::Pipe(_)));
        assert_eq!(graph.len(), 1);
        assert_eq!(driver.state(), PipeState::Initialized);
    }

    #[test]
    fn test_no_reinit_after_deinit() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);

        driver.init(&cfg, &mut graph).unwrap();
        driver.deinit(&mut graph).unwrap();
        assert!(driver.init(&cfg, &mut graph).is_err());
        assert!(driver.deinit(&mut graph).is_err());
    }

    #[test]
    fn test_invalid_framing_leaves_nothing_behind() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);

        driver
            .set_multi_line(MultiLineOptions::new(MultiLineMode::None).with_prefix("^\\d"))
            .unwrap();
        let err = driver.init(&cfg, &mut graph).unwrap_err();

        assert!(matches!(err, Error::Framing(_)));
        assert!(graph.is_empty());
        assert!(driver.reader().is_none());
        assert_eq!(driver.state(), PipeState::Uninitialized);
        driver.free().unwrap();
    }

    #[traced_test]
    #[test]
    fn test_invalid_framing_logs_error() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);
        driver
            .set_multi_line(MultiLineOptions::new(MultiLineMode::PrefixGarbage).with_prefix("(["))
            .unwrap();

        assert!(driver.init(&cfg, &mut PipeGraph::new()).is_err());
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("Invalid file source configuration"));
        assert!(!logs_contain("File source initialized"));
    }

    #[test]
    fn test_prefix_suffix_framing_accepted() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);

        driver
            .set_multi_line(
                MultiLineOptions::new(MultiLineMode::PrefixSuffix).with_prefix("^BEGIN"),
            )
            .unwrap();
        assert!(driver.init(&cfg, &mut PipeGraph::new()).is_ok());
    }

    #[test]
    fn test_reader_failure_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let mut driver = FileSourceDriver::new(dir.path().join("missing.log"), &cfg, None, None);

        let err = driver.init(&cfg, &mut graph).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
        assert!(graph.is_empty());
        assert!(driver.reader().is_none());
        assert_eq!(driver.state(), PipeState::Uninitialized);
    }

    #[test]
    fn test_setters_rejected_after_init() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);
        driver.init(&cfg, &mut PipeGraph::new()).unwrap();

        assert!(matches!(
            driver.set_follow(FollowMode::Disabled),
            Err(Error::Config(_))
        ));
        assert!(driver.set_persist_name("other").is_err());
        assert_eq!(driver.follow_freq(), 1000);
    }

    #[test]
    fn test_persist_name_override() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);

        assert!(driver.set_persist_name("").is_err());
        driver.set_persist_name("app").unwrap();
        driver.init(&cfg, &mut PipeGraph::new()).unwrap();
        assert_eq!(driver.persist_name().as_deref(), Some("app"));
    }

    #[test]
    fn test_max_msg_size_from_global_config() {
        let file = log_file();
        let mut cfg = GlobalConfig::default();
        cfg.log_msg_size = 4096;

        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);
        driver.init(&cfg, &mut PipeGraph::new()).unwrap();
        assert_eq!(driver.reader_options().max_msg_size(), 4096);
        assert_eq!(
            driver.reader().map(|r| r.options().max_msg_size()),
            Some(4096)
        );
    }

    #[test]
    fn test_queue_only_while_initialized() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let (tx, rx) = bounded(8);
        let mut driver = FileSourceDriver::new(file.path(), &cfg, Some("s_files".into()), Some(tx));

        driver.queue(LogMessage::new("early"), &PathOptions::default());
        assert!(rx.is_empty());

        driver.init(&cfg, &mut graph).unwrap();
        driver.queue(LogMessage::new("direct"), &PathOptions::default());
        if let Some(reader) = driver.reader() {
            reader.queue(LogMessage::new("from reader"), &PathOptions::acked());
        }

        let received: Vec<_> = rx.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(received, vec!["direct", "from reader"]);
        assert_eq!(driver.queue_handle().queued(), 2);
        assert_eq!(driver.group(), Some("s_files"));
    }

    #[test]
    fn test_reader_cannot_deliver_after_deinit() {
        let file = log_file();
        let cfg = GlobalConfig::default();
        let mut graph = PipeGraph::new();
        let (tx, rx) = bounded(8);
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, Some(tx));

        driver.init(&cfg, &mut graph).unwrap();
        assert!(driver.reader_mut().unwrap().emit("first\n", &PathOptions::default()));
        driver.deinit(&mut graph).unwrap();

        let reader = driver.reader_mut().unwrap();
        assert!(!reader.emit("after deinit\n", &PathOptions::default()));
        assert_eq!(reader.position(), 6);
        driver.queue(LogMessage::new("direct"), &PathOptions::default());

        let received: Vec<_> = rx.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(received, vec!["first\n"]);
        assert!(!driver.queue_handle().is_running());
    }

    #[test]
    fn test_failed_init_keeps_options() {
        let file = log_file();
        let mut cfg = GlobalConfig::default();
        cfg.log_msg_size = 4096;
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);
        driver
            .set_multi_line(MultiLineOptions::new(MultiLineMode::Smart).with_garbage("^$"))
            .unwrap();

        assert!(driver.init(&cfg, &mut PipeGraph::new()).is_err());
        assert_eq!(driver.reader_options().max_msg_size, None);

        let dir = tempfile::tempdir().unwrap();
        let mut missing = FileSourceDriver::new(dir.path().join("missing.log"), &cfg, None, None);
        assert!(missing.init(&cfg, &mut PipeGraph::new()).is_err());
        assert_eq!(missing.reader_options().max_msg_size, None);
    }

    #[test]
    fn test_follow_override_keeps_configured_interval() {
        let mut driver =
            FileSourceDriver::new("/var/log/app.log", &GlobalConfig::default(), None, None);

        driver
            .set_follow(FollowMode::from_millis(i64::MAX).unwrap())
            .unwrap();
        assert_eq!(driver.follow_freq(), i64::MAX);
        assert!(driver.restore_state());

        let wrapped = PollInterval::try_from(std::time::Duration::MAX);
        assert!(wrapped.is_err());
        let sub_ms = PollInterval::try_from(std::time::Duration::from_micros(500));
        assert!(sub_ms.is_err());
    }

    #[test]
    fn test_free_states() {
        let cfg = GlobalConfig::default();
        let driver = FileSourceDriver::new("/var/log/app.log", &cfg, None, None);
        assert!(driver.free().is_ok());

        let file = log_file();
        let mut driver = FileSourceDriver::new(file.path(), &cfg, None, None);
        driver.init(&cfg, &mut PipeGraph::new()).unwrap();
        assert!(driver.free().is_err());
    }
}
