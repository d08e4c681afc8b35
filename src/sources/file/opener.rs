// SPDX-License-Identifier: Apache-2.0

//! Openers encapsulate how each kind of source path is opened.
//!
//! - **Regular files** are opened read-only and non-blocking, and may be
//!   reopened and seeked by a polling reader.
//! - **`/proc/kmsg`** needs privileges and every read consumes the message, so
//!   positions are never restored.
//! - **`/dev/kmsg`** gives each reader its own cursor; the cursor starts at the
//!   end of the ring buffer unless existing messages are requested.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::sources::file::classify::{is_dev_kmsg, is_proc_kmsg};
use crate::sources::file::config::{FileOpenerOptions, FollowMode};
use crate::sources::file::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenerKind {
    RegularFile,
    ProcKmsg,
    DevKmsg,
}

impl fmt::Display for OpenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenerKind::RegularFile => write!(f, "regular"),
            OpenerKind::ProcKmsg => write!(f, "prockmsg"),
            OpenerKind::DevKmsg => write!(f, "devkmsg"),
        }
    }
}

/// Strategy for opening one kind of source path.
pub trait FileOpener: fmt::Debug + Send + Sync {
    fn kind(&self) -> OpenerKind;

    /// Open `path` for reading.
    fn open(&self, path: &Path, options: &FileOpenerOptions) -> Result<File>;

    /// Whether a reader may seek to a saved position after opening.
    fn can_restore_position(&self) -> bool;

    /// Component added to the persistence key to tell openers apart.
    fn persist_discriminator(&self) -> Option<&'static str> {
        None
    }
}

/// Select the opener for a source.
///
/// Polling always gets the regular file opener, since polling reopens and
/// seeks. Kernel message paths only get their own openers when they are read
/// continuously. `/proc/kmsg` marks the source as needing privileges.
pub fn select_opener(
    follow: FollowMode,
    path: &Path,
    options: &mut FileOpenerOptions,
) -> Arc<dyn FileOpener> {
    let opener: Arc<dyn FileOpener> = if follow.is_polling() {
        Arc::new(RegularFileOpener)
    } else if is_proc_kmsg(path) {
        options.needs_privileges = true;
        Arc::new(ProcKmsgOpener)
    } else if is_dev_kmsg(path) {
        Arc::new(DevKmsgOpener)
    } else {
        Arc::new(RegularFileOpener)
    };

    debug!(
        path = %path.display(),
        follow_freq = follow.millis(),
        opener = %opener.kind(),
        needs_privileges = options.needs_privileges,
        "Selected file opener"
    );
    opener
}

fn read_only_nonblocking() -> OpenOptions {
    let mut open_options = OpenOptions::new();
    open_options
        .read(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK);
    open_options
}

fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

fn open_error(path: &Path, source: io::Error) -> Error {
    if source.kind() == io::ErrorKind::PermissionDenied {
        Error::Permission {
            path: path.to_path_buf(),
            source,
        }
    } else {
        Error::Open {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RegularFileOpener;

impl FileOpener for RegularFileOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::RegularFile
    }

    fn open(&self, path: &Path, _options: &FileOpenerOptions) -> Result<File> {
        read_only_nonblocking().open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })
    }

    fn can_restore_position(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcKmsgOpener;

impl FileOpener for ProcKmsgOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::ProcKmsg
    }

    fn open(&self, path: &Path, options: &FileOpenerOptions) -> Result<File> {
        if options.needs_privileges && !is_privileged() {
            warn!(
                path = %path.display(),
                "Not running as root, opening the kernel message buffer may fail without CAP_SYSLOG"
            );
        }

        read_only_nonblocking()
            .open(path)
            .map_err(|e| open_error(path, e))
    }

    fn can_restore_position(&self) -> bool {
        false
    }

    fn persist_discriminator(&self) -> Option<&'static str> {
        Some("prockmsg")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DevKmsgOpener;

impl FileOpener for DevKmsgOpener {
    fn kind(&self) -> OpenerKind {
        OpenerKind::DevKmsg
    }

    fn open(&self, path: &Path, options: &FileOpenerOptions) -> Result<File> {
        let mut file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| open_error(path, e))?;

        if !options.kmsg_read_existing {
            file.seek(SeekFrom::End(0)).map_err(|source| Error::Open {
                path: path.to_path_buf(),
                source,
            })?;
            debug!("Seeked to end of kmsg ring buffer");
        }

        Ok(file)
    }

    fn can_restore_position(&self) -> bool {
        false
    }

    fn persist_discriminator(&self) -> Option<&'static str> {
        Some("devkmsg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::file::config::PollInterval;
    use std::io::{Read, Write};
    use tempfile::NamedTempFile;

    fn poll() -> FollowMode {
        FollowMode::Poll(PollInterval::default())
    }

    #[test]
    fn test_polling_always_uses_regular_opener() {
        for path in ["/proc/kmsg", "/dev/kmsg", "/var/log/app.log"] {
            let mut options = FileOpenerOptions::default();
            let opener = select_opener(poll(), Path::new(path), &mut options);
            assert_eq!(opener.kind(), OpenerKind::RegularFile, "{}", path);
            assert!(!options.needs_privileges);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_kmsg_needs_privileges() {
        for follow in [FollowMode::Disabled, FollowMode::Legacy] {
            let mut options = FileOpenerOptions::default();
            let opener = select_opener(follow, Path::new("/proc/kmsg"), &mut options);
            assert_eq!(opener.kind(), OpenerKind::ProcKmsg);
            assert!(options.needs_privileges);
            assert!(!opener.can_restore_position());
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_dev_kmsg_opener() {
        let mut options = FileOpenerOptions::default();
        let opener = select_opener(FollowMode::Disabled, Path::new("/dev/kmsg"), &mut options);
        assert_eq!(opener.kind(), OpenerKind::DevKmsg);
        assert!(!options.needs_privileges);
        assert_eq!(opener.persist_discriminator(), Some("devkmsg"));
    }

    #[test]
    fn test_other_paths_use_regular_opener() {
        let mut options = FileOpenerOptions::default();
        let opener = select_opener(FollowMode::Disabled, Path::new("/dev/ttyS0"), &mut options);
        assert_eq!(opener.kind(), OpenerKind::RegularFile);
        assert!(opener.can_restore_position());
        assert_eq!(opener.persist_discriminator(), None);
    }

    #[test]
    fn test_regular_opener_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello\n").unwrap();
        file.flush().unwrap();

        let mut opened = RegularFileOpener
            .open(file.path(), &FileOpenerOptions::default())
            .unwrap();
        let mut content = String::new();
        opened.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello\n");
    }

    #[test]
    fn test_regular_opener_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.log");

        let err = RegularFileOpener
            .open(&missing, &FileOpenerOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_permission_error_mapping() {
        let err = open_error(
            Path::new("/proc/kmsg"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, Error::Permission { .. }));
        assert!(err.to_string().contains("CAP_SYSLOG"));

        let err = open_error(
            Path::new("/proc/kmsg"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(err, Error::Open { .. }));
    }
}
