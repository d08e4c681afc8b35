// SPDX-License-Identifier: Apache-2.0

//! Persisted state layout for file sources.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Key of the saved position inside a reader's persister scope
pub const POSITION_KEY: &str = "position";

/// Current schema version of [`PersistedPosition`]
pub const PERSISTED_POSITION_VERSION: u8 = 1;

/// Saved read position of one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPosition {
    pub version: u8,
    /// Last known path, for humans reading the state file
    pub path: String,
    /// Device ID of the file the offset belongs to
    pub dev: u64,
    /// Inode number of the file the offset belongs to
    pub ino: u64,
    /// Byte offset of the next unread byte
    pub offset: u64,
}

/// Build the persistence key of a reader.
///
/// The key only depends on configuration (the path and the opener kind), so a
/// restart with the same configuration finds the same saved position.
pub fn format_persist_name(path: &Path, discriminator: Option<&str>) -> String {
    match discriminator {
        Some(discriminator) => {
            format!("file_source_curpos({}:{})", discriminator, path.display())
        }
        None => format!("file_source_curpos({})", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_persist_name() {
        assert_eq!(
            format_persist_name(Path::new("/var/log/app.log"), None),
            "file_source_curpos(/var/log/app.log)"
        );
        assert_eq!(
            format_persist_name(Path::new("/dev/kmsg"), Some("devkmsg")),
            "file_source_curpos(devkmsg:/dev/kmsg)"
        );
    }

    #[test]
    fn test_persisted_position_json_layout() {
        let position = PersistedPosition {
            version: PERSISTED_POSITION_VERSION,
            path: "/var/log/app.log".to_string(),
            dev: 1,
            ino: 100,
            offset: 500,
        };

        let value = serde_json::to_value(&position).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["path"], "/var/log/app.log");
        assert_eq!(value["offset"], 500);
    }
}
