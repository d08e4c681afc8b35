// SPDX-License-Identifier: Apache-2.0

//! Classification of a source path into the file kinds that need different
//! follow and open handling.
//!
//! Classification runs once, when the driver is constructed. If the path
//! changes type afterwards the earlier decision is kept.

use std::fs;
use std::path::Path;

/// Legacy kernel ring buffer; reads are destructive and need privileges
pub const PROC_KMSG_PATH: &str = "/proc/kmsg";

/// Kernel message device with a per-reader cursor
pub const DEV_KMSG_PATH: &str = "/dev/kmsg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClassification {
    /// Regular file, or a path that could not be inspected
    Regular,
    /// Character/block device, FIFO or other non-regular node
    DeviceNode,
    /// `/proc/kmsg`
    ProcKmsg,
    /// `/dev/kmsg` present as a device node
    DevKmsg,
}

impl FileClassification {
    /// Inspect `path`. Never fails: a missing path is treated as a regular file.
    pub fn of(path: &Path) -> Self {
        if is_proc_kmsg(path) {
            return FileClassification::ProcKmsg;
        }

        let device = is_device_node(path);
        if device && is_dev_kmsg(path) {
            FileClassification::DevKmsg
        } else if device {
            FileClassification::DeviceNode
        } else {
            FileClassification::Regular
        }
    }

    /// Device nodes and kernel buffers are kept open and read as events arrive.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, FileClassification::Regular)
    }
}

/// `/proc/kmsg` is only special on Linux, and only when spelled exactly.
pub fn is_proc_kmsg(path: &Path) -> bool {
    cfg!(target_os = "linux") && path.as_os_str() == PROC_KMSG_PATH
}

/// `/dev/kmsg` is only special on Linux, and only when spelled exactly.
pub fn is_dev_kmsg(path: &Path) -> bool {
    cfg!(target_os = "linux") && path.as_os_str() == DEV_KMSG_PATH
}

/// True if `path` exists and is not a regular file.
pub fn is_device_node(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => !metadata.is_file(),
        Err(_) => false,
    }
}
