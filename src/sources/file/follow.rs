// SPDX-License-Identifier: Apache-2.0

//! Default follow mode for a file source.

use tracing::warn;

use crate::config::{ConfigVersion, VERSION_3_0};
use crate::diagnostics::OnceFlag;
use crate::sources::file::classify::FileClassification;
use crate::sources::file::config::{FollowMode, PollInterval};

/// Pick the follow mode a source gets when `follow-freq` is not set.
///
/// Configurations older than 3.0 keep the legacy "poll forever" value for every
/// path; the behaviour change is announced once per process through `warned`.
/// Newer configurations read device nodes and `/proc/kmsg` continuously and
/// poll everything else once a second.
pub fn default_follow_mode(
    version: ConfigVersion,
    classification: FileClassification,
    warned: &OnceFlag,
) -> FollowMode {
    if version.is_older_than(VERSION_3_0) {
        if warned.first() {
            warn!(
                config_version = %version,
                "WARNING: file source: default value of follow_freq in file sources has changed in {} to '1' for all files except /proc/kmsg",
                VERSION_3_0
            );
        }
        return FollowMode::Legacy;
    }

    match classification {
        FileClassification::DeviceNode
        | FileClassification::DevKmsg
        | FileClassification::ProcKmsg => FollowMode::Disabled,
        FileClassification::Regular => FollowMode::Poll(PollInterval::default()),
    }
}
