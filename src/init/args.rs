// SPDX-License-Identifier: Apache-2.0

use clap::Args;
use std::path::PathBuf;

use crate::config::{ConfigVersion, GlobalConfig};
use crate::init::file_source::FileSourceArgs;
use crate::sources::file::error::Result;
use crate::sources::file::persistence::JsonFileDatabase;

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Configuration compatibility version, as major.minor or 0xMMmm
    #[arg(long, env = "FILESOURCE_CONFIG_VERSION", default_value = "4.8")]
    pub config_version: ConfigVersion,

    /// Default maximum message size in bytes
    #[arg(long, env = "FILESOURCE_LOG_MSG_SIZE", default_value = "65536")]
    pub log_msg_size: usize,

    /// Path of the persistent state file holding saved read positions
    #[arg(
        long,
        env = "FILESOURCE_STATE_FILE",
        default_value = "/var/lib/filesource/state.json"
    )]
    pub state_file: PathBuf,

    /// Capacity of the channel between the source and the pipeline
    #[arg(long, env = "FILESOURCE_QUEUE_SIZE", default_value = "1000")]
    pub queue_size: usize,

    #[command(flatten)]
    pub file_source: FileSourceArgs,
}

impl CheckArgs {
    /// Open the state store and build the global configuration
    pub fn build_global_config(&self) -> Result<GlobalConfig> {
        let state = JsonFileDatabase::open(&self.state_file)?;
        let mut cfg = GlobalConfig::new(self.config_version).with_state(state);
        cfg.log_msg_size = self.log_msg_size;
        Ok(cfg)
    }
}
