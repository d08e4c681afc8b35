// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;

use crate::topology::PipeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Multi-line configuration error: {0}")]
    Framing(String),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Permission denied opening {path} (reading it requires root or CAP_SYSLOG)")]
    Permission {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pipe(#[from] PipeError),
}

pub type Result<T> = std::result::Result<T, Error>;
