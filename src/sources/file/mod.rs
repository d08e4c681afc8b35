// SPDX-License-Identifier: Apache-2.0

//! File source for regular files, device nodes and kernel message buffers.
//!
//! The driver classifies its path once, derives how the path is followed and
//! opened, validates multi-line framing, and runs a reader through the pipe
//! lifecycle.
//!
//! Features:
//! - Polling for growing regular files, continuous reads for devices
//! - Dedicated openers for `/proc/kmsg` and `/dev/kmsg`
//! - Read position persistence keyed by a restart-stable name

pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod file_id;
pub mod follow;
pub mod framing;
pub mod opener;
pub mod persistence;
pub mod reader;

pub use classify::FileClassification;
pub use config::{
    FileOpenerOptions, FileReaderOptions, FileSourceConfig, FollowMode, MultiLineMode,
    MultiLineOptions, PollInterval,
};
pub use driver::FileSourceDriver;
pub use error::{Error, Result};
pub use file_id::FileId;
pub use opener::{DevKmsgOpener, FileOpener, OpenerKind, ProcKmsgOpener, RegularFileOpener};
pub use persistence::{JsonFileDatabase, JsonFilePersister};
pub use reader::FileReader;
