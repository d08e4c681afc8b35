// SPDX-License-Identifier: Apache-2.0

//! Pipe graph plumbing shared by source drivers.
//!
//! A pipe is anything with an init/deinit lifecycle that can accept messages.
//! Pipes are owned by whoever constructed them; the [`PipeGraph`] only records
//! which pipe forwards into which, by id.

pub mod graph;
pub mod message;
pub mod pipe;
pub mod source_driver;

pub use graph::PipeGraph;
pub use message::{FileMetadata, LogMessage, MessageMetadata, PathOptions};
pub use pipe::{LogPipe, PipeError, PipeId, PipeState};
pub use source_driver::{SourceDriver, SourceQueue};
