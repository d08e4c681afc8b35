// SPDX-License-Identifier: Apache-2.0

//! Source driver for reading log messages from a single file, device node or
//! kernel message buffer, and wiring it into a pipeline engine.

pub mod bounded_channel;
pub mod config;
pub mod diagnostics;
pub mod init;
pub mod sources;
pub mod topology;
