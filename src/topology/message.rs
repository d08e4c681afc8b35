// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::sync::Arc;

/// A single log message travelling from a source into the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct LogMessage {
    pub metadata: Option<MessageMetadata>,
    pub payload: Bytes,
}

impl LogMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            metadata: None,
            payload: payload.into(),
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MessageMetadata {
    File(FileMetadata),
}

/// Where in which file a message was read.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMetadata {
    pub path: Arc<str>,
    /// Byte offset of the first byte of the message
    pub offset: u64,
}

/// Per-message delivery options that travel alongside the message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathOptions {
    /// The sender wants an acknowledgement once the message is delivered
    pub ack_needed: bool,
    /// The sender participates in flow control
    pub flow_control_requested: bool,
}

impl PathOptions {
    pub fn acked() -> Self {
        Self {
            ack_needed: true,
            flow_control_requested: false,
        }
    }
}
