// SPDX-License-Identifier: Apache-2.0

//! The reader pipe of a file source.
//!
//! A `FileReader` opens its path through the opener chosen by the driver,
//! restores the saved read position when the source is polled, and forwards
//! every message it produces to the driver that owns it. The read loop hands
//! framed messages to [`FileReader::emit`], or reports skipped bytes through
//! [`FileReader::advance`].

use bytes::Bytes;
use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::sources::file::config::{FileOpenerOptions, FileReaderOptions};
use crate::sources::file::error::{Error, Result};
use crate::sources::file::file_id::FileId;
use crate::sources::file::opener::{FileOpener, OpenerKind};
use crate::sources::file::persistence::{
    JsonFilePersister, PERSISTED_POSITION_VERSION, POSITION_KEY, PersistedPosition,
    format_persist_name,
};
use crate::topology::{
    FileMetadata, LogMessage, LogPipe, MessageMetadata, PathOptions, PipeGraph, PipeId,
    PipeState, SourceQueue,
};
use crate::topology::pipe::Transition;

pub struct FileReader {
    id: PipeId,
    path: PathBuf,
    path_label: Arc<str>,
    options: FileReaderOptions,
    opener_options: FileOpenerOptions,
    opener: Arc<dyn FileOpener>,
    owner: Arc<SourceQueue>,
    state: PipeState,
    file: Option<File>,
    file_id: Option<FileId>,
    offset: u64,
    persister: Option<JsonFilePersister>,
}

impl FileReader {
    pub fn new(
        path: impl AsRef<Path>,
        options: FileReaderOptions,
        opener_options: FileOpenerOptions,
        opener: Arc<dyn FileOpener>,
        owner: Arc<SourceQueue>,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            id: PipeId::next(),
            path_label: Arc::from(path.display().to_string()),
            path,
            options,
            opener_options,
            opener,
            owner,
            state: PipeState::Uninitialized,
            file: None,
            file_id: None,
            offset: 0,
            persister: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &FileReaderOptions {
        &self.options
    }

    pub fn opener_kind(&self) -> OpenerKind {
        self.opener.kind()
    }

    /// Offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.offset
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Record that `bytes` more bytes were consumed by the read loop.
    pub fn advance(&mut self, bytes: u64) {
        self.offset += bytes;
    }

    /// Queue one framed message read at the current position and move past it.
    ///
    /// Returns false if the message was dropped. A reader that is not
    /// initialized drops without moving; otherwise the position advances even
    /// when the owner queue is full.
    pub fn emit(&mut self, payload: impl Into<Bytes>, path_options: &PathOptions) -> bool {
        if !self.state.is_initialized() {
            debug!(
                path = %self.path.display(),
                state = %self.state,
                "Dropping message from a file reader that is not running"
            );
            return false;
        }

        let payload = payload.into();
        let len = payload.len() as u64;
        let msg = LogMessage::new(payload).with_metadata(MessageMetadata::File(FileMetadata {
            path: self.path_label.clone(),
            offset: self.offset,
        }));
        self.offset += len;
        self.owner.queue(msg, path_options)
    }

    /// The identity key, explicit or derived from the path and opener.
    pub fn generate_persist_name(&self) -> String {
        match &self.options.persist_name {
            Some(name) => name.clone(),
            None => format_persist_name(&self.path, self.opener.persist_discriminator()),
        }
    }

    fn restore_position(&mut self, cfg: &GlobalConfig, file: &mut File) -> Result<()> {
        let key = self.generate_persist_name();
        let mut persister = cfg.state.persister(key.clone());
        persister.load()?;

        let file_id = FileId::from_file(file)?;
        self.file_id = Some(file_id);

        match persister.try_get_raw_json::<PersistedPosition>(POSITION_KEY) {
            Ok(Some(saved)) => {
                let len = file.metadata()?.len();
                if FileId::new(saved.dev, saved.ino) != file_id {
                    info!(
                        path = %self.path.display(),
                        saved_id = %FileId::new(saved.dev, saved.ino),
                        current_id = %file_id,
                        "File was replaced since the position was saved, reading from the beginning"
                    );
                } else if saved.offset > len {
                    info!(
                        path = %self.path.display(),
                        saved_offset = saved.offset,
                        file_size = len,
                        "File was truncated since the position was saved, reading from the beginning"
                    );
                } else {
                    file.seek(SeekFrom::Start(saved.offset))?;
                    self.offset = saved.offset;
                    debug!(
                        path = %self.path.display(),
                        offset = saved.offset,
                        "Restored saved file position"
                    );
                }
            }
            Ok(None) => {
                debug!(persist_name = %key, "No saved position");
            }
            Err(e) => {
                warn!(
                    persist_name = %key,
                    error = %e,
                    "Ignoring unreadable saved position"
                );
            }
        }

        self.persister = Some(persister);
        Ok(())
    }

    fn save_position(&mut self) -> Result<()> {
        let (Some(persister), Some(file_id)) = (self.persister.as_mut(), self.file_id) else {
            return Ok(());
        };

        let position = PersistedPosition {
            version: PERSISTED_POSITION_VERSION,
            path: self.path.display().to_string(),
            dev: file_id.dev(),
            ino: file_id.ino(),
            offset: self.offset,
        };
        persister.set_raw_json(POSITION_KEY, &position)?;
        persister.sync()?;

        debug!(
            path = %self.path.display(),
            offset = self.offset,
            "Saved file position"
        );
        Ok(())
    }
}

impl LogPipe for FileReader {
    type Error = Error;

    fn id(&self) -> PipeId {
        self.id
    }

    fn state(&self) -> PipeState {
        self.state
    }

    fn init(&mut self, cfg: &GlobalConfig, _graph: &mut PipeGraph) -> Result<()> {
        let next = self.state.next(Transition::Init)?;

        let mut file = self.opener.open(&self.path, &self.opener_options)?;
        if self.options.restore_state() && self.opener.can_restore_position() {
            self.restore_position(cfg, &mut file)?;
        }
        self.file = Some(file);
        self.state = next;

        info!(
            path = %self.path.display(),
            opener = %self.opener.kind(),
            follow_freq = self.options.follow().millis(),
            offset = self.offset,
            "File reader initialized"
        );
        Ok(())
    }

    fn deinit(&mut self, _graph: &mut PipeGraph) -> Result<()> {
        let next = self.state.next(Transition::Deinit)?;
        self.state = next;

        let saved = self.save_position();
        self.file = None;

        debug!(path = %self.path.display(), "File reader deinitialized");
        saved
    }

    fn queue(&self, msg: LogMessage, path_options: &PathOptions) {
        if !self.state.is_initialized() {
            debug!(
                path = %self.path.display(),
                state = %self.state,
                "Dropping message from a file reader that is not running"
            );
            return;
        }
        self.owner.queue(msg, path_options);
    }

    fn persist_name(&self) -> Option<String> {
        Some(self.generate_persist_name())
    }
}

impl fmt::Debug for FileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReader")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("opener", &self.opener.kind())
            .field("state", &self.state)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
