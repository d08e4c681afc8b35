// SPDX-License-Identifier: Apache-2.0

use portable_atomic::{AtomicU64, Ordering};
use std::fmt;
use thiserror::Error;

use crate::config::GlobalConfig;
use crate::topology::graph::PipeGraph;
use crate::topology::message::{LogMessage, PathOptions};

/// Identifies a pipe inside a [`PipeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(u64);

impl PipeId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        PipeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipe#{}", self.0)
    }
}

/// Lifecycle operations a pipe can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Init,
    Deinit,
    Free,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Init => write!(f, "init"),
            Transition::Deinit => write!(f, "deinit"),
            Transition::Free => write!(f, "free"),
        }
    }
}

/// Lifecycle state of a pipe.
///
/// The only legal path is `Uninitialized -> Initialized -> Deinitialized -> Freed`,
/// plus `Uninitialized -> Freed` for pipes that never initialized. No state is
/// re-entered; a deinitialized pipe is replaced by a fresh instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipeState {
    #[default]
    Uninitialized,
    Initialized,
    Deinitialized,
    Freed,
}

impl PipeState {
    /// State reached by applying `transition`, or an error if it is not allowed.
    pub fn next(self, transition: Transition) -> Result<PipeState, PipeError> {
        use PipeState::{Deinitialized, Freed, Initialized, Uninitialized};

        match (self, transition) {
            (Uninitialized, Transition::Init) => Ok(Initialized),
            (Initialized, Transition::Deinit) => Ok(Deinitialized),
            (Uninitialized | Deinitialized, Transition::Free) => Ok(Freed),
            (state, transition) => Err(PipeError::InvalidTransition { transition, state }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        *self == PipeState::Initialized
    }
}

impl fmt::Display for PipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeState::Uninitialized => write!(f, "uninitialized"),
            PipeState::Initialized => write!(f, "initialized"),
            PipeState::Deinitialized => write!(f, "deinitialized"),
            PipeState::Freed => write!(f, "freed"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipeError {
    #[error("cannot {transition} a pipe that is {state}")]
    InvalidTransition {
        transition: Transition,
        state: PipeState,
    },

    #[error("{child} is already linked to {parent}")]
    AlreadyLinked { child: PipeId, parent: PipeId },

    #[error("a pipe cannot be linked to itself ({0})")]
    SelfLink(PipeId),
}

/// The lifecycle interface every pipe in the graph implements.
///
/// The engine drives `init`/`deinit` sequentially; `queue` may be called from
/// reader callbacks once the pipe is initialized and must not block.
pub trait LogPipe {
    type Error;

    fn id(&self) -> PipeId;

    fn state(&self) -> PipeState;

    fn init(&mut self, cfg: &GlobalConfig, graph: &mut PipeGraph) -> Result<(), Self::Error>;

    fn deinit(&mut self, graph: &mut PipeGraph) -> Result<(), Self::Error>;

    fn queue(&self, msg: LogMessage, path_options: &PathOptions);

    /// Restart-stable name used to key persisted state, if the pipe has any.
    fn persist_name(&self) -> Option<String>;
}
