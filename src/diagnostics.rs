// SPDX-License-Identifier: Apache-2.0

//! Process-wide diagnostic state.
//!
//! Some warnings describe a behaviour change of the whole configuration rather
//! than of one source, and must be logged once per process no matter how many
//! sources trigger them. Each such warning owns a [`OnceFlag`] that is set
//! atomically the first time it fires and is only reset by a process restart.

use portable_atomic::{AtomicBool, Ordering};

/// A flag that reports `true` exactly once.
#[derive(Debug)]
pub struct OnceFlag(AtomicBool);

impl OnceFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns `true` for the first caller only.
    pub fn first(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for OnceFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Legacy `follow_freq` default warning for configurations older than 3.0.
pub static LEGACY_FOLLOW_FREQ_WARNING: OnceFlag = OnceFlag::new();
