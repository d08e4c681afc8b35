// SPDX-License-Identifier: Apache-2.0

use flume::{Receiver, Sender, TrySendError};
use std::fmt;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
    Full,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
            SendError::Full => write!(f, "channel full"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    /// Non-blocking send. Fails immediately with `SendError::Full` when the
    /// channel has no capacity left, the item is dropped in that case.
    pub fn try_send(&self, item: T) -> Result<(), SendError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SendError::Full),
            Err(TrySendError::Disconnected(_)) => Err(SendError::Disconnected),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for BoundedSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedSender")
            .field("len", &self.tx.len())
            .field("capacity", &self.tx.capacity())
            .finish()
    }
}

#[derive(Clone)]
pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    pub async fn next(&mut self) -> Option<T> {
        match self.rx.recv_async().await {
            Ok(item) => Some(item),
            Err(_e) => None, // disconnected
        }
    }

    /// Non-blocking receive - returns immediately.
    /// Returns None if no item is available or channel is disconnected.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take everything currently buffered without waiting.
    pub fn drain(&self) -> Vec<T> {
        self.rx.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    let sender = BoundedSender { tx };
    let receiver = BoundedReceiver { rx };

    (sender, receiver)
}
