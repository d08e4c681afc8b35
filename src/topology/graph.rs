// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use tracing::debug;

use crate::topology::pipe::{PipeError, PipeId};

/// Forwarding links between pipes.
///
/// The graph never owns a pipe. It only records, by id, which pipe a child
/// forwards its messages to, so dropping a pipe never depends on the graph.
#[derive(Debug, Default)]
pub struct PipeGraph {
    next: HashMap<PipeId, PipeId>,
}

impl PipeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `child` forward into `parent`.
    pub fn append(&mut self, child: PipeId, parent: PipeId) -> Result<(), PipeError> {
        if child == parent {
            return Err(PipeError::SelfLink(child));
        }
        if let Some(existing) = self.next.get(&child) {
            return Err(PipeError::AlreadyLinked {
                child,
                parent: *existing,
            });
        }

        debug!(%child, %parent, "Linking pipe");
        self.next.insert(child, parent);
        Ok(())
    }

    /// Remove the outgoing link of `child`, returning the pipe it pointed to.
    pub fn unlink(&mut self, child: PipeId) -> Option<PipeId> {
        let parent = self.next.remove(&child);
        if let Some(parent) = parent {
            debug!(%child, %parent, "Unlinking pipe");
        }
        parent
    }

    pub fn next_of(&self, child: PipeId) -> Option<PipeId> {
        self.next.get(&child).copied()
    }

    /// Pipes currently forwarding into `parent`.
    pub fn children_of(&self, parent: PipeId) -> Vec<PipeId> {
        let mut children: Vec<PipeId> = self
            .next
            .iter()
            .filter(|(_, p)| **p == parent)
            .map(|(c, _)| *c)
            .collect();
        children.sort();
        children
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_unlink() {
        let mut graph = PipeGraph::new();
        let reader = PipeId::next();
        let driver = PipeId::next();

        graph.append(reader, driver).unwrap();
        assert_eq!(graph.next_of(reader), Some(driver));
        assert_eq!(graph.children_of(driver), vec![reader]);

        assert_eq!(graph.unlink(reader), Some(driver));
        assert!(graph.is_empty());
        assert_eq!(graph.unlink(reader), None);
    }

    #[test]
    fn test_append_rejects_second_parent() {
        let mut graph = PipeGraph::new();
        let reader = PipeId::next();
        let first = PipeId::next();
        let second = PipeId::next();

        graph.append(reader, first).unwrap();
        assert_eq!(
            graph.append(reader, second),
            Err(PipeError::AlreadyLinked {
                child: reader,
                parent: first
            })
        );
        assert_eq!(graph.next_of(reader), Some(first));
    }

    #[test]
    fn test_append_rejects_self_link() {
        let mut graph = PipeGraph::new();
        let pipe = PipeId::next();
        assert_eq!(graph.append(pipe, pipe), Err(PipeError::SelfLink(pipe)));
        assert_eq!(graph.len(), 0);
    }
}
