//! Undo/redo over document snapshots.
//!
//! The store hands out `Arc<Document>` snapshots, so every step keeps the
//! before/after documents by reference count rather than by copy.

use efm_core::model::Document;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct Step {
    before: Arc<Document>,
    after: Arc<Document>,
    description: String,
}

/// A document to restore, and what produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Restore {
    pub document: Arc<Document>,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Step>,
    redo_stack: Vec<Step>,
    /// Maximum undo depth.
    max_depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(100)
    }
}

impl History {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth,
        }
    }

    /// Record one edit. Identical snapshots are not recorded.
    /// A new edit clears the redo stack.
    pub fn record(&mut self, before: Arc<Document>, after: Arc<Document>, description: &str) {
        if before == after {
            return;
        }
        if self.max_depth == 0 {
            return;
        }
        self.undo_stack.push(Step {
            before,
            after,
            description: description.to_string(),
        });
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    /// Step back. Returns the document to restore.
    pub fn undo(&mut self) -> Option<Restore> {
        let step = self.undo_stack.pop()?;
        let restore = Restore {
            document: Arc::clone(&step.before),
            description: step.description.clone(),
        };
        self.redo_stack.push(step);
        Some(restore)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self) -> Option<Restore> {
        let step = self.redo_stack.pop()?;
        let restore = Restore {
            document: Arc::clone(&step.after),
            description: step.description.clone(),
        };
        self.undo_stack.push(step);
        Some(restore)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
