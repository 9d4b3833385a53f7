//! Session model store: the single authoritative document snapshot.
//!
//! Readers take cheap `Arc` snapshots; `put` swaps the whole document at
//! once, so no reader ever observes a half-applied merge. Writing needs
//! `&mut self`, which gives the one-writer-per-event discipline for free.

use crate::model::Document;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ModelStore {
    snapshot: Arc<Document>,
    revision: u64,
}

impl ModelStore {
    /// An empty store at revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with an existing document.
    pub fn with_document(document: Document) -> Self {
        Self {
            snapshot: Arc::new(document),
            revision: 0,
        }
    }

    /// Current document snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<Document> {
        Arc::clone(&self.snapshot)
    }

    /// Borrow the current document without bumping the refcount.
    pub fn document(&self) -> &Document {
        &self.snapshot
    }

    /// Atomically replace the snapshot. Returns `false` (and keeps the
    /// revision) when the new document equals the current one.
    pub fn put(&mut self, document: Document) -> bool {
        if *self.snapshot == document {
            return false;
        }
        self.snapshot = Arc::new(document);
        self.revision += 1;
        log::trace!("model store now at revision {}", self.revision);
        true
    }

    /// Monotonic counter of effective `put`s.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
