//! Editing session: the one place events enter the engine.
//!
//! A `Session` owns the store, the node sync engine, the recompute
//! scheduler, the undo history, and the material catalog for the lifetime
//! of one editing session. Each entry point runs a complete
//! merge → reconcile → recompute sequence before returning, so events never
//! interleave.
//!
//! The host integration is reached through the [`Host`] trait: the canvas,
//! the interactive geometry picker, the recompute trigger, and the reverse
//! channel to the form.

use crate::bridge::{self, DecodeError, EventKind, FormEvent, OutboundMessage};
use crate::canvas::Canvas;
use crate::config::SyncConfig;
use crate::history::History;
use crate::schedule::RecomputeScheduler;
use crate::sync::{CanvasEdit, NodeSyncEngine, SyncReport};
use efm_core::catalog::{CatalogSource, MaterialCatalog};
use efm_core::lint::{LintDiagnostic, lint_document};
use efm_core::merge::{self, RenameError};
use efm_core::model::{Document, Element, ElementUpdate, Geometries};
use efm_core::store::ModelStore;
use std::sync::Arc;

// ─── Host Trait ──────────────────────────────────────────────────────────

/// Capabilities the session consumes from the host application.
pub trait Host {
    fn canvas(&mut self) -> &mut dyn Canvas;

    /// Let the user pick surfaces for `element`. Blocks until done.
    /// `None` means the pick was cancelled.
    fn pick_geometry(&mut self, element: &str) -> Option<Geometries>;

    /// Ask the host to run one recomputation pass.
    fn schedule_recompute(&mut self);

    fn push_to_form(&mut self, message: &OutboundMessage);
}

// ─── Outcome ─────────────────────────────────────────────────────────────

/// What handling one event did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutcome {
    pub store_changed: bool,
    pub sync: SyncReport,
    pub recomputed: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Rename(#[from] RenameError),
}

// ─── Session ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    store: ModelStore,
    sync: NodeSyncEngine,
    scheduler: RecomputeScheduler,
    history: History,
    catalog: MaterialCatalog,
}

impl Session {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_document(config, Document::new())
    }

    /// Start a session on an existing document. Nothing touches the canvas
    /// until the first event (or [`Session::resync`]).
    pub fn with_document(config: SyncConfig, document: Document) -> Self {
        let history = History::new(config.history_depth);
        Self {
            store: ModelStore::with_document(document),
            sync: NodeSyncEngine::new(config),
            scheduler: RecomputeScheduler::new(),
            history,
            catalog: MaterialCatalog::default(),
        }
    }

    pub fn document(&self) -> &Document {
        self.store.document()
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn sync_engine(&self) -> &NodeSyncEngine {
        &self.sync
    }

    pub fn catalog(&self) -> &MaterialCatalog {
        &self.catalog
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn lints(&self) -> Vec<LintDiagnostic> {
        lint_document(self.store.document())
    }

    // ─── Form → Store ────────────────────────────────────────────────────

    /// Decode and handle one navigation message from the form.
    ///
    /// A message that fails to decode is logged and dropped; the store is
    /// left unchanged and the error is returned.
    pub fn handle_message(
        &mut self,
        host: &mut dyn Host,
        uri: &str,
    ) -> Result<EventOutcome, SessionError> {
        let event = bridge::decode_message(uri)
            .inspect_err(|err| log::warn!("dropping form message `{uri}`: {err}"))?;
        Ok(self.handle_event(host, event))
    }

    pub fn handle_event(&mut self, host: &mut dyn Host, event: FormEvent) -> EventOutcome {
        let kind = event.kind();
        log::info!("form event: {kind}");
        let current = self.store.get();

        let next = match event {
            FormEvent::SliderUpdate { id, value } => merge::set_scalar(&current, &id, value),
            FormEvent::GeometryPick { name, thickness } => {
                let mut update = ElementUpdate::new(name);
                update.thickness = thickness;
                match host.pick_geometry(&update.name) {
                    Some(picked) if !picked.is_empty() => update.geometries = picked,
                    _ => log::info!(
                        "geometry pick for `{}` captured nothing; keeping stored geometry",
                        update.name
                    ),
                }
                with_elements(&current, merge::upsert_element(update, &current.elements))
            }
            FormEvent::ReplaceElements { rows, sections } => {
                let mut next = with_elements(&current, merge::merge_elements(rows, &current.elements));
                next.extra = merge::merge_extra(sections, &current.extra);
                next
            }
            FormEvent::DeleteElement { name } => {
                if current.element(&name).is_none() {
                    log::debug!("delete of unknown element `{name}` ignored");
                }
                with_elements(&current, merge::delete_element_by_name(&current.elements, &name))
            }
            FormEvent::ReplaceMaterials { patches, sections } => {
                let mut next = (*current).clone();
                next.materials = merge::merge_materials(patches, &current.materials);
                next.extra = merge::merge_extra(sections, &current.extra);
                next
            }
            FormEvent::Refresh => (*current).clone(),
        };

        let outcome = self.commit(host, next, Some(kind.as_str()));
        if kind == EventKind::LoadTable {
            self.push_state(host);
        }
        outcome
    }

    // ─── Canvas → Store ──────────────────────────────────────────────────

    /// Pull edits made directly on managed canvas nodes into the store,
    /// then push the new state to the form.
    pub fn handle_canvas_change(&mut self, host: &mut dyn Host) -> EventOutcome {
        let edits = self.sync.observe(self.store.document(), &*host.canvas());
        if edits.is_empty() {
            return EventOutcome::default();
        }

        let mut elements = self.store.document().elements.clone();
        for edit in edits {
            let update = match edit {
                CanvasEdit::Thickness { element, value } => {
                    if value < 0.0 {
                        log::warn!("canvas slider for `{element}` sent {value}; clamping to 0");
                    }
                    ElementUpdate::new(element).thickness(value.max(0.0))
                }
                CanvasEdit::Geometry { element, geometries } => {
                    ElementUpdate::new(element).geometries(geometries)
                }
            };
            log::debug!("canvas edit on `{}`", update.name);
            elements = merge::upsert_element(update, &elements);
        }

        let next = with_elements(self.store.document(), elements);
        let outcome = self.commit(host, next, Some("canvas edit"));
        if outcome.store_changed {
            self.push_state(host);
        }
        outcome
    }

    // ─── Direct operations ───────────────────────────────────────────────

    /// Rename an element, carrying its thickness and geometry to the new
    /// name. On the canvas this is delete-old plus create-new.
    pub fn rename_element(
        &mut self,
        host: &mut dyn Host,
        old: &str,
        new: &str,
    ) -> Result<EventOutcome, SessionError> {
        let current = self.store.get();
        let elements = merge::rename_element(&current.elements, old, new)?;
        log::info!("renaming element `{old}` to `{new}`");
        let outcome = self.commit(host, with_elements(&current, elements), Some("rename"));
        if outcome.store_changed {
            self.push_state(host);
        }
        Ok(outcome)
    }

    /// Undo the last recorded edit. `None` when there is nothing to undo.
    pub fn undo(&mut self, host: &mut dyn Host) -> Option<EventOutcome> {
        let restore = self.history.undo()?;
        log::info!("undo: {}", restore.description);
        Some(self.restore(host, restore.document))
    }

    pub fn redo(&mut self, host: &mut dyn Host) -> Option<EventOutcome> {
        let restore = self.history.redo()?;
        log::info!("redo: {}", restore.description);
        Some(self.restore(host, restore.document))
    }

    /// Reconcile the canvas against the store without changing it.
    pub fn resync(&mut self, host: &mut dyn Host) -> EventOutcome {
        let current = (*self.store.get()).clone();
        self.commit(host, current, None)
    }

    /// Replace the material catalog and send it to the form.
    /// An unavailable source leaves an empty catalog.
    pub fn load_catalog(&mut self, host: &mut dyn Host, source: &dyn CatalogSource) {
        self.catalog = MaterialCatalog::load_or_empty(source);
        self.push_state(host);
    }

    /// Send the current document and catalog to the form.
    pub fn push_state(&mut self, host: &mut dyn Host) {
        for message in bridge::outbound_messages(self.store.document(), &self.catalog) {
            log::trace!("pushing `{}` to the form", message.event);
            host.push_to_form(&message);
        }
    }

    /// End the session: delete every managed node. The store is kept.
    pub fn teardown(&mut self, host: &mut dyn Host) -> usize {
        let removed = self.sync.teardown(host.canvas());
        self.history.clear();
        log::info!("session teardown removed {removed} nodes");
        removed
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    /// Put `next`, reconcile, and fire at most one recompute.
    /// `record` names the history step; `None` skips history.
    fn commit(&mut self, host: &mut dyn Host, next: Document, record: Option<&str>) -> EventOutcome {
        self.scheduler.begin();

        let before = self.store.get();
        let store_changed = self.store.put(next);
        if store_changed {
            if let Some(description) = record {
                self.history.record(before, self.store.get(), description);
            }
            self.scheduler.request();
        }

        let sync = self.sync.reconcile(self.store.document(), host.canvas());
        if sync.changed() {
            self.scheduler.request();
        }
        log::debug!(
            "revision {}: {} created, {} updated, {} deleted",
            self.store.revision(),
            sync.created.len(),
            sync.updated.len(),
            sync.deleted.len()
        );

        let recomputed = self.scheduler.end(|| host.schedule_recompute());
        EventOutcome {
            store_changed,
            sync,
            recomputed,
        }
    }

    fn restore(&mut self, host: &mut dyn Host, document: Arc<Document>) -> EventOutcome {
        let outcome = self.commit(host, (*document).clone(), None);
        self.push_state(host);
        outcome
    }
}

fn with_elements(document: &Document, elements: Vec<Element>) -> Document {
    Document {
        elements,
        materials: document.materials.clone(),
        scalars: document.scalars.clone(),
        extra: document.extra.clone(),
    }
}
