//! Node sync engine: document ↔ canvas nodes.
//!
//! The engine keeps the canvas mirroring the model store:
//!
//! - **Store → Canvas**: after every store mutation, `plan` computes the
//!   minimal create / update / delete operations against the live canvas
//!   and `apply` carries them out. Each element owns a geometry container
//!   (keyed by its name) and a thickness slider (`<name>_Thickness`); each
//!   material owns a material node (keyed by its name).
//!
//! - **Canvas → Store**: `observe` reads the managed nodes back and reports
//!   values that were edited on the canvas (a dragged slider, re-picked
//!   geometry) so the session can merge them into the store.
//!
//! The engine only ever deletes or updates nodes it created itself. Those
//! are tracked per entity class in a `ManagedNodes` index
//! (`NodeKey → CanvasNodeId`), which replaces scanning the canvas by name.

use crate::canvas::{
    Canvas, CanvasError, CanvasNodeId, CanvasNodeInfo, MaterialDefinition, NodeKind, NodePayload,
    Point, SliderValue,
};
use crate::config::{CollisionPolicy, SyncConfig};
use crate::layout::{Placement, Section};
use efm_core::id::NodeKey;
use efm_core::model::{Document, Geometries};
use std::collections::{BTreeMap, HashMap, HashSet};

// ─── Managed node index ──────────────────────────────────────────────────

/// The entity class a managed node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityClass {
    Elements,
    Materials,
}

/// Nodes created by the engine for one entity class.
///
/// An entry exists exactly while its node exists on the canvas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedNodes {
    entries: BTreeMap<NodeKey, CanvasNodeId>,
}

impl ManagedNodes {
    pub fn get(&self, key: NodeKey) -> Option<CanvasNodeId> {
        self.entries.get(&key).copied()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeKey, CanvasNodeId)> + '_ {
        self.entries.iter().map(|(k, id)| (*k, *id))
    }

    /// Key names, in key order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(NodeKey::as_str).collect()
    }

    fn insert(&mut self, key: NodeKey, id: CanvasNodeId) {
        self.entries.insert(key, id);
    }

    fn remove(&mut self, key: NodeKey) -> Option<CanvasNodeId> {
        self.entries.remove(&key)
    }
}

// ─── Plan ─────────────────────────────────────────────────────────────────

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOp {
    /// Managed node whose entity is gone: delete it.
    Delete {
        class: EntityClass,
        key: NodeKey,
        id: CanvasNodeId,
    },
    /// Managed node that vanished from the canvas behind our back.
    Forget {
        class: EntityClass,
        key: NodeKey,
        id: CanvasNodeId,
    },
    Create {
        class: EntityClass,
        key: NodeKey,
        kind: NodeKind,
        payload: NodePayload,
        position: Point,
    },
    /// Take ownership of a foreign node (only under `CollisionPolicy::Adopt`).
    Adopt {
        class: EntityClass,
        key: NodeKey,
        id: CanvasNodeId,
        payload: NodePayload,
    },
    /// Rewrite a managed node's payload in place.
    Update {
        key: NodeKey,
        id: CanvasNodeId,
        payload: NodePayload,
    },
    /// A foreign node holds this key's name; it is left untouched.
    Conflict { key: NodeKey, id: CanvasNodeId },
    /// Two entities claim this key (element `A`'s slider and an element
    /// named `A_Thickness`). Only the first claimant gets a node.
    Shadowed { key: NodeKey },
}

/// The operations needed to make the canvas match a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub ops: Vec<NodeOp>,
}

impl SyncPlan {
    /// True when applying the plan would not touch the canvas.
    pub fn is_noop(&self) -> bool {
        self.ops
            .iter()
            .all(|op| matches!(op, NodeOp::Conflict { .. } | NodeOp::Shadowed { .. }))
    }
}

/// What a pass actually did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub created: Vec<NodeKey>,
    pub updated: Vec<NodeKey>,
    pub deleted: Vec<NodeKey>,
    pub adopted: Vec<NodeKey>,
    /// Managed entries dropped because their node had disappeared.
    pub forgotten: Vec<NodeKey>,
    /// Keys whose name is held by a foreign node, or claimed by two
    /// entities at once.
    pub conflicts: Vec<NodeKey>,
    /// Geometry nodes written empty because their geometry was unavailable.
    pub fallbacks: Vec<NodeKey>,
    /// Wires added by connection rules.
    pub wired: usize,
}

impl SyncReport {
    /// True when the pass changed anything on the canvas.
    pub fn changed(&self) -> bool {
        !(self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.adopted.is_empty()
            && self.forgotten.is_empty())
            || self.wired > 0
    }
}

/// A value edited directly on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEdit {
    Thickness { element: String, value: f64 },
    Geometry { element: String, geometries: Geometries },
}

/// A node the document wants on the canvas.
struct Desired {
    class: EntityClass,
    key: NodeKey,
    kind: NodeKind,
    payload: NodePayload,
}

// ─── Engine ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct NodeSyncEngine {
    elements: ManagedNodes,
    materials: ManagedNodes,
    config: SyncConfig,
}

impl NodeSyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            elements: ManagedNodes::default(),
            materials: ManagedNodes::default(),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn managed(&self, class: EntityClass) -> &ManagedNodes {
        match class {
            EntityClass::Elements => &self.elements,
            EntityClass::Materials => &self.materials,
        }
    }

    fn managed_mut(&mut self, class: EntityClass) -> &mut ManagedNodes {
        match class {
            EntityClass::Elements => &mut self.elements,
            EntityClass::Materials => &mut self.materials,
        }
    }

    /// Plan + apply + wire in one go.
    pub fn reconcile(&mut self, doc: &Document, canvas: &mut dyn Canvas) -> SyncReport {
        let plan = self.plan(doc, canvas);
        log::debug!("sync plan: {} ops", plan.ops.len());
        let mut report = self.apply(plan, canvas);
        report.wired = self.wire(canvas);
        report
    }

    // ─── Store → Canvas ──────────────────────────────────────────────────

    /// Compute the operations that make `canvas` mirror `doc`.
    /// Reads the canvas; changes nothing.
    pub fn plan(&self, doc: &Document, canvas: &dyn Canvas) -> SyncPlan {
        let live = canvas.nodes();
        let live_ids: HashSet<CanvasNodeId> = live.iter().map(|n| n.id).collect();
        let managed_ids: HashSet<CanvasNodeId> = self
            .elements
            .iter()
            .chain(self.materials.iter())
            .map(|(_, id)| id)
            .collect();

        // Foreign nodes by name; the first one wins when names repeat.
        let mut foreign: HashMap<&str, &CanvasNodeInfo> = HashMap::new();
        for node in live.iter().filter(|n| !managed_ids.contains(&n.id)) {
            foreign.entry(node.name.as_str()).or_insert(node);
        }

        let (desired, shadowed) = self.desired_nodes(doc);
        let mut ops: Vec<NodeOp> = shadowed
            .into_iter()
            .map(|key| NodeOp::Shadowed { key })
            .collect();

        // Pass 1: managed nodes that no longer belong, or no longer exist.
        for class in [EntityClass::Elements, EntityClass::Materials] {
            let valid: HashSet<NodeKey> = desired
                .iter()
                .filter(|d| d.class == class)
                .map(|d| d.key)
                .collect();
            for (key, id) in self.managed(class).iter() {
                let alive = live_ids.contains(&id);
                if !valid.contains(&key) {
                    if alive {
                        ops.push(NodeOp::Delete { class, key, id });
                    } else {
                        ops.push(NodeOp::Forget { class, key, id });
                    }
                } else if !alive {
                    ops.push(NodeOp::Forget { class, key, id });
                }
            }
        }

        // Pass 2: create what is missing, update what drifted.
        let mut placement = Placement::new(&self.config.layout, &live);
        for Desired {
            class,
            key,
            kind,
            payload,
        } in desired
        {
            let managed = self
                .managed(class)
                .get(key)
                .filter(|id| live_ids.contains(id));
            if let Some(id) = managed {
                if canvas.payload(id).as_ref() != Some(&payload) {
                    ops.push(NodeOp::Update { key, id, payload });
                }
                continue;
            }

            match foreign.get(key.as_str()) {
                Some(node) => match self.config.collision {
                    CollisionPolicy::Adopt if node.kind == kind => ops.push(NodeOp::Adopt {
                        class,
                        key,
                        id: node.id,
                        payload,
                    }),
                    _ => ops.push(NodeOp::Conflict { key, id: node.id }),
                },
                None => ops.push(NodeOp::Create {
                    class,
                    key,
                    kind,
                    payload,
                    position: placement.next(Section::for_kind(kind)),
                }),
            }
        }

        SyncPlan { ops }
    }

    /// Carry out a plan. Failures stay local to the node they concern.
    pub fn apply(&mut self, plan: SyncPlan, canvas: &mut dyn Canvas) -> SyncReport {
        let mut report = SyncReport::default();

        for op in plan.ops {
            match op {
                NodeOp::Delete { class, key, id } => match canvas.delete_node(id) {
                    Ok(()) => {
                        log::trace!("deleted {id} for {key}");
                        self.managed_mut(class).remove(key);
                        report.deleted.push(key);
                    }
                    Err(CanvasError::NodeMissing(_)) => {
                        self.managed_mut(class).remove(key);
                        report.forgotten.push(key);
                    }
                    Err(err) => log::warn!("could not delete {id} for {key}: {err}"),
                },
                NodeOp::Forget { class, key, id } => {
                    log::warn!("managed node {id} for {key} vanished from the canvas");
                    self.managed_mut(class).remove(key);
                    report.forgotten.push(key);
                }
                NodeOp::Create {
                    class,
                    key,
                    kind,
                    payload,
                    position,
                } => {
                    let id = match canvas.create_node(kind, key.as_str()) {
                        Ok(id) => id,
                        Err(err) => {
                            log::warn!("could not create {kind:?} node for {key}: {err}");
                            continue;
                        }
                    };
                    self.managed_mut(class).insert(key, id);
                    write_payload(canvas, key, id, payload, &mut report);
                    if let Err(err) = canvas.set_position(id, position) {
                        log::warn!("could not place {key}: {err}");
                    }
                    log::trace!("created {id} for {key} at ({}, {})", position.x, position.y);
                    report.created.push(key);
                }
                NodeOp::Adopt {
                    class,
                    key,
                    id,
                    payload,
                } => {
                    log::info!("adopting foreign node {id} for {key}");
                    self.managed_mut(class).insert(key, id);
                    write_payload(canvas, key, id, payload, &mut report);
                    report.adopted.push(key);
                }
                NodeOp::Update { key, id, payload } => {
                    if write_payload(canvas, key, id, payload, &mut report) {
                        report.updated.push(key);
                    }
                }
                NodeOp::Conflict { key, id } => {
                    log::warn!("{key} is already taken by unmanaged {id}; leaving it alone");
                    report.conflicts.push(key);
                }
                NodeOp::Shadowed { key } => {
                    log::warn!("{key} is claimed by two entities; only the first gets a node");
                    report.conflicts.push(key);
                }
            }
        }

        report
    }

    /// Apply the configured connection rules. Returns the number of new wires.
    pub fn wire(&self, canvas: &mut dyn Canvas) -> usize {
        if self.config.connections.is_empty() {
            return 0;
        }
        let live = canvas.nodes();
        let resolve = |name: &str| -> Option<CanvasNodeId> {
            NodeKey::lookup(name)
                .and_then(|key| self.elements.get(key).or_else(|| self.materials.get(key)))
                .or_else(|| live.iter().find(|n| n.name == name).map(|n| n.id))
        };

        let mut wired = 0;
        for rule in &self.config.connections {
            let (Some(from), Some(to)) = (resolve(&rule.source), resolve(&rule.target)) else {
                log::trace!("skipping wire {} -> {}: endpoint missing", rule.source, rule.target);
                continue;
            };
            match canvas.connect(from, rule.source_output, to, rule.target_input) {
                Ok(true) => wired += 1,
                Ok(false) => {}
                Err(err) => log::warn!("could not wire {} -> {}: {err}", rule.source, rule.target),
            }
        }
        wired
    }

    /// Delete every managed node and forget them all (session end).
    pub fn teardown(&mut self, canvas: &mut dyn Canvas) -> usize {
        let mut removed = 0;
        for class in [EntityClass::Elements, EntityClass::Materials] {
            let managed = std::mem::take(self.managed_mut(class));
            for (key, id) in managed.iter() {
                match canvas.delete_node(id) {
                    Ok(()) => removed += 1,
                    Err(err) => log::debug!("teardown of {key}: {err}"),
                }
            }
        }
        removed
    }

    // ─── Canvas → Store ──────────────────────────────────────────────────

    /// Values edited on managed canvas nodes that differ from `doc`.
    pub fn observe(&self, doc: &Document, canvas: &dyn Canvas) -> Vec<CanvasEdit> {
        let mut edits = Vec::new();
        for element in &doc.elements {
            if let Some(id) = self.elements.get(NodeKey::slider(&element.name))
                && let Some(NodePayload::Slider(slider)) = canvas.payload(id)
                && slider.value != element.thickness
            {
                edits.push(CanvasEdit::Thickness {
                    element: element.name.clone(),
                    value: slider.value,
                });
            }
            if let Some(id) = self.elements.get(NodeKey::element(&element.name))
                && let Some(NodePayload::Geometry(geometries)) = canvas.payload(id)
                && !geometries.is_empty()
                && geometries != element.geometries
            {
                edits.push(CanvasEdit::Geometry {
                    element: element.name.clone(),
                    geometries,
                });
            }
        }
        edits
    }

    // ─── Helpers ─────────────────────────────────────────────────────────

    /// Nodes the document calls for: geometry containers, then sliders,
    /// then materials. A key claimed twice keeps its first claimant; the
    /// later claims come back as the second list.
    fn desired_nodes(&self, doc: &Document) -> (Vec<Desired>, Vec<NodeKey>) {
        let mut seen = HashSet::new();
        let mut shadowed = Vec::new();
        let mut desired = Vec::with_capacity(doc.elements.len() * 2 + doc.materials.len());

        let geometry = doc.elements.iter().map(|e| Desired {
            class: EntityClass::Elements,
            key: NodeKey::element(&e.name),
            kind: NodeKind::GeometryContainer,
            payload: NodePayload::Geometry(e.geometries.clone()),
        });
        let sliders = doc.elements.iter().map(|e| Desired {
            class: EntityClass::Elements,
            key: NodeKey::slider(&e.name),
            kind: NodeKind::Slider,
            payload: NodePayload::Slider(SliderValue {
                value: e.thickness,
                min: self.config.slider.min.min(e.thickness),
                max: self.config.slider.max.max(e.thickness),
            }),
        });
        let materials = doc.materials.iter().map(|m| Desired {
            class: EntityClass::Materials,
            key: NodeKey::material(&m.name),
            kind: NodeKind::MaterialParam,
            payload: NodePayload::Material(Box::new(MaterialDefinition::from(m))),
        });

        for node in geometry.chain(sliders).chain(materials) {
            if seen.insert((node.class, node.key)) {
                desired.push(node);
            } else {
                shadowed.push(node.key);
            }
        }
        (desired, shadowed)
    }
}

/// Write a payload, degrading unavailable geometry to an empty container.
/// Returns true when the intended payload was written.
fn write_payload(
    canvas: &mut dyn Canvas,
    key: NodeKey,
    id: CanvasNodeId,
    payload: NodePayload,
    report: &mut SyncReport,
) -> bool {
    let is_geometry = matches!(payload, NodePayload::Geometry(_));
    match canvas.write_payload(id, payload) {
        Ok(()) => true,
        Err(err @ CanvasError::GeometryUnavailable(_)) if is_geometry => {
            log::warn!("{key}: {err}; keeping an empty geometry container");
            if let Err(err) = canvas.write_payload(id, NodePayload::Geometry(Geometries::new())) {
                log::warn!("{key}: could not clear geometry: {err}");
            }
            report.fallbacks.push(key);
            false
        }
        Err(err) => {
            log::warn!("{key}: could not write {id}: {err}");
            false
        }
    }
}
