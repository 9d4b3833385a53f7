//! In-memory canvas and host.
//!
//! `MemoryCanvas` keeps nodes and wires in a petgraph `StableDiGraph`.
//! Canvas node ids are handed out from a counter and never reused, even
//! though the graph recycles its indices after removal. `MemoryHost` wraps
//! a canvas with a scripted geometry picker and records what the session
//! asked of it. Both back the tests and the replay CLI.

use crate::bridge::OutboundMessage;
use crate::canvas::{
    Canvas, CanvasError, CanvasNodeId, CanvasNodeInfo, NodeKind, NodePayload, Point,
};
use crate::session::Host;
use efm_core::model::{Geometries, GeometryHandle};
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::{BTreeMap, HashSet, VecDeque};

// ─── Canvas ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryNode {
    pub id: CanvasNodeId,
    pub name: String,
    pub kind: NodeKind,
    pub position: Point,
    pub payload: NodePayload,
}

/// Output port → input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Wire {
    output: usize,
    input: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCanvas {
    graph: StableDiGraph<MemoryNode, Wire>,
    /// Id → graph index, ordered by id (creation order).
    index: BTreeMap<CanvasNodeId, NodeIndex>,
    next_id: u64,
    /// Geometry the host can no longer resolve.
    unavailable: HashSet<GeometryHandle>,
    created: usize,
    deleted: usize,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a node the sync engine knows nothing about, as a user would.
    pub fn add_external(&mut self, kind: NodeKind, name: &str, position: Point) -> CanvasNodeId {
        let id = self.insert(kind, name);
        if let Some(&idx) = self.index.get(&id) {
            self.graph[idx].position = position;
        }
        id
    }

    /// Mark a geometry handle as unresolvable. Writing it fails from now on.
    pub fn make_unavailable(&mut self, handle: GeometryHandle) {
        self.unavailable.insert(handle);
    }

    /// Drag a slider, as a user would on the canvas.
    pub fn set_slider_value(&mut self, id: CanvasNodeId, value: f64) -> Result<(), CanvasError> {
        match self.node_mut(id)?.payload {
            NodePayload::Slider(ref mut slider) => {
                slider.value = value.max(slider.min).min(slider.max);
                Ok(())
            }
            _ => Err(CanvasError::PayloadRejected {
                id,
                payload: "slider",
            }),
        }
    }

    pub fn node(&self, id: CanvasNodeId) -> Option<&MemoryNode> {
        self.index.get(&id).map(|&idx| &self.graph[idx])
    }

    /// The first node called `name`.
    pub fn node_named(&self, name: &str) -> Option<&MemoryNode> {
        self.index
            .values()
            .map(|&idx| &self.graph[idx])
            .find(|n| n.name == name)
    }

    /// How many nodes are called `name`.
    pub fn count_named(&self, name: &str) -> usize {
        self.index
            .values()
            .filter(|&&idx| self.graph[idx].name == name)
            .count()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Every wire as `(from, output, to, input)`.
    pub fn wires(&self) -> Vec<(CanvasNodeId, usize, CanvasNodeId, usize)> {
        self.graph
            .edge_references()
            .map(|e| {
                let w = e.weight();
                (self.graph[e.source()].id, w.output, self.graph[e.target()].id, w.input)
            })
            .collect()
    }

    /// Nodes created through the `Canvas` trait or `add_external`.
    pub fn created_count(&self) -> usize {
        self.created
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted
    }

    fn insert(&mut self, kind: NodeKind, name: &str) -> CanvasNodeId {
        let id = CanvasNodeId(self.next_id);
        self.next_id += 1;
        let idx = self.graph.add_node(MemoryNode {
            id,
            name: name.to_string(),
            kind,
            position: Point::default(),
            payload: NodePayload::Empty,
        });
        self.index.insert(id, idx);
        self.created += 1;
        id
    }

    fn node_mut(&mut self, id: CanvasNodeId) -> Result<&mut MemoryNode, CanvasError> {
        let idx = *self.index.get(&id).ok_or(CanvasError::NodeMissing(id))?;
        Ok(&mut self.graph[idx])
    }
}

fn accepts(kind: NodeKind, payload: &NodePayload) -> bool {
    matches!(
        (kind, payload),
        (_, NodePayload::Empty)
            | (NodeKind::Other, _)
            | (NodeKind::GeometryContainer, NodePayload::Geometry(_))
            | (NodeKind::Slider, NodePayload::Slider(_))
            | (NodeKind::MaterialParam, NodePayload::Material(_))
    )
}

impl Canvas for MemoryCanvas {
    fn nodes(&self) -> Vec<CanvasNodeInfo> {
        self.index
            .values()
            .map(|&idx| {
                let node = &self.graph[idx];
                CanvasNodeInfo {
                    id: node.id,
                    name: node.name.clone(),
                    kind: node.kind,
                    position: node.position,
                }
            })
            .collect()
    }

    fn create_node(&mut self, kind: NodeKind, name: &str) -> Result<CanvasNodeId, CanvasError> {
        Ok(self.insert(kind, name))
    }

    fn delete_node(&mut self, id: CanvasNodeId) -> Result<(), CanvasError> {
        let idx = self.index.remove(&id).ok_or(CanvasError::NodeMissing(id))?;
        self.graph.remove_node(idx);
        self.deleted += 1;
        Ok(())
    }

    fn payload(&self, id: CanvasNodeId) -> Option<NodePayload> {
        self.node(id).map(|n| n.payload.clone())
    }

    fn write_payload(&mut self, id: CanvasNodeId, payload: NodePayload) -> Result<(), CanvasError> {
        if let NodePayload::Geometry(handles) = &payload
            && let Some(missing) = handles.iter().find(|h| self.unavailable.contains(*h))
        {
            return Err(CanvasError::GeometryUnavailable(*missing));
        }
        let node = self.node_mut(id)?;
        if !accepts(node.kind, &payload) {
            return Err(CanvasError::PayloadRejected {
                id,
                payload: payload.label(),
            });
        }
        node.payload = payload;
        Ok(())
    }

    fn position(&self, id: CanvasNodeId) -> Option<Point> {
        self.node(id).map(|n| n.position)
    }

    fn set_position(&mut self, id: CanvasNodeId, at: Point) -> Result<(), CanvasError> {
        self.node_mut(id)?.position = at;
        Ok(())
    }

    fn connect(
        &mut self,
        from: CanvasNodeId,
        output: usize,
        to: CanvasNodeId,
        input: usize,
    ) -> Result<bool, CanvasError> {
        let a = *self.index.get(&from).ok_or(CanvasError::NodeMissing(from))?;
        let b = *self.index.get(&to).ok_or(CanvasError::NodeMissing(to))?;
        if self.is_connected(from, output, to, input) {
            return Ok(false);
        }
        self.graph.add_edge(a, b, Wire { output, input });
        Ok(true)
    }

    fn is_connected(&self, from: CanvasNodeId, output: usize, to: CanvasNodeId, input: usize) -> bool {
        let (Some(&a), Some(&b)) = (self.index.get(&from), self.index.get(&to)) else {
            return false;
        };
        let wire = Wire { output, input };
        self.graph
            .edges_directed(a, Direction::Outgoing)
            .any(|e| e.target() == b && *e.weight() == wire)
    }
}

// ─── Host ────────────────────────────────────────────────────────────────

/// Scripted host: geometry picks are served from a queue.
#[derive(Debug, Default)]
pub struct MemoryHost {
    pub canvas: MemoryCanvas,
    /// Answers to upcoming geometry picks. An empty queue cancels.
    pub picks: VecDeque<Option<Geometries>>,
    /// Recompute passes requested so far.
    pub recomputes: usize,
    /// Everything pushed to the form, oldest first.
    pub outbox: Vec<OutboundMessage>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next geometry pick.
    pub fn queue_pick(&mut self, handles: impl IntoIterator<Item = GeometryHandle>) {
        self.picks.push_back(Some(handles.into_iter().collect()));
    }

    /// Queue a cancelled pick.
    pub fn queue_cancel(&mut self) {
        self.picks.push_back(None);
    }

    /// Events pushed to the form, in order.
    pub fn pushed_events(&self) -> Vec<&'static str> {
        self.outbox.iter().map(|m| m.event).collect()
    }
}

impl Host for MemoryHost {
    fn canvas(&mut self) -> &mut dyn Canvas {
        &mut self.canvas
    }

    fn pick_geometry(&mut self, element: &str) -> Option<Geometries> {
        let picked = self.picks.pop_front().flatten();
        log::trace!("pick for `{element}`: {picked:?}");
        picked
    }

    fn schedule_recompute(&mut self) {
        self.recomputes += 1;
    }

    fn push_to_form(&mut self, message: &OutboundMessage) {
        self.outbox.push(message.clone());
    }
}
