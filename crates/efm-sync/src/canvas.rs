//! Host canvas boundary.
//!
//! The graph-authoring host (node creation, pivots, persistent data) is
//! reached only through the `Canvas` trait. Everything the sync engine
//! needs is expressed here in host-neutral terms.

use efm_core::model::{FlowHypothesis, Geometries, GeometryHandle, Material};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Identity & placement ────────────────────────────────────────────────

/// Stable host-assigned identifier of a canvas node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanvasNodeId(pub u64);

impl fmt::Display for CanvasNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Canvas position of a node's pivot. Y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// The kinds of node the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Holds an element's picked surfaces.
    GeometryContainer,
    /// Number slider holding an element's thickness.
    Slider,
    /// Material definition parameter.
    MaterialParam,
    /// Anything else on the canvas (user components, panels, …).
    Other,
}

// ─── Payloads ────────────────────────────────────────────────────────────

/// Value carried by a number slider node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SliderValue {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Everything needed to build a structural material object on the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDefinition {
    pub family: String,
    pub name: String,
    pub e: f64,
    pub g_in_plane: f64,
    pub g_transverse: f64,
    pub gamma: f64,
    pub ft: f64,
    pub fc: f64,
    pub flow_hypothesis: FlowHypothesis,
    pub alpha_t: f64,
    pub color: String,
}

impl From<&Material> for MaterialDefinition {
    fn from(m: &Material) -> Self {
        Self {
            family: m.family.clone(),
            name: m.name.clone(),
            e: m.e,
            g_in_plane: m.g_in_plane,
            g_transverse: m.g_transverse,
            gamma: m.gamma,
            ft: m.ft,
            fc: m.fc,
            flow_hypothesis: m.flow_hypothesis,
            alpha_t: m.alpha_t,
            color: m.resolved_color().to_string(),
        }
    }
}

/// Structured content of a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodePayload {
    Empty,
    Geometry(Geometries),
    Slider(SliderValue),
    Material(Box<MaterialDefinition>),
}

impl NodePayload {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Geometry(_) => "geometry",
            Self::Slider(_) => "slider",
            Self::Material(_) => "material",
        }
    }
}

/// Snapshot of one node as enumerated from the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasNodeInfo {
    pub id: CanvasNodeId,
    pub name: String,
    pub kind: NodeKind,
    pub position: Point,
}

// ─── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanvasError {
    #[error("{0} does not exist on the canvas")]
    NodeMissing(CanvasNodeId),
    #[error("{id} cannot hold a {payload} payload")]
    PayloadRejected { id: CanvasNodeId, payload: &'static str },
    #[error("geometry {0} is no longer available")]
    GeometryUnavailable(GeometryHandle),
}

// ─── Canvas Trait ────────────────────────────────────────────────────────

/// Capabilities consumed from the graph-authoring host.
pub trait Canvas {
    /// Every node currently on the canvas, in a stable order.
    fn nodes(&self) -> Vec<CanvasNodeInfo>;

    /// Create a node of `kind` named `name`. It starts empty at the origin.
    fn create_node(&mut self, kind: NodeKind, name: &str) -> Result<CanvasNodeId, CanvasError>;

    fn delete_node(&mut self, id: CanvasNodeId) -> Result<(), CanvasError>;

    fn payload(&self, id: CanvasNodeId) -> Option<NodePayload>;

    fn write_payload(&mut self, id: CanvasNodeId, payload: NodePayload) -> Result<(), CanvasError>;

    fn position(&self, id: CanvasNodeId) -> Option<Point>;

    fn set_position(&mut self, id: CanvasNodeId, at: Point) -> Result<(), CanvasError>;

    /// Wire `from`'s output port into `to`'s input port.
    /// Returns `Ok(false)` when that wire already exists.
    fn connect(
        &mut self,
        from: CanvasNodeId,
        output: usize,
        to: CanvasNodeId,
        input: usize,
    ) -> Result<bool, CanvasError>;

    fn is_connected(&self, from: CanvasNodeId, output: usize, to: CanvasNodeId, input: usize) -> bool;
}
