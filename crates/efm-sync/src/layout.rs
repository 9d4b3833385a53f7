//! Section placement for newly created nodes.
//!
//! Nodes are grouped into three fixed columns. At the start of every
//! reconciliation pass the origin is taken one spacing unit below the
//! lowest node on the whole canvas, so new nodes never land on top of
//! anything. Existing nodes are never moved and gaps are never compacted.

use crate::canvas::{CanvasNodeInfo, NodeKind, Point};
use crate::config::LayoutConfig;

/// A column of the managed layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Geometry,
    Thickness,
    Material,
}

impl Section {
    pub fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Slider => Self::Thickness,
            NodeKind::MaterialParam => Self::Material,
            NodeKind::GeometryContainer | NodeKind::Other => Self::Geometry,
        }
    }
}

/// Hands out slots for one pass.
#[derive(Debug, Clone)]
pub struct Placement<'a> {
    config: &'a LayoutConfig,
    lowest: Option<f32>,
    cursors: [Option<f32>; 3],
}

impl<'a> Placement<'a> {
    /// Start a pass over the canvas as it currently is.
    pub fn new(config: &'a LayoutConfig, live: &[CanvasNodeInfo]) -> Self {
        let lowest = live
            .iter()
            .map(|n| n.position.y)
            .fold(None, |acc: Option<f32>, y| Some(acc.map_or(y, |a| a.max(y))));
        Self {
            config,
            lowest,
            cursors: [None; 3],
        }
    }

    /// The next free slot of `section`.
    pub fn next(&mut self, section: Section) -> Point {
        let (x, spacing, slot) = match section {
            Section::Geometry => (self.config.geometry_x, self.config.geometry_spacing, 0),
            Section::Thickness => (self.config.thickness_x, self.config.thickness_spacing, 1),
            Section::Material => (self.config.material_x, self.config.material_spacing, 2),
        };
        let y = match self.cursors[slot] {
            Some(y) => y,
            None => self
                .lowest
                .map_or(self.config.start_y, |lowest| lowest + spacing),
        };
        self.cursors[slot] = Some(y + spacing);
        Point::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasNodeId;

    fn node_at(y: f32) -> CanvasNodeInfo {
        CanvasNodeInfo {
            id: CanvasNodeId(0),
            name: "Panel".into(),
            kind: NodeKind::Other,
            position: Point::new(0.0, y),
        }
    }

    #[test]
    fn empty_canvas_starts_at_start_y() {
        let config = LayoutConfig::default();
        let mut placement = Placement::new(&config, &[]);
        assert_eq!(placement.next(Section::Geometry), Point::new(900.0, 200.0));
        assert_eq!(placement.next(Section::Geometry), Point::new(900.0, 300.0));
        assert_eq!(placement.next(Section::Thickness), Point::new(1050.0, 200.0));
        assert_eq!(placement.next(Section::Thickness), Point::new(1050.0, 260.0));
    }

    #[test]
    fn origin_is_one_spacing_below_lowest_node() {
        let config = LayoutConfig::default();
        let live = [node_at(40.0), node_at(700.0), node_at(320.0)];
        let mut placement = Placement::new(&config, &live);
        assert_eq!(placement.next(Section::Material), Point::new(500.0, 760.0));
        assert_eq!(placement.next(Section::Geometry), Point::new(900.0, 800.0));
    }
}
