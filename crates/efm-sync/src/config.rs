//! Session configuration.
//!
//! Every field has a default, so an empty JSON object (or no config file at
//! all) yields a working setup. Hosts tune placement, slider ranges, and
//! the wiring to their own downstream components.

use serde::{Deserialize, Serialize};

// ─── Layout ───────────────────────────────────────────────────────────────

/// Column placement of the three node sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub geometry_x: f32,
    pub thickness_x: f32,
    pub material_x: f32,
    /// Y of the first node when the canvas is empty.
    pub start_y: f32,
    pub geometry_spacing: f32,
    pub thickness_spacing: f32,
    pub material_spacing: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            geometry_x: 900.0,
            thickness_x: 1050.0,
            material_x: 500.0,
            start_y: 200.0,
            geometry_spacing: 100.0,
            thickness_spacing: 60.0,
            material_spacing: 60.0,
        }
    }
}

// ─── Sliders ──────────────────────────────────────────────────────────────

/// Range given to thickness sliders. The maximum grows to fit the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderConfig {
    pub min: f64,
    pub max: f64,
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self { min: 0.0, max: 100.0 }
    }
}

// ─── Collisions ───────────────────────────────────────────────────────────

/// What to do when an entity's node name is already taken by a canvas node
/// the engine did not create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Leave the foreign node alone and report a conflict. Default: **skip**.
    #[default]
    Skip,
    /// Take ownership of a foreign node of the matching kind.
    Adopt,
}

// ─── Wiring ───────────────────────────────────────────────────────────────

/// Connect `source`'s output port to `target`'s input port, by node name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRule {
    pub source: String,
    #[serde(default)]
    pub source_output: usize,
    pub target: String,
    #[serde(default)]
    pub target_input: usize,
}

// ─── Top level ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub layout: LayoutConfig,
    pub slider: SliderConfig,
    pub collision: CollisionPolicy,
    pub connections: Vec<ConnectionRule>,
    /// Maximum number of undo steps kept per session.
    pub history_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            slider: SliderConfig::default(),
            collision: CollisionPolicy::Skip,
            connections: Vec::new(),
            history_depth: 100,
        }
    }
}

impl SyncConfig {
    /// Parse a JSON config; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid config: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default_config() {
        assert_eq!(SyncConfig::from_json("{}").unwrap(), SyncConfig::default());
    }

    #[test]
    fn partial_config_overrides_only_given_keys() {
        let config = SyncConfig::from_json(
            r#"{
                "layout": { "start_y": 535 },
                "collision": "adopt",
                "connections": [
                    { "source": "Stone Walls", "target": "_Stone Walls", "target_input": 1 }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.layout.start_y, 535.0);
        assert_eq!(config.layout.geometry_x, 900.0);
        assert_eq!(config.collision, CollisionPolicy::Adopt);
        assert_eq!(config.connections[0].source_output, 0);
        assert_eq!(config.connections[0].target_input, 1);
    }
}
