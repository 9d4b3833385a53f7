//! Core document model for EFM sessions.
//!
//! A `Document` holds two named collections (structural `Element`s (panels
//! with a thickness and picked geometry) and `Material`s) plus free slider
//! scalars and any sections the form sends that this crate does not know.
//! Names are the identity key across the store, the canvas, and the form.
//!
//! Partial updates arrive as `ElementUpdate` / `MaterialPatch`, where every
//! optional field is an explicit `Option`. The merge engine relies on that
//! to tell "absent" apart from "set to zero".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Free-form JSON fields preserved verbatim through merges.
pub type Extra = Map<String, Value>;

/// Color used when a material has none.
pub const DEFAULT_COLOR: &str = "White";

// ─── Geometry ────────────────────────────────────────────────────────────

/// Opaque reference to a host geometry object (a picked surface).
///
/// The engine never looks inside; it only stores, compares, and hands
/// handles back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeometryHandle(pub u64);

impl fmt::Display for GeometryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Ordered geometry handles of one element.
pub type Geometries = SmallVec<[GeometryHandle; 4]>;

// ─── Elements ────────────────────────────────────────────────────────────

/// A named structural panel.
///
/// The form is authoritative for `name` and `thickness`; only canvas-side
/// picking may supply `geometries`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub thickness: f64,
    #[serde(default)]
    pub geometries: Geometries,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Element {
    pub fn new(name: impl Into<String>, thickness: f64) -> Self {
        Self {
            name: name.into(),
            thickness,
            geometries: Geometries::new(),
            extra: Extra::new(),
        }
    }

    #[must_use]
    pub fn with_geometries(mut self, geometries: impl IntoIterator<Item = GeometryHandle>) -> Self {
        self.geometries = geometries.into_iter().collect();
        self
    }
}

/// Incoming partial element record.
///
/// An empty `geometries` means "no geometry carried", never "clear it".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementUpdate {
    pub name: String,
    pub thickness: Option<f64>,
    pub geometries: Geometries,
    pub extra: Extra,
}

impl ElementUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn thickness(mut self, thickness: f64) -> Self {
        self.thickness = Some(thickness);
        self
    }

    #[must_use]
    pub fn geometries(mut self, geometries: impl IntoIterator<Item = GeometryHandle>) -> Self {
        self.geometries = geometries.into_iter().collect();
        self
    }
}

impl From<&Element> for ElementUpdate {
    fn from(element: &Element) -> Self {
        Self {
            name: element.name.clone(),
            thickness: Some(element.thickness),
            geometries: element.geometries.clone(),
            extra: element.extra.clone(),
        }
    }
}

// ─── Materials ───────────────────────────────────────────────────────────

/// Plasticity flow rule of a material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FlowHypothesis {
    #[default]
    Mises,
    Tresca,
    Rankine,
    DruckerPrager,
}

impl FlowHypothesis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mises => "mises",
            Self::Tresca => "tresca",
            Self::Rankine => "rankine",
            Self::DruckerPrager => "drucker-prager",
        }
    }
}

impl FromStr for FlowHypothesis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "mises" | "vonmises" => Ok(Self::Mises),
            "tresca" => Ok(Self::Tresca),
            "rankine" => Ok(Self::Rankine),
            "druckerprager" => Ok(Self::DruckerPrager),
            _ => Err(format!("unknown flow hypothesis `{s}`")),
        }
    }
}

impl fmt::Display for FlowHypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FlowHypothesis {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FlowHypothesis {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient::opt_flow(deserializer).map(Option::unwrap_or_default)
    }
}

/// A named structural material.
///
/// Wire keys follow the material table columns of the form (`E`,
/// `G_in-plane`, `fc`, …). Columns this struct does not model land in
/// `extra` and survive merges untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    #[serde(rename = "Family", alias = "family", default)]
    pub family: String,
    #[serde(rename = "E", default, deserialize_with = "lenient::f64_or_zero")]
    pub e: f64,
    #[serde(
        rename = "G_in-plane",
        alias = "G_inplane",
        default,
        deserialize_with = "lenient::f64_or_zero"
    )]
    pub g_in_plane: f64,
    #[serde(rename = "G_transverse", default, deserialize_with = "lenient::f64_or_zero")]
    pub g_transverse: f64,
    #[serde(default, deserialize_with = "lenient::f64_or_zero")]
    pub gamma: f64,
    /// Tensile strength.
    #[serde(
        alias = "tensileStrength",
        default,
        deserialize_with = "lenient::f64_or_zero"
    )]
    pub ft: f64,
    /// Compressive strength.
    #[serde(
        alias = "compressiveStrength",
        default,
        deserialize_with = "lenient::f64_or_zero"
    )]
    pub fc: f64,
    #[serde(rename = "FlowHypothesis", alias = "flowHypothesis", default)]
    pub flow_hypothesis: FlowHypothesis,
    #[serde(rename = "alphaT", default, deserialize_with = "lenient::f64_or_zero")]
    pub alpha_t: f64,
    #[serde(
        rename = "Color",
        alias = "color",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Material {
    /// A material with every numeric field at `0.0` and no color.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: String::new(),
            e: 0.0,
            g_in_plane: 0.0,
            g_transverse: 0.0,
            gamma: 0.0,
            ft: 0.0,
            fc: 0.0,
            flow_hypothesis: FlowHypothesis::default(),
            alpha_t: 0.0,
            color: None,
            extra: Extra::new(),
        }
    }

    /// Build a fresh material from a patch, defaulting absent fields.
    pub fn from_patch(patch: MaterialPatch) -> Self {
        let mut material = Self::new(patch.name.clone());
        patch.apply_to(&mut material);
        material
    }

    /// The display color, falling back to [`DEFAULT_COLOR`].
    pub fn resolved_color(&self) -> &str {
        self.color
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COLOR)
    }
}

/// Incoming partial material record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MaterialPatch {
    pub name: String,
    #[serde(
        rename = "Family",
        alias = "family",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub family: Option<String>,
    #[serde(rename = "E", default, deserialize_with = "lenient::opt_f64")]
    pub e: Option<f64>,
    #[serde(
        rename = "G_in-plane",
        alias = "G_inplane",
        default,
        deserialize_with = "lenient::opt_f64"
    )]
    pub g_in_plane: Option<f64>,
    #[serde(rename = "G_transverse", default, deserialize_with = "lenient::opt_f64")]
    pub g_transverse: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub gamma: Option<f64>,
    #[serde(alias = "tensileStrength", default, deserialize_with = "lenient::opt_f64")]
    pub ft: Option<f64>,
    #[serde(
        alias = "compressiveStrength",
        default,
        deserialize_with = "lenient::opt_f64"
    )]
    pub fc: Option<f64>,
    #[serde(
        rename = "FlowHypothesis",
        alias = "flowHypothesis",
        default,
        deserialize_with = "lenient::opt_flow"
    )]
    pub flow_hypothesis: Option<FlowHypothesis>,
    #[serde(rename = "alphaT", default, deserialize_with = "lenient::opt_f64")]
    pub alpha_t: Option<f64>,
    #[serde(
        rename = "Color",
        alias = "color",
        default,
        deserialize_with = "lenient::opt_string"
    )]
    pub color: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl MaterialPatch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Shallow key-by-key overwrite: every field the patch carries wins.
    pub fn apply_to(self, material: &mut Material) {
        material.name = self.name;
        if let Some(family) = self.family {
            material.family = family;
        }
        let numeric = [
            (self.e, &mut material.e),
            (self.g_in_plane, &mut material.g_in_plane),
            (self.g_transverse, &mut material.g_transverse),
            (self.gamma, &mut material.gamma),
            (self.ft, &mut material.ft),
            (self.fc, &mut material.fc),
            (self.alpha_t, &mut material.alpha_t),
        ];
        for (incoming, slot) in numeric {
            if let Some(value) = incoming {
                *slot = value;
            }
        }
        if let Some(flow) = self.flow_hypothesis {
            material.flow_hypothesis = flow;
        }
        if self.color.is_some() {
            material.color = self.color;
        }
        for (key, value) in self.extra {
            material.extra.insert(key, value);
        }
    }
}

impl From<&Material> for MaterialPatch {
    fn from(material: &Material) -> Self {
        Self {
            name: material.name.clone(),
            family: Some(material.family.clone()),
            e: Some(material.e),
            g_in_plane: Some(material.g_in_plane),
            g_transverse: Some(material.g_transverse),
            gamma: Some(material.gamma),
            ft: Some(material.ft),
            fc: Some(material.fc),
            flow_hypothesis: Some(material.flow_hypothesis),
            alpha_t: Some(material.alpha_t),
            color: material.color.clone(),
            extra: material.extra.clone(),
        }
    }
}

// ─── Document ────────────────────────────────────────────────────────────

/// The canonical session document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub materials: Vec<Material>,
    /// Free slider values keyed by slider id.
    #[serde(default)]
    pub scalars: BTreeMap<String, f64>,
    /// Top-level sections the engine does not model (e.g. `LoadDict`).
    #[serde(default)]
    pub extra: Extra,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|e| e.name.as_str())
    }

    pub fn material_names(&self) -> impl Iterator<Item = &str> {
        self.materials.iter().map(|m| m.name.as_str())
    }
}

// ─── Lenient field decoding ──────────────────────────────────────────────

/// Deserializers for form-originated values.
///
/// HTML inputs hand numbers over as strings, and blank inputs as `""`.
/// Blank and `null` count as absent; anything else must parse.
pub mod lenient {
    use super::FlowHypothesis;
    use serde::Deserializer;
    use serde::de::{self, Visitor};
    use std::fmt;

    struct OptF64;

    impl<'de> Visitor<'de> for OptF64 {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, a numeric string, or null")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v.is_finite() {
                Ok(Some(v))
            } else {
                Err(E::custom(format!("non-finite number {v}")))
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            parse_number(v).map_err(E::custom)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(OptF64)
        }
    }

    /// Parse a form number. Blank input is `None`.
    pub fn parse_number(raw: &str) -> Result<Option<f64>, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(format!("`{raw}` is not a number")),
        }
    }

    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        d.deserialize_any(OptF64)
    }

    pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        opt_f64(d).map(|v| v.unwrap_or(0.0))
    }

    struct OptString;

    impl<'de> Visitor<'de> for OptString {
        type Value = Option<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, a number, or null")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v.to_string()))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(OptString)
        }
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        d.deserialize_any(OptString)
    }

    pub fn opt_flow<'de, D: Deserializer<'de>>(d: D) -> Result<Option<FlowHypothesis>, D::Error> {
        match opt_string(d)? {
            Some(raw) if !raw.trim().is_empty() => {
                raw.parse::<FlowHypothesis>().map(Some).map_err(de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}
