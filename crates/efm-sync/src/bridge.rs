//! Form bridge: the navigation-message protocol of the embedded web form.
//!
//! Inbound, the form reports edits by navigating to scheme-tagged URIs:
//!
//! ```text
//! sliderupdate:slider?<id>=<value>
//! geometryupdate:geo?<name>,<thickness>
//! updateelements:update?data=<json>
//! deleteelement:delete?name=<name>
//! updatematerials:update?data=<json>
//! loadtable:state
//! ```
//!
//! `parse_message` splits the URI, `decode_form_event` turns the query into
//! a typed [`FormEvent`]. Outbound, `outbound_messages` builds the payloads
//! of the ready events the form listens for.

use efm_core::catalog::MaterialCatalog;
use efm_core::id::slider_key_collision;
use efm_core::model::{
    Document, ElementUpdate, Extra, GeometryHandle, Material, MaterialPatch, lenient,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use winnow::combinator::{opt, preceded};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{rest, take_till, take_while};

// ─── Errors ──────────────────────────────────────────────────────────────

/// Why an inbound message was dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event kind `{0}`")]
    UnknownEvent(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("`{event}` is missing its `{param}` parameter")]
    MissingParameter {
        event: EventKind,
        param: &'static str,
    },
    #[error("`{raw}` is not a valid number for {field}")]
    InvalidNumber { field: String, raw: String },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
    #[error("element `{name}` has negative thickness {value}")]
    NegativeThickness { name: String, value: f64 },
    #[error("element `{name}` would share a node key with another element's thickness slider")]
    SliderKeyCollision { name: String },
}

// ─── Event kinds ─────────────────────────────────────────────────────────

/// The message schemes the form speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SliderUpdate,
    GeometryUpdate,
    UpdateElements,
    DeleteElement,
    UpdateMaterials,
    LoadTable,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SliderUpdate => "sliderupdate",
            Self::GeometryUpdate => "geometryupdate",
            Self::UpdateElements => "updateelements",
            Self::DeleteElement => "deleteelement",
            Self::UpdateMaterials => "updatematerials",
            Self::LoadTable => "loadtable",
        }
    }
}

impl FromStr for EventKind {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sliderupdate" => Ok(Self::SliderUpdate),
            "geometryupdate" => Ok(Self::GeometryUpdate),
            "updateelements" => Ok(Self::UpdateElements),
            "deleteelement" => Ok(Self::DeleteElement),
            "updatematerials" => Ok(Self::UpdateMaterials),
            "loadtable" => Ok(Self::LoadTable),
            _ => Err(DecodeError::UnknownEvent(s.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded form edit.
#[derive(Debug, Clone, PartialEq)]
pub enum FormEvent {
    /// One slider moved. Thickness sliders are keyed `<element>_Thickness`.
    SliderUpdate { id: String, value: f64 },
    /// Pick geometry for `name` on the canvas, then upsert the element.
    GeometryPick { name: String, thickness: Option<f64> },
    /// The full element table, plus any other top-level sections sent
    /// alongside it (`LoadDict`, ...).
    ReplaceElements {
        rows: Vec<ElementUpdate>,
        sections: Extra,
    },
    DeleteElement { name: String },
    /// The full material list, plus any other top-level sections.
    ReplaceMaterials {
        patches: Vec<MaterialPatch>,
        sections: Extra,
    },
    /// The form (re)loaded and wants the current state.
    Refresh,
}

impl FormEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SliderUpdate { .. } => EventKind::SliderUpdate,
            Self::GeometryPick { .. } => EventKind::GeometryUpdate,
            Self::ReplaceElements { .. } => EventKind::UpdateElements,
            Self::DeleteElement { .. } => EventKind::DeleteElement,
            Self::ReplaceMaterials { .. } => EventKind::UpdateMaterials,
            Self::Refresh => EventKind::LoadTable,
        }
    }
}

// ─── Message envelope ────────────────────────────────────────────────────

/// A navigation URI split into its parts. Nothing is decoded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormMessage<'a> {
    pub scheme: &'a str,
    pub opaque: &'a str,
    pub query: &'a str,
}

fn parse_scheme<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .parse_next(input)
}

fn parse_envelope<'a>(input: &mut &'a str) -> ModalResult<FormMessage<'a>> {
    let scheme = parse_scheme.parse_next(input)?;
    ':'.parse_next(input)?;
    let opaque = take_till(0.., '?').parse_next(input)?;
    let query = opt(preceded('?', rest)).parse_next(input)?;
    Ok(FormMessage {
        scheme,
        opaque,
        query: query.unwrap_or(""),
    })
}

/// Split `<scheme>:<opaque>?<query>`.
pub fn parse_message(uri: &str) -> Result<FormMessage<'_>, DecodeError> {
    let mut input = uri.trim();
    parse_envelope
        .parse_next(&mut input)
        .map_err(|e: winnow::error::ErrMode<ContextError>| {
            DecodeError::Malformed(format!("`{uri}` is not a scheme-tagged message: {e}"))
        })
}

/// Parse and decode a whole navigation URI.
pub fn decode_message(uri: &str) -> Result<FormEvent, DecodeError> {
    let message = parse_message(uri)?;
    let kind: EventKind = message.scheme.parse()?;
    decode_form_event(kind, message.query)
}

// ─── Event decoding ──────────────────────────────────────────────────────

/// Decode the raw query of a message of `kind`.
pub fn decode_form_event(kind: EventKind, query: &str) -> Result<FormEvent, DecodeError> {
    match kind {
        EventKind::SliderUpdate => {
            let (id, raw) = query.split_once('=').ok_or(DecodeError::MissingParameter {
                event: kind,
                param: "value",
            })?;
            let id = percent_decode(id)?;
            if id.is_empty() {
                return Err(DecodeError::MissingParameter { event: kind, param: "id" });
            }
            let raw = percent_decode(raw)?;
            let value = number(&raw, &id)?.ok_or_else(|| DecodeError::InvalidNumber {
                field: id.clone(),
                raw: raw.clone(),
            })?;
            Ok(FormEvent::SliderUpdate { id, value })
        }
        EventKind::GeometryUpdate => {
            let (name, raw) = query.split_once(',').ok_or(DecodeError::MissingParameter {
                event: kind,
                param: "thickness",
            })?;
            let name = percent_decode(name)?;
            if name.trim().is_empty() {
                return Err(DecodeError::MissingParameter { event: kind, param: "name" });
            }
            let thickness = number(&percent_decode(raw)?, &name)?;
            if let Some(value) = thickness
                && value < 0.0
            {
                return Err(DecodeError::NegativeThickness { name, value });
            }
            Ok(FormEvent::GeometryPick { name, thickness })
        }
        EventKind::UpdateElements => {
            let data = required_param(kind, query, "data")?;
            let fragment: ElementsFragment = from_json(&data)?;
            let rows = fragment
                .geom_dict
                .elements
                .into_iter()
                .map(FormElementRow::into_update)
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(name) = slider_key_collision(rows.iter().map(|r| r.name.as_str())) {
                return Err(DecodeError::SliderKeyCollision {
                    name: name.to_string(),
                });
            }
            Ok(FormEvent::ReplaceElements {
                rows,
                sections: fragment.sections,
            })
        }
        EventKind::DeleteElement => {
            let name = required_param(kind, query, "name")?;
            Ok(FormEvent::DeleteElement { name })
        }
        EventKind::UpdateMaterials => {
            let data = required_param(kind, query, "data")?;
            let fragment: MaterialsFragment = from_json(&data)?;
            Ok(FormEvent::ReplaceMaterials {
                patches: fragment.mat_dict.materials,
                sections: fragment.sections,
            })
        }
        EventKind::LoadTable => Ok(FormEvent::Refresh),
    }
}

/// The value of `param` in an `a=b&c=d` query, percent-decoded.
/// Present-but-empty counts as missing.
fn required_param(kind: EventKind, query: &str, param: &'static str) -> Result<String, DecodeError> {
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key == param {
            let value = percent_decode(value)?;
            if value.trim().is_empty() {
                break;
            }
            return Ok(value);
        }
    }
    Err(DecodeError::MissingParameter { event: kind, param })
}

fn number(raw: &str, field: &str) -> Result<Option<f64>, DecodeError> {
    lenient::parse_number(raw).map_err(|_| DecodeError::InvalidNumber {
        field: field.to_string(),
        raw: raw.to_string(),
    })
}

fn from_json<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T, DecodeError> {
    serde_json::from_str(data).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

/// Decode `%XX` escapes into UTF-8 text. `+` is kept literally.
pub fn percent_decode(raw: &str) -> Result<String, DecodeError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = bytes.get(i + 1).copied().and_then(hex_val);
            let lo = bytes.get(i + 2).copied().and_then(hex_val);
            match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 3;
                    continue;
                }
                _ => {
                    return Err(DecodeError::Malformed(format!(
                        "bad percent escape at byte {i} of `{raw}`"
                    )));
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).map_err(|_| DecodeError::Malformed(format!("`{raw}` is not UTF-8")))
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// ─── Wire shapes ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ElementsFragment {
    #[serde(rename = "GeomDict")]
    geom_dict: GeomDict,
    #[serde(flatten)]
    sections: Extra,
}

#[derive(Deserialize)]
struct GeomDict {
    #[serde(rename = "Elements", default)]
    elements: Vec<FormElementRow>,
}

/// One row of the element table. Geometry the form sends is discarded.
#[derive(Deserialize)]
struct FormElementRow {
    name: String,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    thickness: Option<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    geometries: serde::de::IgnoredAny,
    #[serde(flatten)]
    extra: Extra,
}

impl FormElementRow {
    fn into_update(self) -> Result<ElementUpdate, DecodeError> {
        if let Some(value) = self.thickness
            && value < 0.0
        {
            return Err(DecodeError::NegativeThickness {
                name: self.name,
                value,
            });
        }
        Ok(ElementUpdate {
            name: self.name,
            thickness: self.thickness,
            geometries: Default::default(),
            extra: self.extra,
        })
    }
}

#[derive(Deserialize)]
struct MaterialsFragment {
    #[serde(rename = "MatDict")]
    mat_dict: MatDict,
    #[serde(flatten)]
    sections: Extra,
}

#[derive(Deserialize)]
struct MatDict {
    #[serde(rename = "Materials", default)]
    materials: Vec<MaterialPatch>,
}

// ─── Store → Form ────────────────────────────────────────────────────────

/// Element row as the form shows it: geometry is never sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormElement<'a> {
    pub name: &'a str,
    pub thickness: f64,
    pub geometries: &'static [GeometryHandle],
}

fn form_elements(doc: &Document) -> Vec<FormElement<'_>> {
    doc.elements
        .iter()
        .map(|e| FormElement {
            name: &e.name,
            thickness: e.thickness,
            geometries: &[],
        })
        .collect()
}

/// The document as the form consumes it, geometry stripped.
pub fn serialize_for_form(doc: &Document) -> Value {
    json!({
        "GeomDict": { "Elements": form_elements(doc) },
        "MatDict": { "Materials": &doc.materials },
    })
}

/// A ready event pushed to the form, with the data it carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub event: &'static str,
    pub payload: Value,
}

pub const ELEMENTS_LOADED: &str = "elementsLoaded";
pub const MATERIAL_DATA_LOADED: &str = "materialDataLoaded";
pub const MATERIALS_LOADED: &str = "materialsLoaded";

/// The three ready events, in the order the form expects them.
pub fn outbound_messages(doc: &Document, catalog: &MaterialCatalog) -> Vec<OutboundMessage> {
    vec![
        OutboundMessage {
            event: ELEMENTS_LOADED,
            payload: json!(form_elements(doc)),
        },
        OutboundMessage {
            event: MATERIAL_DATA_LOADED,
            payload: json!(catalog),
        },
        OutboundMessage {
            event: MATERIALS_LOADED,
            payload: json!(doc.materials.iter().collect::<Vec<&Material>>()),
        },
    ]
}
