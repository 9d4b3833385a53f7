//! Merge engine: upsert-by-name with selective field preservation.
//!
//! All functions here are pure: they take the existing collection by
//! reference and return the merged one. The caller decides when the result
//! becomes the new store snapshot.
//!
//! Two policies live side by side:
//!
//! - **Bulk replace** (`merge_elements`, `merge_materials`): the result holds
//!   exactly the incoming name set, in incoming order. Names missing from
//!   the incoming list are dropped.
//! - **Single entity** (`upsert_*`, `delete_*`, `rename_element`,
//!   `set_scalar`): touch one record, never drop others.
//!
//! Element geometry is special: the form cannot carry it, so an incoming
//! element with empty `geometries` keeps whatever geometry is stored.

use crate::id::{THICKNESS_SUFFIX, slider_key_collision};
use crate::model::{Document, Element, ElementUpdate, Extra, Material, MaterialPatch};
use std::collections::HashMap;

/// Why a rename was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenameError {
    #[error("element name must not be empty")]
    EmptyName,
    #[error("an element named `{0}` already exists")]
    TargetExists(String),
    #[error("element name `{0}` would share a node key with another element's thickness slider")]
    SliderKeyCollision(String),
}

// ─── Elements ────────────────────────────────────────────────────────────

/// Full-replace merge of an incoming element list.
///
/// Thickness is overwritten when the update carries one; geometry only when
/// the update carries a non-empty list. A repeated incoming name collapses
/// into one record at its first position.
#[must_use]
pub fn merge_elements(incoming: Vec<ElementUpdate>, existing: &[Element]) -> Vec<Element> {
    let by_name: HashMap<&str, &Element> =
        existing.iter().map(|e| (e.name.as_str(), e)).collect();
    let mut merged: Vec<Element> = Vec::with_capacity(incoming.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(incoming.len());

    for update in incoming {
        if let Some(&pos) = positions.get(&update.name) {
            log::debug!("duplicate element `{}` in incoming list", update.name);
            apply_element_update(&mut merged[pos], update);
            continue;
        }
        let element = match by_name.get(update.name.as_str()) {
            Some(old) => {
                let mut element = (*old).clone();
                apply_element_update(&mut element, update);
                element
            }
            None => new_element(update),
        };
        positions.insert(element.name.clone(), merged.len());
        merged.push(element);
    }

    merged
}

/// Insert or update a single element, leaving every other element alone.
#[must_use]
pub fn upsert_element(update: ElementUpdate, existing: &[Element]) -> Vec<Element> {
    let mut elements = existing.to_vec();
    match elements.iter_mut().find(|e| e.name == update.name) {
        Some(element) => apply_element_update(element, update),
        None => elements.push(new_element(update)),
    }
    elements
}

/// Remove the element called `name`. Unknown names are a no-op.
#[must_use]
pub fn delete_element_by_name(existing: &[Element], name: &str) -> Vec<Element> {
    existing.iter().filter(|e| e.name != name).cloned().collect()
}

/// Rename an element, carrying over its thickness and geometry.
///
/// A missing `old` name (or `old == new`) returns the list unchanged.
pub fn rename_element(existing: &[Element], old: &str, new: &str) -> Result<Vec<Element>, RenameError> {
    if new.trim().is_empty() {
        return Err(RenameError::EmptyName);
    }
    if old == new || !existing.iter().any(|e| e.name == old) {
        return Ok(existing.to_vec());
    }
    if existing.iter().any(|e| e.name == new) {
        return Err(RenameError::TargetExists(new.to_string()));
    }
    let renamed: Vec<Element> = existing
        .iter()
        .map(|e| {
            let mut e = e.clone();
            if e.name == old {
                e.name = new.to_string();
            }
            e
        })
        .collect();
    if let Some(name) = slider_key_collision(renamed.iter().map(|e| e.name.as_str())) {
        return Err(RenameError::SliderKeyCollision(name.to_string()));
    }
    Ok(renamed)
}

fn new_element(update: ElementUpdate) -> Element {
    Element {
        name: update.name,
        thickness: update.thickness.unwrap_or(0.0),
        geometries: update.geometries,
        extra: update.extra,
    }
}

fn apply_element_update(element: &mut Element, update: ElementUpdate) {
    if let Some(thickness) = update.thickness {
        element.thickness = thickness;
    }
    if !update.geometries.is_empty() {
        element.geometries = update.geometries;
    }
    for (key, value) in update.extra {
        element.extra.insert(key, value);
    }
}

// ─── Materials ───────────────────────────────────────────────────────────

/// Full-replace merge of an incoming material list (the bulk form path).
///
/// Each patch overwrites only the fields it carries; fields it omits keep
/// their stored value.
#[must_use]
pub fn merge_materials(incoming: Vec<MaterialPatch>, existing: &[Material]) -> Vec<Material> {
    let by_name: HashMap<&str, &Material> =
        existing.iter().map(|m| (m.name.as_str(), m)).collect();
    let mut merged: Vec<Material> = Vec::with_capacity(incoming.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(incoming.len());

    for patch in incoming {
        if let Some(&pos) = positions.get(&patch.name) {
            log::debug!("duplicate material `{}` in incoming list", patch.name);
            patch.apply_to(&mut merged[pos]);
            continue;
        }
        let material = match by_name.get(patch.name.as_str()) {
            Some(old) => {
                let mut material = (*old).clone();
                patch.apply_to(&mut material);
                material
            }
            None => Material::from_patch(patch),
        };
        positions.insert(material.name.clone(), merged.len());
        merged.push(material);
    }

    merged
}

/// Insert or update one material without dropping any other.
#[must_use]
pub fn upsert_material(patch: MaterialPatch, existing: &[Material]) -> Vec<Material> {
    let mut materials = existing.to_vec();
    match materials.iter_mut().find(|m| m.name == patch.name) {
        Some(material) => patch.apply_to(material),
        None => materials.push(Material::from_patch(patch)),
    }
    materials
}

/// Remove the material called `name`. Unknown names are a no-op.
#[must_use]
pub fn delete_material_by_name(existing: &[Material], name: &str) -> Vec<Material> {
    existing.iter().filter(|m| m.name != name).cloned().collect()
}

// ─── Document-level ──────────────────────────────────────────────────────

/// Set one slider value.
///
/// `<element>_Thickness` ids address that element's thickness (clamped at
/// zero); any other id is a free scalar kept in `Document::scalars`.
#[must_use]
pub fn set_scalar(document: &Document, id: &str, value: f64) -> Document {
    let mut next = document.clone();
    if let Some(name) = id.strip_suffix(THICKNESS_SUFFIX)
        && let Some(element) = next.elements.iter_mut().find(|e| e.name == name)
    {
        if value < 0.0 {
            log::warn!("thickness slider `{id}` sent {value}; clamping to 0");
        }
        element.thickness = value.max(0.0);
        return next;
    }
    next.scalars.insert(id.to_string(), value);
    next
}

/// Overwrite unknown top-level sections key by key.
#[must_use]
pub fn merge_extra(incoming: Extra, existing: &Extra) -> Extra {
    let mut merged = existing.clone();
    for (key, value) in incoming {
        merged.insert(key, value);
    }
    merged
}
