//! Lint diagnostics for EFM documents.
//!
//! Reports structural issues without modifying the document.
//! `Session::lints` exposes them; `efm-replay` prints them.

use crate::model::Document;
use std::collections::HashSet;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintSeverity {
    /// Likely a mistake.
    Warning,
    /// Informational: a step the user has not done yet.
    Info,
}

/// A single lint diagnostic for a named entity.
#[derive(Debug, Clone, PartialEq)]
pub struct LintDiagnostic {
    /// Name of the element or material the finding refers to.
    pub subject: String,
    /// Human-readable message.
    pub message: String,
    pub severity: LintSeverity,
    /// Short rule identifier (e.g. "missing-geometry", "duplicate-name").
    pub rule: &'static str,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Run all lint rules over the document and return diagnostics.
#[must_use]
pub fn lint_document(doc: &Document) -> Vec<LintDiagnostic> {
    let mut diags = Vec::new();
    lint_duplicate_names(doc, &mut diags);
    lint_negative_thickness(doc, &mut diags);
    lint_missing_geometry(doc, &mut diags);
    diags
}

// ─── Rules ────────────────────────────────────────────────────────────────

/// Names are identity keys; a repeat means two records fight over one node.
fn lint_duplicate_names(doc: &Document, diags: &mut Vec<LintDiagnostic>) {
    let mut seen = HashSet::new();
    for name in doc.element_names() {
        if !seen.insert(name) {
            diags.push(LintDiagnostic {
                subject: name.to_string(),
                message: format!("Element name `{name}` is used more than once."),
                severity: LintSeverity::Warning,
                rule: "duplicate-name",
            });
        }
    }
    let mut seen = HashSet::new();
    for name in doc.material_names() {
        if !seen.insert(name) {
            diags.push(LintDiagnostic {
                subject: name.to_string(),
                message: format!("Material name `{name}` is used more than once."),
                severity: LintSeverity::Warning,
                rule: "duplicate-name",
            });
        }
    }
}

fn lint_negative_thickness(doc: &Document, diags: &mut Vec<LintDiagnostic>) {
    for element in doc.elements.iter().filter(|e| e.thickness < 0.0) {
        diags.push(LintDiagnostic {
            subject: element.name.clone(),
            message: format!(
                "Element `{}` has negative thickness {}.",
                element.name, element.thickness
            ),
            severity: LintSeverity::Warning,
            rule: "negative-thickness",
        });
    }
}

fn lint_missing_geometry(doc: &Document, diags: &mut Vec<LintDiagnostic>) {
    for element in doc.elements.iter().filter(|e| e.geometries.is_empty()) {
        diags.push(LintDiagnostic {
            subject: element.name.clone(),
            message: format!(
                "Element `{}` has no geometry yet; pick surfaces for it.",
                element.name
            ),
            severity: LintSeverity::Info,
            rule: "missing-geometry",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Element, GeometryHandle, Material};

    #[test]
    fn lint_clean_document() {
        let mut doc = Document::new();
        doc.elements
            .push(Element::new("Wall1", 200.0).with_geometries([GeometryHandle(1)]));
        doc.materials.push(Material::new("C30"));
        assert!(lint_document(&doc).is_empty());
    }

    #[test]
    fn lint_reports_each_rule() {
        let mut doc = Document::new();
        doc.elements.push(Element::new("Wall1", -1.0));
        doc.elements.push(Element::new("Wall1", 10.0));

        let rules: Vec<_> = lint_document(&doc).iter().map(|d| d.rule).collect();
        assert_eq!(
            rules,
            vec![
                "duplicate-name",
                "negative-thickness",
                "missing-geometry",
                "missing-geometry"
            ]
        );
    }
}
