//! Material catalog: the table of stock materials offered by the form.
//!
//! The catalog is read from a spreadsheet-like table (one header row and
//! any number of data rows) by whatever the host has at hand. Reading the
//! actual file is the caller's job, through the `CatalogSource` trait.

use crate::model::MaterialPatch;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Column holding the catalog name of a material row.
pub const NAME_COLUMN: &str = "Name";

// ─── Catalog Source Trait ────────────────────────────────────────────────

/// Loads a raw material table.
///
/// Implemented by each host environment:
/// - desktop: reads the first sheet of a workbook
/// - CLI: reads a JSON array of rows
/// - tests: returns an in-memory table
pub trait CatalogSource {
    /// Return the table as rows of cells; the first row is the header.
    fn load(&self) -> Result<Vec<Vec<Value>>, String>;
}

// ─── Catalog ─────────────────────────────────────────────────────────────

/// Field names plus one field→value mapping per row, the shape the form
/// consumes on `materialDataLoaded`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialCatalog {
    #[serde(rename = "fieldNames")]
    pub field_names: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl MaterialCatalog {
    /// Build a catalog from a header row followed by data rows.
    ///
    /// Null header cells are skipped. Short rows map their missing cells
    /// to `null`; cells beyond the header are ignored.
    pub fn from_table(table: Vec<Vec<Value>>) -> Self {
        let mut rows_iter = table.into_iter();
        let Some(header) = rows_iter.next() else {
            return Self::default();
        };
        let field_names: Vec<String> = header
            .into_iter()
            .filter(|cell| !cell.is_null())
            .map(|cell| match cell {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();

        let rows = rows_iter
            .map(|row| {
                field_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| (name.clone(), row.get(i).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        Self { field_names, rows }
    }

    /// Load from a source, downgrading any failure to an empty catalog.
    pub fn load_or_empty(source: &dyn CatalogSource) -> Self {
        match source.load() {
            Ok(table) => {
                let catalog = Self::from_table(table);
                log::info!(
                    "loaded material catalog: {} fields, {} rows",
                    catalog.field_names.len(),
                    catalog.rows.len()
                );
                catalog
            }
            Err(err) => {
                log::warn!("material catalog unavailable, continuing without it: {err}");
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Turn the row whose `Name` column equals `name` into a material patch,
    /// as the form does when a stock material is selected.
    pub fn lookup(&self, name: &str) -> Option<MaterialPatch> {
        let row = self
            .rows
            .iter()
            .find(|row| row.get(NAME_COLUMN).and_then(Value::as_str) == Some(name))?;
        let mut object = row.clone();
        object.insert("name".into(), Value::String(name.to_string()));
        match serde_json::from_value(Value::Object(object)) {
            Ok(patch) => Some(patch),
            Err(err) => {
                log::warn!("catalog row `{name}` is not a valid material: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct MemorySource(Result<Vec<Vec<Value>>, String>);

    impl CatalogSource for MemorySource {
        fn load(&self) -> Result<Vec<Vec<Value>>, String> {
            self.0.clone()
        }
    }

    fn table() -> Vec<Vec<Value>> {
        vec![
            vec![json!("Name"), json!("Family"), json!("E"), json!("fc"), Value::Null],
            vec![json!("C30/37"), json!("Concrete"), json!(33000), json!(30)],
            vec![json!("S235"), json!("Steel"), json!(210000), json!(235), json!("ignored")],
        ]
    }

    #[test]
    fn from_table_maps_rows_by_header() {
        let catalog = MaterialCatalog::from_table(table());
        assert_eq!(catalog.field_names, vec!["Name", "Family", "E", "fc"]);
        assert_eq!(catalog.rows.len(), 2);
        assert_eq!(catalog.rows[1]["fc"], json!(235));
        assert_eq!(catalog.rows[1].len(), 4);
    }

    #[test]
    fn short_rows_fill_with_null() {
        let catalog = MaterialCatalog::from_table(vec![
            vec![json!("Name"), json!("E")],
            vec![json!("Timber")],
        ]);
        assert_eq!(catalog.rows[0]["E"], Value::Null);
    }

    #[test]
    fn unavailable_source_degrades_to_empty() {
        let catalog = MaterialCatalog::load_or_empty(&MemorySource(Err("no file".into())));
        assert!(catalog.is_empty());
        assert!(catalog.field_names.is_empty());
    }

    #[test]
    fn lookup_builds_patch_from_row() {
        let catalog = MaterialCatalog::load_or_empty(&MemorySource(Ok(table())));
        let patch = catalog.lookup("C30/37").unwrap();
        assert_eq!(patch.name, "C30/37");
        assert_eq!(patch.family.as_deref(), Some("Concrete"));
        assert_eq!(patch.fc, Some(30.0));
        assert!(catalog.lookup("Glass").is_none());
    }

    #[test]
    fn catalog_serializes_in_form_shape() {
        let catalog = MaterialCatalog::from_table(table());
        let json = serde_json::to_value(&catalog).unwrap();
        assert!(json.get("fieldNames").is_some());
        assert!(json.get("rows").is_some());
    }
}
