pub mod catalog;
pub mod id;
pub mod lint;
pub mod merge;
pub mod model;
pub mod store;

pub use catalog::{CatalogSource, MaterialCatalog};
pub use id::NodeKey;
pub use lint::{LintDiagnostic, LintSeverity, lint_document};
pub use merge::RenameError;
pub use model::*;
pub use store::ModelStore;
