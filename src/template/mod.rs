//! Event template catalog.
//!
//! This module provides:
//! - Loading of a nested template catalog into a flat table keyed by dotted code
//! - A small substitution engine rendering `{{parameters.x}}` placeholders
//!
//! # Example
//!
//! ```ignore
//! let store = TemplateStore::load("config/event-templates.yaml")?;
//!
//! let template = store.get("billing.invoice.overdue").unwrap();
//! let title = render(&template.title, &json!({"invoice": "INV-1"}))?;
//! ```

mod store;
mod substitution;
mod types;

pub use store::{CatalogFormat, TemplateStore};
pub use substitution::{render, PARAMETERS_ROOT};
pub use types::{CatalogError, CatalogResult, RenderError, Template};
