//! Template catalog loading and lookup

use std::collections::HashMap;
use std::path::Path;

use serde_json::{Map, Value};

use super::types::{CatalogError, CatalogResult, Template};

const TITLE_KEY: &str = "title";
const MESSAGE_KEY: &str = "message";
const LEVEL_KEY: &str = "level";

/// Document formats accepted for the catalog file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Yaml,
    Json,
    Toml,
}

impl CatalogFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> CatalogResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(CatalogError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Read-only table of templates keyed by dotted code.
///
/// Built once before the first message is handled and never mutated
/// afterwards, so it can be shared across tasks behind an `Arc` without
/// further synchronization. Codes keep the exact case of the catalog keys.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: HashMap<String, Template>,
}

impl TemplateStore {
    /// Load the catalog from a file. The format is inferred from the extension.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let format = CatalogFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let store = Self::parse(&content, format)?;

        tracing::info!(
            path = %path.display(),
            templates = store.len(),
            "Template catalog loaded"
        );

        Ok(store)
    }

    /// Load the catalog from an in-memory document.
    pub fn parse(content: &str, format: CatalogFormat) -> CatalogResult<Self> {
        let root: Value = match format {
            CatalogFormat::Yaml => serde_yaml::from_str(content)?,
            CatalogFormat::Json => serde_json::from_str(content)?,
            CatalogFormat::Toml => toml::from_str(content)?,
        };

        match root {
            // An empty YAML document
            Value::Null => Ok(Self::default()),
            Value::Object(tree) => Self::from_tree(tree),
            _ => Err(malformed("", "catalog root must be a group of templates")),
        }
    }

    /// Flatten a catalog tree into the lookup table.
    pub fn from_tree(root: Map<String, Value>) -> CatalogResult<Self> {
        let mut templates = HashMap::new();
        collect_templates("", root, &mut templates)?;
        Ok(Self { templates })
    }

    /// Look up a template by code
    pub fn get(&self, code: &str) -> Option<&Template> {
        self.templates.get(code)
    }

    /// Check if a code is registered
    pub fn contains(&self, code: &str) -> bool {
        self.templates.contains_key(code)
    }

    /// Get the number of templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// All registered codes, sorted
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}

/// A node holding a `title` key is a leaf; every other node is a group whose
/// values must themselves be nodes.
fn collect_templates(
    path: &str,
    mut node: Map<String, Value>,
    templates: &mut HashMap<String, Template>,
) -> CatalogResult<()> {
    if let Some(title) = node.remove(TITLE_KEY) {
        if path.is_empty() {
            return Err(malformed(path, "template at catalog root has no code"));
        }

        let message = node
            .remove(MESSAGE_KEY)
            .ok_or_else(|| malformed(path, "template is missing 'message'"))?;
        let level = node
            .remove(LEVEL_KEY)
            .ok_or_else(|| malformed(path, "template is missing 'level'"))?;

        let template = Template {
            code: path.to_string(),
            level: leaf_text(path, LEVEL_KEY, level)?,
            title: leaf_text(path, TITLE_KEY, title)?,
            message: leaf_text(path, MESSAGE_KEY, message)?,
        };

        if templates.insert(path.to_string(), template).is_some() {
            return Err(malformed(path, "duplicate template code"));
        }

        return Ok(());
    }

    for (key, value) in node {
        let child_path = if path.is_empty() {
            key
        } else {
            format!("{}.{}", path, key)
        };

        match value {
            Value::Object(group) => collect_templates(&child_path, group, templates)?,
            other => {
                return Err(malformed(
                    &child_path,
                    &format!("expected a group of templates, found {}", kind(&other)),
                ))
            }
        }
    }

    Ok(())
}

fn leaf_text(path: &str, key: &str, value: Value) -> CatalogResult<String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(malformed(
            path,
            &format!("'{}' must be text, found {}", key, kind(&other)),
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "a list",
        Value::Object(_) => "a group",
    }
}

fn malformed(path: &str, reason: &str) -> CatalogError {
    CatalogError::Malformed {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLevel;
    use std::io::Write;

    const CATALOG: &str = r#"
billing:
  invoice:
    overdue:
      title: "Invoice {{parameters.invoice}} overdue"
      message: "Invoice {{parameters.invoice}} is {{parameters.days}} days late"
      level: WARN
    paid:
      title: "Invoice paid"
      message: "Thanks"
      level: INFO
system:
  restart:
    title: "Restarted"
    message: "Service restarted"
    level: CRITICAL
"#;

    #[test]
    fn test_flattens_nested_catalog() {
        let store = TemplateStore::parse(CATALOG, CatalogFormat::Yaml).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(
            store.codes(),
            vec!["billing.invoice.overdue", "billing.invoice.paid", "system.restart"]
        );
    }

    #[test]
    fn test_lookup_returns_registered_fields() {
        let store = TemplateStore::parse(CATALOG, CatalogFormat::Yaml).unwrap();

        let overdue = store.get("billing.invoice.overdue").unwrap();
        assert_eq!(overdue.code, "billing.invoice.overdue");
        assert_eq!(overdue.title, "Invoice {{parameters.invoice}} overdue");
        assert_eq!(
            overdue.message,
            "Invoice {{parameters.invoice}} is {{parameters.days}} days late"
        );
        assert_eq!(overdue.event_level(), EventLevel::Warning);

        assert_eq!(store.get("billing.invoice.paid").unwrap().event_level(), EventLevel::Info);
        assert_eq!(store.get("system.restart").unwrap().event_level(), EventLevel::Error);
    }

    #[test]
    fn test_interior_codes_are_not_templates() {
        let store = TemplateStore::parse(CATALOG, CatalogFormat::Yaml).unwrap();

        assert!(!store.contains("billing"));
        assert!(!store.contains("billing.invoice"));
        assert!(store.get("missing.code").is_none());
    }

    #[test]
    fn test_scalar_where_group_expected_fails() {
        let catalog = r#"
billing:
  invoice: "not a group"
"#;

        let err = TemplateStore::parse(catalog, CatalogFormat::Yaml).unwrap_err();
        match err {
            CatalogError::Malformed { path, .. } => assert_eq!(path, "billing.invoice"),
            other => panic!("Expected malformed catalog error, got {:?}", other),
        }
    }

    #[test]
    fn test_leaf_missing_message_fails() {
        let catalog = r#"
alerts:
  disk:
    title: "Disk full"
    level: ERROR
"#;

        assert!(matches!(
            TemplateStore::parse(catalog, CatalogFormat::Yaml),
            Err(CatalogError::Malformed { .. })
        ));
    }

    #[test]
    fn test_empty_catalog_loads() {
        let store = TemplateStore::parse("{}", CatalogFormat::Json).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let store = TemplateStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = TemplateStore::load("/nonexistent/event-templates.yaml");
        assert!(matches!(result, Err(CatalogError::Read { .. })));
    }

    #[test]
    fn test_load_unknown_extension_fails() {
        let result = TemplateStore::load("/etc/event-templates.ini");
        assert!(matches!(result, Err(CatalogError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_codes_keep_key_case() {
        let catalog = r#"
billing:
  invoiceOverdue:
    title: "Overdue"
    message: "Invoice {{parameters.invoice}} is late"
    level: WARN
  Refunds:
    issued:
      title: "Refund issued"
      message: "Done"
      level: INFO
"#;

        let store = TemplateStore::parse(catalog, CatalogFormat::Yaml).unwrap();

        assert_eq!(store.codes(), vec!["billing.Refunds.issued", "billing.invoiceOverdue"]);
        let overdue = store.get("billing.invoiceOverdue").unwrap();
        assert_eq!(overdue.code, "billing.invoiceOverdue");
        assert_eq!(overdue.event_level(), EventLevel::Warning);
        assert!(!store.contains("billing.invoiceoverdue"));
    }

    #[test]
    fn test_toml_catalog() {
        let catalog = r#"
[feeds.priceFeed.stale]
title = "Stale prices"
message = "No prices for {{parameters.minutes}} minutes"
level = "WARN"
"#;

        let store = TemplateStore::parse(catalog, CatalogFormat::Toml).unwrap();
        assert_eq!(store.get("feeds.priceFeed.stale").unwrap().title, "Stale prices");
    }

    #[test]
    fn test_non_text_leaf_field_fails() {
        let catalog = r#"{"alerts": {"disk": {"title": ["x"], "message": "m", "level": "INFO"}}}"#;

        match TemplateStore::parse(catalog, CatalogFormat::Json).unwrap_err() {
            CatalogError::Malformed { path, .. } => assert_eq!(path, "alerts.disk"),
            other => panic!("Expected malformed catalog error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_yaml_document_loads() {
        let store = TemplateStore::parse("", CatalogFormat::Yaml).unwrap();
        assert!(store.is_empty());
    }
}
