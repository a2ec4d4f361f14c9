//! Template types and errors

use thiserror::Error;

use crate::event::EventLevel;

/// Errors raised while loading the template catalog.
///
/// All variants are fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read template catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported template catalog extension '{0}' (expected yaml, yml, json or toml)")]
    UnsupportedFormat(String),

    #[error("Invalid YAML in template catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON in template catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML in template catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Malformed template catalog at '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

/// Errors raised while rendering a single template string.
///
/// The `Display` text is stored in place of the field that failed to render,
/// so it is phrased for operators reading the event list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("template: syntax error at offset {position}: {reason}")]
    Syntax { position: usize, reason: String },

    #[error("template: undefined variable '{0}'")]
    UndefinedVariable(String),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// A registered event template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Dotted path of the template inside the catalog (e.g. `billing.invoice.overdue`)
    pub code: String,

    /// Level as written in the catalog; mapped with [`EventLevel::from_code`]
    pub level: String,

    /// Title template text
    pub title: String,

    /// Message template text
    pub message: String,
}

impl Template {
    /// Severity the template resolves to.
    pub fn event_level(&self) -> EventLevel {
        EventLevel::from_code(&self.level)
    }
}
