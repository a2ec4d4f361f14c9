//! Turns incoming events into normalized records

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::metrics::{FIELDS_CLIPPED_TOTAL, TEMPLATE_MISSES_TOTAL, TEMPLATE_RENDER_ERRORS_TOTAL};
use crate::template::{render, TemplateStore};

use super::types::{
    EventLevel, IncomingEvent, NormalizedEvent, MESSAGE_MAX_CHARS, TITLE_MAX_CHARS,
};

/// Message stored when a code does not resolve; the title becomes `?<code>?`
pub const MISSING_CODE_MESSAGE: &str = "?Code not found?";

#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The parameters could not be encoded for storage
    #[error("Failed to marshal event parameters: {0}")]
    Marshal(#[from] serde_json::Error),
}

/// Resolves templates, renders parameters and enforces size limits.
pub struct EventNormalizer {
    templates: Arc<TemplateStore>,
}

impl EventNormalizer {
    /// The store must be fully loaded before the first event is normalized.
    pub fn new(templates: Arc<TemplateStore>) -> Self {
        Self { templates }
    }

    /// Normalize one event.
    ///
    /// Missing codes and render failures are reported in-band in the stored
    /// fields; only a parameter encoding failure aborts.
    pub fn normalize(&self, event: IncomingEvent) -> Result<NormalizedEvent, NormalizeError> {
        let IncomingEvent {
            username,
            level,
            event_date,
            code,
            title,
            message,
            parameters,
        } = event;

        let (title, message, level) = if code.is_empty() {
            (title, message, level)
        } else {
            self.resolve_code(&code)
        };

        let parameters = Value::Object(parameters);
        let title = render_field(&title, &parameters, "title");
        let message = render_field(&message, &parameters, "message");

        let encoded = serde_json::to_vec(&parameters)?;

        Ok(NormalizedEvent {
            username,
            event_date,
            level,
            title: clip(title, TITLE_MAX_CHARS, "title"),
            message: clip(message, MESSAGE_MAX_CHARS, "message"),
            parameters: encoded,
        })
    }

    fn resolve_code(&self, code: &str) -> (String, String, EventLevel) {
        match self.templates.get(code) {
            Some(template) => (
                template.title.clone(),
                template.message.clone(),
                template.event_level(),
            ),
            None => {
                TEMPLATE_MISSES_TOTAL.inc();
                tracing::warn!(code = %code, "Event code not found in template catalog");
                (
                    format!("?{}?", code),
                    MISSING_CODE_MESSAGE.to_string(),
                    EventLevel::Error,
                )
            }
        }
    }
}

fn render_field(text: &str, parameters: &Value, field: &'static str) -> String {
    render(text, parameters).unwrap_or_else(|e| {
        TEMPLATE_RENDER_ERRORS_TOTAL.with_label_values(&[field]).inc();
        tracing::warn!(field, error = %e, "Failed to render event {}", field);
        e.to_string()
    })
}

/// Hard cut at `limit` characters; never splits a character.
fn clip(mut text: String, limit: usize, field: &'static str) -> String {
    let cut = text.char_indices().nth(limit).map(|(index, _)| index);
    if let Some(cut) = cut {
        FIELDS_CLIPPED_TOTAL.with_label_values(&[field]).inc();
        tracing::warn!(field, limit, value = %text, "Event {} is too long, clipping", field);
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::CatalogFormat;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Map};

    fn normalizer() -> EventNormalizer {
        let catalog = r#"
billing:
  invoice:
    overdue:
      title: "Invoice {{parameters.invoice}} overdue"
      message: "Invoice {{parameters.invoice}} is {{parameters.days}} days late"
      level: WARN
    broken:
      title: "Invoice {{parameters.missing}}"
      message: "Still {{parameters.invoice}}"
      level: INFO
"#;
        let store = TemplateStore::parse(catalog, CatalogFormat::Yaml).unwrap();
        EventNormalizer::new(Arc::new(store))
    }

    fn event(
        code: &str,
        title: &str,
        message: &str,
        level: EventLevel,
        parameters: Value,
    ) -> IncomingEvent {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        IncomingEvent {
            username: "ann".to_string(),
            level,
            event_date: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            code: code.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            parameters,
        }
    }

    #[test]
    fn test_inline_event_kept_verbatim() {
        let normalized = normalizer()
            .normalize(event("", "Hi", "There", EventLevel::Info, json!({})))
            .unwrap();

        assert_eq!(normalized.username, "ann");
        assert_eq!(normalized.title, "Hi");
        assert_eq!(normalized.message, "There");
        assert_eq!(normalized.level, EventLevel::Info);
        assert_eq!(normalized.event_date, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_code_resolves_template() {
        let normalized = normalizer()
            .normalize(event(
                "billing.invoice.overdue",
                "ignored",
                "ignored",
                EventLevel::Error,
                json!({"invoice": "INV-7", "days": 12}),
            ))
            .unwrap();

        assert_eq!(normalized.title, "Invoice INV-7 overdue");
        assert_eq!(normalized.message, "Invoice INV-7 is 12 days late");
        assert_eq!(normalized.level, EventLevel::Warning);
    }

    #[test]
    fn test_missing_code_placeholder() {
        for level in [EventLevel::Info, EventLevel::Warning, EventLevel::Error] {
            let normalized = normalizer()
                .normalize(event("no.such.code", "Hi", "There", level, json!({})))
                .unwrap();

            assert_eq!(normalized.title, "?no.such.code?");
            assert_eq!(normalized.message, MISSING_CODE_MESSAGE);
            assert_eq!(normalized.level, EventLevel::Error);
        }
    }

    #[test]
    fn test_title_render_error_kept_in_band() {
        let normalized = normalizer()
            .normalize(event(
                "billing.invoice.broken",
                "",
                "",
                EventLevel::Info,
                json!({"invoice": "INV-9"}),
            ))
            .unwrap();

        assert_eq!(normalized.title, "template: undefined variable 'parameters.missing'");
        assert_eq!(normalized.message, "Still INV-9");
        assert_eq!(normalized.level, EventLevel::Info);
    }

    #[test]
    fn test_message_render_error_kept_in_band() {
        let normalized = normalizer()
            .normalize(event(
                "",
                "Hello {{parameters.name}}",
                "Bye {{parameters.name",
                EventLevel::Warning,
                json!({"name": "Ann"}),
            ))
            .unwrap();

        assert_eq!(normalized.title, "Hello Ann");
        assert!(normalized.message.starts_with("template: syntax error"));
    }

    #[test]
    fn test_both_fields_fail_independently() {
        let normalized = normalizer()
            .normalize(event(
                "",
                "{{parameters.a}}",
                "{{parameters.b}}",
                EventLevel::Info,
                json!({}),
            ))
            .unwrap();

        assert_eq!(normalized.title, "template: undefined variable 'parameters.a'");
        assert_eq!(normalized.message, "template: undefined variable 'parameters.b'");
    }

    #[test]
    fn test_truncation_limits() {
        let long_title = "t".repeat(100);
        let long_message = "m".repeat(600);

        let normalized = normalizer()
            .normalize(event("", &long_title, &long_message, EventLevel::Info, json!({})))
            .unwrap();

        assert_eq!(normalized.title, "t".repeat(TITLE_MAX_CHARS));
        assert_eq!(normalized.message, "m".repeat(MESSAGE_MAX_CHARS));
    }

    #[test]
    fn test_at_limit_unchanged() {
        let title = "t".repeat(TITLE_MAX_CHARS);
        let message = "m".repeat(MESSAGE_MAX_CHARS);

        let normalized = normalizer()
            .normalize(event("", &title, &message, EventLevel::Info, json!({})))
            .unwrap();

        assert_eq!(normalized.title, title);
        assert_eq!(normalized.message, message);
    }

    #[test]
    fn test_truncation_applies_after_rendering() {
        let normalized = normalizer()
            .normalize(event(
                "",
                "{{parameters.long}}",
                "ok",
                EventLevel::Info,
                json!({"long": "é".repeat(70)}),
            ))
            .unwrap();

        assert_eq!(normalized.title.chars().count(), TITLE_MAX_CHARS);
        assert_eq!(normalized.title, "é".repeat(TITLE_MAX_CHARS));
    }

    #[test]
    fn test_parameters_encoded() {
        let parameters = json!({"invoice": "INV-7", "nested": {"days": [1, 2]}});

        let normalized = normalizer()
            .normalize(event("", "Hi", "There", EventLevel::Info, parameters.clone()))
            .unwrap();

        let decoded = normalized.decode_parameters().unwrap();
        assert_eq!(Value::Object(decoded), parameters);
    }
}
