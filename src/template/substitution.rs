//! Variable substitution engine for templates
//!
//! Placeholders take the form `{{ parameters.path.to.value }}` or the short
//! `{{ .path.to.value }}`, where `.` is the mapping sent with the event. The
//! only named root is `parameters`. Output is plain text; nothing is escaped.

use serde_json::Value;

use super::types::RenderError;

/// Name under which event parameters are exposed to templates
pub const PARAMETERS_ROOT: &str = "parameters";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Render `template` against the event parameters.
///
/// Fails on malformed placeholders and on references that do not resolve.
/// A variable that resolves to `null` renders as an empty string.
pub fn render(template: &str, parameters: &Value) -> Result<String, RenderError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);

        let inner = &rest[start + OPEN.len()..];
        let end = inner.find(CLOSE).ok_or_else(|| RenderError::Syntax {
            position: offset + start,
            reason: "unclosed action".to_string(),
        })?;

        let value = resolve(inner[..end].trim(), offset + start, parameters)?;
        write_value(&mut output, value);

        let consumed = start + OPEN.len() + end + CLOSE.len();
        offset += consumed;
        rest = &rest[consumed..];
    }

    output.push_str(rest);
    Ok(output)
}

fn resolve<'a>(
    expression: &str,
    position: usize,
    parameters: &'a Value,
) -> Result<&'a Value, RenderError> {
    if expression.is_empty() {
        return Err(RenderError::Syntax {
            position,
            reason: "empty placeholder".to_string(),
        });
    }

    // A leading `.` is the parameters mapping itself: `{{.name}}`, `{{.}}`
    let (path, relative) = match expression.strip_prefix('.') {
        Some(rest) => (rest, true),
        None => (expression, false),
    };

    let segments: Vec<&str> = if path.is_empty() && relative {
        Vec::new()
    } else {
        path.split('.').collect()
    };
    if segments.iter().any(|s| !is_identifier(s)) {
        return Err(RenderError::Syntax {
            position,
            reason: format!("invalid variable reference '{}'", expression),
        });
    }

    let lookup = if relative {
        &segments[..]
    } else {
        match segments.split_first() {
            Some((root, rest)) if *root == PARAMETERS_ROOT => rest,
            _ => return Err(RenderError::UndefinedVariable(expression.to_string())),
        }
    };

    let mut current = parameters;
    for segment in lookup {
        let next = match current {
            Value::Object(map) => map.get(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| RenderError::UndefinedVariable(expression.to_string()))?;
    }

    Ok(current)
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn write_value(output: &mut String, value: &Value) {
    match value {
        Value::String(s) => output.push_str(s),
        Value::Null => {}
        // Numbers and booleans use their JSON text; arrays and objects compact JSON
        other => output.push_str(&other.to_string()),
    }
}
