//! Prompt template substitution.

use serde_json::{Map, Value};

use crate::segment::{TemplateLine, TemplatePart};

/// Resolves `{name}` placeholders line by line against `variables`.
///
/// A placeholder whose value is missing or falsy (`null`, `false`, `0`, `""`)
/// is dropped; the literal text around it passes through unchanged.
pub fn render_template(template: &str, variables: &Map<String, Value>) -> Vec<TemplateLine> {
    template
        .split('\n')
        .map(|line| render_line(line, variables))
        .collect()
}

fn render_line(line: &str, variables: &Map<String, Value>) -> TemplateLine {
    let mut parts = Vec::new();
    let mut last = 0;

    for (start, end, name) in placeholders(line) {
        if start > last {
            parts.push(TemplatePart::Literal(line[last..start].to_string()));
        }
        if let Some(value) = variables.get(name).and_then(display_value) {
            parts.push(TemplatePart::Value(value));
        }
        last = end;
    }
    if last < line.len() {
        parts.push(TemplatePart::Literal(line[last..].to_string()));
    }

    TemplateLine { parts }
}

/// Byte ranges of `{name}` tokens. `name` is one or more chars other than `}`.
fn placeholders(line: &str) -> Vec<(usize, usize, &str)> {
    let mut found = Vec::new();
    let mut from = 0;

    while let Some(open) = line[from..].find('{').map(|i| from + i) {
        let Some(close) = line[open + 1..].find('}').map(|i| open + 1 + i) else {
            break;
        };
        if close == open + 1 {
            // `{}` is not a token; retry from the next char.
            from = open + 1;
            continue;
        }
        found.push((open, close + 1, &line[open + 1..close]));
        from = close + 1;
    }
    found
}

fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}
