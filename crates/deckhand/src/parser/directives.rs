use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::{Mapping, Value};

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@([A-Za-z0-9][A-Za-z0-9_-]*):(.*)$").expect("directive pattern is valid")
});

/// The leading configuration section of a slide block.
#[derive(Debug, Clone, Default)]
pub struct Section {
    /// Directive keys and their typed values, in source order.
    pub entries: Mapping,
    /// Everything after the configuration section.
    pub body: String,
}

/// Split a raw block into its `@key: value` configuration section and body.
///
/// The section is the run of directive lines at the top of the block. Values are
/// read as YAML so `980`, `true` and `[Inter, Fira Code]` come out typed; values
/// YAML would swallow (such as a `#fff` colour, which reads as a comment) are
/// kept as plain strings. A key repeated within one block is an error.
pub fn extract(block: &str) -> Result<Section, String> {
    let mut entries = Mapping::new();
    let mut lines = block.lines().peekable();
    let mut consumed = 0usize;

    while let Some(line) = lines.peek() {
        let trimmed = line.trim();
        let Some(caps) = DIRECTIVE.captures(trimmed) else {
            break;
        };
        let key = caps[1].to_string();
        let raw = caps[2].trim();
        let value = parse_value(raw).map_err(|e| format!("invalid value for `{key}`: {e}"))?;
        if entries.insert(Value::String(key.clone()), value).is_some() {
            return Err(format!("`{key}` is set more than once"));
        }
        consumed += 1;
        lines.next();
    }

    let body = if consumed == 0 {
        block.to_string()
    } else {
        trim_leading_blank_lines(&lines.collect::<Vec<_>>().join("\n"))
    };

    Ok(Section { entries, body })
}

fn parse_value(raw: &str) -> Result<Value, serde_yaml::Error> {
    if raw.is_empty() {
        return Ok(Value::Null);
    }
    match serde_yaml::from_str::<Value>(raw)? {
        Value::Null if raw != "null" && raw != "~" => Ok(Value::String(raw.to_string())),
        value => Ok(value),
    }
}

fn trim_leading_blank_lines(text: &str) -> String {
    let mut rest = text;
    while let Some(pos) = rest.find('\n') {
        if rest[..pos].trim().is_empty() {
            rest = &rest[pos + 1..];
        } else {
            break;
        }
    }
    if rest.trim().is_empty() {
        String::new()
    } else {
        rest.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(section: &'a Section, key: &str) -> Option<&'a Value> {
        section.entries.get(Value::String(key.to_string()))
    }

    #[test]
    fn test_no_directives() {
        let section = extract("# Title\n\nBody").unwrap();
        assert!(section.entries.is_empty());
        assert_eq!(section.body, "# Title\n\nBody");
    }

    #[test]
    fn test_typed_values() {
        let section =
            extract("@theme: dark\n@canvas-width: 980\n@drawings-persist: true\n# Hi").unwrap();
        assert_eq!(get(&section, "theme"), Some(&Value::String("dark".into())));
        assert_eq!(get(&section, "canvas-width").and_then(Value::as_u64), Some(980));
        assert_eq!(
            get(&section, "drawings-persist").and_then(Value::as_bool),
            Some(true)
        );
        assert_eq!(section.body, "# Hi");
    }

    #[test]
    fn test_flow_sequence_value() {
        let section = extract("@fonts: [Inter, Fira Code]").unwrap();
        let fonts = get(&section, "fonts").and_then(Value::as_sequence).unwrap();
        assert_eq!(fonts.len(), 2);
        assert_eq!(section.body, "");
    }

    #[test]
    fn test_hash_value_stays_a_string() {
        let section = extract("@accent: #ff8800").unwrap();
        assert_eq!(
            get(&section, "accent"),
            Some(&Value::String("#ff8800".into()))
        );
    }

    #[test]
    fn test_blank_line_after_section_is_dropped() {
        let section = extract("@layout: cover\n\n\n# Welcome").unwrap();
        assert_eq!(section.body, "# Welcome");
    }

    #[test]
    fn test_directive_after_content_is_body() {
        let section = extract("# Title\n@layout: cover").unwrap();
        assert!(section.entries.is_empty());
        assert!(section.body.ends_with("@layout: cover"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = extract("@theme: dark\n@theme: light").unwrap_err();
        assert!(err.contains("theme"), "unexpected message: {err}");
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = extract("@fonts: [Inter, Fira").unwrap_err();
        assert!(err.contains("fonts"), "unexpected message: {err}");
    }

    #[test]
    fn test_lookalike_lines_are_body() {
        assert!(extract("@ layout: x").unwrap().entries.is_empty());
        assert!(extract("email@example.com: hi").unwrap().entries.is_empty());
    }
}
