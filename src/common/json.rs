//! JSON helpers for configuration documents and override fragments.
//!
//! Documents are handled as schema-agnostic `serde_json::Value` trees. The
//! lenient mode accepts the relaxed syntax the external trainer's parser
//! tolerates (line and block comments, trailing commas); the strict mode is
//! plain JSON.
//!
//! TODO: Jsonnet `local` bindings and `std.extVar` calls fail in both modes.

use serde_json::{Map, Value};

use crate::common::error::{SweepError, SweepResult};

/// How configuration text is parsed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ParseMode {
    /// Standard JSON only.
    Strict,
    /// Comments and trailing commas are stripped before parsing.
    #[default]
    Lenient,
}

/// Remove `//`, `#` and `/* */` comments that sit outside string literals.
///
/// Newlines are preserved so parser error positions still match the source.
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '#' => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars, &mut out),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn skip_line<I: Iterator<Item = char>>(chars: &mut I, out: &mut String) {
    for c in chars {
        if c == '\n' {
            out.push('\n');
            break;
        }
    }
}

/// Drop commas that directly precede a closing `}` or `]`.
pub fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escape = false;

    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Parse a configuration document. The top level must be an object.
pub fn parse_document(text: &str, mode: ParseMode) -> SweepResult<Value> {
    let value: Value = match mode {
        ParseMode::Strict => serde_json::from_str(text)?,
        ParseMode::Lenient => serde_json::from_str(&strip_trailing_commas(&strip_comments(text)))?,
    };
    if !value.is_object() {
        return Err(SweepError::invalid_config(
            "configuration document must be a JSON object",
        ));
    }
    Ok(value)
}

/// Parse an override fragment given on the command line.
///
/// Fragments are always parsed strictly; dotted keys are unflattened.
pub fn parse_fragment(text: &str) -> SweepResult<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| SweepError::invalid_override(format!("override is not valid JSON: {err}")))?;
    if !value.is_object() {
        return Err(SweepError::invalid_override("override must be a JSON object"));
    }
    unflatten(value)
}

/// Deep-merge `overlay` onto `base`, last write wins per leaf.
///
/// Objects merge key by key; any other overlay value replaces the base value.
/// Keys absent from the overlay are left untouched.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

/// Expand dotted keys (`"trainer.cuda_device": 1`) into nested objects.
///
/// Two keys that address the same leaf, or a leaf and something beneath it,
/// are rejected regardless of their order.
pub fn unflatten(value: Value) -> SweepResult<Value> {
    let Value::Object(map) = value else {
        return Ok(value);
    };

    let mut out = Value::Object(Map::new());
    for (key, inner) in map {
        let inner = unflatten(inner)?;
        let segments: Vec<&str> = key.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(SweepError::invalid_override(format!(
                "override key `{key}` has an empty path segment"
            )));
        }
        let nested = segments
            .iter()
            .rev()
            .fold(inner, |acc, segment| {
                let mut m = Map::new();
                m.insert((*segment).to_string(), acc);
                Value::Object(m)
            });
        merge_disjoint(&mut out, nested, &key)?;
    }
    Ok(out)
}

fn merge_disjoint(base: &mut Value, overlay: Value, key: &str) -> SweepResult<()> {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge_disjoint(existing, v, key)?,
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
            Ok(())
        }
        _ => Err(SweepError::invalid_override(format!(
            "override key `{key}` conflicts with another key for the same path"
        ))),
    }
}

/// Look up a dotted path such as `dataset_reader.contextualizer.layer_num`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

/// Build a fragment that sets a single dotted path.
pub fn fragment_at(path: &str, leaf: Value) -> SweepResult<Value> {
    let mut m = Map::new();
    m.insert(path.to_string(), leaf);
    unflatten(Value::Object(m))
}
