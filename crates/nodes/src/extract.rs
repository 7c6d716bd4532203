//! Best-effort JSON extraction and per-field coercion of model output.
//!
//! Models wrap JSON in prose, code fences or trailing commentary. [`extract_json`]
//! finds the first balanced `{...}` substring that parses. [`FieldReader`] then
//! reads each field leniently, substituting the caller's default (and noting
//! the field as defaulted) when a value is missing, empty or the wrong shape.

use serde_json::{Map, Value};

/// Returns the first JSON object embedded in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(&text[start..]) {
            let candidate = &text[start..start + end + 1];
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Byte offset of the brace closing the object that opens at `text[0]`.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Coerces a JSON value to an integer score clamped to `range`.
///
/// Accepts numbers, numeric strings and ratio strings such as `"8/10"`, which
/// are rescaled onto the range's upper bound. Returns `None` for anything
/// without a usable number.
pub fn coerce_score(value: &Value, range: (u8, u8)) -> Option<u8> {
    let (lo, hi) = range;
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_numeric_text(s, hi)?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(f64::from(lo), f64::from(hi)) as u8)
}

fn parse_numeric_text(text: &str, hi: u8) -> Option<f64> {
    let text = text.trim().trim_end_matches('%');
    match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = leading_number(num)?;
            let den: f64 = leading_number(den)?;
            if den <= 0.0 {
                return None;
            }
            Some(num / den * f64::from(hi))
        }
        None => leading_number(text),
    }
}

fn leading_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

/// Lenient reader over one JSON object.
#[derive(Debug)]
pub struct FieldReader<'a> {
    map: Option<&'a Map<String, Value>>,
    prefix: String,
    defaulted: Vec<String>,
}

impl<'a> FieldReader<'a> {
    /// Reads from `raw`; anything other than an object defaults every field.
    pub fn new(raw: Option<&'a Value>) -> Self {
        Self {
            map: raw.and_then(Value::as_object),
            prefix: String::new(),
            defaulted: Vec::new(),
        }
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.map?.get(field).filter(|v| pipeline::quality::is_filled(v))
    }

    fn note_default(&mut self, field: &str) {
        self.defaulted.push(format!("{}{field}", self.prefix));
    }

    /// A text field. Numbers and string lists are rendered as text.
    pub fn text(&mut self, field: &str, default: String) -> String {
        let value = match self.get(field) {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(Value::Array(items)) => {
                let lines: Vec<String> = items.iter().filter_map(item_text).collect();
                (!lines.is_empty()).then(|| lines.join("\n"))
            }
            Some(v @ Value::Object(_)) => Some(v.to_string()),
            _ => None,
        };
        value.unwrap_or_else(|| {
            self.note_default(field);
            default
        })
    }

    /// A list of strings. A single string becomes a one-item list (or one
    /// item per line when it spans several lines).
    pub fn list(&mut self, field: &str, default: Vec<String>) -> Vec<String> {
        let value = match self.get(field) {
            Some(Value::Array(items)) => {
                let list: Vec<String> = items.iter().filter_map(item_text).collect();
                (!list.is_empty()).then_some(list)
            }
            Some(Value::String(s)) => Some(
                s.lines()
                    .map(|l| l.trim().trim_start_matches(['-', '*']).trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect(),
            ),
            _ => None,
        };
        value.unwrap_or_else(|| {
            self.note_default(field);
            default
        })
    }

    /// An integer score clamped to `range`.
    pub fn score(&mut self, field: &str, range: (u8, u8), default: u8) -> u8 {
        match self.get(field).and_then(|v| coerce_score(v, range)) {
            Some(score) => score,
            None => {
                self.note_default(field);
                default.clamp(range.0, range.1)
            }
        }
    }

    /// The raw items of an array field, or `None` (noted as defaulted).
    pub fn items(&mut self, field: &str) -> Option<&'a [Value]> {
        match self.get(field) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.as_slice()),
            _ => {
                self.note_default(field);
                None
            }
        }
    }

    /// Reads a nested object field with `read`. Defaults recorded inside are
    /// reported as `field.inner`.
    pub fn nested<T>(&mut self, field: &str, read: impl FnOnce(&mut FieldReader<'a>) -> T) -> T {
        let inner_map = self.get(field).and_then(Value::as_object);
        if inner_map.is_none() {
            self.note_default(field);
        }
        let mut inner = FieldReader {
            map: inner_map,
            prefix: format!("{}{field}.", self.prefix),
            defaulted: Vec::new(),
        };
        let value = read(&mut inner);
        if inner_map.is_some() {
            self.defaulted.extend(inner.defaulted);
        }
        value
    }

    /// Records `field` as defaulted when the caller rejects a value the
    /// reader accepted, such as an array with no usable items.
    pub fn mark_defaulted(&mut self, field: &str) {
        self.note_default(field);
    }

    /// Fields (dotted for nested ones) that fell back to defaults.
    pub fn defaulted(&self) -> &[String] {
        &self.defaulted
    }

    pub fn into_defaulted(self) -> Vec<String> {
        self.defaulted
    }
}

/// Text of one list item. Objects are summarised by their most descriptive key.
fn item_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => {
            let label = ["name", "title", "step", "description", "value"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str));
            Some(label.map_or_else(|| value.to_string(), str::to_string))
        }
        _ => None,
    }
}
