//! Completeness heuristic for stage output.
//!
//! The score is the fraction of a stage's required fields that the model
//! itself supplied with a non-empty value, plus a small bonus for longer
//! responses, capped at 1.0. Fields the agent had to default count as
//! missing, so a full fallback scores zero.
//!
//! The function is monotonic in completeness: supplying an additional
//! required field never lowers the score.

use serde_json::Value;

use crate::{PipelineStage, QualityScore};

/// Serialised length above which the small length bonus applies.
pub const SHORT_BONUS_CHARS: usize = 200;

/// Serialised length above which the large length bonus applies.
pub const LONG_BONUS_CHARS: usize = 500;

const SHORT_BONUS: f64 = 0.05;
const LONG_BONUS: f64 = 0.1;

/// Scores the JSON object a model returned for `stage`.
///
/// `raw` is `None` when no usable JSON came back (call failure or parse
/// failure); that scores zero. `defaulted` lists the fields the agent could
/// not read from `raw` (`"timeline.beta"` for a nested one); a required
/// field with itself or any sub-field defaulted counts as missing.
pub fn assess(stage: PipelineStage, raw: Option<&Value>, defaulted: &[String]) -> QualityScore {
    let Some(Value::Object(map)) = raw else {
        return QualityScore::zero();
    };

    let required = stage.required_fields();
    let present = required
        .iter()
        .filter(|field| map.get(**field).is_some_and(is_filled))
        .filter(|field| !was_defaulted(field, defaulted))
        .count();
    let completeness = present as f64 / required.len() as f64;

    if present == 0 {
        return QualityScore::saturating(completeness);
    }

    let length = raw.map(|v| v.to_string().len()).unwrap_or(0);
    let bonus = if length > LONG_BONUS_CHARS {
        LONG_BONUS
    } else if length > SHORT_BONUS_CHARS {
        SHORT_BONUS
    } else {
        0.0
    };

    QualityScore::saturating(completeness + bonus)
}

fn was_defaulted(field: &str, defaulted: &[String]) -> bool {
    defaulted.iter().any(|d| {
        d == field
            || d.strip_prefix(field)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// Whether a JSON value counts as present and non-empty.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
