//! Shared prompt pieces.

use pipeline::{IdeaContext, PipelineStage, StageResults};
use serde::Serialize;

const MAX_TITLE_WORDS: usize = 6;
const MAX_ONE_LINER_CHARS: usize = 140;

pub(crate) fn system_prompt(role: &str, stage: PipelineStage, schema: &str) -> String {
    format!(
        "{role}\n\n\
         Respond with a single JSON object and nothing else. \
         Required fields: {fields}.\n\
         Expected shape:\n{schema}\n\
         Every field must be present and non-empty. Do not wrap the JSON in commentary.",
        fields = stage.required_fields().join(", "),
    )
}

/// The idea itself plus the caller's hints.
pub(crate) fn idea_block(context: &IdeaContext) -> String {
    format!(
        "## Idea\n{}\n\n## Hints\n{}\n",
        context.idea_text.trim(),
        context.hints()
    )
}

/// Upstream results for `current`, restricted to the stages listed in
/// `wanted` that run before it.
pub(crate) fn upstream_block(
    prior: &StageResults,
    current: PipelineStage,
    wanted: &[PipelineStage],
) -> String {
    let mut out = String::new();
    for stage in wanted.iter().copied().filter(|s| *s < current) {
        let rendered = match stage {
            PipelineStage::Normalize => compact(&prior.normalize),
            PipelineStage::Research => compact(&prior.research),
            PipelineStage::Feasibility => compact(&prior.feasibility),
            PipelineStage::MarketMoat => compact(&prior.market_moat),
            PipelineStage::RiskAssessment => compact(&prior.risk_assessment),
            PipelineStage::UxDesign => compact(&prior.ux_design),
            PipelineStage::CodeScaffold => compact(&prior.code_scaffold),
            PipelineStage::ApiDesign => compact(&prior.api_design),
            PipelineStage::Export => compact(&prior.export),
        };
        if let Some(json) = rendered {
            out.push_str(&format!("## Prior {stage} result\n{json}\n\n"));
        }
    }
    out
}

fn compact<T: Serialize>(value: &Option<T>) -> Option<String> {
    value.as_ref().and_then(|v| serde_json::to_string(v).ok())
}

/// Title for an idea: the caller's, else the first few words of the idea.
pub fn derive_title(context: &IdeaContext) -> String {
    if let Some(title) = context.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    let words: Vec<String> = context
        .idea_text
        .split_whitespace()
        .filter(|w| !matches!(w.to_ascii_lowercase().as_str(), "a" | "an" | "the"))
        .take(MAX_TITLE_WORDS)
        .map(|w| {
            let w = w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        "Untitled Startup Idea".to_string()
    } else {
        words.join(" ")
    }
}

/// One-liner for an idea: the caller's, else its first sentence, shortened.
pub fn derive_one_liner(context: &IdeaContext) -> String {
    if let Some(line) = context.one_liner.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        return line.to_string();
    }
    let text = context.idea_text.trim();
    let sentence = text
        .split_inclusive(['.', '!', '?', '\n'])
        .next()
        .unwrap_or(text)
        .trim();
    if sentence.chars().count() <= MAX_ONE_LINER_CHARS {
        return sentence.to_string();
    }
    let cut: String = sentence.chars().take(MAX_ONE_LINER_CHARS - 3).collect();
    match cut.rfind(' ') {
        Some(space) => format!("{}...", &cut[..space]),
        None => format!("{cut}..."),
    }
}
