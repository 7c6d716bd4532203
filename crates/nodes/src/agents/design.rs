//! Design agents: UX, code scaffold, API design, export.

use pipeline::{
    ApiDesign, ApiEndpoint, CodeScaffold, ExportBundle, PipelineStage, StageOutput, UxDesign,
};
use serde_json::Value;

use super::prompts::{derive_title, idea_block, upstream_block};
use super::{PromptInput, StageAgent};
use crate::extract::FieldReader;

// ---------------------------------------------------------------------------

pub(crate) struct UxDesigner;

impl StageAgent for UxDesigner {
    fn stage(&self) -> PipelineStage {
        PipelineStage::UxDesign
    }

    fn role(&self) -> &'static str {
        "You are a product designer who maps user journeys and sketches low-fidelity wireframes in words."
    }

    fn schema(&self) -> &'static str {
        r#"{"userJourney": [string], "keyFlows": [string], "wireframes": [string], "principles": [string], "accessibility": string}"#
    }

    fn max_tokens(&self) -> u32 {
        2000
    }

    fn temperature(&self) -> f32 {
        0.6
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        let wireframes = if input.context.requirements.wireframes {
            "Describe one wireframe per key screen: layout, primary elements and the main call to action."
        } else {
            "Keep wireframes to a single line per screen."
        };
        format!(
            "{}\n{}Design the user experience. {wireframes}",
            idea_block(input.context),
            upstream_block(
                input.prior,
                self.stage(),
                &[PipelineStage::Normalize, PipelineStage::Research]
            ),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, _input: &PromptInput<'_>) -> StageOutput {
        let d = UxDesign::default();
        StageOutput::UxDesign(UxDesign {
            user_journey: f.list("userJourney", d.user_journey),
            key_flows: f.list("keyFlows", d.key_flows),
            wireframes: f.list("wireframes", d.wireframes),
            principles: f.list("principles", d.principles),
            accessibility: f.text("accessibility", d.accessibility),
        })
    }

    fn fallback(&self, _input: &PromptInput<'_>) -> StageOutput {
        StageOutput::UxDesign(UxDesign::default())
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct CodeArchitect;

impl StageAgent for CodeArchitect {
    fn stage(&self) -> PipelineStage {
        PipelineStage::CodeScaffold
    }

    fn role(&self) -> &'static str {
        "You are a senior software architect who lays out the repository for a new product."
    }

    fn schema(&self) -> &'static str {
        r#"{"techStack": string, "structure": string (repository tree, one path per line), "components": [string], "database": string, "apiStructure": string}"#
    }

    fn max_tokens(&self) -> u32 {
        3000
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        let depth = if input.context.requirements.code_scaffold {
            "Give a full repository tree down to the main source files."
        } else {
            "A top-level repository tree is enough."
        };
        format!(
            "{}\n{}Choose a tech stack that fits the feasibility assessment and lay out the repository. {depth}",
            idea_block(input.context),
            upstream_block(
                input.prior,
                self.stage(),
                &[
                    PipelineStage::Normalize,
                    PipelineStage::Feasibility,
                    PipelineStage::UxDesign,
                ]
            ),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, _input: &PromptInput<'_>) -> StageOutput {
        let d = CodeScaffold::default();
        StageOutput::CodeScaffold(CodeScaffold {
            tech_stack: f.text("techStack", d.tech_stack),
            structure: f.text("structure", d.structure),
            components: f.list("components", d.components),
            database: f.text("database", d.database),
            api_structure: f.text("apiStructure", d.api_structure),
        })
    }

    fn fallback(&self, _input: &PromptInput<'_>) -> StageOutput {
        StageOutput::CodeScaffold(CodeScaffold::default())
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct ApiDesigner;

/// Reads `{"method", "path", "description"}` objects or `"GET /path - text"` strings.
fn endpoint(value: &Value) -> Option<ApiEndpoint> {
    match value {
        Value::Object(map) => {
            let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::trim);
            let path = text("path").filter(|p| !p.is_empty())?;
            Some(ApiEndpoint::new(
                text("method").unwrap_or("GET").to_ascii_uppercase(),
                path,
                text("description").unwrap_or_default(),
            ))
        }
        Value::String(s) => {
            let (route, description) = s
                .split_once(" - ")
                .map_or((s.as_str(), ""), |(r, d)| (r, d));
            let mut parts = route.split_whitespace();
            let first = parts.next()?;
            match parts.next() {
                Some(path) => Some(ApiEndpoint::new(
                    first.to_ascii_uppercase(),
                    path,
                    description.trim(),
                )),
                None if first.starts_with('/') => {
                    Some(ApiEndpoint::new("GET", first, description.trim()))
                }
                None => None,
            }
        }
        _ => None,
    }
}

impl StageAgent for ApiDesigner {
    fn stage(&self) -> PipelineStage {
        PipelineStage::ApiDesign
    }

    fn role(&self) -> &'static str {
        "You are an API designer who sketches clean, versioned HTTP APIs."
    }

    fn schema(&self) -> &'static str {
        r#"{"endpoints": [{"method": string, "path": string, "description": string}], "models": [string], "authentication": string, "security": string, "documentation": string}"#
    }

    fn max_tokens(&self) -> u32 {
        3000
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        format!(
            "{}\n{}Sketch the HTTP API backing the core flows: endpoints, data models, \
             authentication and security measures.",
            idea_block(input.context),
            upstream_block(
                input.prior,
                self.stage(),
                &[
                    PipelineStage::Normalize,
                    PipelineStage::UxDesign,
                    PipelineStage::CodeScaffold,
                ]
            ),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, _input: &PromptInput<'_>) -> StageOutput {
        let d = ApiDesign::default();
        let endpoints: Vec<ApiEndpoint> = match f.items("endpoints") {
            Some(items) => {
                let parsed: Vec<ApiEndpoint> = items.iter().filter_map(endpoint).collect();
                if parsed.is_empty() {
                    f.mark_defaulted("endpoints");
                }
                parsed
            }
            None => Vec::new(),
        };
        StageOutput::ApiDesign(ApiDesign {
            endpoints: if endpoints.is_empty() { d.endpoints } else { endpoints },
            models: f.list("models", d.models),
            authentication: f.text("authentication", d.authentication),
            security: f.text("security", d.security),
            documentation: f.text("documentation", d.documentation),
        })
    }

    fn fallback(&self, _input: &PromptInput<'_>) -> StageOutput {
        StageOutput::ApiDesign(ApiDesign::default())
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct Exporter;

impl Exporter {
    fn defaults(input: &PromptInput<'_>) -> ExportBundle {
        let title = input
            .prior
            .normalize
            .as_ref()
            .map(|n| n.title.clone())
            .unwrap_or_else(|| derive_title(input.context));
        let mut d = ExportBundle::default();
        d.summary = format!("{title}: {}", d.summary);
        if let Some(feasibility) = &input.prior.feasibility {
            d.roadmap = vec![
                format!("MVP: {}", feasibility.timeline.mvp),
                format!("Beta: {}", feasibility.timeline.beta),
                format!("Launch: {}", feasibility.timeline.launch),
            ];
        }
        d
    }
}

impl StageAgent for Exporter {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Export
    }

    fn role(&self) -> &'static str {
        "You are a chief of staff who condenses an idea dossier into an executive summary, roadmap and agent runbook."
    }

    fn schema(&self) -> &'static str {
        r#"{"summary": string, "roadmap": [string], "runbook": string (YAML), "nextSteps": [string], "metrics": [string]}"#
    }

    fn max_tokens(&self) -> u32 {
        2500
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        let runbook = if input.context.requirements.runbook {
            "The runbook is a YAML document of ordered steps, each with a name and a goal."
        } else {
            "Keep the runbook to a short YAML list of steps."
        };
        format!(
            "{}\n{}Summarise the dossier for a founder. {runbook}",
            idea_block(input.context),
            upstream_block(input.prior, self.stage(), &PipelineStage::ALL),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, input: &PromptInput<'_>) -> StageOutput {
        let d = Self::defaults(input);
        StageOutput::Export(ExportBundle {
            summary: f.text("summary", d.summary),
            roadmap: f.list("roadmap", d.roadmap),
            runbook: f.text("runbook", d.runbook),
            next_steps: f.list("nextSteps", d.next_steps),
            metrics: f.list("metrics", d.metrics),
        })
    }

    fn fallback(&self, input: &PromptInput<'_>) -> StageOutput {
        StageOutput::Export(Self::defaults(input))
    }
}
