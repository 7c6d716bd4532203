//! Analysis agents: normalize, research, feasibility, market & moat, risk.

use pipeline::{
    FeasibilityAssessment, MarketMoat, Mitigation, NormalizedIdea, PipelineStage,
    ResearchFindings, RiskAssessment, StageOutput, Timeline, FEASIBILITY_RANGE, MARKET_AXIS_RANGE,
};

use super::prompts::{derive_one_liner, derive_title, idea_block, upstream_block};
use super::{PromptInput, StageAgent};
use crate::extract::FieldReader;

// ---------------------------------------------------------------------------

pub(crate) struct Normalizer;

impl Normalizer {
    fn defaults(input: &PromptInput<'_>) -> NormalizedIdea {
        NormalizedIdea {
            title: derive_title(input.context),
            one_liner: derive_one_liner(input.context),
            ..NormalizedIdea::default()
        }
    }
}

impl StageAgent for Normalizer {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Normalize
    }

    fn role(&self) -> &'static str {
        "You are a startup analyst who turns rough ideas into crisp problem statements."
    }

    fn schema(&self) -> &'static str {
        r#"{"title": string, "oneLiner": string, "problem": string, "audience": string, "valueProposition": string}"#
    }

    fn max_tokens(&self) -> u32 {
        800
    }

    fn temperature(&self) -> f32 {
        0.3
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        format!(
            "{}\nGive the idea a short product title and a one-sentence pitch, then state \
             the problem, who has it, and why this solution is better.",
            idea_block(input.context)
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, input: &PromptInput<'_>) -> StageOutput {
        let d = Self::defaults(input);
        StageOutput::Normalize(NormalizedIdea {
            title: f.text("title", d.title),
            one_liner: f.text("oneLiner", d.one_liner),
            problem: f.text("problem", d.problem),
            audience: f.text("audience", d.audience),
            value_proposition: f.text("valueProposition", d.value_proposition),
        })
    }

    fn fallback(&self, input: &PromptInput<'_>) -> StageOutput {
        StageOutput::Normalize(Self::defaults(input))
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct MarketResearcher;

impl MarketResearcher {
    fn defaults(input: &PromptInput<'_>) -> ResearchFindings {
        let mut d = ResearchFindings::default();
        let title = input
            .prior
            .normalize
            .as_ref()
            .map(|n| n.title.clone())
            .unwrap_or_else(|| derive_title(input.context));

        if let Some(intel) = input.intel {
            if let Some(size) = &intel.market_size {
                d.market_size = size.clone();
            }
            if !intel.competitors.is_empty() {
                d.competitors = intel.competitors.clone();
            }
            if !intel.opportunities.is_empty() {
                d.opportunities = intel.opportunities.clone();
            }
            if !intel.risks.is_empty() {
                d.challenges = intel.risks.clone();
            }
        }

        d.prd = format!(
            "# {title}: Product Requirements\n\n\
             ## Problem\n{problem}\n\n\
             ## Goals\n- Validate demand with a minimal product\n- Reach a repeatable first use case\n\n\
             ## Non-goals\n- Broad platform features before product/market fit\n",
            problem = input
                .prior
                .normalize
                .as_ref()
                .map(|n| n.problem.clone())
                .unwrap_or_else(|| input.context.idea_text.trim().to_string()),
        );
        d
    }
}

impl StageAgent for MarketResearcher {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Research
    }

    fn role(&self) -> &'static str {
        "You are a market researcher who sizes markets, maps competitors and writes product requirement documents."
    }

    fn schema(&self) -> &'static str {
        r#"{"marketSize": string, "competitors": [string], "opportunities": [string], "challenges": [string], "prd": string (Markdown)}"#
    }

    fn max_tokens(&self) -> u32 {
        2500
    }

    fn temperature(&self) -> f32 {
        0.5
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        let intel = input
            .intel
            .map(|i| format!("## Market signals\n{}\n", i.to_prompt_section()))
            .unwrap_or_default();
        format!(
            "{}\n{}{}Research the market for this idea and write a concise PRD in Markdown \
             with problem, goals, users, core features and success metrics.",
            idea_block(input.context),
            upstream_block(input.prior, self.stage(), &[PipelineStage::Normalize]),
            intel,
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, input: &PromptInput<'_>) -> StageOutput {
        let d = Self::defaults(input);
        StageOutput::Research(ResearchFindings {
            market_size: f.text("marketSize", d.market_size),
            competitors: f.list("competitors", d.competitors),
            opportunities: f.list("opportunities", d.opportunities),
            challenges: f.list("challenges", d.challenges),
            prd: f.text("prd", d.prd),
        })
    }

    fn fallback(&self, input: &PromptInput<'_>) -> StageOutput {
        StageOutput::Research(Self::defaults(input))
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct FeasibilityAnalyst;

impl StageAgent for FeasibilityAnalyst {
    fn stage(&self) -> PipelineStage {
        PipelineStage::Feasibility
    }

    fn role(&self) -> &'static str {
        "You are a pragmatic CTO assessing whether a small team can build a product."
    }

    fn schema(&self) -> &'static str {
        r#"{"score": integer 1-10, "technologies": [string], "timeline": {"mvp": string, "beta": string, "launch": string}, "resources": string, "risks": [string]}"#
    }

    fn max_tokens(&self) -> u32 {
        1500
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        format!(
            "{}\n{}Score technical feasibility from 1 (impractical) to 10 (straightforward), \
             list the core technologies, estimate an MVP/beta/launch timeline and the team needed.",
            idea_block(input.context),
            upstream_block(
                input.prior,
                self.stage(),
                &[PipelineStage::Normalize, PipelineStage::Research]
            ),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, _input: &PromptInput<'_>) -> StageOutput {
        let d = FeasibilityAssessment::default();
        let timeline = f.nested("timeline", |t| Timeline {
            mvp: t.text("mvp", d.timeline.mvp.clone()),
            beta: t.text("beta", d.timeline.beta.clone()),
            launch: t.text("launch", d.timeline.launch.clone()),
        });
        StageOutput::Feasibility(FeasibilityAssessment {
            score: f.score("score", FEASIBILITY_RANGE, d.score),
            technologies: f.list("technologies", d.technologies),
            timeline,
            resources: f.text("resources", d.resources),
            risks: f.list("risks", d.risks),
        })
    }

    fn fallback(&self, _input: &PromptInput<'_>) -> StageOutput {
        StageOutput::Feasibility(FeasibilityAssessment::default())
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct MoatStrategist;

impl StageAgent for MoatStrategist {
    fn stage(&self) -> PipelineStage {
        PipelineStage::MarketMoat
    }

    fn role(&self) -> &'static str {
        "You are a venture investor scoring startup ideas on desirability, viability, defensibility and timing."
    }

    fn schema(&self) -> &'static str {
        r#"{"desirability": integer 1-100, "viability": integer 1-100, "defensibility": integer 1-100, "timing": integer 1-100, "moatStrategies": [string]}"#
    }

    fn max_tokens(&self) -> u32 {
        1200
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        format!(
            "{}\n{}Score each axis from 1 to 100 and propose concrete strategies for building a moat.",
            idea_block(input.context),
            upstream_block(
                input.prior,
                self.stage(),
                &[PipelineStage::Normalize, PipelineStage::Research, PipelineStage::Feasibility]
            ),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, _input: &PromptInput<'_>) -> StageOutput {
        let d = MarketMoat::default();
        StageOutput::MarketMoat(MarketMoat {
            desirability: f.score("desirability", MARKET_AXIS_RANGE, d.desirability),
            viability: f.score("viability", MARKET_AXIS_RANGE, d.viability),
            defensibility: f.score("defensibility", MARKET_AXIS_RANGE, d.defensibility),
            timing: f.score("timing", MARKET_AXIS_RANGE, d.timing),
            moat_strategies: f.list("moatStrategies", d.moat_strategies),
        })
    }

    fn fallback(&self, _input: &PromptInput<'_>) -> StageOutput {
        StageOutput::MarketMoat(MarketMoat::default())
    }
}

// ---------------------------------------------------------------------------

pub(crate) struct RiskAnalyst;

impl RiskAnalyst {
    fn defaults(input: &PromptInput<'_>) -> RiskAssessment {
        let mut d = RiskAssessment::default();
        if let Some(feasibility) = &input.prior.feasibility {
            if !feasibility.risks.is_empty() {
                d.technical_risks = feasibility.risks.clone();
            }
        }
        if let Some(research) = &input.prior.research {
            if !research.challenges.is_empty() {
                d.market_risks = research.challenges.clone();
            }
        }
        d
    }
}

impl StageAgent for RiskAnalyst {
    fn stage(&self) -> PipelineStage {
        PipelineStage::RiskAssessment
    }

    fn role(&self) -> &'static str {
        "You are a risk analyst who identifies what could sink a young company and how to mitigate it."
    }

    fn schema(&self) -> &'static str {
        r#"{"technicalRisks": [string], "marketRisks": [string], "financialRisks": [string], "regulatoryRisks": [string], "mitigation": {"immediate": [string], "shortTerm": [string], "longTerm": [string]}}"#
    }

    fn max_tokens(&self) -> u32 {
        1500
    }

    fn user_prompt(&self, input: &PromptInput<'_>) -> String {
        format!(
            "{}\n{}List the main risks in each category and a mitigation plan by horizon.",
            idea_block(input.context),
            upstream_block(
                input.prior,
                self.stage(),
                &[
                    PipelineStage::Normalize,
                    PipelineStage::Research,
                    PipelineStage::Feasibility,
                    PipelineStage::MarketMoat,
                ]
            ),
        )
    }

    fn parse(&self, f: &mut FieldReader<'_>, input: &PromptInput<'_>) -> StageOutput {
        let d = Self::defaults(input);
        let mitigation = f.nested("mitigation", |m| Mitigation {
            immediate: m.list("immediate", d.mitigation.immediate.clone()),
            short_term: m.list("shortTerm", d.mitigation.short_term.clone()),
            long_term: m.list("longTerm", d.mitigation.long_term.clone()),
        });
        StageOutput::RiskAssessment(RiskAssessment {
            technical_risks: f.list("technicalRisks", d.technical_risks),
            market_risks: f.list("marketRisks", d.market_risks),
            financial_risks: f.list("financialRisks", d.financial_risks),
            regulatory_risks: f.list("regulatoryRisks", d.regulatory_risks),
            mitigation,
        })
    }

    fn fallback(&self, input: &PromptInput<'_>) -> StageOutput {
        StageOutput::RiskAssessment(Self::defaults(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::{IdeaContext, MarketIntel, StageResults};
    use serde_json::json;

    fn input<'a>(ctx: &'a IdeaContext, prior: &'a StageResults) -> PromptInput<'a> {
        PromptInput {
            context: ctx,
            prior,
            intel: None,
        }
    }

    #[test]
    fn normalizer_fallback_is_derived_from_the_idea() {
        let ctx = IdeaContext::new("Peer-to-peer rental of camping gear. Owners earn on idle kit.");
        let prior = StageResults::default();
        match Normalizer.fallback(&input(&ctx, &prior)) {
            StageOutput::Normalize(n) => {
                assert_eq!(n.title, "Peer-to-peer Rental Of Camping Gear Owners");
                assert_eq!(n.one_liner, "Peer-to-peer rental of camping gear.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn research_fallback_uses_market_intel() {
        let ctx = IdeaContext::new("Peer-to-peer rental of camping gear");
        let prior = StageResults::default();
        let intel = MarketIntel {
            market_size: Some("$3B".into()),
            competitors: vec!["Outdoorsy".into()],
            ..MarketIntel::default()
        };
        let mut with_intel = input(&ctx, &prior);
        with_intel.intel = Some(&intel);

        match MarketResearcher.fallback(&with_intel) {
            StageOutput::Research(r) => {
                assert_eq!(r.market_size, "$3B");
                assert_eq!(r.competitors, vec!["Outdoorsy"]);
                assert!(r.prd.contains("Product Requirements"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn feasibility_reads_nested_timeline() {
        let ctx = IdeaContext::new("Peer-to-peer rental of camping gear");
        let prior = StageResults::default();
        let raw = json!({
            "score": "7/10",
            "technologies": ["Postgres"],
            "timeline": {"mvp": "6 weeks", "beta": "3 months", "launch": "5 months"},
            "resources": "3 engineers",
            "risks": ["payments"]
        });
        let mut f = FieldReader::new(Some(&raw));
        match FeasibilityAnalyst.parse(&mut f, &input(&ctx, &prior)) {
            StageOutput::Feasibility(a) => {
                assert_eq!(a.score, 7);
                assert_eq!(a.timeline.mvp, "6 weeks");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.defaulted().is_empty());
    }

    #[test]
    fn risk_defaults_reuse_upstream_findings() {
        let ctx = IdeaContext::new("Peer-to-peer rental of camping gear");
        let mut prior = StageResults::default();
        prior.feasibility = Some(FeasibilityAssessment {
            risks: vec!["insurance integration".into()],
            ..FeasibilityAssessment::default()
        });
        match RiskAnalyst.fallback(&input(&ctx, &prior)) {
            StageOutput::RiskAssessment(r) => {
                assert_eq!(r.technical_risks, vec!["insurance integration"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
