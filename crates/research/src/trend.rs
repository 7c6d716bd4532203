//! Trend signals matched against the idea text.

use async_trait::async_trait;
use pipeline::IdeaContext;

use crate::connector::{haystack, Connector, ConnectorError, Signals};

struct Trend {
    name: &'static str,
    needles: &'static [&'static str],
    opportunity: &'static str,
    risk: &'static str,
    growth: &'static str,
}

const TRENDS: &[Trend] = &[
    Trend {
        name: "generative AI adoption",
        needles: &["ai", "ai-powered", "llm", "gpt", "generative", "agent"],
        opportunity: "Buyers are actively budgeting for AI tooling",
        risk: "Fast-moving incumbents can copy AI features quickly",
        growth: "rapid",
    },
    Trend {
        name: "remote and hybrid work",
        needles: &["remote", "hybrid", "distributed", "async"],
        opportunity: "Distributed teams need new coordination tools",
        risk: "Return-to-office policies may shrink the segment",
        growth: "steady",
    },
    Trend {
        name: "sustainability",
        needles: &["sustainab", "carbon", "climate", "recycl", "refurbish", "reuse", "second-hand"],
        opportunity: "Circular-economy demand from consumers and regulators",
        risk: "Green claims face greater scrutiny",
        growth: "strong",
    },
    Trend {
        name: "creator economy",
        needles: &["creator", "influencer", "newsletter", "podcast"],
        opportunity: "Creators pay for tools that grow their audience",
        risk: "Creator income is volatile",
        growth: "steady",
    },
    Trend {
        name: "sharing economy",
        needles: &["rental", "rent", "share", "sharing", "peer-to-peer", "idle"],
        opportunity: "Owners want to monetise idle assets",
        risk: "Insurance and liability for shared goods",
        growth: "moderate",
    },
    Trend {
        name: "startup formation",
        needles: &["startup", "founder", "ideation", "validation"],
        opportunity: "Record numbers of new business applications",
        risk: "Founders are price-sensitive before funding",
        growth: "moderate",
    },
];

fn matches(text: &str, needle: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .any(|word| word == needle || (needle.len() > 3 && word.starts_with(needle)))
}

/// Contributes opportunities and risks for each market trend the idea touches.
/// Fails with [`ConnectorError::NoSignal`] when none match.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendConnector;

#[async_trait]
impl Connector for TrendConnector {
    fn name(&self) -> &'static str {
        "trend"
    }

    async fn gather(&self, context: &IdeaContext) -> Result<Signals, ConnectorError> {
        let text = haystack(context);
        let matched: Vec<&Trend> = TRENDS
            .iter()
            .filter(|t| t.needles.iter().any(|n| matches(&text, n)))
            .collect();
        let Some(lead) = matched.first() else {
            return Err(ConnectorError::NoSignal);
        };

        let names: Vec<&str> = matched.iter().map(|t| t.name).collect();
        Ok(Signals {
            summary: Some(format!("Rides on {}", names.join(" and "))),
            growth_rate: Some(format!("{} ({})", lead.growth, lead.name)),
            opportunities: matched.iter().map(|t| t.opportunity.to_string()).collect(),
            risks: matched.iter().map(|t| t.risk.to_string()).collect(),
            confidence: (0.3 + 0.1 * matched.len() as f64).min(0.7),
            ..Signals::default()
        })
    }
}
