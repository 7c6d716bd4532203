//! Keyword heuristics: industry category plus canned signals per category.

use async_trait::async_trait;
use pipeline::{IdeaCategory, IdeaContext, Reference};

use crate::connector::{haystack, Connector, ConnectorError, Signals};

/// Keywords per category, checked in order. The first category with the most
/// hits wins.
const CATEGORY_KEYWORDS: &[(IdeaCategory, &[&str])] = &[
    (
        IdeaCategory::AiMl,
        &["ai", "ai-powered", "machine learning", "llm", "gpt", "model", "neural"],
    ),
    (
        IdeaCategory::Fintech,
        &["payment", "bank", "fintech", "invest", "loan", "lending", "crypto", "invoice"],
    ),
    (
        IdeaCategory::Healthtech,
        &["health", "medical", "patient", "clinic", "doctor", "wellness", "therapy"],
    ),
    (
        IdeaCategory::Edtech,
        &["learn", "course", "student", "teacher", "school", "tutor", "education"],
    ),
    (
        IdeaCategory::Gaming,
        &["game", "gaming", "player", "esports"],
    ),
    (
        IdeaCategory::Marketplace,
        &["marketplace", "peer-to-peer", "p2p", "buyers", "sellers", "rental", "connecting"],
    ),
    (
        IdeaCategory::Ecommerce,
        &["shop", "store", "e-commerce", "ecommerce", "retail", "checkout"],
    ),
    (
        IdeaCategory::MobileApp,
        &["mobile", "app", "ios", "android", "smartphone"],
    ),
    (
        IdeaCategory::Saas,
        &["saas", "platform", "dashboard", "subscription", "b2b", "teams", "workflow"],
    ),
];

fn hits(text: &str, keywords: &[&str]) -> usize {
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    keywords
        .iter()
        .filter(|k| {
            if k.contains(' ') {
                text.contains(*k)
            } else {
                words.iter().any(|w| w == *k || (k.len() > 3 && w.starts_with(*k)))
            }
        })
        .count()
}

/// Infers the industry bucket for an idea.
pub fn infer_category(context: &IdeaContext) -> IdeaCategory {
    let text = haystack(context);
    let mut best = (IdeaCategory::Other, 0);
    for (category, keywords) in CATEGORY_KEYWORDS {
        let n = hits(&text, keywords);
        if n > best.1 {
            best = (*category, n);
        }
    }
    best.0
}

fn canned(category: IdeaCategory) -> Signals {
    let (size, growth, competitors, opportunities, risks): (&str, &str, &[&str], &[&str], &[&str]) =
        match category {
            IdeaCategory::AiMl => (
                "Generative AI software spend is in the tens of billions of USD",
                "30%+ CAGR",
                &["Incumbent platforms adding AI features", "Open-source model tooling"],
                &["Automating manual knowledge work", "Vertical models for niche domains"],
                &["Model provider dependency", "Inference cost at scale", "Output reliability"],
            ),
            IdeaCategory::Fintech => (
                "Global fintech revenue is several hundred billion USD",
                "15-20% CAGR",
                &["Stripe", "Incumbent banks' digital offerings"],
                &["Embedded finance for vertical software", "Underserved SMB segments"],
                &["Licensing and compliance burden", "Fraud exposure"],
            ),
            IdeaCategory::Healthtech => (
                "Digital health is a market of several hundred billion USD",
                "15-20% CAGR",
                &["Telehealth platforms", "EHR vendors"],
                &["Remote monitoring", "Administrative automation for clinics"],
                &["Health data regulation", "Long clinical sales cycles"],
            ),
            IdeaCategory::Edtech => (
                "Global edtech spend is in the hundreds of billions of USD",
                "10-15% CAGR",
                &["Coursera", "Duolingo", "Khan Academy"],
                &["Personalised learning paths", "Workforce upskilling"],
                &["Low willingness to pay among learners", "Engagement drop-off"],
            ),
            IdeaCategory::Gaming => (
                "Global games market is roughly 200 billion USD",
                "5-10% CAGR",
                &["Established studios", "Platform storefronts"],
                &["Community-driven content", "Cross-platform play"],
                &["Hit-driven revenue", "High user acquisition cost"],
            ),
            IdeaCategory::Marketplace => (
                "Online marketplaces move trillions of USD in gross merchandise value",
                "10-15% CAGR",
                &["Horizontal marketplaces", "Classifieds and social groups"],
                &["Underserved verticals with fragmented supply", "Trust and payments layer"],
                &["Chicken-and-egg liquidity", "Disintermediation after the first match"],
            ),
            IdeaCategory::Ecommerce => (
                "Global e-commerce sales exceed 5 trillion USD",
                "8-10% CAGR",
                &["Amazon", "Shopify merchants"],
                &["Direct-to-consumer niches", "Social commerce"],
                &["Thin margins", "Rising acquisition costs"],
            ),
            IdeaCategory::MobileApp => (
                "Consumer app spending exceeds 150 billion USD a year",
                "10% CAGR",
                &["Category leaders in the app stores"],
                &["Mobile-first workflows", "Subscription monetisation"],
                &["App store gatekeeping", "Retention beyond the first week"],
            ),
            IdeaCategory::Saas => (
                "Global SaaS spend is several hundred billion USD",
                "15-20% CAGR",
                &["Horizontal suites", "Spreadsheets and manual processes"],
                &["Vertical SaaS for underserved industries", "Workflow automation"],
                &["Crowded categories", "Churn in SMB segments"],
            ),
            IdeaCategory::Other => (
                "Market size unclear; needs primary research",
                "unknown",
                &[],
                &["Define a narrow beachhead segment"],
                &["Unvalidated demand"],
            ),
        };
    let owned = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();
    Signals {
        summary: None,
        market_size: Some(size.to_string()),
        growth_rate: Some(growth.to_string()),
        category: Some(category),
        opportunities: owned(opportunities),
        risks: owned(risks),
        competitors: owned(competitors),
        references: vec![Reference::new(
            "Y Combinator Startup Library",
            "https://www.ycombinator.com/library",
        )],
        confidence: if category == IdeaCategory::Other { 0.2 } else { 0.5 },
    }
}

/// Classifies the idea by keyword and contributes per-category signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordConnector;

#[async_trait]
impl Connector for KeywordConnector {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn gather(&self, context: &IdeaContext) -> Result<Signals, ConnectorError> {
        Ok(canned(infer_category(context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_the_strongest_keywords() {
        let cases = [
            ("An AI-powered platform for startup ideation and validation", IdeaCategory::AiMl),
            ("Peer-to-peer rental of camping gear between owners", IdeaCategory::Marketplace),
            ("Invoice financing and payments for freelancers", IdeaCategory::Fintech),
            ("Tutor matching for high school students", IdeaCategory::Edtech),
            ("Handmade pottery workshops in the countryside", IdeaCategory::Other),
        ];
        for (text, expected) in cases {
            assert_eq!(infer_category(&IdeaContext::new(text)), expected, "{text}");
        }
    }

    #[test]
    fn industry_hint_counts_towards_the_category() {
        let ctx = IdeaContext::new("Software for small clinics").with_industry("healthtech");
        assert_eq!(infer_category(&ctx), IdeaCategory::Healthtech);
    }

    #[tokio::test]
    async fn signals_carry_the_category() {
        let signals = KeywordConnector
            .gather(&IdeaContext::new("Online course builder for teachers"))
            .await
            .unwrap();
        assert_eq!(signals.category, Some(IdeaCategory::Edtech));
        assert!(signals.market_size.is_some());
        assert!(!signals.risks.is_empty());
    }
}
