//! The research service: fans out to every connector and merges the results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use pipeline::{IdeaContext, MarketIntel, MarketIntelSource, Reference};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::connector::{Connector, ConnectorError, Signals};
use crate::keyword::KeywordConnector;
use crate::trend::TrendConnector;

/// How long merged intel is reused for the same idea.
pub const DEFAULT_RESEARCH_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on a single connector.
pub const DEFAULT_CONNECTOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Merges market signals from several connectors.
///
/// Connectors run concurrently. A connector that fails or times out is logged
/// and contributes nothing. Merged intel is cached by idea text, industry and
/// target market.
pub struct ResearchService {
    connectors: Vec<Arc<dyn Connector>>,
    connector_timeout: Duration,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, MarketIntel)>>,
}

impl std::fmt::Debug for ResearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.connectors.iter().map(|c| c.name()).collect();
        f.debug_struct("ResearchService")
            .field("connectors", &names)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for ResearchService {
    /// Keyword and trend connectors.
    fn default() -> Self {
        Self::new()
            .with_connector(Arc::new(KeywordConnector))
            .with_connector(Arc::new(TrendConnector))
    }
}

impl ResearchService {
    /// A service with no connectors.
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
            connector_timeout: DEFAULT_CONNECTOR_TIMEOUT,
            ttl: DEFAULT_RESEARCH_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_connector_timeout(mut self, timeout: Duration) -> Self {
        self.connector_timeout = timeout;
        self
    }

    fn cache_key(context: &IdeaContext) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            context.idea_text.trim().to_lowercase(),
            context.industry.as_deref().unwrap_or_default().to_lowercase(),
            context.target_market.as_deref().unwrap_or_default().to_lowercase(),
        )
    }

    async fn gather(&self, context: &IdeaContext) -> MarketIntel {
        let calls = self.connectors.iter().map(|connector| async move {
            let result = match tokio::time::timeout(self.connector_timeout, connector.gather(context)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectorError::Timeout(self.connector_timeout)),
            };
            (connector.name(), result)
        });

        let mut contributions = Vec::new();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(signals) => contributions.push((name, signals)),
                Err(ConnectorError::NoSignal) => debug!(connector = name, "no signal"),
                Err(error) => warn!(connector = name, %error, "connector failed"),
            }
        }
        merge(contributions)
    }
}

#[async_trait]
impl MarketIntelSource for ResearchService {
    #[instrument(skip_all, fields(connectors = self.connectors.len()))]
    async fn market_intel(&self, context: &IdeaContext) -> MarketIntel {
        let key = Self::cache_key(context);
        {
            let cache = self.cache.lock().await;
            if let Some((stored, intel)) = cache.get(&key) {
                if stored.elapsed() < self.ttl {
                    debug!("research cache hit");
                    return intel.clone();
                }
            }
        }

        let intel = self.gather(context).await;
        debug!(sources = ?intel.sources, confidence = intel.confidence, "market intel gathered");

        let mut cache = self.cache.lock().await;
        let ttl = self.ttl;
        cache.retain(|_, (stored, _)| stored.elapsed() < ttl);
        cache.insert(key, (Instant::now(), intel.clone()));
        intel
    }
}

fn push_unique(into: &mut Vec<String>, seen: &mut HashSet<String>, items: Vec<String>) {
    for item in items {
        if seen.insert(item.clone()) {
            into.push(item);
        }
    }
}

/// Merges contributions in connector order.
///
/// Lists are concatenated without duplicates; scalars take the first
/// non-empty value; confidence is the mean over contributors.
pub fn merge(contributions: Vec<(&str, Signals)>) -> MarketIntel {
    let mut intel = MarketIntel::default();
    let (mut opportunities, mut risks, mut competitors) =
        (HashSet::new(), HashSet::new(), HashSet::new());
    let mut references: HashSet<Reference> = HashSet::new();
    let mut confidence_sum = 0.0;
    let contributors = contributions.len();

    let first = |slot: &mut Option<String>, value: Option<String>| {
        if slot.is_none() {
            *slot = value.filter(|v| !v.trim().is_empty());
        }
    };

    for (name, signals) in contributions {
        first(&mut intel.summary, signals.summary);
        first(&mut intel.market_size, signals.market_size);
        first(&mut intel.growth_rate, signals.growth_rate);
        if intel.category.is_none() {
            intel.category = signals.category;
        }
        push_unique(&mut intel.opportunities, &mut opportunities, signals.opportunities);
        push_unique(&mut intel.risks, &mut risks, signals.risks);
        push_unique(&mut intel.competitors, &mut competitors, signals.competitors);
        for reference in signals.references {
            if references.insert(reference.clone()) {
                intel.references.push(reference);
            }
        }
        confidence_sum += signals.confidence.clamp(0.0, 1.0);
        intel.sources.push(name.to_string());
    }

    if contributors > 0 {
        intel.confidence = confidence_sum / contributors as f64;
    }
    intel
}
