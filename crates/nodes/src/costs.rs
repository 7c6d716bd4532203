//! Gateway-wide cost accounting and budget alerts.
//!
//! The tracker is shared by every execution. Daily and monthly totals roll
//! over on UTC calendar boundaries; a budget alert fires at most once per
//! period, the first time the period's spend reaches its threshold.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use pipeline::{CostBudget, ModelName, TokenCost, TokenCount};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

/// The accounting window an alert refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPeriod {
    Daily,
    Monthly,
}

/// Raised when a period's spend first reaches its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub period: AlertPeriod,
    pub spent: TokenCost,
    pub threshold: CostBudget,
}

/// Receives budget alerts. Must return promptly.
pub type AlertCallback = Arc<dyn Fn(&BudgetAlert) + Send + Sync>;

/// Alert thresholds; `None` disables the alert for that period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BudgetThresholds {
    pub daily: Option<CostBudget>,
    pub monthly: Option<CostBudget>,
}

/// Usage attributed to one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub requests: u64,
    pub input_tokens: TokenCount,
    pub output_tokens: TokenCount,
    pub cost: TokenCost,
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total: TokenCost,
    pub today: TokenCost,
    pub this_month: TokenCost,
    /// Every request served, including cache hits.
    pub requests: u64,
    pub cache_hits: u64,
    pub per_model: BTreeMap<String, ModelUsage>,
}

#[derive(Debug)]
struct Ledger {
    total: TokenCost,
    today: TokenCost,
    day: NaiveDate,
    this_month: TokenCost,
    month: (i32, u32),
    requests: u64,
    cache_hits: u64,
    per_model: BTreeMap<String, ModelUsage>,
    daily_alerted: bool,
    monthly_alerted: bool,
}

impl Ledger {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total: TokenCost::zero(),
            today: TokenCost::zero(),
            day: now.date_naive(),
            this_month: TokenCost::zero(),
            month: (now.year(), now.month()),
            requests: 0,
            cache_hits: 0,
            per_model: BTreeMap::new(),
            daily_alerted: false,
            monthly_alerted: false,
        }
    }

    fn roll_over(&mut self, now: DateTime<Utc>) {
        let day = now.date_naive();
        if day != self.day {
            self.day = day;
            self.today = TokenCost::zero();
            self.daily_alerted = false;
        }
        let month = (now.year(), now.month());
        if month != self.month {
            self.month = month;
            self.this_month = TokenCost::zero();
            self.monthly_alerted = false;
        }
    }
}

/// Shared cost tracker.
pub struct CostTracker {
    ledger: Mutex<Ledger>,
    thresholds: BudgetThresholds,
    on_alert: Option<AlertCallback>,
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("thresholds", &self.thresholds)
            .field("has_alert_callback", &self.on_alert.is_some())
            .finish()
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new(BudgetThresholds::default())
    }
}

impl CostTracker {
    pub fn new(thresholds: BudgetThresholds) -> Self {
        Self {
            ledger: Mutex::new(Ledger::new(Utc::now())),
            thresholds,
            on_alert: None,
        }
    }

    /// Installs the callback invoked when a threshold is first crossed.
    pub fn with_alert_callback(mut self, callback: AlertCallback) -> Self {
        self.on_alert = Some(callback);
        self
    }

    /// Records a paid provider call.
    pub async fn record_call(
        &self,
        model: &ModelName,
        input_tokens: TokenCount,
        output_tokens: TokenCount,
        cost: TokenCost,
    ) {
        self.record_call_at(model, input_tokens, output_tokens, cost, Utc::now())
            .await;
    }

    /// [`record_call`](Self::record_call) at an explicit instant.
    pub async fn record_call_at(
        &self,
        model: &ModelName,
        input_tokens: TokenCount,
        output_tokens: TokenCount,
        cost: TokenCost,
        now: DateTime<Utc>,
    ) {
        let alerts = {
            let mut ledger = self.ledger.lock().await;
            ledger.roll_over(now);
            ledger.total += cost;
            ledger.today += cost;
            ledger.this_month += cost;
            ledger.requests += 1;

            let usage = ledger.per_model.entry(model.to_string()).or_default();
            usage.requests += 1;
            usage.input_tokens += input_tokens;
            usage.output_tokens += output_tokens;
            usage.cost += cost;

            self.pending_alerts(&mut ledger)
        };

        for alert in alerts {
            warn!(
                period = ?alert.period,
                spent = %alert.spent,
                threshold = %alert.threshold,
                "LLM budget threshold reached"
            );
            if let Some(callback) = &self.on_alert {
                callback(&alert);
            }
        }
    }

    /// Records a request answered from the cache: counted, but free.
    pub async fn record_cache_hit(&self) {
        let mut ledger = self.ledger.lock().await;
        ledger.roll_over(Utc::now());
        ledger.requests += 1;
        ledger.cache_hits += 1;
    }

    pub async fn summary(&self) -> CostSummary {
        let ledger = self.ledger.lock().await;
        CostSummary {
            total: ledger.total,
            today: ledger.today,
            this_month: ledger.this_month,
            requests: ledger.requests,
            cache_hits: ledger.cache_hits,
            per_model: ledger.per_model.clone(),
        }
    }

    fn pending_alerts(&self, ledger: &mut Ledger) -> Vec<BudgetAlert> {
        let mut alerts = Vec::new();
        if let Some(threshold) = self.thresholds.daily {
            if !ledger.daily_alerted && threshold.is_exceeded_by(ledger.today) {
                ledger.daily_alerted = true;
                alerts.push(BudgetAlert {
                    period: AlertPeriod::Daily,
                    spent: ledger.today,
                    threshold,
                });
            }
        }
        if let Some(threshold) = self.thresholds.monthly {
            if !ledger.monthly_alerted && threshold.is_exceeded_by(ledger.this_month) {
                ledger.monthly_alerted = true;
                alerts.push(BudgetAlert {
                    period: AlertPeriod::Monthly,
                    spent: ledger.this_month,
                    threshold,
                });
            }
        }
        alerts
    }
}
