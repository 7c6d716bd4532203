//! Shared handler state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use nodes::{AgentCallService, Conductor, DossierReview};
use pipeline::{Constraints, ExecutionId, PipelineResult};
use tokio::sync::RwLock;

/// Finished results kept for `GET /pipeline`.
pub const DEFAULT_STORED_RESULTS: usize = 256;

/// Finished results by execution id. The oldest entry is evicted once
/// `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ResultStore {
    inner: Arc<RwLock<(HashMap<ExecutionId, PipelineResult>, VecDeque<ExecutionId>)>>,
    capacity: usize,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORED_RESULTS)
    }
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new((HashMap::new(), VecDeque::new()))),
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, result: PipelineResult) {
        let mut guard = self.inner.write().await;
        let (results, order) = &mut *guard;
        let id = result.execution_id;
        if results.insert(id, result).is_none() {
            order.push_back(id);
        }
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                results.remove(&oldest);
            }
        }
    }

    pub async fn get(&self, id: ExecutionId) -> Option<PipelineResult> {
        self.inner.read().await.0.get(&id).cloned()
    }
}

/// Everything the handlers need.
#[derive(Clone)]
pub struct AppState {
    pub conductor: Arc<Conductor>,
    pub gateway: Arc<AgentCallService>,
    pub review: DossierReview,
    pub results: ResultStore,
    /// Limits applied when a submission leaves them unset.
    pub defaults: Constraints,
    /// Whether a model API key is configured.
    pub credentials_configured: bool,
}

impl AppState {
    pub fn new(conductor: Arc<Conductor>, gateway: Arc<AgentCallService>) -> Self {
        Self {
            conductor,
            gateway,
            review: DossierReview::default(),
            results: ResultStore::default(),
            defaults: Constraints::default(),
            credentials_configured: true,
        }
    }

    pub fn with_defaults(mut self, defaults: Constraints) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_review(mut self, review: DossierReview) -> Self {
        self.review = review;
        self
    }

    pub fn with_credentials(mut self, configured: bool) -> Self {
        self.credentials_configured = configured;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("defaults", &self.defaults)
            .field("credentials_configured", &self.credentials_configured)
            .finish_non_exhaustive()
    }
}
