//! IdeaForge research service.
//!
//! Implements [`pipeline::MarketIntelSource`] by running a set of
//! [`Connector`]s concurrently and merging their partial signals into one
//! [`pipeline::MarketIntel`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The [`pipeline`] crate sees only `MarketIntelSource`;
//! the research stage agent in `nodes` consumes it.
//!
//! | Connector            | Contributes                                         |
//! |----------------------|-----------------------------------------------------|
//! | [`KeywordConnector`] | industry category, market size, competitors, risks  |
//! | [`TrendConnector`]   | summary, growth signal, trend opportunities, risks  |

mod connector;
mod keyword;
mod service;
mod trend;

pub use connector::{Connector, ConnectorError, Signals};
pub use keyword::{infer_category, KeywordConnector};
pub use service::{merge, ResearchService, DEFAULT_CONNECTOR_TIMEOUT, DEFAULT_RESEARCH_TTL};
pub use trend::TrendConnector;
