//! IdeaForge HTTP surface.
//!
//! | Route                               | Purpose                                  |
//! |-------------------------------------|------------------------------------------|
//! | `POST /pipeline`                    | run the pipeline, return the dossier     |
//! | `GET /pipeline?execution_id=...`    | progress while running, result after     |
//! | `DELETE /pipeline?execution_id=...` | cancel a running execution               |
//! | `GET /health`                       | liveness and gateway cost summary        |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Request parsing, status codes and the finished-result
//! store live here. The pipeline itself is driven by [`nodes::Conductor`].

mod dto;
mod handlers;
mod routes;
mod server;
mod state;

pub use dto::{
    CancelResponse, ComplianceRejection, ConstraintOverrides, ErrorResponse, ExecutionQuery,
    ExecutionView, SubmitOptions, SubmitRequest,
};
pub use routes::router;
pub use server::{serve, ServeError};
pub use state::{AppState, ResultStore, DEFAULT_STORED_RESULTS};
