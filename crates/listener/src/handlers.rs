//! HTTP handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pipeline::{ExecutionId, ForgeError};
use serde_json::json;
use tracing::{info, warn};

use crate::dto::{
    CancelResponse, ComplianceRejection, ErrorResponse, ExecutionQuery, ExecutionView,
    SubmitRequest,
};
use crate::state::AppState;

const CREDENTIALS_HINT: &str =
    "Set IDEA_FORGE__LLM__ANTHROPIC_API_KEY (or ANTHROPIC_API_KEY) and restart the server.";

fn error(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

/// Maps pipeline errors onto status codes.
pub(crate) fn forge_error_response(err: &ForgeError) -> Response {
    match err {
        ForgeError::InvalidInput { field, message } => error(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("invalid_input", err.to_string())
                .with_details(json!({"field": field, "message": message})),
        ),
        ForgeError::InjectionDetected { source_document, .. } => error(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("injection_detected", "input contains instructions aimed at the models")
                .with_details(json!({"field": source_document})),
        ),
        ForgeError::UnknownExecution { .. } => error(
            StatusCode::NOT_FOUND,
            ErrorResponse::new("not_found", err.to_string()),
        ),
        ForgeError::Cancelled { .. } => error(
            StatusCode::CONFLICT,
            ErrorResponse::new("cancelled", err.to_string()),
        ),
        ForgeError::ConfigurationError { .. } => error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("configuration_error", err.to_string()),
        ),
        ForgeError::CriticalStageFailed { .. }
        | ForgeError::BudgetExceeded { .. }
        | ForgeError::TimeBudgetExceeded { .. } => error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("pipeline_failed", err.to_string()),
        ),
    }
}

fn parse_id(query: &ExecutionQuery) -> Result<ExecutionId, Response> {
    let raw = query
        .execution_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            error(
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("invalid_input", "execution_id query parameter is required"),
            )
        })?;
    raw.parse::<ExecutionId>().map_err(|_| {
        error(
            StatusCode::BAD_REQUEST,
            ErrorResponse::new("invalid_input", format!("'{raw}' is not a valid execution id")),
        )
    })
}

/// POST /pipeline - run the pipeline for one idea.
pub async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return error(
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("invalid_input", rejection.body_text()),
            )
        }
    };
    if !state.credentials_configured {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("missing_credentials", "no language model API key is configured")
                .with_hint(CREDENTIALS_HINT),
        );
    }

    let (id, context) = match request.into_context(state.defaults) {
        Ok(parts) => parts,
        Err(err) => return forge_error_response(&err),
    };
    let id = id.unwrap_or_else(ExecutionId::new_random);

    // The run lives in its own task so a client disconnect does not cut it
    // short; the result is stored either way.
    let run_state = state.clone();
    let run = tokio::spawn(async move {
        let mut result = run_state.conductor.execute_with_id(id, context.clone()).await?;
        run_state.review.review(&mut result, &context).await;
        if !result.metadata.compliance.as_ref().is_some_and(|c| c.is_fail()) {
            run_state.results.insert(result.clone()).await;
        }
        Ok::<_, ForgeError>(result)
    });

    let result = match run.await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            if !err.is_input_error() {
                warn!(execution_id = %id, error = %err, "pipeline request failed");
            }
            return forge_error_response(&err);
        }
        Err(join_error) => {
            warn!(execution_id = %id, error = %join_error, "pipeline task did not finish");
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal_error", "the pipeline run stopped unexpectedly"),
            );
        }
    };

    if let Some(compliance) = result.metadata.compliance.as_ref().filter(|c| c.is_fail()) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ComplianceRejection {
                error: "compliance_failed",
                execution_id: id,
                compliance: compliance.clone(),
            }),
        )
            .into_response();
    }

    info!(execution_id = %id, stages_completed = result.metadata.stages_completed, "pipeline request served");
    (StatusCode::OK, Json(result)).into_response()
}

/// GET /pipeline?execution_id= - progress of a running execution or its result.
pub async fn status(State(state): State<AppState>, Query(query): Query<ExecutionQuery>) -> Response {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Some(progress) = state.conductor.progress(id).await {
        return Json(ExecutionView::Running { progress }).into_response();
    }
    match state.results.get(id).await {
        Some(result) => Json(ExecutionView::Finished {
            result: Box::new(result),
        })
        .into_response(),
        None => forge_error_response(&ForgeError::UnknownExecution { execution_id: id }),
    }
}

/// DELETE /pipeline?execution_id= - cancel a running execution.
pub async fn cancel(State(state): State<AppState>, Query(query): Query<ExecutionQuery>) -> Response {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.conductor.cancel(id).await {
        Ok(()) => Json(CancelResponse {
            execution_id: id,
            status: "cancelled",
        })
        .into_response(),
        Err(err) => forge_error_response(&err),
    }
}

/// GET /health - liveness plus spend so far.
pub async fn health(State(state): State<AppState>) -> Response {
    let costs = state.gateway.cost_summary().await;
    let running = state.conductor.registry().len().await;
    Json(json!({
        "status": "ok",
        "credentials_configured": state.credentials_configured,
        "running_executions": running,
        "costs": costs,
    }))
    .into_response()
}
