//! Route handlers.
//!
//! Every `/api/container` handler authenticates before reading its body or
//! touching the registry.

use super::AppState;
use super::models::{CreateRequest, HealthResponse, MessageResponse};
use crate::auth::bearer_token;
use crate::error::Result;
use crate::manager::CreatedEnvironment;
use crate::state::{EnvironmentStats, EnvironmentSummary};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = bearer_token(value)?;
    state.verifier.verify(token)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        engine: state.manager.engine_name().to_string(),
    })
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedEnvironment>)> {
    let owner = authenticate(&state, &headers)?;
    let spec = CreateRequest::from_slice(&body)?.into_spec()?;

    let created = state.manager.create(&owner, spec).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<EnvironmentSummary>>> {
    let owner = authenticate(&state, &headers)?;
    Ok(Json(state.manager.list(&owner)?))
}

pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<EnvironmentStats>> {
    let owner = authenticate(&state, &headers)?;
    Ok(Json(state.manager.stats(&owner)?))
}

pub async fn start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<EnvironmentSummary>> {
    let owner = authenticate(&state, &headers)?;
    Ok(Json(state.manager.start(&name, &owner).await?))
}

pub async fn stop(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<EnvironmentSummary>> {
    let owner = authenticate(&state, &headers)?;
    Ok(Json(state.manager.stop(&name, &owner).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    let owner = authenticate(&state, &headers)?;
    state.manager.delete(&name, &owner).await?;
    Ok(Json(MessageResponse {
        message: "deleted".to_string(),
    }))
}

pub async fn logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse> {
    let owner = authenticate(&state, &headers)?;
    let text = state.manager.logs(&name, &owner).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text,
    ))
}
