// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP route handlers for the credential broker API.
//!
//! | Method | Path | Handler | Description |
//! |--------|------|---------|-------------|
//! | GET | `/health` | [`health`] | Health check endpoint |
//! | GET | `/config` | [`read_config`] | Provider configuration, without the secret |
//! | PUT | `/config` | [`write_config`] | Create or merge the provider configuration |
//! | DELETE | `/config` | [`delete_config`] | Remove the provider configuration |
//! | GET | `/roles` | [`list_roles`] | Role names |
//! | GET | `/roles/{name}` | [`read_role`] | One role definition |
//! | PUT | `/roles/{name}` | [`write_role`] | Create or update a role |
//! | DELETE | `/roles/{name}` | [`delete_role`] | Revoke all credentials, then delete the role |
//! | POST | `/creds/{role}` | [`issue_credential`] | Credential according to the role's mode |
//! | DELETE | `/creds/{role}` | [`revoke_credentials`] | Revoke all credentials of a role |
//! | POST | `/sts/{role}` | [`issue_session`] | Session credential |

use std::sync::Arc;

use crate::application::AppState;
use crate::constants::{MAX_REQUEST_ID_LENGTH, REQUEST_ID_HEADER};
use crate::errors::AppError;
use crate::models::{
    ConfigRequest, ConfigResponse, IssuedCredential, Role, RoleList, RoleRequest,
    SessionCredential, SessionRequest,
};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::json;

/// Health check endpoint.
///
/// # Response
///
/// ```json
/// {"status": "ok"}
/// ```
pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// The caller's request identifier, or a fresh UUID when none was sent.
///
/// The identifier becomes part of a provider user name, so it is restricted
/// to ASCII letters, digits, `-`, `_` and `.`.
pub fn request_id(headers: &HeaderMap) -> Result<String, AppError> {
    let Some(value) = headers.get(REQUEST_ID_HEADER) else {
        return Ok(uuid::Uuid::new_v4().to_string());
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::ValidationError(format!("{REQUEST_ID_HEADER} is not ASCII")))?;
    let valid = !value.is_empty()
        && value.len() <= MAX_REQUEST_ID_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(AppError::ValidationError(format!(
            "{REQUEST_ID_HEADER} must be 1 to {MAX_REQUEST_ID_LENGTH} characters of [A-Za-z0-9_.-]"
        )));
    }
    Ok(value.to_string())
}

#[tracing::instrument(skip(state))]
pub async fn read_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConfigResponse>, AppError> {
    Ok(Json(state.broker.read_config().await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn write_config(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfigRequest>,
) -> Result<Json<ConfigResponse>, AppError> {
    Ok(Json(state.broker.write_config(request).await?))
}

#[tracing::instrument(skip(state))]
pub async fn delete_config(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.broker.delete_config().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(skip(state))]
pub async fn list_roles(State(state): State<Arc<AppState>>) -> Result<Json<RoleList>, AppError> {
    let keys = state.broker.list_roles().await?;
    Ok(Json(RoleList { keys }))
}

#[tracing::instrument(skip(state))]
pub async fn read_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Role>, AppError> {
    Ok(Json(state.broker.read_role(&name).await?))
}

#[tracing::instrument(skip(state, request))]
pub async fn write_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<RoleRequest>,
) -> Result<Json<Role>, AppError> {
    Ok(Json(state.broker.write_role(&name, request).await?))
}

#[tracing::instrument(skip(state))]
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.broker.delete_role(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Returns a credential for `role`: the long-lived one for static roles, a
/// session derived from it for sts roles.
///
/// The body is optional and only consulted for sts roles.
#[tracing::instrument(skip(state, headers, body))]
pub async fn issue_credential(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> Result<Json<IssuedCredential>, AppError> {
    let request_id = request_id(&headers)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    tracing::debug!("[broker] credential request {} for role {}", request_id, role);

    let issued = state
        .broker
        .issue(&role, &request_id, Utc::now(), request)
        .await?;
    Ok(Json(issued))
}

#[tracing::instrument(skip(state))]
pub async fn revoke_credentials(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let revoked = state.broker.revoke_credentials(&role).await?;
    Ok(Json(json!({"revoked": revoked})))
}

#[tracing::instrument(skip(state, headers, body))]
pub async fn issue_session(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> Result<Json<SessionCredential>, AppError> {
    let request_id = request_id(&headers)?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let session = state
        .broker
        .session(&role, &request_id, Utc::now(), request)
        .await?;
    Ok(Json(session))
}
