// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::provider::ProviderError;
use crate::storage::StorageError;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AppError {
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("{step}: {source}")]
    StoreError {
        step: &'static str,
        source: StorageError,
    },
    #[error("{step}: {source}")]
    ProviderError {
        step: &'static str,
        source: ProviderError,
    },
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("internal server error")]
    InternalServerError,
}

impl AppError {
    /// Wraps a store failure with the step being attempted.
    pub fn store(step: &'static str) -> impl FnOnce(StorageError) -> AppError {
        move |source| AppError::StoreError { step, source }
    }

    /// Wraps a provider failure with the step being attempted.
    pub fn provider(step: &'static str) -> impl FnOnce(ProviderError) -> AppError {
        move |source| AppError::ProviderError { step, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::RoleNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::ProviderError { .. } => StatusCode::BAD_GATEWAY,
            Self::StoreError { .. } | Self::ConfigError(_) | Self::InternalServerError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match self {
            Self::InternalServerError => "Internal Server Error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({"code": status.as_u16(), "message": message}));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(_source: serde_json::Error) -> Self {
        tracing::error!("{:?}", _source);
        AppError::InternalServerError
    }
}

impl From<anyhow::Error> for AppError {
    fn from(_source: anyhow::Error) -> Self {
        tracing::error!("{:?}", _source);
        AppError::InternalServerError
    }
}

impl From<std::io::Error> for AppError {
    fn from(_source: std::io::Error) -> Self {
        tracing::error!("{:?}", _source);
        AppError::InternalServerError
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(source: validator::ValidationErrors) -> Self {
        AppError::ValidationError(source.to_string())
    }
}
