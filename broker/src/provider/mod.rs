// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Identity provider client.
//!
//! The remote administrative API owns storage-service users and their policy
//! attachments. The broker only ever talks to it through [`IdentityProvider`]:
//!
//! - [`admin::AdminClient`]: signed HTTP calls against the admin API, plus
//!   STS `AssumeRole` through `aws-sdk-sts`
//! - [`memory::MemoryProvider`]: in-process users and policies for tests and
//!   local development
//!
//! Clients are built from the stored [`ProviderConfig`] by a
//! [`ProviderFactory`] and cached in a [`handle::ProviderHandle`] until the
//! configuration changes.

pub mod admin;
pub mod config;
pub mod handle;
pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::constants::INLINE_POLICY_SUFFIX;
use crate::models::{ProviderConfig, SessionCredential};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider connection error: {0}")]
    Connection(String),
    #[error("provider authentication failed: {0}")]
    Authentication(String),
    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("provider configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// The user or policy the request named does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404, .. })
    }
}

/// The policy bound to a provider user.
///
/// Static roles reference an existing policy by name. Session roles carry an
/// inline document, which the provider installs under a per-user name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyRef {
    Named(String),
    Document(String),
}

impl PolicyRef {
    /// Name the policy is attached under for `identity_key`.
    pub fn name_for(&self, identity_key: &str) -> String {
        match self {
            Self::Named(name) => name.clone(),
            Self::Document(_) => format!("{identity_key}-{INLINE_POLICY_SUFFIX}"),
        }
    }
}

/// Parameters of an STS `AssumeRole` call made as a long-lived user.
#[derive(Clone)]
pub struct AssumeRoleRequest {
    /// STS endpoint URL of the provider.
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: zeroize::Zeroizing<String>,
    /// Policy document scoping down the session.
    pub policy: Option<String>,
    pub duration: Duration,
}

impl fmt::Debug for AssumeRoleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumeRoleRequest")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("duration", &self.duration)
            .finish()
    }
}

/// Administrative operations of the remote identity provider.
///
/// Every call goes straight to the provider; nothing is cached locally.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_user(&self, access_key_id: &str, secret_key: &str)
    -> Result<(), ProviderError>;

    async fn delete_user(&self, access_key_id: &str) -> Result<(), ProviderError>;

    async fn attach_policy(
        &self,
        access_key_id: &str,
        policy: &PolicyRef,
    ) -> Result<(), ProviderError>;

    async fn detach_policy(
        &self,
        access_key_id: &str,
        policy: &PolicyRef,
    ) -> Result<(), ProviderError>;

    async fn assume_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredential, ProviderError>;
}

/// Builds provider clients from the current configuration.
pub trait ProviderFactory: Send + Sync {
    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn IdentityProvider>, ProviderError>;
}
