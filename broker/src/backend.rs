// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The broker: every component wired over one store and one provider handle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use crate::controller::CredentialController;
use crate::credentials::CredentialStore;
use crate::errors::AppError;
use crate::models::{
    ConfigRequest, ConfigResponse, CredentialMode, CredentialResponse, IssuedCredential, Role,
    RoleRequest, SessionCredential, SessionRequest,
};
use crate::provider::ProviderFactory;
use crate::provider::config::ConfigStore;
use crate::provider::handle::ProviderHandle;
use crate::registry::RoleRegistry;
use crate::storage::Storage;
use crate::sts::StsIssuer;

pub struct Broker {
    configs: ConfigStore,
    registry: RoleRegistry,
    provider: Arc<ProviderHandle>,
    controller: CredentialController,
    issuer: StsIssuer,
}

impl Broker {
    pub fn new(storage: Arc<dyn Storage>, factory: Arc<dyn ProviderFactory>) -> Self {
        let configs = ConfigStore::new(storage.clone());
        let registry = RoleRegistry::new(storage.clone());
        let provider = Arc::new(ProviderHandle::new(configs.clone(), factory));
        let store = Arc::new(CredentialStore::new(storage));

        Self {
            controller: CredentialController::new(registry.clone(), store, provider.clone()),
            issuer: StsIssuer::new(configs.clone(), provider.clone()),
            configs,
            registry,
            provider,
        }
    }

    pub async fn read_config(&self) -> Result<ConfigResponse, AppError> {
        self.configs
            .get()
            .await?
            .map(|config| ConfigResponse::from(&config))
            .ok_or_else(|| AppError::NotFound("provider configuration".to_string()))
    }

    /// Merges `request` into the stored configuration.
    #[tracing::instrument(skip(self, request))]
    pub async fn write_config(&self, request: ConfigRequest) -> Result<ConfigResponse, AppError> {
        let existing = self.configs.get().await?;
        let config = request.into_config(existing);
        self.configs.put(&config).await?;
        self.provider.invalidate().await;
        tracing::info!("[broker] provider configured for {}", config.endpoint);
        Ok(ConfigResponse::from(&config))
    }

    pub async fn delete_config(&self) -> Result<(), AppError> {
        self.configs.delete().await?;
        self.provider.invalidate().await;
        tracing::info!("[broker] provider configuration removed");
        Ok(())
    }

    pub async fn read_role(&self, name: &str) -> Result<Role, AppError> {
        self.registry.get(name).await
    }

    pub async fn list_roles(&self) -> Result<Vec<String>, AppError> {
        self.registry.list().await
    }

    /// Creates `name`, or updates it keeping the fields `request` omits.
    #[tracing::instrument(skip(self, request))]
    pub async fn write_role(&self, name: &str, request: RoleRequest) -> Result<Role, AppError> {
        let existing = self.registry.find(name).await?;
        let role = request.into_role(name, existing);
        self.registry.put(&role).await?;
        Ok(role)
    }

    /// Revokes the role's credentials, then forgets the role.
    ///
    /// When revocation fails the role is kept, so its pool stays reachable.
    #[tracing::instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> Result<(), AppError> {
        self.controller.revoke_all(name).await?;
        self.registry.delete(name).await?;
        self.controller.forget_role(name);
        tracing::info!("[broker] deleted role {}", name);
        Ok(())
    }

    pub async fn revoke_credentials(&self, role_name: &str) -> Result<usize, AppError> {
        self.controller.revoke_all(role_name).await
    }

    /// Hands out what the role's mode calls for: the long-lived credential for
    /// static roles, a session derived from it for sts roles.
    #[tracing::instrument(skip(self, request))]
    pub async fn issue(
        &self,
        role_name: &str,
        request_id: &str,
        now: DateTime<Utc>,
        request: SessionRequest,
    ) -> Result<IssuedCredential, AppError> {
        let role = self.registry.get(role_name).await?;
        match role.credential_type {
            CredentialMode::Static => {
                let credential = self
                    .controller
                    .obtain_credential(role_name, request_id, now)
                    .await?;
                Ok(IssuedCredential::Static(CredentialResponse::from(
                    &credential,
                )))
            }
            CredentialMode::Session => {
                let session = self.derive_session(&role, request_id, now, request).await?;
                Ok(IssuedCredential::Session(session))
            }
        }
    }

    /// Issues a session credential for `role_name` whatever its mode.
    #[tracing::instrument(skip(self, request))]
    pub async fn session(
        &self,
        role_name: &str,
        request_id: &str,
        now: DateTime<Utc>,
        request: SessionRequest,
    ) -> Result<SessionCredential, AppError> {
        let role = self.registry.get(role_name).await?;
        if role.max_sts_ttl == 0 {
            return Err(AppError::ValidationError(format!(
                "role {role_name} has no max_sts_ttl"
            )));
        }
        self.derive_session(&role, request_id, now, request).await
    }

    async fn derive_session(
        &self,
        role: &Role,
        request_id: &str,
        now: DateTime<Utc>,
        request: SessionRequest,
    ) -> Result<SessionCredential, AppError> {
        request.validate()?;
        let credential = self
            .controller
            .obtain_credential(&role.name, request_id, now)
            .await?;
        self.issuer
            .issue_session(&credential, role, request.policy, request.ttl)
            .await
    }
}
