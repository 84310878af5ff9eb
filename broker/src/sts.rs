// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;

use zeroize::Zeroizing;

use crate::errors::AppError;
use crate::models::{Credential, Role, SessionCredential, clamp_session_ttl};
use crate::provider::AssumeRoleRequest;
use crate::provider::config::ConfigStore;
use crate::provider::handle::ProviderHandle;

/// Derives session credentials from a role's long-lived credential.
pub struct StsIssuer {
    configs: ConfigStore,
    provider: Arc<ProviderHandle>,
}

impl StsIssuer {
    pub fn new(configs: ConfigStore, provider: Arc<ProviderHandle>) -> Self {
        Self { configs, provider }
    }

    /// Calls `AssumeRole` as `credential`.
    ///
    /// `policy` defaults to the role's document. `ttl` is clamped to the
    /// role's session maximum, with `0` or `None` selecting that maximum.
    /// Nothing is persisted.
    #[tracing::instrument(skip(self, credential, role, policy), fields(role = %role.name, access_key_id = %credential.access_key_id))]
    pub async fn issue_session(
        &self,
        credential: &Credential,
        role: &Role,
        policy: Option<String>,
        ttl: Option<u64>,
    ) -> Result<SessionCredential, AppError> {
        let config = self.configs.require().await?;
        let duration = clamp_session_ttl(ttl, role.max_sts_ttl);
        let request = AssumeRoleRequest {
            endpoint: config.endpoint_url(),
            access_key_id: credential.access_key_id.clone(),
            secret_access_key: Zeroizing::new(credential.secret_access_key.clone()),
            policy: policy.or_else(|| role.policy_document.clone()),
            duration,
        };

        let session = self
            .provider
            .client()
            .await?
            .assume_role(&request)
            .await
            .map_err(AppError::provider("assuming role"))?;

        tracing::info!(
            "[broker] issued session for role {} valid for {}s",
            role.name,
            duration.as_secs()
        );
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{ConfigRequest, CredentialMode, CredentialStatus, RoleRequest};
    use crate::provider::memory::{MemoryProvider, MemoryProviderFactory, ProviderOperation};
    use crate::storage::{MemoryStorage, Storage};
    use chrono::{Duration, Utc};

    struct Harness {
        issuer: StsIssuer,
        provider: Arc<MemoryProvider>,
        storage: Arc<MemoryStorage>,
        role: Role,
        credential: Credential,
    }

    async fn harness() -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let configs = ConfigStore::new(storage.clone());
        configs
            .put(
                &ConfigRequest {
                    endpoint: Some("minio.local:9000".into()),
                    access_key_id: Some("admin".into()),
                    secret_access_key: Some("password".into()),
                    use_ssl: Some(true),
                }
                .into_config(None),
            )
            .await
            .unwrap();

        let provider = Arc::new(MemoryProvider::new());
        provider.insert_user("rep-req-1", "long-lived-secret", None);
        let factory = Arc::new(MemoryProviderFactory::new(provider.clone()));
        let handle = Arc::new(ProviderHandle::new(configs.clone(), factory));

        let role = RoleRequest {
            user_name_prefix: Some("rep".into()),
            policy_document: Some("{\"Statement\":[]}".into()),
            credential_type: Some(CredentialMode::Session),
            max_sts_ttl: Some(3600),
            ..Default::default()
        }
        .into_role("reports", None);
        let credential = Credential {
            access_key_id: "rep-req-1".into(),
            secret_access_key: "long-lived-secret".into(),
            role_name: "reports".into(),
            policy_name: Some("rep-req-1-inline".into()),
            status: CredentialStatus::Enabled,
            expiration_date: Utc::now() + Duration::hours(720),
        };

        Harness {
            issuer: StsIssuer::new(configs, handle),
            provider,
            storage,
            role,
            credential,
        }
    }

    #[tokio::test]
    async fn test_zero_ttl_selects_role_maximum() {
        let h = harness().await;
        let before = Utc::now();

        let session = h
            .issuer
            .issue_session(&h.credential, &h.role, None, Some(0))
            .await
            .unwrap();

        let sessions = h.provider.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration, std::time::Duration::from_secs(3600));
        assert_eq!(sessions[0].endpoint, "https://minio.local:9000");
        assert_eq!(sessions[0].access_key_id, "rep-req-1");
        assert_eq!(sessions[0].policy.as_deref(), Some("{\"Statement\":[]}"));
        assert!(session.expiration >= before + Duration::seconds(3600));
        assert!(session.expiration <= Utc::now() + Duration::seconds(3600));
    }

    #[tokio::test]
    async fn test_ttl_above_maximum_is_clamped() {
        let h = harness().await;
        h.issuer
            .issue_session(&h.credential, &h.role, Some("{}".into()), Some(86_400))
            .await
            .unwrap();
        h.issuer
            .issue_session(&h.credential, &h.role, None, Some(900))
            .await
            .unwrap();

        let sessions = h.provider.sessions();
        assert_eq!(sessions[0].duration, std::time::Duration::from_secs(3600));
        assert_eq!(sessions[0].policy.as_deref(), Some("{}"));
        assert_eq!(sessions[1].duration, std::time::Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_issue_session_does_not_touch_the_store() {
        let h = harness().await;
        h.storage.fail_put(true);
        h.storage.fail_delete(true);

        h.issuer
            .issue_session(&h.credential, &h.role, None, None)
            .await
            .unwrap();
        assert!(h.storage.get("users").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_is_wrapped() {
        let h = harness().await;
        h.provider.fail(ProviderOperation::AssumeRole);
        assert!(matches!(
            h.issuer
                .issue_session(&h.credential, &h.role, None, None)
                .await,
            Err(AppError::ProviderError {
                step: "assuming role",
                ..
            })
        ));
    }
}
