// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Credential lifecycle: deciding per request whether to reuse, mint or evict.
//!
//! A credential exists twice, as a user in the identity provider and as an
//! entry in the role's pool, and the two are written without a shared
//! transaction. The controller keeps them reconcilable by ordering every
//! mutation:
//!
//! - a replacement is created and recorded before the credential it replaces
//!   is torn down, so a failure in between leaves two entries rather than none
//! - a pool entry is only removed after the provider user is gone
//! - a minted credential is recorded even when attaching its policy failed
//!
//! A pool holding more than one entry is converged back to one on the next
//! request for the role.

use std::collections::HashMap;
use std::sync::Arc;

use aws_lc_rs::rand;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::constants::SECRET_KEY_LENGTH;
use crate::credentials::CredentialStore;
use crate::errors::AppError;
use crate::models::{Credential, CredentialStatus, Role};
use crate::provider::PolicyRef;
use crate::provider::handle::ProviderHandle;
use crate::registry::RoleRegistry;

pub struct CredentialController {
    registry: RoleRegistry,
    store: Arc<CredentialStore>,
    provider: Arc<ProviderHandle>,
    role_locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Identity keys are checked for uniqueness across roles under this lock.
    mint_lock: Mutex<()>,
}

impl CredentialController {
    pub fn new(
        registry: RoleRegistry,
        store: Arc<CredentialStore>,
        provider: Arc<ProviderHandle>,
    ) -> Self {
        Self {
            registry,
            store,
            provider,
            role_locks: parking_lot::Mutex::new(HashMap::new()),
            mint_lock: Mutex::new(()),
        }
    }

    /// Mutations of one role's pool run one at a time.
    fn role_lock(&self, role_name: &str) -> Arc<Mutex<()>> {
        self.role_locks
            .lock()
            .entry(role_name.to_string())
            .or_default()
            .clone()
    }

    /// Drops the lock of a role that no longer exists.
    pub fn forget_role(&self, role_name: &str) {
        self.role_locks.lock().remove(role_name);
    }

    #[cfg(test)]
    pub(crate) fn tracked_roles(&self) -> usize {
        self.role_locks.lock().len()
    }

    /// Returns a usable long-lived credential for `role_name`.
    #[tracing::instrument(skip(self))]
    pub async fn obtain_credential(
        &self,
        role_name: &str,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, AppError> {
        let role = self.registry.get(role_name).await?;
        let lock = self.role_lock(role_name);
        let _guard = lock.lock().await;

        let pool = self.converge(&role).await?;
        let Some(current) = pool.into_iter().next() else {
            tracing::info!("[broker] no credential recorded for role {}", role.name);
            return self.mint(&role, request_id, now).await;
        };

        if !current.is_expired(now) {
            return Ok(current);
        }

        tracing::info!(
            "[broker] credential {} of role {} expired at {}",
            current.access_key_id,
            role.name,
            current.expiration_date
        );

        // Re-minting under the same identity key would overwrite the user the
        // old entry points at, so that one has to go first.
        if role.identity_key(request_id) == current.access_key_id {
            self.evict(&role, &current).await?;
            return self.mint(&role, request_id, now).await;
        }

        let replacement = self.mint(&role, request_id, now).await?;
        if let Err(err) = self.evict(&role, &current).await {
            tracing::warn!(
                "[broker] unable to evict expired credential {} of role {}: {}",
                current.access_key_id,
                role.name,
                err
            );
        }
        Ok(replacement)
    }

    /// Evicts the earliest-expiring entry until at most one remains.
    async fn converge(&self, role: &Role) -> Result<Vec<Credential>, AppError> {
        loop {
            let pool = self.store.pool(&role.name).await?;
            if pool.len() <= 1 {
                return Ok(pool);
            }

            tracing::warn!(
                "[broker] role {} has {} recorded credentials, reconciling",
                role.name,
                pool.len()
            );
            let oldest = pool
                .iter()
                .min_by_key(|credential| credential.expiration_date)
                .ok_or(AppError::InternalServerError)?;
            self.evict(role, oldest).await?;
        }
    }

    /// Evicts every credential recorded for `role_name`, stopping at the first failure.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_all(&self, role_name: &str) -> Result<usize, AppError> {
        let role = self.registry.get(role_name).await?;
        let lock = self.role_lock(role_name);
        let _guard = lock.lock().await;

        let pool = self.store.pool(role_name).await?;
        for credential in &pool {
            self.evict(&role, credential).await?;
        }

        tracing::info!(
            "[broker] revoked {} credentials of role {}",
            pool.len(),
            role_name
        );
        Ok(pool.len())
    }

    #[tracing::instrument(skip(self, role), fields(role = %role.name))]
    async fn mint(
        &self,
        role: &Role,
        request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, AppError> {
        let policy = role.policy_ref()?;
        let expiration_date = role.expiration_from(now)?;
        let access_key_id = role.identity_key(request_id);
        let secret = generate_secret()?;

        let _mint = self.mint_lock.lock().await;
        let pools = self.store.snapshot().await?;
        if let Some(owner) = pools
            .iter()
            .find(|(owner, pool)| {
                **owner != role.name
                    && pool
                        .iter()
                        .any(|credential| credential.access_key_id == access_key_id)
            })
            .map(|(owner, _)| owner)
        {
            return Err(AppError::ValidationError(format!(
                "identity {access_key_id} already belongs to role {owner}"
            )));
        }

        let provider = self.provider.client().await?;
        provider
            .create_user(&access_key_id, &secret)
            .await
            .map_err(AppError::provider("creating user"))?;
        let attached = provider
            .attach_policy(&access_key_id, &policy)
            .await
            .map_err(AppError::provider("attaching policy"));

        let credential = Credential {
            policy_name: Some(policy.name_for(&access_key_id)),
            access_key_id,
            secret_access_key: secret.to_string(),
            role_name: role.name.clone(),
            status: CredentialStatus::Enabled,
            expiration_date,
        };

        // Recorded even without a policy, so a later eviction can find the user
        self.store.append(credential.clone()).await?;
        self.provider.invalidate().await;
        attached?;

        tracing::info!(
            "[broker] minted credential {} for role {}, expires {}",
            credential.access_key_id,
            role.name,
            credential.expiration_date
        );
        Ok(credential)
    }

    #[tracing::instrument(skip(self, role, credential), fields(role = %role.name, access_key_id = %credential.access_key_id))]
    async fn evict(&self, role: &Role, credential: &Credential) -> Result<(), AppError> {
        let policy = attached_policy(role, credential)?;
        let provider = self.provider.client().await?;

        // A user that is already gone counts as torn down
        if let Err(err) = provider
            .detach_policy(&credential.access_key_id, &policy)
            .await
        {
            if !err.is_not_found() {
                return Err(AppError::provider("detaching policy")(err));
            }
            tracing::warn!(
                "[broker] credential {} of role {} no longer exists remotely",
                credential.access_key_id,
                role.name
            );
        }
        match provider.delete_user(&credential.access_key_id).await {
            Err(err) if !err.is_not_found() => {
                return Err(AppError::provider("deleting user")(err));
            }
            _ => {}
        }

        self.store
            .remove(&role.name, &credential.access_key_id)
            .await?;
        self.provider.invalidate().await;

        tracing::info!(
            "[broker] evicted credential {} of role {}",
            credential.access_key_id,
            role.name
        );
        Ok(())
    }
}

/// The policy `credential` was minted with, which may differ from the role's
/// current one after an update.
fn attached_policy(role: &Role, credential: &Credential) -> Result<PolicyRef, AppError> {
    let document = role.policy_document.clone().unwrap_or_default();
    let inline_name = PolicyRef::Document(String::new()).name_for(&credential.access_key_id);
    match &credential.policy_name {
        Some(name) if *name == inline_name => Ok(PolicyRef::Document(document)),
        Some(name) => Ok(PolicyRef::Named(name.clone())),
        None => role.policy_ref(),
    }
}

/// 32 random bytes, base64 encoded.
fn generate_secret() -> Result<Zeroizing<String>, AppError> {
    let mut bytes = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
    rand::fill(&mut bytes[..]).map_err(|_| {
        tracing::error!("[broker] system random number generator failed");
        AppError::InternalServerError
    })?;
    Ok(Zeroizing::new(BASE64_STANDARD.encode(&*bytes)))
}
