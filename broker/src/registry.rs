// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;

use crate::constants::ROLE_STORAGE_PREFIX;
use crate::errors::AppError;
use crate::models::Role;
use crate::storage::{Storage, get_json, put_json};

/// Role definitions, one record per role under `roles/<name>`.
#[derive(Clone)]
pub struct RoleRegistry {
    storage: Arc<dyn Storage>,
}

impl RoleRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(name: &str) -> String {
        format!("{ROLE_STORAGE_PREFIX}{name}")
    }

    /// Returns the role, if one is stored under `name`.
    pub async fn find(&self, name: &str) -> Result<Option<Role>, AppError> {
        get_json(self.storage.as_ref(), &Self::key(name))
            .await
            .map_err(AppError::store("reading role"))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, name: &str) -> Result<Role, AppError> {
        self.find(name)
            .await?
            .ok_or_else(|| AppError::RoleNotFound(name.to_string()))
    }

    #[tracing::instrument(skip(self, role), fields(role = %role.name))]
    pub async fn put(&self, role: &Role) -> Result<(), AppError> {
        role.check()?;
        put_json(self.storage.as_ref(), &Self::key(&role.name), role)
            .await
            .map_err(AppError::store("persisting role"))?;
        tracing::info!("[broker] stored role {}", role.name);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<(), AppError> {
        self.storage
            .delete(&Self::key(name))
            .await
            .map_err(AppError::store("deleting role"))
    }

    pub async fn list(&self) -> Result<Vec<String>, AppError> {
        self.storage
            .list(ROLE_STORAGE_PREFIX)
            .await
            .map_err(AppError::store("listing roles"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::{CredentialMode, RoleRequest};
    use crate::storage::MemoryStorage;

    fn role(name: &str) -> Role {
        RoleRequest {
            user_name_prefix: Some("app".into()),
            policy_name: Some("readonly".into()),
            max_ttl: Some(3600),
            ..Default::default()
        }
        .into_role(name, None)
    }

    #[tokio::test]
    async fn test_create_update_read_delete() {
        let registry = RoleRegistry::new(Arc::new(MemoryStorage::new()));
        registry.put(&role("billing")).await.unwrap();
        assert_eq!(registry.get("billing").await.unwrap(), role("billing"));

        let existing = registry.get("billing").await.unwrap();
        let updated = RoleRequest {
            user_name_prefix: Some("new_prefix".into()),
            ..Default::default()
        }
        .into_role("billing", Some(existing));
        registry.put(&updated).await.unwrap();

        let stored = registry.get("billing").await.unwrap();
        assert_eq!(stored.user_name_prefix.as_deref(), Some("new_prefix"));
        assert_eq!(stored.policy_name.as_deref(), Some("readonly"));
        assert_eq!(stored.credential_type, CredentialMode::Static);

        registry.delete("billing").await.unwrap();
        assert_eq!(
            registry.get("billing").await,
            Err(AppError::RoleNotFound("billing".into()))
        );
    }

    #[tokio::test]
    async fn test_list_roles() {
        let registry = RoleRegistry::new(Arc::new(MemoryStorage::new()));
        for name in ["reports", "billing", "archive"] {
            registry.put(&role(name)).await.unwrap();
        }
        assert_eq!(
            registry.list().await.unwrap(),
            vec!["archive", "billing", "reports"]
        );
    }

    #[tokio::test]
    async fn test_invalid_role_is_not_stored() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = RoleRegistry::new(storage.clone());
        let invalid = RoleRequest::default().into_role("billing", None);
        assert!(matches!(
            registry.put(&invalid).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(storage.get("roles/billing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failures() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = RoleRegistry::new(storage.clone());

        storage.fail_list(true);
        assert!(matches!(
            registry.list().await,
            Err(AppError::StoreError {
                step: "listing roles",
                ..
            })
        ));

        storage.fail_put(true);
        assert!(matches!(
            registry.put(&role("billing")).await,
            Err(AppError::StoreError {
                step: "persisting role",
                ..
            })
        ));

        storage.fail_get(true);
        assert!(matches!(
            registry.get("billing").await,
            Err(AppError::StoreError {
                step: "reading role",
                ..
            })
        ));
    }
}
