// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Credential pools, persisted as one JSON map under the `users` key.
//!
//! Every role's pool lives in the same entry, so each mutation is a
//! read-modify-write of the whole map. Those cycles are serialized here to
//! keep concurrent updates for different roles from overwriting each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::constants::USER_STORAGE_KEY;
use crate::errors::AppError;
use crate::models::Credential;
use crate::storage::{Storage, get_json, put_json};

pub type PoolMap = BTreeMap<String, Vec<Credential>>;

pub struct CredentialStore {
    storage: Arc<dyn Storage>,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    async fn load_all(&self) -> Result<PoolMap, AppError> {
        Ok(get_json(self.storage.as_ref(), USER_STORAGE_KEY)
            .await
            .map_err(AppError::store("loading credential pools"))?
            .unwrap_or_default())
    }

    async fn save_all(&self, pools: &PoolMap) -> Result<(), AppError> {
        put_json(self.storage.as_ref(), USER_STORAGE_KEY, pools)
            .await
            .map_err(AppError::store("persisting credential pools"))
    }

    /// The pool of `role`, in insertion order. Unknown roles have an empty pool.
    pub async fn pool(&self, role: &str) -> Result<Vec<Credential>, AppError> {
        let mut pools = self.load_all().await?;
        Ok(pools.remove(role).unwrap_or_default())
    }

    /// Every pool, keyed by role name.
    pub async fn snapshot(&self) -> Result<PoolMap, AppError> {
        self.load_all().await
    }

    /// Appends `credential` to the pool of its owning role.
    #[tracing::instrument(skip(self, credential), fields(role = %credential.role_name, access_key_id = %credential.access_key_id))]
    pub async fn append(&self, credential: Credential) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let mut pools = self.load_all().await?;
        pools
            .entry(credential.role_name.clone())
            .or_default()
            .push(credential);
        self.save_all(&pools).await
    }

    /// Removes the entry for `access_key_id` from the pool of `role`.
    ///
    /// Returns `false` when no such entry was recorded. A pool left empty is
    /// dropped from the map.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, role: &str, access_key_id: &str) -> Result<bool, AppError> {
        let _guard = self.write_lock.lock().await;
        let mut pools = self.load_all().await?;

        let Some(pool) = pools.get_mut(role) else {
            return Ok(false);
        };
        let before = pool.len();
        pool.retain(|credential| credential.access_key_id != access_key_id);
        if pool.len() == before {
            return Ok(false);
        }
        if pool.is_empty() {
            pools.remove(role);
        }

        self.save_all(&pools).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::CredentialStatus;
    use crate::storage::MemoryStorage;
    use chrono::Utc;

    fn credential(role: &str, access_key_id: &str) -> Credential {
        Credential {
            access_key_id: access_key_id.into(),
            secret_access_key: "secret".into(),
            role_name: role.into(),
            policy_name: Some("readonly".into()),
            status: CredentialStatus::Enabled,
            expiration_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_and_remove() {
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        assert!(store.pool("billing").await.unwrap().is_empty());

        store.append(credential("billing", "app-1")).await.unwrap();
        store.append(credential("billing", "app-2")).await.unwrap();
        store.append(credential("reports", "rep-1")).await.unwrap();

        let pool = store.pool("billing").await.unwrap();
        let keys: Vec<&str> = pool.iter().map(|c| c.access_key_id.as_str()).collect();
        assert_eq!(keys, vec!["app-1", "app-2"]);

        assert!(store.remove("billing", "app-1").await.unwrap());
        assert!(!store.remove("billing", "app-1").await.unwrap());
        assert!(store.remove("billing", "app-2").await.unwrap());

        let snapshot = store.snapshot().await.unwrap();
        assert!(!snapshot.contains_key("billing"));
        assert_eq!(snapshot["reports"].len(), 1);
    }

    #[tokio::test]
    async fn test_pool_map_wire_format() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(storage.clone());
        store.append(credential("billing", "app-1")).await.unwrap();

        let raw = storage.get(USER_STORAGE_KEY).await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let entry = &json["billing"][0];
        assert_eq!(entry["accessKeyId"], "app-1");
        assert_eq!(entry["roleName"], "billing");
        assert_eq!(entry["policyName"], "readonly");
        assert_eq!(entry["status"], "enabled");
        assert!(entry["expirationDate"].is_string());
    }

    #[tokio::test]
    async fn test_concurrent_appends_for_different_roles() {
        let store = Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())));
        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append(credential(&format!("role-{i}"), &format!("key-{i}")))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.snapshot().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_failed_write_is_surfaced() {
        let storage = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(storage.clone());
        storage.fail_put(true);
        assert!(matches!(
            store.append(credential("billing", "app-1")).await,
            Err(AppError::StoreError {
                step: "persisting credential pools",
                ..
            })
        ));
        storage.fail_put(false);
        assert!(store.pool("billing").await.unwrap().is_empty());
    }
}
