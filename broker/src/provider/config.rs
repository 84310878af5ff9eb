// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;

use validator::Validate;

use crate::constants::CONFIG_STORAGE_KEY;
use crate::errors::AppError;
use crate::models::ProviderConfig;
use crate::storage::{Storage, get_json, put_json};

/// Provider connection settings, stored under [`CONFIG_STORAGE_KEY`].
#[derive(Clone)]
pub struct ConfigStore {
    storage: Arc<dyn Storage>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns the stored configuration, `None` if the provider was never configured.
    pub async fn get(&self) -> Result<Option<ProviderConfig>, AppError> {
        get_json(self.storage.as_ref(), CONFIG_STORAGE_KEY)
            .await
            .map_err(AppError::store("reading provider configuration"))
    }

    /// Like [`get`](Self::get), but a missing configuration is an error.
    pub async fn require(&self) -> Result<ProviderConfig, AppError> {
        self.get()
            .await?
            .ok_or_else(|| AppError::ConfigError("provider is not configured".to_string()))
    }

    #[tracing::instrument(skip(self, config))]
    pub async fn put(&self, config: &ProviderConfig) -> Result<(), AppError> {
        config.validate()?;
        put_json(self.storage.as_ref(), CONFIG_STORAGE_KEY, config)
            .await
            .map_err(AppError::store("persisting provider configuration"))
    }

    pub async fn delete(&self) -> Result<(), AppError> {
        self.storage
            .delete(CONFIG_STORAGE_KEY)
            .await
            .map_err(AppError::store("deleting provider configuration"))
    }
}
