// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::provider::config::ConfigStore;
use crate::provider::{IdentityProvider, ProviderFactory};

/// Lazily built, shared provider client.
///
/// Readers take the read lock and clone the cached client. When the slot is
/// empty the first caller builds a client from the stored configuration under
/// the write lock. [`invalidate`](Self::invalidate) empties the slot so that
/// configuration edits apply to the very next request.
pub struct ProviderHandle {
    configs: ConfigStore,
    factory: Arc<dyn ProviderFactory>,
    client: RwLock<Option<Arc<dyn IdentityProvider>>>,
    generation: AtomicU64,
}

impl ProviderHandle {
    pub fn new(configs: ConfigStore, factory: Arc<dyn ProviderFactory>) -> Self {
        Self {
            configs,
            factory,
            client: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the cached client, building one if none exists.
    pub async fn client(&self) -> Result<Arc<dyn IdentityProvider>, AppError> {
        // Fast path: a client is already cached
        {
            let cached = self.client.read().await;
            if let Some(client) = cached.as_ref() {
                return Ok(client.clone());
            }
        }

        let mut slot = self.client.write().await;

        // Double-check after acquiring write lock (another task may have built it)
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let config = self.configs.require().await?;
        let client = self
            .factory
            .build(&config)
            .map_err(AppError::provider("building provider client"))?;

        tracing::debug!(
            "[broker] built provider client for {}, generation {}",
            config.endpoint,
            self.generation()
        );

        *slot = Some(client.clone());
        Ok(client)
    }

    /// Discards the cached client; the next [`client`](Self::client) call rebuilds it.
    pub async fn invalidate(&self) {
        let mut slot = self.client.write().await;
        *slot = None;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!("[broker] provider client invalidated, generation {}", generation);
    }

    /// Number of invalidations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
