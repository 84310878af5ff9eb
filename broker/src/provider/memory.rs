// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! In-process identity provider.
//!
//! [`MemoryProvider`] keeps users, their attached policies and installed
//! inline policies in memory, records every call it receives and can be told
//! to fail any operation. It behaves like the remote provider where it
//! matters to the broker: removing or detaching from a missing user fails,
//! and `AssumeRole` checks the caller's secret.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::models::{ProviderConfig, SessionCredential};
use crate::provider::{
    AssumeRoleRequest, IdentityProvider, PolicyRef, ProviderError, ProviderFactory,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    CreateUser,
    DeleteUser,
    AttachPolicy,
    DetachPolicy,
    AssumeRole,
}

/// One call received by the provider, successful or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub operation: ProviderOperation,
    pub access_key_id: String,
}

/// An `AssumeRole` call that produced a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumedSession {
    pub endpoint: String,
    pub access_key_id: String,
    pub policy: Option<String>,
    pub duration: Duration,
}

struct MemoryUser {
    secret_key: String,
    policies: BTreeSet<String>,
}

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<String, MemoryUser>,
    inline_policies: BTreeMap<String, String>,
    calls: Vec<ProviderCall>,
    sessions: Vec<AssumedSession>,
    failing: HashSet<ProviderOperation>,
}

impl MemoryState {
    fn begin(
        &mut self,
        operation: ProviderOperation,
        access_key_id: &str,
    ) -> Result<(), ProviderError> {
        self.calls.push(ProviderCall {
            operation,
            access_key_id: access_key_id.to_string(),
        });
        if self.failing.contains(&operation) {
            return Err(ProviderError::Connection(format!(
                "injected {operation:?} failure"
            )));
        }
        Ok(())
    }

    fn user_mut(&mut self, access_key_id: &str) -> Result<&mut MemoryUser, ProviderError> {
        self.users
            .get_mut(access_key_id)
            .ok_or_else(|| ProviderError::Rejected {
                status: 404,
                message: format!("user {access_key_id} does not exist"),
            })
    }
}

#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `operation` fail with a connection error.
    pub fn fail(&self, operation: ProviderOperation) {
        self.state.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: ProviderOperation) {
        self.state.lock().failing.remove(&operation);
    }

    /// Adds a user directly, bypassing the call log.
    pub fn insert_user(&self, access_key_id: &str, secret_key: &str, policy: Option<&str>) {
        let mut state = self.state.lock();
        let policies = policy.map(str::to_string).into_iter().collect();
        state.users.insert(
            access_key_id.to_string(),
            MemoryUser {
                secret_key: secret_key.to_string(),
                policies,
            },
        );
    }

    pub fn has_user(&self, access_key_id: &str) -> bool {
        self.state.lock().users.contains_key(access_key_id)
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    pub fn user_policies(&self, access_key_id: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .users
            .get(access_key_id)
            .map(|user| user.policies.iter().cloned().collect())
    }

    pub fn user_secret(&self, access_key_id: &str) -> Option<String> {
        self.state
            .lock()
            .users
            .get(access_key_id)
            .map(|user| user.secret_key.clone())
    }

    pub fn inline_policy(&self, name: &str) -> Option<String> {
        self.state.lock().inline_policies.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, operation: ProviderOperation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    pub fn sessions(&self) -> Vec<AssumedSession> {
        self.state.lock().sessions.clone()
    }
}

fn random_token(len: usize) -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(len)
        .collect()
}

#[async_trait]
impl IdentityProvider for MemoryProvider {
    async fn create_user(
        &self,
        access_key_id: &str,
        secret_key: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.begin(ProviderOperation::CreateUser, access_key_id)?;
        // Adding an existing user overwrites its secret, like the admin API does
        state
            .users
            .entry(access_key_id.to_string())
            .or_insert_with(|| MemoryUser {
                secret_key: String::new(),
                policies: BTreeSet::new(),
            })
            .secret_key = secret_key.to_string();
        Ok(())
    }

    async fn delete_user(&self, access_key_id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.begin(ProviderOperation::DeleteUser, access_key_id)?;
        state.user_mut(access_key_id)?;
        state.users.remove(access_key_id);
        Ok(())
    }

    async fn attach_policy(
        &self,
        access_key_id: &str,
        policy: &PolicyRef,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.begin(ProviderOperation::AttachPolicy, access_key_id)?;
        let name = policy.name_for(access_key_id);
        state.user_mut(access_key_id)?.policies.insert(name.clone());
        if let PolicyRef::Document(document) = policy {
            state.inline_policies.insert(name, document.clone());
        }
        Ok(())
    }

    async fn detach_policy(
        &self,
        access_key_id: &str,
        policy: &PolicyRef,
    ) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.begin(ProviderOperation::DetachPolicy, access_key_id)?;
        let name = policy.name_for(access_key_id);
        if let PolicyRef::Document(_) = policy {
            state.inline_policies.remove(&name);
        }
        state.user_mut(access_key_id)?.policies.remove(&name);
        Ok(())
    }

    async fn assume_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredential, ProviderError> {
        let mut state = self.state.lock();
        state.begin(ProviderOperation::AssumeRole, &request.access_key_id)?;

        let authenticated = state
            .users
            .get(&request.access_key_id)
            .is_some_and(|user| user.secret_key == *request.secret_access_key);
        if !authenticated {
            return Err(ProviderError::Authentication(
                "the access key id or secret key is invalid".to_string(),
            ));
        }

        state.sessions.push(AssumedSession {
            endpoint: request.endpoint.clone(),
            access_key_id: request.access_key_id.clone(),
            policy: request.policy.clone(),
            duration: request.duration,
        });

        let lifetime = chrono::Duration::from_std(request.duration)
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;

        Ok(SessionCredential {
            access_key_id: random_token(20).to_uppercase(),
            secret_access_key: random_token(40),
            session_token: random_token(64),
            expiration: Utc::now() + lifetime,
        })
    }
}

/// Hands out one shared [`MemoryProvider`] and counts how often it was asked to.
pub struct MemoryProviderFactory {
    provider: Arc<MemoryProvider>,
    builds: AtomicUsize,
}

impl MemoryProviderFactory {
    pub fn new(provider: Arc<MemoryProvider>) -> Self {
        Self {
            provider,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for MemoryProviderFactory {
    fn build(&self, config: &ProviderConfig) -> Result<Arc<dyn IdentityProvider>, ProviderError> {
        tracing::trace!("[broker] memory provider requested for {}", config.endpoint);
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(self.provider.clone())
    }
}
