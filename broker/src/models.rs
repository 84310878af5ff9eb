// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::ZeroizeOnDrop;

use crate::constants::{
    DEFAULT_MAX_TTL, MAX_ACCESS_KEY_LENGTH, MAX_ENDPOINT_LENGTH, MAX_POLICY_DOCUMENT_LENGTH,
    MAX_POLICY_NAME_LENGTH, MAX_ROLE_NAME_LENGTH, MAX_USER_NAME_PREFIX_LENGTH,
};
use crate::errors::AppError;
use crate::provider::PolicyRef;

/// How credentials for a role are handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialMode {
    /// The long-lived credential itself, with a named policy attached.
    #[default]
    #[serde(rename = "static")]
    Static,
    /// A session credential derived from the long-lived one via STS.
    #[serde(rename = "sts")]
    Session,
}

/// A named class of callers sharing one storage-service policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Role {
    #[validate(length(min = 1, max = MAX_ROLE_NAME_LENGTH))]
    #[validate(custom(function = "validate_name"))]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = MAX_USER_NAME_PREFIX_LENGTH))]
    #[validate(custom(function = "validate_name"))]
    pub user_name_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = MAX_POLICY_NAME_LENGTH))]
    pub policy_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = MAX_POLICY_DOCUMENT_LENGTH))]
    pub policy_document: Option<String>,

    #[serde(default)]
    pub credential_type: CredentialMode,

    /// Lifetime of a long-lived credential, in seconds.
    pub max_ttl: u64,

    /// Upper bound for a derived session credential, in seconds.
    #[serde(default)]
    pub max_sts_ttl: u64,
}

impl Role {
    /// Validates field formats and the fields the credential mode requires.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;

        if self.max_ttl == 0 {
            return Err(AppError::ValidationError(
                "max_ttl must be greater than zero".to_string(),
            ));
        }

        match self.credential_type {
            CredentialMode::Static if self.policy_name.is_none() => Err(
                AppError::ValidationError("static roles require a policy_name".to_string()),
            ),
            CredentialMode::Session if self.policy_document.is_none() => Err(
                AppError::ValidationError("sts roles require a policy_document".to_string()),
            ),
            CredentialMode::Session if self.max_sts_ttl == 0 => Err(AppError::ValidationError(
                "sts roles require a max_sts_ttl".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// The policy attached to every credential minted for this role.
    pub fn policy_ref(&self) -> Result<PolicyRef, AppError> {
        let policy = match self.credential_type {
            CredentialMode::Static => self.policy_name.clone().map(PolicyRef::Named),
            CredentialMode::Session => self.policy_document.clone().map(PolicyRef::Document),
        };
        policy.ok_or_else(|| {
            AppError::ValidationError(format!("role {} has no policy for its mode", self.name))
        })
    }

    /// Deterministic provider user name for a request: `prefix-requestID`.
    pub fn identity_key(&self, request_id: &str) -> String {
        match &self.user_name_prefix {
            Some(prefix) => format!("{prefix}-{request_id}"),
            None => request_id.to_string(),
        }
    }

    /// Expiration of a long-lived credential issued at `now`.
    pub fn expiration_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        i64::try_from(self.max_ttl)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::ValidationError(format!("max_ttl of role {} is out of range", self.name))
            })
    }
}

/// Body of a role write. Omitted fields keep their stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRequest {
    #[serde(default)]
    pub user_name_prefix: Option<String>,
    #[serde(default)]
    pub policy_name: Option<String>,
    #[serde(default)]
    pub policy_document: Option<String>,
    #[serde(default)]
    pub credential_type: Option<CredentialMode>,
    #[serde(default)]
    pub max_ttl: Option<u64>,
    #[serde(default)]
    pub max_sts_ttl: Option<u64>,
}

impl RoleRequest {
    /// Merges the request over `existing` (if any) into a role named `name`.
    pub fn into_role(self, name: &str, existing: Option<Role>) -> Role {
        let base = existing.unwrap_or_else(|| Role {
            name: name.to_string(),
            user_name_prefix: None,
            policy_name: None,
            policy_document: None,
            credential_type: CredentialMode::Static,
            max_ttl: DEFAULT_MAX_TTL.as_secs(),
            max_sts_ttl: 0,
        });

        Role {
            name: name.to_string(),
            user_name_prefix: self.user_name_prefix.or(base.user_name_prefix),
            policy_name: self.policy_name.or(base.policy_name),
            policy_document: self.policy_document.or(base.policy_document),
            credential_type: self.credential_type.unwrap_or(base.credential_type),
            max_ttl: self.max_ttl.unwrap_or(base.max_ttl),
            max_sts_ttl: self.max_sts_ttl.unwrap_or(base.max_sts_ttl),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleList {
    pub keys: Vec<String>,
}

/// Role and prefix names: ASCII letters, digits, `_`, `-` and `.`.
fn validate_name(name: &str) -> Result<(), validator::ValidationError> {
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(validator::ValidationError::new("invalid_name"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    #[default]
    Enabled,
    Disabled,
}

/// A long-lived storage-service identity, as recorded in a role's pool.
#[derive(Clone, PartialEq, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_key_id: String,

    pub secret_access_key: String,

    #[serde(default)]
    #[zeroize(skip)]
    pub role_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[zeroize(skip)]
    pub policy_name: Option<String>,

    #[zeroize(skip)]
    pub status: CredentialStatus,

    #[zeroize(skip)]
    pub expiration_date: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_date
    }
}

// Custom Debug implementation to prevent accidental logging of sensitive data
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("role_name", &self.role_name)
            .field("status", &self.status)
            .field("expiration_date", &self.expiration_date)
            .finish()
    }
}

/// Response fields for a long-lived credential.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct CredentialResponse {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[zeroize(skip)]
    pub policy_name: Option<String>,
    #[zeroize(skip)]
    pub expiration_date: DateTime<Utc>,
    #[zeroize(skip)]
    pub status: CredentialStatus,
}

impl From<&Credential> for CredentialResponse {
    fn from(credential: &Credential) -> Self {
        Self {
            access_key_id: credential.access_key_id.clone(),
            secret_access_key: credential.secret_access_key.clone(),
            policy_name: credential.policy_name.clone(),
            expiration_date: credential.expiration_date,
            status: credential.status,
        }
    }
}

impl fmt::Debug for CredentialResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResponse")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("expiration_date", &self.expiration_date)
            .finish()
    }
}

/// Short-lived STS credential. Never persisted.
#[derive(Clone, PartialEq, Serialize, Deserialize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[zeroize(skip)]
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("access_key_id", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &"[REDACTED]")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// What `POST /creds/{role}` hands back, depending on the role's mode.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IssuedCredential {
    Static(CredentialResponse),
    Session(SessionCredential),
}

/// Optional parameters of a session credential request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SessionRequest {
    /// Policy document scoping down the session; the role's document by default.
    #[serde(default)]
    #[validate(length(min = 1, max = MAX_POLICY_DOCUMENT_LENGTH))]
    pub policy: Option<String>,
    /// Requested lifetime in seconds; `0` or absent selects the role maximum.
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Connection settings for the identity provider's administrative API.
#[derive(Clone, PartialEq, Serialize, Deserialize, Validate, ZeroizeOnDrop)]
pub struct ProviderConfig {
    #[validate(length(min = 1, max = MAX_ENDPOINT_LENGTH))]
    #[validate(custom(function = "validate_endpoint"))]
    pub endpoint: String,

    #[serde(rename = "accessKeyId")]
    #[validate(length(min = 1, max = MAX_ACCESS_KEY_LENGTH))]
    pub access_key_id: String,

    #[serde(rename = "secretAccessKey")]
    #[validate(length(min = 1, max = MAX_ACCESS_KEY_LENGTH))]
    pub secret_access_key: String,

    #[serde(rename = "useSSL", default)]
    #[zeroize(skip)]
    pub use_ssl: bool,
}

impl ProviderConfig {
    /// Base URL of the provider: the endpoint with the scheme `useSSL` selects.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

/// Endpoints are `host[:port]`, without a scheme or path.
fn validate_endpoint(endpoint: &str) -> Result<(), validator::ValidationError> {
    if endpoint.contains("://") || endpoint.contains('/') || endpoint.contains(char::is_whitespace)
    {
        return Err(validator::ValidationError::new("invalid_endpoint"));
    }
    Ok(())
}

/// Body of a configuration write. Omitted fields keep their stored values.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(rename = "accessKeyId", default)]
    pub access_key_id: Option<String>,
    #[serde(rename = "secretAccessKey", default)]
    pub secret_access_key: Option<String>,
    #[serde(rename = "useSSL", default)]
    pub use_ssl: Option<bool>,
}

impl ConfigRequest {
    pub fn into_config(self, existing: Option<ProviderConfig>) -> ProviderConfig {
        let (endpoint, access_key_id, secret_access_key, use_ssl) = match existing {
            Some(ref c) => (
                c.endpoint.clone(),
                c.access_key_id.clone(),
                c.secret_access_key.clone(),
                c.use_ssl,
            ),
            None => (String::new(), String::new(), String::new(), false),
        };

        ProviderConfig {
            endpoint: self.endpoint.unwrap_or(endpoint),
            access_key_id: self.access_key_id.unwrap_or(access_key_id),
            secret_access_key: self.secret_access_key.unwrap_or(secret_access_key),
            use_ssl: self.use_ssl.unwrap_or(use_ssl),
        }
    }
}

/// Configuration as returned by a read: the secret is never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub endpoint: String,
    #[serde(rename = "accessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "useSSL")]
    pub use_ssl: bool,
}

impl From<&ProviderConfig> for ConfigResponse {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            access_key_id: config.access_key_id.clone(),
            use_ssl: config.use_ssl,
        }
    }
}

/// Clamps a requested session lifetime to `[1, max]`; `0` selects `max`.
pub fn clamp_session_ttl(requested: Option<u64>, max: u64) -> Duration {
    let seconds = match requested {
        Some(ttl) if ttl > 0 && ttl <= max => ttl,
        _ => max,
    };
    Duration::from_secs(seconds.max(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn static_role() -> Role {
        RoleRequest {
            policy_name: Some("readonly".into()),
            ..Default::default()
        }
        .into_role("billing", None)
    }

    #[test]
    fn test_static_role_defaults() {
        let role = static_role();
        assert_eq!(role.credential_type, CredentialMode::Static);
        assert_eq!(role.max_ttl, 720 * 3600);
        assert!(role.check().is_ok());
        assert_eq!(role.policy_ref().unwrap(), PolicyRef::Named("readonly".into()));
    }

    #[test]
    fn test_static_role_requires_policy_name() {
        let role = RoleRequest::default().into_role("billing", None);
        assert!(matches!(role.check(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_session_role_requires_document_and_ttl() {
        let mut role = RoleRequest {
            credential_type: Some(CredentialMode::Session),
            policy_name: Some("readonly".into()),
            ..Default::default()
        }
        .into_role("reports", None);
        assert!(role.check().is_err());

        role.policy_document = Some("{}".into());
        assert!(role.check().is_err());

        role.max_sts_ttl = 100;
        assert!(role.check().is_ok());
        assert_eq!(role.policy_ref().unwrap(), PolicyRef::Document("{}".into()));
    }

    #[test]
    fn test_role_name_format() {
        let mut role = static_role();
        role.name = "bad name/with slash".into();
        assert!(matches!(role.check(), Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_update_keeps_unspecified_fields() {
        let existing = RoleRequest {
            user_name_prefix: Some("app".into()),
            policy_name: Some("readonly".into()),
            max_ttl: Some(60),
            ..Default::default()
        }
        .into_role("billing", None);

        let updated = RoleRequest {
            user_name_prefix: Some("new_prefix".into()),
            ..Default::default()
        }
        .into_role("billing", Some(existing));

        assert_eq!(updated.user_name_prefix.as_deref(), Some("new_prefix"));
        assert_eq!(updated.policy_name.as_deref(), Some("readonly"));
        assert_eq!(updated.max_ttl, 60);
    }

    #[test]
    fn test_expiration_from() {
        let now = Utc::now();
        let mut role = static_role();
        assert_eq!(
            role.expiration_from(now).unwrap(),
            now + chrono::Duration::hours(720)
        );
        role.max_ttl = u64::MAX;
        assert!(role.expiration_from(now).is_err());
    }

    #[test]
    fn test_identity_key_derivation() {
        let mut role = static_role();
        assert_eq!(role.identity_key("req-1"), "req-1");
        role.user_name_prefix = Some("app".into());
        assert_eq!(role.identity_key("req-1"), "app-req-1");
    }

    #[test]
    fn test_credential_expiry_boundary() {
        let now = Utc::now();
        let credential = Credential {
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
            role_name: "billing".into(),
            policy_name: None,
            status: CredentialStatus::Enabled,
            expiration_date: now,
        };
        assert!(!credential.is_expired(now));
        assert!(credential.is_expired(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let credential = Credential {
            access_key_id: "key".into(),
            secret_access_key: "super-secret".into(),
            role_name: "billing".into(),
            policy_name: None,
            status: CredentialStatus::Enabled,
            expiration_date: Utc::now(),
        };
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_credential_wire_names() {
        let json = serde_json::json!({
            "accessKeyId": "key",
            "secretAccessKey": "secret",
            "policyName": "readonly",
            "status": "enabled",
            "expirationDate": "2026-01-01T00:00:00Z"
        });
        let credential: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(credential.role_name, "");
        assert_eq!(credential.status, CredentialStatus::Enabled);
    }

    #[test]
    fn test_clamp_session_ttl() {
        assert_eq!(clamp_session_ttl(None, 100), Duration::from_secs(100));
        assert_eq!(clamp_session_ttl(Some(0), 100), Duration::from_secs(100));
        assert_eq!(clamp_session_ttl(Some(50), 100), Duration::from_secs(50));
        assert_eq!(clamp_session_ttl(Some(500), 100), Duration::from_secs(100));
    }

    #[test]
    fn test_provider_config_endpoint_url() {
        let mut config = ConfigRequest {
            endpoint: Some("minio.local:9000".into()),
            access_key_id: Some("admin".into()),
            secret_access_key: Some("password".into()),
            use_ssl: Some(true),
        }
        .into_config(None);
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint_url(), "https://minio.local:9000");

        config.use_ssl = false;
        assert_eq!(config.endpoint_url(), "http://minio.local:9000");

        config.endpoint = "https://minio.local".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_request_merges() {
        let existing = ConfigRequest {
            endpoint: Some("minio.local:9000".into()),
            access_key_id: Some("admin".into()),
            secret_access_key: Some("password".into()),
            use_ssl: None,
        }
        .into_config(None);

        let updated = ConfigRequest {
            access_key_id: Some("rotated".into()),
            ..Default::default()
        }
        .into_config(Some(existing));

        assert_eq!(updated.endpoint, "minio.local:9000");
        assert_eq!(updated.access_key_id, "rotated");
        assert_eq!(updated.secret_access_key, "password");
        assert!(!updated.use_ssl);
    }
}
