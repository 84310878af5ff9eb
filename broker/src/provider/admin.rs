// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP client for the storage service's administrative API.
//!
//! Requests are signed with AWS SigV4 (service `s3`) using the administrative
//! key pair from the provider configuration. Session credentials come from the
//! provider's STS endpoint through `aws-sdk-sts`, authenticated as the
//! long-lived user rather than the administrator.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create user | `PUT /minio/admin/v3/add-user?accessKey=` |
//! | delete user | `DELETE /minio/admin/v3/remove-user?accessKey=` |
//! | attach policy | `POST /minio/admin/v3/idp/builtin/policy/attach` |
//! | detach policy | `POST /minio/admin/v3/idp/builtin/policy/detach` |
//! | install inline policy | `PUT /minio/admin/v3/add-canned-policy?name=` |
//! | remove inline policy | `DELETE /minio/admin/v3/remove-canned-policy?name=` |

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sts::config::http::HttpResponse;
use aws_sdk_sts::error::{DisplayErrorContext, SdkError};
use aws_sdk_sts::operation::assume_role::AssumeRoleError;
use aws_sigv4::http_request::{
    PayloadChecksumKind, SignableBody, SignableRequest, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use chrono::DateTime;
use reqwest::{Method, StatusCode, Url};
use serde_json::json;

use crate::models::{ProviderConfig, SessionCredential};
use crate::provider::{
    AssumeRoleRequest, IdentityProvider, PolicyRef, ProviderError, ProviderFactory,
};

const ADMIN_PREFIX: &str = "/minio/admin/v3";
const SIGNING_SERVICE: &str = "s3";
/// The provider ignores the role ARN, but STS requires one to be present.
const STS_ROLE_ARN: &str = "arn:minio:iam:::role/credential-broker";

pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    region: String,
    timeout: Duration,
}

impl AdminClient {
    pub fn new(
        config: &ProviderConfig,
        timeout: Duration,
        region: &str,
    ) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&config.endpoint_url())
            .map_err(|err| ProviderError::Configuration(format!("invalid endpoint: {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Configuration(err.to_string()))?;
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None, // session token
            None, // expiration
            "credential-broker-admin",
        );

        Ok(Self {
            http,
            base_url,
            credentials,
            region: region.to_string(),
            timeout,
        })
    }

    /// Computes the SigV4 headers for a request.
    fn signing_headers(
        &self,
        method: &Method,
        url: &Url,
        body: &[u8],
    ) -> Result<Vec<(String, String)>, ProviderError> {
        let identity: Identity = self.credentials.clone().into();
        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;

        let params: aws_sigv4::http_request::SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_SERVICE)
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|err| ProviderError::Configuration(err.to_string()))?
            .into();

        let signable = SignableRequest::new(
            method.as_str(),
            url.as_str(),
            std::iter::empty(),
            SignableBody::Bytes(body),
        )
        .map_err(|err| ProviderError::Configuration(err.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|err| ProviderError::Configuration(err.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }

    #[tracing::instrument(skip(self, body))]
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<(), ProviderError> {
        let mut url = self
            .base_url
            .join(&format!("{ADMIN_PREFIX}{path}"))
            .map_err(|err| ProviderError::Configuration(err.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let headers = self.signing_headers(&method, &url, &body)?;
        let mut request = self.http.request(method, url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ProviderError::Connection(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|err| format!("unreadable response body: {err}"));
        tracing::debug!("[broker] admin API returned {}: {}", status, message);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ProviderError::Authentication(message))
            }
            _ => Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Result<(), ProviderError> {
        let body =
            serde_json::to_vec(&body).map_err(|err| ProviderError::Configuration(err.to_string()))?;
        self.send(method, path, query, body).await
    }

    fn sts_client(&self, request: &AssumeRoleRequest) -> aws_sdk_sts::Client {
        // Only the caller's own credentials are used, never ambient ones
        let credentials = Credentials::new(
            request.access_key_id.clone(),
            request.secret_access_key.to_string(),
            None,
            None,
            "credential-broker-sts",
        );
        let sdk_config = SdkConfig::builder()
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .region(Region::new(self.region.clone()))
            .endpoint_url(request.endpoint.clone())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.timeout)
                    .build(),
            )
            .behavior_version(BehaviorVersion::latest())
            .build();
        aws_sdk_sts::Client::new(&sdk_config)
    }
}

fn map_sts_error(err: SdkError<AssumeRoleError, HttpResponse>) -> ProviderError {
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            ProviderError::Connection(message)
        }
        SdkError::ServiceError(context) => match context.raw().status().as_u16() {
            401 | 403 => ProviderError::Authentication(message),
            status => ProviderError::Rejected { status, message },
        },
        _ => ProviderError::InvalidResponse(message),
    }
}

#[async_trait]
impl IdentityProvider for AdminClient {
    async fn create_user(
        &self,
        access_key_id: &str,
        secret_key: &str,
    ) -> Result<(), ProviderError> {
        self.send_json(
            Method::PUT,
            "/add-user",
            &[("accessKey", access_key_id)],
            json!({"secretKey": secret_key, "status": "enabled"}),
        )
        .await
    }

    async fn delete_user(&self, access_key_id: &str) -> Result<(), ProviderError> {
        self.send(
            Method::DELETE,
            "/remove-user",
            &[("accessKey", access_key_id)],
            Vec::new(),
        )
        .await
    }

    async fn attach_policy(
        &self,
        access_key_id: &str,
        policy: &PolicyRef,
    ) -> Result<(), ProviderError> {
        let name = policy.name_for(access_key_id);
        if let PolicyRef::Document(document) = policy {
            self.send(
                Method::PUT,
                "/add-canned-policy",
                &[("name", name.as_str())],
                document.as_bytes().to_vec(),
            )
            .await?;
        }

        self.send_json(
            Method::POST,
            "/idp/builtin/policy/attach",
            &[],
            json!({"policies": [name], "user": access_key_id}),
        )
        .await
    }

    async fn detach_policy(
        &self,
        access_key_id: &str,
        policy: &PolicyRef,
    ) -> Result<(), ProviderError> {
        let name = policy.name_for(access_key_id);
        let detached = self
            .send_json(
                Method::POST,
                "/idp/builtin/policy/detach",
                &[],
                json!({"policies": [name], "user": access_key_id}),
            )
            .await;
        if let Err(err) = &detached
            && !err.is_not_found()
        {
            return detached;
        }

        // An inline policy outlives its user, so it is removed even when the
        // user is already gone
        if let PolicyRef::Document(_) = policy {
            match self
                .send(
                    Method::DELETE,
                    "/remove-canned-policy",
                    &[("name", name.as_str())],
                    Vec::new(),
                )
                .await
            {
                Err(err) if !err.is_not_found() => return Err(err),
                _ => {}
            }
        }
        detached
    }

    #[tracing::instrument(skip(self))]
    async fn assume_role(
        &self,
        request: &AssumeRoleRequest,
    ) -> Result<SessionCredential, ProviderError> {
        let duration = i32::try_from(request.duration.as_secs()).unwrap_or(i32::MAX);

        let output = self
            .sts_client(request)
            .assume_role()
            .role_arn(STS_ROLE_ARN)
            .role_session_name(&request.access_key_id)
            .duration_seconds(duration)
            .set_policy(request.policy.clone())
            .send()
            .await
            .map_err(map_sts_error)?;

        let credentials = output.credentials().ok_or_else(|| {
            ProviderError::InvalidResponse("AssumeRole returned no credentials".to_string())
        })?;
        let expiration = credentials.expiration();
        let expiration = DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!(
                    "invalid session expiration: {expiration}"
                ))
            })?;

        Ok(SessionCredential {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}

/// Builds [`AdminClient`]s for the provider handle.
pub struct AdminClientFactory {
    timeout: Duration,
    region: String,
}

impl AdminClientFactory {
    pub fn new(timeout: Duration, region: impl Into<String>) -> Self {
        Self {
            timeout,
            region: region.into(),
        }
    }
}

impl ProviderFactory for AdminClientFactory {
    fn build(
        &self,
        config: &ProviderConfig,
    ) -> Result<std::sync::Arc<dyn IdentityProvider>, ProviderError> {
        let client = AdminClient::new(config, self.timeout, &self.region)?;
        Ok(std::sync::Arc::new(client))
    }
}
