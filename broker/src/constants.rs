// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::time::Duration;

/// Storage key holding the provider connection settings.
pub const CONFIG_STORAGE_KEY: &str = "config";
/// Storage prefix for role definitions (`roles/<name>`).
pub const ROLE_STORAGE_PREFIX: &str = "roles/";
/// Storage key holding the pool map for every role.
pub const USER_STORAGE_KEY: &str = "users";

pub const SECRET_KEY_LENGTH: usize = 32;
pub const DEFAULT_MAX_TTL: Duration = Duration::from_secs(720 * 60 * 60); // 30 days
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_STS_REGION: &str = "us-east-1";
pub const INLINE_POLICY_SUFFIX: &str = "inline";

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const MAX_REQUEST_ID_LENGTH: usize = 128;
pub const MAX_REQUEST_BODY_SIZE: usize = 1024 * 1024; // 1 MB
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Validation constants for role and configuration requests
pub const MAX_ROLE_NAME_LENGTH: u64 = 128;
pub const MAX_USER_NAME_PREFIX_LENGTH: u64 = 64;
pub const MAX_POLICY_NAME_LENGTH: u64 = 256;
pub const MAX_POLICY_DOCUMENT_LENGTH: u64 = 20 * 1024;
pub const MAX_ENDPOINT_LENGTH: u64 = 512;
pub const MAX_ACCESS_KEY_LENGTH: u64 = 256;
