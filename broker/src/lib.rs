// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # Credential Broker
//!
//! Issues and rotates object-storage credentials on behalf of named roles.
//!
//! The broker sits between callers asking for credentials and two external
//! systems: the storage service's administrative API, which owns users and
//! their policies, and a metadata store recording which credentials exist.
//!
//! ```text
//! Client -> HTTP API -> Broker -> CredentialController -> IdentityProvider (admin API, STS)
//!                          |               |
//!                          +-> RoleRegistry +-> CredentialStore -> Storage
//! ```
//!
//! Each role has a pool holding at most one live long-lived credential. When
//! it expires a replacement is minted before the old user is torn down, and a
//! pool left with extra entries by an earlier failure is reconciled on the
//! next request. Roles in `sts` mode hand out session credentials derived
//! from their long-lived one instead.
//!
//! ## Modules
//!
//! - [`application`]: HTTP server setup with Axum, body limit, timeout and tracing
//! - [`backend`]: the [`backend::Broker`] tying the components together
//! - [`configuration`]: CLI argument parsing with clap
//! - [`constants`]: storage keys, defaults and limits
//! - [`controller`]: credential rotation and revocation
//! - [`credentials`]: per-role credential pools
//! - [`errors`]: application error types with HTTP response mapping
//! - [`models`]: roles, credentials and request/response types with validation
//! - [`provider`]: identity provider clients and the shared client handle
//! - [`registry`]: role definitions
//! - [`routes`]: HTTP route handlers
//! - [`storage`]: the metadata store interface and its implementations
//! - [`sts`]: session credential issuance
//!
//! ## Usage
//!
//! ```bash
//! credential-broker --host 127.0.0.1 --port 8080 --data-dir /var/lib/credential-broker
//! ```
//!
//! ## Security Considerations
//!
//! - Secrets are generated locally from the system CSPRNG, never chosen by callers
//! - Secret-bearing types redact themselves in `Debug` output and zeroize on drop
//! - Role and configuration reads never return secret material
//! - Callers are not authenticated by the broker; run it behind a trusted front end

pub mod application;
pub mod backend;
pub mod configuration;
pub mod constants;
pub mod controller;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod routes;
pub mod storage;
pub mod sts;
