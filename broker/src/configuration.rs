// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::constants::{DEFAULT_PROVIDER_TIMEOUT, DEFAULT_STS_REGION};

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct BrokerOptions {
    #[arg(long, default_value = "127.0.0.1", env("BROKER_HTTP_HOST"))]
    pub host: String,
    #[arg(long, default_value = "8080", env("BROKER_HTTP_PORT"))]
    pub port: u16,
    /// Directory for persistent metadata; kept in memory when unset.
    #[arg(long, env("BROKER_DATA_DIR"))]
    pub data_dir: Option<PathBuf>,
    #[arg(long, default_value = "10", env("BROKER_PROVIDER_TIMEOUT_SECS"))]
    pub provider_timeout_secs: u64,
    #[arg(long, default_value = DEFAULT_STS_REGION, env("BROKER_STS_REGION"))]
    pub sts_region: String,
}

impl BrokerOptions {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

impl Default for BrokerOptions {
    fn default() -> Self {
        BrokerOptions {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: None,
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT.as_secs(),
            sts_region: DEFAULT_STS_REGION.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let options = BrokerOptions::try_parse_from([
            "credential-broker",
            "--port",
            "9000",
            "--data-dir",
            "/var/lib/broker",
            "--provider-timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(options.port, 9000);
        assert_eq!(options.data_dir, Some(PathBuf::from("/var/lib/broker")));
        assert_eq!(options.provider_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_default_matches_parser_defaults() {
        let defaults = BrokerOptions::default();
        assert_eq!(defaults.host, "127.0.0.1");
        assert_eq!(defaults.provider_timeout(), DEFAULT_PROVIDER_TIMEOUT);
        assert_eq!(defaults.sts_region, "us-east-1");
        assert!(defaults.data_dir.is_none());
    }
}
