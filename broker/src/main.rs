// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use clap::Parser;
use credential_broker::application::Application;
use credential_broker::backend::Broker;
use credential_broker::configuration::BrokerOptions;
use credential_broker::provider::admin::AdminClientFactory;
use credential_broker::storage::{FileStorage, MemoryStorage, Storage};
use std::{io::Error, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    println!("[broker] init");

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        // span fields are already part of every event
        .with_current_span(false)
        .with_ansi(false)
        // the log collector adds its own ingestion time
        .without_time()
        .with_target(false)
        .init();

    // get configuration options from flags and environment variables
    let options = BrokerOptions::parse();

    tracing::info!("[broker] {:?}", &options);

    let storage: Arc<dyn Storage> = match &options.data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            tracing::info!("[broker] storing metadata in {}", dir.display());
            Arc::new(FileStorage::new(dir))
        }
        None => {
            tracing::warn!("[broker] no data directory set, metadata is kept in memory");
            Arc::new(MemoryStorage::new())
        }
    };

    let factory = Arc::new(AdminClientFactory::new(
        options.provider_timeout(),
        options.sts_region.clone(),
    ));
    let broker = Arc::new(Broker::new(storage, factory));

    let application = Application::build(options, broker).await?;

    application.run_until_stopped().await
}
