// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use crate::backend::Broker;
use crate::configuration::BrokerOptions;
use crate::constants::{MAX_REQUEST_BODY_SIZE, REQUEST_TIMEOUT};
use crate::routes;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::serve::Serve;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Broker>,
}

pub struct Application {
    port: u16,
    server: Serve<TcpListener, Router, Router>,
}

impl Application {
    pub async fn build(options: BrokerOptions, broker: Arc<Broker>) -> Result<Self, std::io::Error> {
        let address = format!("{}:{}", options.host, options.port);
        let listener = TcpListener::bind(address).await?;
        let server = run(listener, broker)?;
        let port = server.local_addr()?.port();

        tracing::info!("[broker] listening at http://{}:{}", options.host, port);

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// The full router, middleware included.
pub fn create_router(broker: Arc<Broker>) -> Router {
    let state = Arc::new(AppState { broker });

    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/config",
            get(routes::read_config)
                .put(routes::write_config)
                .delete(routes::delete_config),
        )
        .route("/roles", get(routes::list_roles))
        .route(
            "/roles/{name}",
            get(routes::read_role)
                .put(routes::write_role)
                .delete(routes::delete_role),
        )
        .route(
            "/creds/{role}",
            post(routes::issue_credential).delete(routes::revoke_credentials),
        )
        .route("/sts/{role}", post(routes::issue_session))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tracing::instrument(skip(listener, broker))]
pub fn run(
    listener: TcpListener,
    broker: Arc<Broker>,
) -> Result<Serve<TcpListener, Router, Router>, std::io::Error> {
    let app = create_router(broker);
    Ok(axum::serve(listener, app))
}
