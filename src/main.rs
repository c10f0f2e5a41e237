// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use image_staging_server::{
    api::router,
    config::{AppConfig, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            // Tracing is configured from the same environment, so fall back to stderr.
            eprintln!("Configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_format);

    let shutdown = CancellationToken::new();
    let state = match AppState::from_config(&config, shutdown.clone()) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build key document HTTP client");
            return ExitCode::FAILURE;
        }
    };

    // Warm the key set cache; failure is not fatal, readiness reports it.
    let key_document_url = &config.auth.key_document_url;
    match state.authenticator.resolver().refresh(key_document_url).await {
        Ok(keys) => tracing::info!(keys, url = %key_document_url, "Loaded signing keys"),
        Err(err) => tracing::warn!(
            error_code = err.error_code(),
            security_event = false,
            url = %key_document_url,
            "Signing keys not yet available"
        ),
    }

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr = %config.bind_addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(shutdown_signal(shutdown.clone()));

    tracing::info!(
        addr = %config.bind_addr,
        issuer = %config.auth.issuer,
        "Image staging server listening (docs at /docs)"
    );

    let app = router(state);
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %err, "Server failed");
        return ExitCode::FAILURE;
    }

    tracing::info!("Server stopped");
    ExitCode::SUCCESS
}
