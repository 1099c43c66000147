use anyhow::{Context, Result};
use sol_paywall::{
    config::Config,
    handlers::{router, AppState},
    services::{connect_store, Analytics, PaymentVerifier, RpcLedgerClient},
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting sol-paywall v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);
    tracing::info!("Receiving wallet: {}", config.wallet_address);

    let ledger = Arc::new(
        RpcLedgerClient::new(config.ledger_config()).context("Failed to build RPC client")?,
    );
    let store = connect_store(&config.redis_url).await;
    let verifier = Arc::new(PaymentVerifier::new(
        ledger,
        store,
        config.policy(),
        config.verifier_settings(),
    ));
    let analytics = Arc::new(Analytics::new());

    let app = router(AppState {
        verifier,
        analytics,
    })
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::default().include_headers(true)),
    )
    .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
