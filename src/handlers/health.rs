use crate::{handlers::AppState, models::HealthStatus, models::Network};
use axum::{extract::State, Json};
use chrono::Utc;
use std::collections::BTreeMap;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let store = state.verifier.store();
    let store_ok = store.ping().await;

    let mut ledger_rpc = BTreeMap::new();
    for network in Network::ALL {
        let reachable = match state.verifier.ledger().health(network).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%network, error = %e, "RPC health check failed");
                false
            }
        };
        ledger_rpc.insert(network.to_string(), reachable);
    }

    let status = if !store_ok {
        "unhealthy"
    } else if ledger_rpc.values().all(|ok| *ok) {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_backend: store.backend().to_string(),
        store: store_ok,
        ledger_rpc,
        uptime_seconds: state.analytics.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
