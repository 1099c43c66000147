pub mod health;
pub mod payments;
pub mod stats;

pub use health::*;
pub use payments::*;
pub use stats::*;

use crate::{
    middleware::require_user,
    services::{Analytics, PaymentVerifier},
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<PaymentVerifier>,
    pub analytics: Arc<Analytics>,
}

pub fn router(state: AppState) -> Router {
    // every payment route acts on behalf of a user
    let payments = Router::new()
        .route("/payments/verify", post(verify_payment))
        .route("/payments", get(list_payments))
        .route("/payments/:signature", get(get_payment))
        .route_layer(axum_middleware::from_fn(require_user));

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .merge(payments)
        .with_state(state)
}
