use crate::{
    error::ApiError,
    handlers::AppState,
    middleware::UserId,
    models::{
        ApiResponse, PaymentClaim, PaymentFilter, PaymentList, PaymentStatus, PlanId, Pubkey,
        Signature, SortField, SortOrder, VerificationResult, VerifiedPayment,
    },
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;

pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    payload: Result<Json<PaymentClaim>, JsonRejection>,
) -> Result<Json<ApiResponse<VerificationResult>>, ApiError> {
    let Json(claim) = payload.map_err(|e| ApiError::InvalidClaim(e.body_text()))?;

    let outcome = state.verifier.submit_payment(&user_id, &claim).await;
    state.analytics.record(&outcome);
    let result = outcome?;

    // never disclose another account's record
    if result.duplicate && result.payment.user_id != user_id {
        tracing::warn!(
            signature = %result.payment.signature,
            %user_id,
            "signature already claimed by another user"
        );
        return Err(ApiError::SignatureAlreadyUsed);
    }

    Ok(Json(ApiResponse::ok(result)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub plan_id: Option<String>,
    pub wallet_address: Option<String>,
    /// RFC3339. Records verified at or after this instant.
    pub start_date: Option<String>,
    /// RFC3339. Covers the whole day that follows this instant.
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ApiError::InvalidQuery(format!("{}: expected RFC3339 ({})", field, e)))
}

impl ListQuery {
    fn into_filter(self) -> Result<PaymentFilter, ApiError> {
        let status = self
            .status
            .map(|s| s.parse::<PaymentStatus>())
            .transpose()
            .map_err(ApiError::InvalidQuery)?;
        let plan_id = self
            .plan_id
            .map(|p| p.parse::<PlanId>())
            .transpose()
            .map_err(ApiError::InvalidQuery)?;
        let wallet_address = self
            .wallet_address
            .map(|w| w.parse::<Pubkey>())
            .transpose()
            .map_err(|e| ApiError::InvalidQuery(format!("wallet_address: {}", e)))?;

        let from = self
            .start_date
            .map(|d| parse_date("start_date", &d))
            .transpose()?;
        let until = self
            .end_date
            .map(|d| parse_date("end_date", &d).map(|end| end + chrono::Duration::days(1)))
            .transpose()?;
        if let (Some(from), Some(until)) = (from, until) {
            if from >= until {
                return Err(ApiError::InvalidQuery(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        let limit = match self.limit {
            Some(0) => {
                return Err(ApiError::InvalidQuery("limit must be at least 1".to_string()))
            }
            Some(limit) => limit.min(MAX_PAGE_SIZE),
            None => DEFAULT_PAGE_SIZE,
        };

        Ok(PaymentFilter {
            status,
            plan_id,
            wallet_address,
            from,
            until,
            sort_by: self
                .sort_by
                .as_deref()
                .map(SortField::parse_or_default)
                .unwrap_or_default(),
            sort_order: self
                .sort_order
                .as_deref()
                .map(SortOrder::parse_or_default)
                .unwrap_or_default(),
            limit: Some(limit),
            skip: self.skip.unwrap_or(0),
        })
    }
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<PaymentList<VerifiedPayment>>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let filter = query.into_filter()?;

    let page = state
        .verifier
        .store()
        .list_for_user(&user_id, &filter)
        .await?;

    Ok(Json(ApiResponse::ok(PaymentList {
        count: page.payments.len(),
        total: page.total,
        payments: page.payments,
        sort_by: filter.sort_by.as_str().to_string(),
        sort_order: filter.sort_order.as_str().to_string(),
    })))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(signature): Path<String>,
) -> Result<Json<ApiResponse<VerifiedPayment>>, ApiError> {
    let signature: Signature = signature
        .parse()
        .map_err(|e| ApiError::InvalidQuery(format!("signature: {}", e)))?;

    match state.verifier.store().get(&signature).await? {
        Some(payment) if payment.user_id == user_id => Ok(Json(ApiResponse::ok(payment))),
        _ => Err(ApiError::NotFound),
    }
}
