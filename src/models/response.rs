use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PaymentList<T> {
    pub payments: Vec<T>,
    pub count: usize,
    /// Matches before pagination.
    pub total: usize,
    pub sort_by: String,
    pub sort_order: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store_backend: String,
    pub store: bool,
    /// RPC reachability keyed by network name.
    pub ledger_rpc: BTreeMap<String, bool>,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Stats {
    pub submissions: u64,
    pub verified: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub invalid_claims: u64,
    pub network_failures: u64,
    pub rejections_by_reason: BTreeMap<String, u64>,
    pub uptime_seconds: u64,
}
