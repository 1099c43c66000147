//! At-most-once processing of transaction signatures.
//!
//! A verification starts by atomically claiming its signature. The claim is a
//! lease: it expires on its own if the holder dies, and it can be released
//! early when a transient failure means the attempt should be retried. The
//! final outcome is written once and never changes.

use crate::models::{PaymentFilter, PaymentPage, Signature, VerifiedPayment};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("stored record is corrupt: {0}")]
    Serialization(String),

    #[error("lease on {0} is no longer held")]
    LeaseLost(Signature),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Proof that the holder is the only verifier working on a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub signature: Signature,
    pub token: Uuid,
}

impl Lease {
    fn new(signature: Signature) -> Self {
        Self {
            signature,
            token: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Claim {
    /// The caller now owns the signature until the lease is finalized,
    /// released or expires.
    Acquired(Lease),
    /// Another verifier holds an unexpired lease.
    InFlight,
    /// The signature already has an immutable outcome.
    Finalized(VerifiedPayment),
}

/// Serialized form of a slot in shared storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub(crate) enum StoredSlot {
    Pending {
        token: Uuid,
        claimed_at: DateTime<Utc>,
    },
    Final {
        record: VerifiedPayment,
    },
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert-if-absent on the signature, as one atomic operation.
    async fn claim(&self, signature: &Signature, lease_ttl: Duration) -> Result<Claim, StoreError>;

    /// Persists the outcome for a held lease. Fails with
    /// [`StoreError::LeaseLost`] if another verifier took over the signature.
    async fn finalize(
        &self,
        lease: &Lease,
        record: VerifiedPayment,
    ) -> Result<VerifiedPayment, StoreError>;

    /// Drops a held lease without recording an outcome.
    async fn release(&self, lease: &Lease) -> Result<(), StoreError>;

    async fn get(&self, signature: &Signature) -> Result<Option<VerifiedPayment>, StoreError>;

    async fn list_for_user(
        &self,
        user_id: &str,
        filter: &PaymentFilter,
    ) -> Result<PaymentPage, StoreError>;

    async fn ping(&self) -> bool;

    fn backend(&self) -> &'static str;
}

enum Slot {
    Pending { token: Uuid, expires_at: Instant },
    Final(VerifiedPayment),
}

/// Process-local store. Atomicity comes from doing each operation under a
/// single lock acquisition.
#[derive(Default)]
pub struct MemoryPaymentStore {
    slots: Mutex<HashMap<Signature, Slot>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn claim(&self, signature: &Signature, lease_ttl: Duration) -> Result<Claim, StoreError> {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();

        match slots.get(signature) {
            Some(Slot::Final(record)) => return Ok(Claim::Finalized(record.clone())),
            Some(Slot::Pending { expires_at, .. }) if *expires_at > now => {
                return Ok(Claim::InFlight)
            }
            Some(Slot::Pending { .. }) => {
                tracing::warn!(%signature, "reclaiming abandoned verification lease");
            }
            None => {}
        }

        let lease = Lease::new(*signature);
        slots.insert(
            *signature,
            Slot::Pending {
                token: lease.token,
                expires_at: now + lease_ttl,
            },
        );
        Ok(Claim::Acquired(lease))
    }

    async fn finalize(
        &self,
        lease: &Lease,
        record: VerifiedPayment,
    ) -> Result<VerifiedPayment, StoreError> {
        let mut slots = self.slots.lock().await;

        let holds_lease = match slots.get(&lease.signature) {
            Some(Slot::Pending { token, .. }) => *token == lease.token,
            // expired and swept: nobody else owns it either
            None => true,
            Some(Slot::Final(_)) => false,
        };
        if !holds_lease {
            return Err(StoreError::LeaseLost(lease.signature));
        }

        slots.insert(lease.signature, Slot::Final(record.clone()));
        Ok(record)
    }

    async fn release(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().await;
        if matches!(
            slots.get(&lease.signature),
            Some(Slot::Pending { token, .. }) if *token == lease.token
        ) {
            slots.remove(&lease.signature);
        }
        Ok(())
    }

    async fn get(&self, signature: &Signature) -> Result<Option<VerifiedPayment>, StoreError> {
        let slots = self.slots.lock().await;
        Ok(match slots.get(signature) {
            Some(Slot::Final(record)) => Some(record.clone()),
            _ => None,
        })
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        filter: &PaymentFilter,
    ) -> Result<PaymentPage, StoreError> {
        let slots = self.slots.lock().await;
        let records = slots.values().filter_map(|slot| match slot {
            Slot::Final(record) if record.user_id == user_id => Some(record.clone()),
            _ => None,
        });
        Ok(filter.apply(records))
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
