use crate::models::{
    ClaimError, Commitment, PaymentClaim, PaymentStatus, RejectionReason, Signature,
    ValidatedClaim, VerificationResult, VerifiedPayment,
};
use crate::services::decoder::decode;
use crate::services::ledger_client::{LedgerClient, LedgerError};
use crate::services::replay_guard::{Claim, Lease, PaymentStore, StoreError};
use crate::services::validation::{validate, Rejection, Verdict, VerificationPolicy};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("invalid claim: {0}")]
    InvalidClaimFormat(#[from] ClaimError),

    #[error("ledger unavailable: {0}")]
    Network(String),

    #[error("verification of {0} is already in progress")]
    InProgress(Signature),

    #[error("too many verifications in progress")]
    Overloaded,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VerificationError {
    /// Whether the caller may resubmit the same claim later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VerificationError::Network(_)
                | VerificationError::InProgress(_)
                | VerificationError::Overloaded
        )
    }
}

#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub commitment: Commitment,
    /// How long a claimed signature stays locked if its verifier dies.
    pub lease_ttl: Duration,
    /// Hard cap on the ledger fetch, retries included. Must be below `lease_ttl`.
    pub fetch_timeout: Duration,
    /// How long a duplicate submission waits for an in-flight verification.
    pub in_flight_wait: Duration,
    pub in_flight_poll: Duration,
    pub max_concurrent: usize,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            commitment: Commitment::Finalized,
            lease_ttl: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(60),
            in_flight_wait: Duration::from_secs(15),
            in_flight_poll: Duration::from_millis(100),
            max_concurrent: 64,
        }
    }
}

/// Verifies payment claims against the ledger, at most once per signature.
pub struct PaymentVerifier {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn PaymentStore>,
    policy: VerificationPolicy,
    settings: VerifierSettings,
    permits: Semaphore,
}

impl PaymentVerifier {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn PaymentStore>,
        policy: VerificationPolicy,
        settings: VerifierSettings,
    ) -> Self {
        let permits = Semaphore::new(settings.max_concurrent.max(1));
        Self {
            ledger,
            store,
            policy,
            settings,
            permits,
        }
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Verifies `claim` on behalf of `user_id`.
    ///
    /// A signature that already has an outcome is answered from the store with
    /// `duplicate = true` and no ledger access. Rejections are persisted and
    /// returned as `Ok`; `Err` means the claim was malformed or the attempt
    /// could not complete.
    pub async fn submit_payment(
        &self,
        user_id: &str,
        claim: &PaymentClaim,
    ) -> Result<VerificationResult, VerificationError> {
        let claim = claim.validate(&self.policy.prices)?;

        let lease = match self.acquire(&claim.signature).await? {
            Ok(lease) => lease,
            Err(existing) => {
                tracing::info!(
                    signature = %claim.signature,
                    status = ?existing.status,
                    "signature already processed"
                );
                return Ok(VerificationResult::new(existing, true));
            }
        };

        // only lease holders take a permit; duplicates waiting above hold none
        let outcome = match self.permit().await {
            Ok(_permit) => self.verify_leased(user_id, &claim, &lease).await,
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            if let Err(release_err) = self.store.release(&lease).await {
                tracing::warn!(
                    signature = %claim.signature,
                    error = %release_err,
                    "failed to release lease; it will expire"
                );
            }
        }
        outcome
    }

    /// Waits for a verification slot, but not so long that the lease could
    /// expire before the fetch completes.
    async fn permit(&self) -> Result<SemaphorePermit<'_>, VerificationError> {
        let budget = self
            .settings
            .lease_ttl
            .saturating_sub(self.settings.fetch_timeout);
        match tokio::time::timeout(budget, self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(VerificationError::Internal(
                "verifier is shutting down".to_string(),
            )),
            Err(_) => {
                tracing::warn!(
                    max_concurrent = self.settings.max_concurrent,
                    "no verification slot became free"
                );
                Err(VerificationError::Overloaded)
            }
        }
    }

    /// Claims the signature, waiting out another verifier's lease if needed.
    /// Returns the existing record instead of a lease once one exists.
    async fn acquire(
        &self,
        signature: &Signature,
    ) -> Result<Result<Lease, VerifiedPayment>, VerificationError> {
        let deadline = Instant::now() + self.settings.in_flight_wait;
        loop {
            match self.store.claim(signature, self.settings.lease_ttl).await? {
                Claim::Acquired(lease) => return Ok(Ok(lease)),
                Claim::Finalized(record) => return Ok(Err(record)),
                Claim::InFlight if Instant::now() >= deadline => {
                    return Err(VerificationError::InProgress(*signature));
                }
                Claim::InFlight => {
                    tracing::debug!(%signature, "waiting for in-flight verification");
                    tokio::time::sleep(self.settings.in_flight_poll).await;
                }
            }
        }
    }

    async fn verify_leased(
        &self,
        user_id: &str,
        claim: &ValidatedClaim,
        lease: &Lease,
    ) -> Result<VerificationResult, VerificationError> {
        let fetch = self
            .ledger
            .fetch_transaction(&claim.signature, claim.network, self.settings.commitment);

        let fetched = match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(signature = %claim.signature, "ledger fetch timed out");
                return Err(VerificationError::Network("ledger fetch timed out".to_string()));
            }
        };

        let verdict = match fetched {
            Ok(raw) => match decode(&raw.message_bytes, &raw.loaded_addresses) {
                Ok(decoded) => validate(claim, &raw, &decoded, &self.policy, Utc::now()),
                Err(e) => {
                    tracing::error!(signature = %claim.signature, error = %e, "transaction decode failed");
                    Verdict::Reject(Rejection::new(
                        RejectionReason::MalformedTransaction,
                        e.to_string(),
                    ))
                }
            },
            Err(LedgerError::NotFound) => Verdict::Reject(Rejection::new(
                RejectionReason::TransactionNotFound,
                format!("transaction not found at {} commitment", self.settings.commitment.as_str()),
            )),
            Err(LedgerError::Malformed(detail)) => {
                tracing::error!(signature = %claim.signature, %detail, "node returned malformed transaction");
                Verdict::Reject(Rejection::new(RejectionReason::MalformedTransaction, detail))
            }
            Err(e) => {
                tracing::warn!(
                    signature = %claim.signature,
                    network = %claim.network,
                    error = %e,
                    transient = e.is_retryable(),
                    "ledger fetch failed"
                );
                return Err(VerificationError::Network(e.to_string()));
            }
        };

        let record = build_record(user_id, claim, &verdict);
        match self.store.finalize(lease, record).await {
            Ok(record) => {
                match &verdict {
                    Verdict::Accept(accepted) => tracing::info!(
                        signature = %claim.signature,
                        user_id,
                        plan = %claim.plan,
                        lamports = accepted.observed_lamports as i64,
                        "payment verified"
                    ),
                    Verdict::Reject(rejection) => tracing::warn!(
                        signature = %claim.signature,
                        user_id,
                        reason = %rejection.reason,
                        detail = %rejection.detail,
                        "payment rejected"
                    ),
                }
                Ok(VerificationResult::new(record, false))
            }
            Err(StoreError::LeaseLost(signature)) => {
                tracing::warn!(%signature, "lease lost before finalize; returning stored outcome");
                match self.store.get(&signature).await? {
                    Some(existing) => Ok(VerificationResult::new(existing, true)),
                    None => Err(StoreError::LeaseLost(signature).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn build_record(user_id: &str, claim: &ValidatedClaim, verdict: &Verdict) -> VerifiedPayment {
    let (status, rejection, observed) = match verdict {
        Verdict::Accept(accepted) => (PaymentStatus::Verified, None, Some(accepted.observed_lamports)),
        Verdict::Reject(rejection) => (
            PaymentStatus::Rejected,
            Some(rejection),
            rejection.observed_lamports,
        ),
    };

    VerifiedPayment {
        signature: claim.signature,
        user_id: user_id.to_string(),
        plan_id: claim.plan,
        wallet_address: claim.wallet,
        amount_sol: claim.amount_sol.clone(),
        amount_lamports: observed.and_then(|l| i64::try_from(l).ok()),
        amount_usd: claim.amount_usd,
        sol_price_at_payment: claim.sol_price_at_payment,
        network: claim.network,
        status,
        rejection_reason: rejection.map(|r| r.reason),
        rejection_detail: rejection.map(|r| r.detail.clone()),
        verified_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{LoadedAddresses, Network, RawTransaction};
    use crate::services::decoder::test_support::legacy_transfer;
    use crate::services::validation::test_support::{raw, transfer_keys};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Ledger double that replays queued responses and counts fetches.
    pub struct MockLedger {
        responses: Mutex<VecDeque<Result<RawTransaction, LedgerError>>>,
        fallback: Result<RawTransaction, LedgerError>,
        delay: Duration,
        pub fetches: AtomicUsize,
    }

    impl MockLedger {
        pub fn returning(response: Result<RawTransaction, LedgerError>) -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                fallback: response,
                delay: Duration::ZERO,
                fetches: AtomicUsize::new(0),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn then(self, response: Result<RawTransaction, LedgerError>) -> Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn fetch_transaction(
            &self,
            _signature: &Signature,
            _network: Network,
            _commitment: Commitment,
        ) -> Result<RawTransaction, LedgerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let queued = self.responses.lock().unwrap().pop_front();
            queued.unwrap_or_else(|| self.fallback.clone())
        }

        async fn health(&self, _network: Network) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    /// A fresh, well-formed transfer of `lamports` to the configured receiver.
    pub fn transfer(lamports: u64) -> RawTransaction {
        let mut tx = raw(lamports);
        tx.block_time = Some(Utc::now().timestamp() - 10);
        tx.message_bytes = legacy_transfer(&transfer_keys());
        tx.loaded_addresses = LoadedAddresses::default();
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::{PaymentStatus, SIGNATURE_LEN};
    use crate::services::replay_guard::MemoryPaymentStore;
    use crate::services::validation::test_support::{policy, sender};
    use serde_json::json;

    const HALF_SOL: u64 = 500_000_000;

    fn claim_for(sig: u8, amount_sol: &str) -> PaymentClaim {
        PaymentClaim {
            signature: Signature::new([sig; SIGNATURE_LEN]).to_string(),
            plan_id: "standard".to_string(),
            wallet_address: sender().to_string(),
            amount_sol: amount_sol.to_string(),
            amount_usd: 50,
            sol_price_at_payment: 100.0,
            network: "devnet".to_string(),
        }
    }

    fn verifier(ledger: Arc<MockLedger>, store: Arc<MemoryPaymentStore>) -> PaymentVerifier {
        PaymentVerifier::new(
            ledger,
            store,
            policy(),
            VerifierSettings {
                in_flight_wait: Duration::from_secs(5),
                in_flight_poll: Duration::from_millis(5),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_matching_transfer_is_verified() {
        let ledger = Arc::new(MockLedger::returning(Ok(transfer(HALF_SOL))));
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = verifier(ledger.clone(), store.clone());

        let result = verifier.submit_payment("alice", &claim_for(1, "0.5")).await.unwrap();

        assert_eq!(result.status, PaymentStatus::Verified);
        assert!(!result.duplicate);
        assert_eq!(result.reason, None);
        assert_eq!(result.payment.user_id, "alice");
        assert_eq!(result.payment.amount_lamports, Some(HALF_SOL as i64));
        assert_eq!(ledger.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_short_transfer_is_rejected_and_persisted() {
        let ledger = Arc::new(MockLedger::returning(Ok(transfer(400_000_000))));
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = verifier(ledger, store.clone());

        let result = verifier.submit_payment("alice", &claim_for(2, "0.5")).await.unwrap();

        assert_eq!(result.status, PaymentStatus::Rejected);
        assert_eq!(result.reason, Some(RejectionReason::AmountMismatch));
        let stored = store
            .get(&Signature::new([2; SIGNATURE_LEN]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.rejection_reason, Some(RejectionReason::AmountMismatch));
        assert!(stored.rejection_detail.unwrap().contains("mismatch"));
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent_without_refetch() {
        let ledger = Arc::new(MockLedger::returning(Ok(transfer(HALF_SOL))));
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = verifier(ledger.clone(), store);
        let claim = claim_for(3, "0.5");

        let first = verifier.submit_payment("alice", &claim).await.unwrap();
        let second = verifier.submit_payment("alice", &claim).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.payment, second.payment);
        assert_eq!(ledger.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_fetch_once() {
        let ledger = Arc::new(
            MockLedger::returning(Ok(transfer(HALF_SOL))).with_delay(Duration::from_millis(50)),
        );
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = Arc::new(verifier(ledger.clone(), store.clone()));
        let claim = claim_for(4, "0.5");

        let (a, b) = tokio::join!(
            verifier.submit_payment("alice", &claim),
            verifier.submit_payment("alice", &claim)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(ledger.fetch_count(), 1);
        assert_eq!(a.payment, b.payment);
        assert_ne!(a.duplicate, b.duplicate);
        assert_eq!(
            store.list_for_user("alice", &Default::default()).await.unwrap().total,
            1
        );
    }

    #[tokio::test]
    async fn test_many_concurrent_submissions_fetch_once() {
        let ledger = Arc::new(
            MockLedger::returning(Ok(transfer(HALF_SOL))).with_delay(Duration::from_millis(20)),
        );
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = Arc::new(verifier(ledger.clone(), store));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let verifier = verifier.clone();
                tokio::spawn(async move { verifier.submit_payment("alice", &claim_for(5, "0.5")).await })
            })
            .collect();
        let results: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(ledger.fetch_count(), 1);
        assert_eq!(results.iter().filter(|r| !r.duplicate).count(), 1);
        assert!(results.iter().all(|r| r.status == PaymentStatus::Verified));
    }

    #[tokio::test]
    async fn test_waiting_duplicates_do_not_block_other_signatures() {
        let ledger = Arc::new(
            MockLedger::returning(Ok(transfer(HALF_SOL))).with_delay(Duration::from_millis(400)),
        );
        let verifier = Arc::new(PaymentVerifier::new(
            ledger.clone(),
            Arc::new(MemoryPaymentStore::new()),
            policy(),
            VerifierSettings {
                max_concurrent: 2,
                in_flight_poll: Duration::from_millis(5),
                ..Default::default()
            },
        ));

        let mut pending = Vec::new();
        for _ in 0..4 {
            let verifier = verifier.clone();
            pending.push(tokio::spawn(async move {
                verifier.submit_payment("alice", &claim_for(20, "0.5")).await
            }));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let started = Instant::now();
        let other = verifier.submit_payment("bob", &claim_for(21, "0.5")).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(other.status, PaymentStatus::Verified);
        assert!(
            elapsed < Duration::from_millis(600),
            "unrelated signature waited {:?}",
            elapsed
        );
        for handle in pending {
            assert_eq!(handle.await.unwrap().unwrap().status, PaymentStatus::Verified);
        }
        assert_eq!(ledger.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_saturated_verifier_releases_lease() {
        let ledger = Arc::new(
            MockLedger::returning(Ok(transfer(HALF_SOL))).with_delay(Duration::from_millis(300)),
        );
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = Arc::new(PaymentVerifier::new(
            ledger,
            store.clone(),
            policy(),
            VerifierSettings {
                max_concurrent: 1,
                lease_ttl: Duration::from_secs(1),
                fetch_timeout: Duration::from_millis(950),
                ..Default::default()
            },
        ));

        let busy = {
            let verifier = verifier.clone();
            tokio::spawn(async move { verifier.submit_payment("alice", &claim_for(22, "0.5")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = verifier.submit_payment("bob", &claim_for(23, "0.5")).await.unwrap_err();
        assert!(matches!(err, VerificationError::Overloaded));
        assert!(err.is_retryable());
        assert!(matches!(
            store
                .claim(&Signature::new([23; SIGNATURE_LEN]), Duration::from_secs(1))
                .await
                .unwrap(),
            Claim::Acquired(_)
        ));
        assert!(busy.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_network_failure_releases_lease_for_retry() {
        let ledger = Arc::new(
            MockLedger::returning(Ok(transfer(HALF_SOL))).then(Err(LedgerError::Transport {
                attempts: 3,
                message: "HTTP 503".to_string(),
            })),
        );
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = verifier(ledger.clone(), store.clone());
        let claim = claim_for(6, "0.5");

        let err = verifier.submit_payment("alice", &claim).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, VerificationError::Network(_)));
        assert!(store.get(&Signature::new([6; SIGNATURE_LEN])).await.unwrap().is_none());

        let retry = verifier.submit_payment("alice", &claim).await.unwrap();
        assert_eq!(retry.status, PaymentStatus::Verified);
        assert!(!retry.duplicate);
        assert_eq!(ledger.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_timeout_releases_lease() {
        let ledger = Arc::new(
            MockLedger::returning(Ok(transfer(HALF_SOL))).with_delay(Duration::from_millis(200)),
        );
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = PaymentVerifier::new(
            ledger,
            store.clone(),
            policy(),
            VerifierSettings {
                fetch_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let sig = Signature::new([7; SIGNATURE_LEN]);

        let err = verifier.submit_payment("alice", &claim_for(7, "0.5")).await.unwrap_err();
        assert!(matches!(err, VerificationError::Network(_)));
        assert!(matches!(
            store.claim(&sig, Duration::from_secs(1)).await.unwrap(),
            Claim::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_not_found_is_persisted_rejection() {
        let ledger = Arc::new(MockLedger::returning(Err(LedgerError::NotFound)));
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = verifier(ledger, store.clone());

        let result = verifier.submit_payment("alice", &claim_for(8, "0.5")).await.unwrap();
        assert_eq!(result.reason, Some(RejectionReason::TransactionNotFound));
        assert!(store.get(&Signature::new([8; SIGNATURE_LEN])).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_malformed_not_missing() {
        let mut tx = transfer(HALF_SOL);
        tx.message_bytes.truncate(70);
        let ledger = Arc::new(MockLedger::returning(Ok(tx)));
        let verifier = verifier(ledger, Arc::new(MemoryPaymentStore::new()));

        let result = verifier.submit_payment("alice", &claim_for(9, "0.5")).await.unwrap();
        assert_eq!(result.reason, Some(RejectionReason::MalformedTransaction));
        assert_eq!(result.payment.amount_lamports, None);
    }

    #[tokio::test]
    async fn test_failed_transaction_is_rejected() {
        let mut tx = transfer(HALF_SOL);
        tx.err = Some(json!({"InstructionError": [0, {"Custom": 1}]}));
        let ledger = Arc::new(MockLedger::returning(Ok(tx)));
        let verifier = verifier(ledger, Arc::new(MemoryPaymentStore::new()));

        let result = verifier.submit_payment("alice", &claim_for(10, "0.5")).await.unwrap();
        assert_eq!(result.reason, Some(RejectionReason::TransactionFailedOnChain));
    }

    #[tokio::test]
    async fn test_invalid_claim_never_touches_ledger_or_store() {
        let ledger = Arc::new(MockLedger::returning(Ok(transfer(HALF_SOL))));
        let store = Arc::new(MemoryPaymentStore::new());
        let verifier = verifier(ledger.clone(), store.clone());

        let mut claim = claim_for(11, "0.5");
        claim.amount_usd = 10;
        let err = verifier.submit_payment("alice", &claim).await.unwrap_err();

        assert!(matches!(err, VerificationError::InvalidClaimFormat(_)));
        assert!(!err.is_retryable());
        assert_eq!(ledger.fetch_count(), 0);
        assert!(matches!(
            store
                .claim(&Signature::new([11; SIGNATURE_LEN]), Duration::from_secs(1))
                .await
                .unwrap(),
            Claim::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn test_waiter_gives_up_on_stuck_lease() {
        let ledger = Arc::new(MockLedger::returning(Ok(transfer(HALF_SOL))));
        let store = Arc::new(MemoryPaymentStore::new());
        let sig = Signature::new([12; SIGNATURE_LEN]);
        store.claim(&sig, Duration::from_secs(60)).await.unwrap();

        let verifier = PaymentVerifier::new(
            ledger.clone(),
            store,
            policy(),
            VerifierSettings {
                in_flight_wait: Duration::from_millis(30),
                in_flight_poll: Duration::from_millis(5),
                ..Default::default()
            },
        );

        let err = verifier.submit_payment("alice", &claim_for(12, "0.5")).await.unwrap_err();
        assert!(matches!(err, VerificationError::InProgress(s) if s == sig));
        assert_eq!(ledger.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_lease_is_taken_over_after_expiry() {
        let ledger = Arc::new(MockLedger::returning(Ok(transfer(HALF_SOL))));
        let store = Arc::new(MemoryPaymentStore::new());
        let sig = Signature::new([13; SIGNATURE_LEN]);
        store.claim(&sig, Duration::from_millis(20)).await.unwrap();

        let verifier = verifier(ledger.clone(), store);
        let result = verifier.submit_payment("alice", &claim_for(13, "0.5")).await.unwrap();

        assert_eq!(result.status, PaymentStatus::Verified);
        assert_eq!(ledger.fetch_count(), 1);
    }
}
