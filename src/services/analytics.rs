use crate::{
    models::{RejectionReason, Stats, VerificationResult},
    services::verifier::VerificationError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-local verification counters.
pub struct Analytics {
    submissions: AtomicU64,
    verified: AtomicU64,
    rejected: AtomicU64,
    duplicates: AtomicU64,
    invalid_claims: AtomicU64,
    network_failures: AtomicU64,
    by_reason: [AtomicU64; RejectionReason::ALL.len()],
    start_time: Instant,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    pub fn new() -> Self {
        Self {
            submissions: AtomicU64::new(0),
            verified: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            invalid_claims: AtomicU64::new(0),
            network_failures: AtomicU64::new(0),
            by_reason: Default::default(),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, outcome: &Result<VerificationResult, VerificationError>) {
        self.submissions.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(result) if result.duplicate => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
            }
            Ok(result) => match result.reason {
                None => {
                    self.verified.fetch_add(1, Ordering::Relaxed);
                }
                Some(reason) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    self.by_reason[reason_slot(reason)].fetch_add(1, Ordering::Relaxed);
                }
            },
            Err(VerificationError::InvalidClaimFormat(_)) => {
                self.invalid_claims.fetch_add(1, Ordering::Relaxed);
            }
            Err(VerificationError::Network(_)) => {
                self.network_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }
    }

    pub fn get_stats(&self) -> Stats {
        let rejections_by_reason = RejectionReason::ALL
            .iter()
            .map(|reason| {
                (
                    reason.to_string(),
                    self.by_reason[reason_slot(*reason)].load(Ordering::Relaxed),
                )
            })
            .collect::<BTreeMap<_, _>>();

        Stats {
            submissions: self.submissions.load(Ordering::Relaxed),
            verified: self.verified.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            invalid_claims: self.invalid_claims.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            rejections_by_reason,
            uptime_seconds: self.uptime_seconds(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

fn reason_slot(reason: RejectionReason) -> usize {
    RejectionReason::ALL
        .iter()
        .position(|r| *r == reason)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClaimError, PaymentStatus};
    use crate::services::replay_guard::test_support::{record, signature};

    fn rejected(reason: RejectionReason) -> VerificationResult {
        let mut payment = record(signature(1), "alice");
        payment.status = PaymentStatus::Rejected;
        payment.rejection_reason = Some(reason);
        VerificationResult::new(payment, false)
    }

    #[test]
    fn test_outcomes_are_counted_separately() {
        let analytics = Analytics::new();

        analytics.record(&Ok(VerificationResult::new(record(signature(1), "alice"), false)));
        analytics.record(&Ok(VerificationResult::new(record(signature(1), "alice"), true)));
        analytics.record(&Ok(rejected(RejectionReason::AmountMismatch)));
        analytics.record(&Ok(rejected(RejectionReason::AmountMismatch)));
        analytics.record(&Err(VerificationError::InvalidClaimFormat(ClaimError::Plan(
            "gold".to_string(),
        ))));
        analytics.record(&Err(VerificationError::Network("timeout".to_string())));

        let stats = analytics.get_stats();
        assert_eq!(stats.submissions, 6);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.invalid_claims, 1);
        assert_eq!(stats.network_failures, 1);
        assert_eq!(stats.rejections_by_reason["AmountMismatch"], 2);
        assert_eq!(stats.rejections_by_reason["TransactionStale"], 0);
        assert_eq!(stats.rejections_by_reason.len(), RejectionReason::ALL.len());
    }
}
