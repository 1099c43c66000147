//! Ordered, pure checks that decide whether a fetched transaction proves a
//! payment claim.
//!
//! Every stage returns a [`Check`]; [`validate`] runs them in a fixed order
//! and stops at the first rejection. Nothing here performs I/O.

use crate::models::{
    format_sol, DecodedMessage, PlanId, PriceTable, Pubkey, RawTransaction, RejectionReason,
    ValidatedClaim,
};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Business rules applied to every claim.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub receiving_wallet: Pubkey,
    pub prices: PriceTable,
    pub freshness_window: Duration,
    /// Allowed |observed - claimed| in lamports.
    pub amount_tolerance: u64,
}

impl VerificationPolicy {
    pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(60 * 60);
    /// 0.001 SOL
    pub const DEFAULT_AMOUNT_TOLERANCE: u64 = 1_000_000;

    pub fn new(receiving_wallet: Pubkey) -> Self {
        Self {
            receiving_wallet,
            prices: PriceTable::default(),
            freshness_window: Self::DEFAULT_FRESHNESS_WINDOW,
            amount_tolerance: Self::DEFAULT_AMOUNT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub detail: String,
    pub observed_lamports: Option<i128>,
}

impl Rejection {
    pub fn new(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            observed_lamports: None,
        }
    }

    fn with_observed(mut self, lamports: i128) -> Self {
        self.observed_lamports = Some(lamports);
        self
    }
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check<T = ()> {
    Pass(T),
    Reject(Rejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub observed_lamports: i128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept(Accepted),
    Reject(Rejection),
}

impl Verdict {
    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            Verdict::Accept(_) => None,
            Verdict::Reject(r) => Some(r.reason),
        }
    }
}

/// Runs the five checks in order: execution, freshness, parties, amount, plan.
pub fn validate(
    claim: &ValidatedClaim,
    raw: &RawTransaction,
    decoded: &DecodedMessage,
    policy: &VerificationPolicy,
    now: DateTime<Utc>,
) -> Verdict {
    if let Check::Reject(r) = check_execution(raw) {
        return Verdict::Reject(r);
    }

    if let Check::Reject(r) = check_freshness(raw.block_time, now, policy.freshness_window) {
        return Verdict::Reject(r);
    }

    let recipient_index = match check_parties(decoded, &claim.wallet, &policy.receiving_wallet) {
        Check::Pass(index) => index,
        Check::Reject(r) => return Verdict::Reject(r),
    };

    let observed = match check_amount(raw, recipient_index, claim.lamports, policy.amount_tolerance) {
        Check::Pass(observed) => observed,
        Check::Reject(r) => return Verdict::Reject(r),
    };

    if let Check::Reject(r) = check_plan(claim.plan, claim.amount_usd, &policy.prices) {
        return Verdict::Reject(r.with_observed(observed));
    }

    Verdict::Accept(Accepted {
        observed_lamports: observed,
    })
}

pub fn check_execution(raw: &RawTransaction) -> Check {
    match &raw.err {
        None => Check::Pass(()),
        Some(err) => Check::Reject(Rejection::new(
            RejectionReason::TransactionFailedOnChain,
            format!("transaction failed on-chain: {}", err),
        )),
    }
}

/// A transaction exactly `window` old is still fresh. Block times ahead of
/// `now` (clock skew) are accepted.
pub fn check_freshness(block_time: Option<i64>, now: DateTime<Utc>, window: Duration) -> Check {
    let Some(block_time) = block_time else {
        return Check::Reject(Rejection::new(
            RejectionReason::TransactionStale,
            "transaction block time not available",
        ));
    };

    let age = now.timestamp().saturating_sub(block_time);
    let window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
    if age > window_secs {
        return Check::Reject(Rejection::new(
            RejectionReason::TransactionStale,
            format!("transaction is {}s old, limit is {}s", age, window_secs),
        ));
    }
    Check::Pass(())
}

/// Both parties must appear among the account keys; passes the recipient's
/// index, which addresses its balances.
pub fn check_parties(decoded: &DecodedMessage, sender: &Pubkey, recipient: &Pubkey) -> Check<usize> {
    let Some(recipient_index) = decoded.position_of(recipient) else {
        return Check::Reject(Rejection::new(
            RejectionReason::AccountNotFound,
            format!("recipient wallet {} not found in transaction", recipient),
        ));
    };
    if !decoded.contains(sender) {
        return Check::Reject(Rejection::new(
            RejectionReason::AccountNotFound,
            format!("sender wallet {} not found in transaction", sender),
        ));
    }
    Check::Pass(recipient_index)
}

/// Compares the recipient's balance delta with the claimed amount; passes the
/// observed delta in lamports.
pub fn check_amount(
    raw: &RawTransaction,
    recipient_index: usize,
    claimed_lamports: u64,
    tolerance: u64,
) -> Check<i128> {
    let (Some(&pre), Some(&post)) = (
        raw.pre_balances.get(recipient_index),
        raw.post_balances.get(recipient_index),
    ) else {
        return Check::Reject(Rejection::new(
            RejectionReason::AccountNotFound,
            format!("no balance data for recipient at index {}", recipient_index),
        ));
    };

    let observed = i128::from(post) - i128::from(pre);
    let difference = (observed - i128::from(claimed_lamports)).abs();
    if difference > i128::from(tolerance) {
        return Check::Reject(
            Rejection::new(
                RejectionReason::AmountMismatch,
                format!(
                    "transfer amount mismatch: expected {} SOL, found {} SOL",
                    format_sol(i128::from(claimed_lamports)),
                    format_sol(observed)
                ),
            )
            .with_observed(observed),
        );
    }
    Check::Pass(observed)
}

pub fn check_plan(plan: PlanId, amount_usd: i64, prices: &PriceTable) -> Check {
    match prices.price_of(plan) {
        Some(price) if price == amount_usd => Check::Pass(()),
        Some(price) => Check::Reject(Rejection::new(
            RejectionReason::PlanInvalid,
            format!("plan {} costs {} USD, claim says {}", plan, price, amount_usd),
        )),
        None => Check::Reject(Rejection::new(
            RejectionReason::PlanInvalid,
            format!("plan {} is not for sale", plan),
        )),
    }
}
