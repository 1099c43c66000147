use crate::models::ledger::{
    parse_sol_amount, AmountParseError, KeyParseError, Network, Pubkey, Signature,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Standard,
    Advanced,
    Enterprise,
}

impl PlanId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Standard => "standard",
            PlanId::Advanced => "advanced",
            PlanId::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "standard" => Ok(PlanId::Standard),
            "advanced" => Ok(PlanId::Advanced),
            "enterprise" => Ok(PlanId::Enterprise),
            other => Err(format!("unknown plan: {}", other)),
        }
    }
}

/// Authoritative fiat price per plan, in whole USD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTable(HashMap<PlanId, i64>);

impl PriceTable {
    pub fn new(prices: HashMap<PlanId, i64>) -> Self {
        Self(prices)
    }

    pub fn price_of(&self, plan: PlanId) -> Option<i64> {
        self.0.get(&plan).copied()
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self(HashMap::from([
            (PlanId::Standard, 50),
            (PlanId::Advanced, 500),
            (PlanId::Enterprise, 1000),
        ]))
    }
}

/// Parses `standard=50,advanced=500,enterprise=1000`.
impl FromStr for PriceTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut prices = HashMap::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (plan, price) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected plan=price, got '{}'", entry))?;
            let plan: PlanId = plan.parse()?;
            let price: i64 = price
                .trim()
                .parse()
                .map_err(|_| format!("invalid price for {}: '{}'", plan, price))?;
            if price <= 0 {
                return Err(format!("price for {} must be positive", plan));
            }
            if prices.insert(plan, price).is_some() {
                return Err(format!("duplicate price entry for {}", plan));
            }
        }
        if prices.is_empty() {
            return Err("price table is empty".to_string());
        }
        Ok(Self(prices))
    }
}

/// A user's unverified statement that they paid for a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentClaim {
    pub signature: String,
    pub plan_id: String,
    pub wallet_address: String,
    pub amount_sol: String,
    pub amount_usd: i64,
    pub sol_price_at_payment: f64,
    pub network: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClaimError {
    #[error("invalid signature: {0}")]
    Signature(KeyParseError),

    #[error("invalid wallet address: {0}")]
    WalletAddress(KeyParseError),

    #[error("invalid plan: {0}")]
    Plan(String),

    #[error("invalid price for plan {plan}: expected {expected}, got {got}")]
    PriceMismatch { plan: PlanId, expected: i64, got: i64 },

    #[error("invalid SOL amount: {0}")]
    Amount(AmountParseError),

    #[error("{0}")]
    Network(String),

    #[error("invalid SOL price at payment: {0}")]
    FiatPrice(f64),
}

/// A claim whose fields have been parsed and checked against the price table.
#[derive(Debug, Clone)]
pub struct ValidatedClaim {
    pub signature: Signature,
    pub plan: PlanId,
    pub wallet: Pubkey,
    pub amount_sol: String,
    pub lamports: u64,
    pub amount_usd: i64,
    pub sol_price_at_payment: f64,
    pub network: Network,
}

impl PaymentClaim {
    /// Syntactic and price-table checks. Performs no I/O.
    pub fn validate(&self, prices: &PriceTable) -> Result<ValidatedClaim, ClaimError> {
        let signature: Signature = self.signature.parse().map_err(ClaimError::Signature)?;
        let plan: PlanId = self.plan_id.parse().map_err(ClaimError::Plan)?;

        let expected = prices
            .price_of(plan)
            .ok_or_else(|| ClaimError::Plan(format!("{} is not for sale", plan)))?;
        if expected != self.amount_usd {
            return Err(ClaimError::PriceMismatch {
                plan,
                expected,
                got: self.amount_usd,
            });
        }

        let wallet: Pubkey = self
            .wallet_address
            .parse()
            .map_err(ClaimError::WalletAddress)?;
        let lamports = parse_sol_amount(&self.amount_sol).map_err(ClaimError::Amount)?;
        let network: Network = self.network.parse().map_err(ClaimError::Network)?;

        if !self.sol_price_at_payment.is_finite() || self.sol_price_at_payment <= 0.0 {
            return Err(ClaimError::FiatPrice(self.sol_price_at_payment));
        }

        Ok(ValidatedClaim {
            signature,
            plan,
            wallet,
            amount_sol: self.amount_sol.trim().to_string(),
            lamports,
            amount_usd: self.amount_usd,
            sol_price_at_payment: self.sol_price_at_payment,
            network,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Verified,
    Rejected,
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "verified" => Ok(PaymentStatus::Verified),
            "rejected" => Ok(PaymentStatus::Rejected),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Terminal, persisted reasons a transaction does not prove the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    TransactionNotFound,
    MalformedTransaction,
    TransactionFailedOnChain,
    TransactionStale,
    AccountNotFound,
    AmountMismatch,
    PlanInvalid,
}

impl RejectionReason {
    pub const ALL: [RejectionReason; 7] = [
        RejectionReason::TransactionNotFound,
        RejectionReason::MalformedTransaction,
        RejectionReason::TransactionFailedOnChain,
        RejectionReason::TransactionStale,
        RejectionReason::AccountNotFound,
        RejectionReason::AmountMismatch,
        RejectionReason::PlanInvalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::TransactionNotFound => "TransactionNotFound",
            RejectionReason::MalformedTransaction => "MalformedTransaction",
            RejectionReason::TransactionFailedOnChain => "TransactionFailedOnChain",
            RejectionReason::TransactionStale => "TransactionStale",
            RejectionReason::AccountNotFound => "AccountNotFound",
            RejectionReason::AmountMismatch => "AmountMismatch",
            RejectionReason::PlanInvalid => "PlanInvalid",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ledger-of-record entry for one signature. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedPayment {
    pub signature: Signature,
    pub user_id: String,
    pub plan_id: PlanId,
    pub wallet_address: Pubkey,
    pub amount_sol: String,
    /// Recipient balance delta observed on chain, when it could be computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_lamports: Option<i64>,
    pub amount_usd: i64,
    pub sol_price_at_payment: f64,
    pub network: Network,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_detail: Option<String>,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    /// True when the signature had already been processed; `payment` is the
    /// original outcome.
    pub duplicate: bool,
    pub payment: VerifiedPayment,
}

impl VerificationResult {
    pub fn new(payment: VerifiedPayment, duplicate: bool) -> Self {
        Self {
            status: payment.status,
            reason: payment.rejection_reason,
            duplicate,
            payment,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    VerifiedAt,
    AmountUsd,
    AmountSol,
    Status,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::VerifiedAt => "verified_at",
            SortField::AmountUsd => "amount_usd",
            SortField::AmountSol => "amount_sol",
            SortField::Status => "status",
        }
    }

    /// Unknown fields fall back to the default ordering.
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim() {
            "amount_usd" => SortField::AmountUsd,
            "amount_sol" => SortField::AmountSol,
            "status" => SortField::Status,
            _ => SortField::VerifiedAt,
        }
    }

    fn compare(&self, a: &VerifiedPayment, b: &VerifiedPayment) -> Ordering {
        match self {
            SortField::VerifiedAt => a.verified_at.cmp(&b.verified_at),
            SortField::AmountUsd => a.amount_usd.cmp(&b.amount_usd),
            SortField::AmountSol => claimed_lamports(a).cmp(&claimed_lamports(b)),
            SortField::Status => a.status.cmp(&b.status),
        }
        .then_with(|| a.verified_at.cmp(&b.verified_at))
    }
}

// stored amounts were validated on the way in
fn claimed_lamports(payment: &VerifiedPayment) -> u64 {
    parse_sol_amount(&payment.amount_sol).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// Anything other than `asc` sorts descending.
    pub fn parse_or_default(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

/// Read-side query over a user's payment records.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub plan_id: Option<PlanId>,
    pub wallet_address: Option<Pubkey>,
    /// Inclusive lower bound on `verified_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `verified_at`.
    pub until: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: Option<usize>,
    pub skip: usize,
}

/// One page of a filtered listing. `total` counts every match before
/// pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentPage {
    pub payments: Vec<VerifiedPayment>,
    pub total: usize,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &VerifiedPayment) -> bool {
        self.status.map_or(true, |s| payment.status == s)
            && self.plan_id.map_or(true, |p| payment.plan_id == p)
            && self
                .wallet_address
                .map_or(true, |w| payment.wallet_address == w)
            && self.from.map_or(true, |from| payment.verified_at >= from)
            && self.until.map_or(true, |until| payment.verified_at < until)
    }

    /// Filters, sorts and paginates.
    pub fn apply(&self, payments: impl IntoIterator<Item = VerifiedPayment>) -> PaymentPage {
        let mut matched: Vec<_> = payments.into_iter().filter(|p| self.matches(p)).collect();
        matched.sort_by(|a, b| match self.sort_order {
            SortOrder::Asc => self.sort_by.compare(a, b),
            SortOrder::Desc => self.sort_by.compare(b, a),
        });

        let total = matched.len();
        let payments = matched
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        PaymentPage { payments, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::{PUBKEY_LEN, SIGNATURE_LEN};

    fn claim() -> PaymentClaim {
        PaymentClaim {
            signature: Signature::new([3u8; SIGNATURE_LEN]).to_string(),
            plan_id: "standard".to_string(),
            wallet_address: Pubkey::new([4u8; PUBKEY_LEN]).to_string(),
            amount_sol: "0.5".to_string(),
            amount_usd: 50,
            sol_price_at_payment: 100.0,
            network: "devnet".to_string(),
        }
    }

    fn record(user: &str, status: PaymentStatus, secs: i64) -> VerifiedPayment {
        VerifiedPayment {
            signature: Signature::new([secs as u8; SIGNATURE_LEN]),
            user_id: user.to_string(),
            plan_id: PlanId::Standard,
            wallet_address: Pubkey::new([4u8; PUBKEY_LEN]),
            amount_sol: "0.5".to_string(),
            amount_lamports: Some(500_000_000),
            amount_usd: 50,
            sol_price_at_payment: 100.0,
            network: Network::Devnet,
            status,
            rejection_reason: None,
            rejection_detail: None,
            verified_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_default_price_table() {
        let prices = PriceTable::default();
        assert_eq!(prices.price_of(PlanId::Standard), Some(50));
        assert_eq!(prices.price_of(PlanId::Advanced), Some(500));
        assert_eq!(prices.price_of(PlanId::Enterprise), Some(1000));
    }

    #[test]
    fn test_price_table_from_str() {
        let prices: PriceTable = "standard=60, enterprise=2000".parse().unwrap();
        assert_eq!(prices.price_of(PlanId::Standard), Some(60));
        assert_eq!(prices.price_of(PlanId::Advanced), None);

        assert!("standard".parse::<PriceTable>().is_err());
        assert!("gold=10".parse::<PriceTable>().is_err());
        assert!("standard=-1".parse::<PriceTable>().is_err());
        assert!("standard=1,standard=2".parse::<PriceTable>().is_err());
        assert!("".parse::<PriceTable>().is_err());
    }

    #[test]
    fn test_valid_claim() {
        let validated = claim().validate(&PriceTable::default()).unwrap();
        assert_eq!(validated.plan, PlanId::Standard);
        assert_eq!(validated.lamports, 500_000_000);
        assert_eq!(validated.network, Network::Devnet);
    }

    #[test]
    fn test_claim_price_must_match_table() {
        let mut c = claim();
        c.amount_usd = 49;
        assert_eq!(
            c.validate(&PriceTable::default()).unwrap_err(),
            ClaimError::PriceMismatch {
                plan: PlanId::Standard,
                expected: 50,
                got: 49
            }
        );
    }

    #[test]
    fn test_claim_plan_missing_from_table() {
        let prices: PriceTable = "advanced=500".parse().unwrap();
        assert!(matches!(claim().validate(&prices), Err(ClaimError::Plan(_))));
    }

    #[test]
    fn test_claim_rejects_bad_fields() {
        let prices = PriceTable::default();

        let mut c = claim();
        c.signature = "not-a-signature".to_string();
        assert!(matches!(c.validate(&prices), Err(ClaimError::Signature(_))));

        let mut c = claim();
        c.plan_id = "platinum".to_string();
        assert!(matches!(c.validate(&prices), Err(ClaimError::Plan(_))));

        let mut c = claim();
        c.wallet_address = Signature::new([1u8; SIGNATURE_LEN]).to_string();
        assert!(matches!(c.validate(&prices), Err(ClaimError::WalletAddress(_))));

        let mut c = claim();
        c.amount_sol = "half".to_string();
        assert!(matches!(c.validate(&prices), Err(ClaimError::Amount(_))));

        let mut c = claim();
        c.network = "testnet".to_string();
        assert!(matches!(c.validate(&prices), Err(ClaimError::Network(_))));

        let mut c = claim();
        c.sol_price_at_payment = f64::NAN;
        assert!(matches!(c.validate(&prices), Err(ClaimError::FiatPrice(_))));
    }

    #[test]
    fn test_rejection_reason_serializes_as_name() {
        let json = serde_json::to_string(&RejectionReason::AmountMismatch).unwrap();
        assert_eq!(json, "\"AmountMismatch\"");
        for reason in RejectionReason::ALL {
            assert_eq!(format!("\"{}\"", reason), serde_json::to_string(&reason).unwrap());
        }
    }

    #[test]
    fn test_filter_orders_newest_first_and_paginates() {
        let records = vec![
            record("u1", PaymentStatus::Verified, 1),
            record("u1", PaymentStatus::Rejected, 3),
            record("u1", PaymentStatus::Verified, 2),
        ];

        let all = PaymentFilter::default().apply(records.clone());
        let order: Vec<_> = all.payments.iter().map(|p| p.verified_at.timestamp()).collect();
        assert_eq!(order, vec![1_700_000_003, 1_700_000_002, 1_700_000_001]);
        assert_eq!(all.total, 3);

        let verified = PaymentFilter {
            status: Some(PaymentStatus::Verified),
            skip: 1,
            limit: Some(5),
            ..Default::default()
        }
        .apply(records);
        assert_eq!(verified.payments.len(), 1);
        assert_eq!(verified.total, 2);
        assert_eq!(verified.payments[0].verified_at.timestamp(), 1_700_000_001);
    }

    #[test]
    fn test_filter_date_range_is_half_open() {
        let records: Vec<_> = (1..=5)
            .map(|n| record("u1", PaymentStatus::Verified, n))
            .collect();
        let at = |secs: i64| DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap();

        let page = PaymentFilter {
            from: Some(at(2)),
            until: Some(at(4)),
            ..Default::default()
        }
        .apply(records);

        let stamps: Vec<_> = page.payments.iter().map(|p| p.verified_at).collect();
        assert_eq!(stamps, vec![at(3), at(2)]);
    }

    #[test]
    fn test_filter_sorts_by_whitelisted_field() {
        let mut cheap = record("u1", PaymentStatus::Verified, 1);
        cheap.amount_sol = "0.25".to_string();
        let mut pricey = record("u1", PaymentStatus::Verified, 2);
        pricey.amount_sol = "2.5".to_string();
        let mut mid = record("u1", PaymentStatus::Rejected, 3);
        mid.amount_sol = "1".to_string();

        let page = PaymentFilter {
            sort_by: SortField::AmountSol,
            sort_order: SortOrder::Asc,
            ..Default::default()
        }
        .apply(vec![pricey, cheap, mid]);
        let amounts: Vec<_> = page.payments.iter().map(|p| p.amount_sol.as_str()).collect();
        assert_eq!(amounts, vec!["0.25", "1", "2.5"]);

        assert_eq!(SortField::parse_or_default("amount_usd"), SortField::AmountUsd);
        assert_eq!(SortField::parse_or_default("password"), SortField::VerifiedAt);
        assert_eq!(SortOrder::parse_or_default("ASC"), SortOrder::Asc);
        assert_eq!(SortOrder::parse_or_default("sideways"), SortOrder::Desc);
    }
}
