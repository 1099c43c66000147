pub mod analytics;
pub mod decoder;
pub mod ledger_client;
pub mod redis_store;
pub mod replay_guard;
pub mod validation;
pub mod verifier;

pub use analytics::Analytics;
pub use decoder::{decode, DecodeError};
pub use ledger_client::{LedgerClient, LedgerConfig, LedgerError, RpcLedgerClient};
pub use redis_store::{connect_store, RedisPaymentStore};
pub use replay_guard::{Claim, Lease, MemoryPaymentStore, PaymentStore, StoreError};
pub use validation::{Verdict, VerificationPolicy};
pub use verifier::{PaymentVerifier, VerificationError, VerifierSettings};
