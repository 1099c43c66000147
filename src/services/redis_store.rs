use crate::models::{PaymentFilter, PaymentPage, Signature, VerifiedPayment};
use crate::services::replay_guard::{Claim, Lease, MemoryPaymentStore, PaymentStore, StoreError, StoredSlot};
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Writes the final record only while the caller's lease token is current.
/// A vanished slot means the lease expired unclaimed, which is still ours.
const FINALIZE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
    local slot = cjson.decode(current)
    if slot.state ~= 'pending' or slot.token ~= ARGV[1] then
        return 0
    end
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('ZADD', KEYS[2], ARGV[3], ARGV[4])
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
local slot = cjson.decode(current)
if slot.state == 'pending' and slot.token == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn slot_key(signature: &Signature) -> String {
    format!("payment:{}", signature)
}

fn user_index_key(user_id: &str) -> String {
    format!("user_payments:{}", user_id)
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Shared ledger-of-record in Redis. The claim is `SET NX PX`, so lease
/// expiry is enforced by Redis itself.
pub struct RedisPaymentStore {
    redis: redis::aio::ConnectionManager,
    finalized: Cache<Signature, VerifiedPayment>,
    finalize_script: redis::Script,
    release_script: redis::Script,
}

impl RedisPaymentStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = client.get_connection_manager().await?;

        // final records never change, so they can be cached indefinitely
        let finalized = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(Duration::from_secs(60 * 60))
            .build();

        Ok(Self {
            redis,
            finalized,
            finalize_script: redis::Script::new(FINALIZE_SCRIPT),
            release_script: redis::Script::new(RELEASE_SCRIPT),
        })
    }

    async fn read_slot(&self, signature: &Signature) -> Result<Option<StoredSlot>, StoreError> {
        let mut redis = self.redis.clone();
        let stored: Option<String> = redis.get(slot_key(signature)).await?;
        stored
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }
}

#[async_trait]
impl PaymentStore for RedisPaymentStore {
    async fn claim(&self, signature: &Signature, lease_ttl: Duration) -> Result<Claim, StoreError> {
        if let Some(record) = self.finalized.get(signature).await {
            tracing::debug!(%signature, "finalized record served from memory");
            return Ok(Claim::Finalized(record));
        }

        let token = Uuid::new_v4();
        let pending = serde_json::to_string(&StoredSlot::Pending {
            token,
            claimed_at: Utc::now(),
        })?;

        let mut redis = self.redis.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(slot_key(signature))
            .arg(pending)
            .arg("NX")
            .arg("PX")
            .arg(lease_ttl.as_millis().max(1) as u64)
            .query_async(&mut redis)
            .await?;

        if acquired.is_some() {
            return Ok(Claim::Acquired(Lease {
                signature: *signature,
                token,
            }));
        }

        match self.read_slot(signature).await? {
            Some(StoredSlot::Final { record }) => {
                self.finalized.insert(*signature, record.clone()).await;
                Ok(Claim::Finalized(record))
            }
            // pending, or expired between SET and GET; the caller polls again
            _ => Ok(Claim::InFlight),
        }
    }

    async fn finalize(
        &self,
        lease: &Lease,
        record: VerifiedPayment,
    ) -> Result<VerifiedPayment, StoreError> {
        let stored = serde_json::to_string(&StoredSlot::Final {
            record: record.clone(),
        })?;

        let mut redis = self.redis.clone();
        let written: i64 = self
            .finalize_script
            .key(slot_key(&lease.signature))
            .key(user_index_key(&record.user_id))
            .arg(lease.token.to_string())
            .arg(stored)
            .arg(record.verified_at.timestamp_millis())
            .arg(lease.signature.to_string())
            .invoke_async(&mut redis)
            .await?;

        if written == 0 {
            return Err(StoreError::LeaseLost(lease.signature));
        }

        self.finalized.insert(lease.signature, record.clone()).await;
        tracing::debug!(signature = %lease.signature, "outcome persisted");
        Ok(record)
    }

    async fn release(&self, lease: &Lease) -> Result<(), StoreError> {
        let mut redis = self.redis.clone();
        let _: i64 = self
            .release_script
            .key(slot_key(&lease.signature))
            .arg(lease.token.to_string())
            .invoke_async(&mut redis)
            .await?;
        Ok(())
    }

    async fn get(&self, signature: &Signature) -> Result<Option<VerifiedPayment>, StoreError> {
        if let Some(record) = self.finalized.get(signature).await {
            return Ok(Some(record));
        }

        match self.read_slot(signature).await? {
            Some(StoredSlot::Final { record }) => {
                self.finalized.insert(*signature, record.clone()).await;
                Ok(Some(record))
            }
            _ => Ok(None),
        }
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        filter: &PaymentFilter,
    ) -> Result<PaymentPage, StoreError> {
        let mut redis = self.redis.clone();
        let signatures: Vec<String> = redis.zrevrange(user_index_key(user_id), 0, -1).await?;
        if signatures.is_empty() {
            return Ok(PaymentPage::default());
        }

        let keys: Vec<String> = signatures.iter().map(|s| format!("payment:{}", s)).collect();
        let stored: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut redis)
            .await?;

        let mut records = Vec::with_capacity(stored.len());
        for json in stored.into_iter().flatten() {
            match serde_json::from_str::<StoredSlot>(&json) {
                Ok(StoredSlot::Final { record }) if record.user_id == user_id => records.push(record),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping unreadable payment record"),
            }
        }
        Ok(filter.apply(records))
    }

    async fn ping(&self) -> bool {
        let mut redis = self.redis.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut redis)
            .await
            .is_ok()
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

/// Connects to Redis, falling back to a process-local store when it is
/// unreachable. The fallback only guarantees at-most-once within this process.
pub async fn connect_store(redis_url: &str) -> Arc<dyn PaymentStore> {
    match RedisPaymentStore::connect(redis_url).await {
        Ok(store) => {
            tracing::info!("Redis connected successfully");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                "Redis connection failed: {}, using in-memory payment store (single instance only)",
                e
            );
            Arc::new(MemoryPaymentStore::new())
        }
    }
}
