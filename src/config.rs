use crate::models::{parse_sol_amount, Commitment, PriceTable, Pubkey};
use crate::services::{LedgerConfig, VerificationPolicy, VerifierSettings};
use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Receiving side
    pub wallet_address: Pubkey,
    pub plan_prices: PriceTable,
    pub freshness_window: Duration,
    pub amount_tolerance_lamports: u64,

    // Solana RPC
    pub mainnet_rpc_url: String,
    pub devnet_rpc_url: String,
    pub rpc_timeout: Duration,
    pub rpc_max_attempts: u32,
    pub rpc_backoff: Duration,
    pub commitment: Commitment,

    // Ledger-of-record
    pub redis_url: String,
    pub lease_ttl: Duration,
    pub in_flight_wait: Duration,
    pub max_concurrent_verifications: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let environment = Self::parse_environment(&var("ENVIRONMENT", "development"))?;

        let wallet = lookup("WALLET_ADDRESS").context("WALLET_ADDRESS required")?;
        let wallet_address: Pubkey = wallet
            .trim()
            .parse()
            .context("Invalid WALLET_ADDRESS")?;

        let plan_prices: PriceTable = var("PLAN_PRICES", "standard=50,advanced=500,enterprise=1000")
            .parse()
            .map_err(|e| anyhow!("Invalid PLAN_PRICES: {}", e))?;

        let commitment: Commitment = var("RPC_COMMITMENT", "finalized")
            .parse()
            .map_err(|e| anyhow!("Invalid RPC_COMMITMENT: {}", e))?;

        let amount_tolerance_lamports = parse_sol_amount(&var("AMOUNT_TOLERANCE_SOL", "0.001"))
            .context("Invalid AMOUNT_TOLERANCE_SOL")?;

        let config = Self {
            environment,
            host: var("HOST", "0.0.0.0"),
            port: var("PORT", "8080").parse().context("Invalid PORT")?,

            wallet_address,
            plan_prices,
            freshness_window: Duration::from_secs(
                var("FRESHNESS_WINDOW_SECS", "3600")
                    .parse()
                    .context("Invalid FRESHNESS_WINDOW_SECS")?,
            ),
            amount_tolerance_lamports,

            mainnet_rpc_url: var("SOLANA_MAINNET_RPC_URL", "https://api.mainnet-beta.solana.com"),
            devnet_rpc_url: var("SOLANA_DEVNET_RPC_URL", "https://api.devnet.solana.com"),
            rpc_timeout: Duration::from_secs(
                var("RPC_TIMEOUT_SECS", "8")
                    .parse()
                    .context("Invalid RPC_TIMEOUT_SECS")?,
            ),
            rpc_max_attempts: var("RPC_MAX_ATTEMPTS", "3")
                .parse()
                .context("Invalid RPC_MAX_ATTEMPTS")?,
            rpc_backoff: Duration::from_millis(
                var("RPC_BACKOFF_MS", "250")
                    .parse()
                    .context("Invalid RPC_BACKOFF_MS")?,
            ),
            commitment,

            redis_url: var("REDIS_URL", "redis://localhost:6379"),
            lease_ttl: Duration::from_secs(
                var("LEASE_TTL_SECS", "120")
                    .parse()
                    .context("Invalid LEASE_TTL_SECS")?,
            ),
            in_flight_wait: Duration::from_secs(
                var("IN_FLIGHT_WAIT_SECS", "15")
                    .parse()
                    .context("Invalid IN_FLIGHT_WAIT_SECS")?,
            ),
            max_concurrent_verifications: var("MAX_CONCURRENT_VERIFICATIONS", "64")
                .parse()
                .context("Invalid MAX_CONCURRENT_VERIFICATIONS")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn parse_environment(env: &str) -> Result<Environment> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("SOLANA_MAINNET_RPC_URL", &self.mainnet_rpc_url),
            ("SOLANA_DEVNET_RPC_URL", &self.devnet_rpc_url),
        ] {
            if !url.starts_with("http") {
                bail!("{} must be HTTP(S) URL", name);
            }
        }

        if self.rpc_max_attempts == 0 {
            bail!("RPC_MAX_ATTEMPTS must be at least 1");
        }
        if self.max_concurrent_verifications == 0 {
            bail!("MAX_CONCURRENT_VERIFICATIONS must be at least 1");
        }
        if self.lease_ttl.is_zero() {
            bail!("LEASE_TTL_SECS must be positive");
        }
        // a lease must outlive the slowest fetch or a second verifier can start
        if self.fetch_timeout() >= self.lease_ttl {
            bail!(
                "LEASE_TTL_SECS ({}s) must exceed the worst-case RPC time ({}s)",
                self.lease_ttl.as_secs(),
                self.fetch_timeout().as_secs()
            );
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }

    /// Upper bound on one ledger fetch: every attempt times out and every
    /// backoff is taken, plus a second of slack.
    fn fetch_timeout(&self) -> Duration {
        let attempts = self.rpc_max_attempts.max(1);
        let backoff: Duration = (0..attempts - 1)
            .map(|n| self.rpc_backoff.saturating_mul(1 << n.min(8)))
            .sum();
        self.rpc_timeout.saturating_mul(attempts) + backoff + Duration::from_secs(1)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            mainnet_url: self.mainnet_rpc_url.clone(),
            devnet_url: self.devnet_rpc_url.clone(),
            request_timeout: self.rpc_timeout,
            max_attempts: self.rpc_max_attempts,
            backoff: self.rpc_backoff,
        }
    }

    pub fn policy(&self) -> VerificationPolicy {
        VerificationPolicy {
            receiving_wallet: self.wallet_address,
            prices: self.plan_prices.clone(),
            freshness_window: self.freshness_window,
            amount_tolerance: self.amount_tolerance_lamports,
        }
    }

    pub fn verifier_settings(&self) -> VerifierSettings {
        VerifierSettings {
            commitment: self.commitment,
            lease_ttl: self.lease_ttl,
            fetch_timeout: self.fetch_timeout(),
            in_flight_wait: self.in_flight_wait,
            max_concurrent: self.max_concurrent_verifications,
            ..VerifierSettings::default()
        }
    }
}
