use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const SIGNATURE_LEN: usize = 64;
pub const PUBKEY_LEN: usize = 32;
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

const SOL_DECIMALS: usize = 9;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("invalid base58: {0}")]
    Base58(String),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Decodes a base58 string into exactly `N` bytes.
///
/// Inputs longer than any valid encoding of `N` bytes are refused before
/// decoding so hostile strings never reach the bignum conversion.
fn decode_base58_array<const N: usize>(s: &str) -> Result<[u8; N], KeyParseError> {
    // base58 needs at most ~1.37 chars per byte
    if s.len() > N * 2 {
        return Err(KeyParseError::Length {
            expected: N,
            actual: s.len() * 3 / 4,
        });
    }

    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| KeyParseError::Base58(e.to_string()))?;

    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| KeyParseError::Length {
        expected: N,
        actual: bytes.len(),
    })
}

macro_rules! base58_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = KeyParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_base58_array::<$len>(s.trim()).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&bs58::encode(&self.0).into_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

base58_newtype!(
    /// Transaction signature; the ledger-wide transaction identifier.
    Signature,
    SIGNATURE_LEN
);

base58_newtype!(
    /// Ed25519 account public key.
    Pubkey,
    PUBKEY_LEN
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[serde(alias = "main", alias = "mainnet-beta")]
    Mainnet,
    #[serde(alias = "dev")]
    Devnet,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Mainnet, Network::Devnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Devnet => "devnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" | "main" | "mainnet-beta" => Ok(Network::Mainnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            other => Err(format!("unsupported network: {}", other)),
        }
    }
}

/// Node confidence level requested when reading a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    #[default]
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level: {}", other)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must be a plain decimal number: {0}")]
    InvalidFormat(String),

    #[error("amount has more than 9 decimal places: {0}")]
    TooPrecise(String),

    #[error("amount is out of range: {0}")]
    Overflow(String),
}

/// Parses a decimal SOL string ("0.5", "12", "0.0001") into exact lamports.
///
/// Signs, exponents and missing integer or fractional parts are refused.
pub fn parse_sol_amount(input: &str) -> Result<u64, AmountParseError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountParseError::Empty);
    }

    let (whole, frac) = match s.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (s, None),
    };

    let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(whole) || frac.is_some_and(|f| !is_digits(f)) {
        return Err(AmountParseError::InvalidFormat(s.to_string()));
    }

    let frac = frac.unwrap_or("");
    if frac.len() > SOL_DECIMALS {
        return Err(AmountParseError::TooPrecise(s.to_string()));
    }

    let overflow = || AmountParseError::Overflow(s.to_string());
    let whole: u64 = whole.parse().map_err(|_| overflow())?;
    let frac_lamports: u64 = if frac.is_empty() {
        0
    } else {
        format!("{:0<width$}", frac, width = SOL_DECIMALS)
            .parse()
            .map_err(|_| overflow())?
    };

    whole
        .checked_mul(LAMPORTS_PER_SOL)
        .and_then(|l| l.checked_add(frac_lamports))
        .ok_or_else(overflow)
}

/// Renders a signed lamport amount as a SOL decimal for logs and audit notes.
pub fn format_sol(lamports: i128) -> String {
    let sign = if lamports < 0 { "-" } else { "" };
    let abs = lamports.unsigned_abs();
    let per_sol = LAMPORTS_PER_SOL as u128;
    format!("{}{}.{:09}", sign, abs / per_sol, abs % per_sol)
}
