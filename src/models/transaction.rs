use crate::models::ledger::{Pubkey, Signature};
use serde_json::Value;

/// Account keys a v0 transaction pulled in through address lookup tables,
/// as resolved by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedAddresses {
    pub writable: Vec<Pubkey>,
    pub readonly: Vec<Pubkey>,
}

impl LoadedAddresses {
    pub fn is_empty(&self) -> bool {
        self.writable.is_empty() && self.readonly.is_empty()
    }
}

/// A transaction as returned by the ledger node, before decoding.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub slot: u64,
    /// Unix seconds; nodes omit it for very old or not yet rooted slots.
    pub block_time: Option<i64>,
    /// Execution error reported by the node. `None` means the transaction succeeded.
    pub err: Option<Value>,
    /// Balances in lamports, indexed like `DecodedMessage::account_keys`.
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub loaded_addresses: LoadedAddresses,
    /// Wire-format transaction bytes (signatures followed by the message).
    pub message_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVersion {
    Legacy,
    V0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// Instruction payloads are carried opaquely; verification relies on
/// balance deltas, not on instruction semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressTableLookup {
    pub account_key: Pubkey,
    pub writable_indexes: Vec<u8>,
    pub readonly_indexes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub version: MessageVersion,
    pub signatures: Vec<Signature>,
    pub header: MessageHeader,
    /// Static keys followed by loaded writable then loaded readonly keys.
    /// Position `i` is the join key into the node's pre/post balance arrays.
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: [u8; 32],
    pub instructions: Vec<CompiledInstruction>,
    pub address_table_lookups: Vec<AddressTableLookup>,
}

impl DecodedMessage {
    pub fn position_of(&self, key: &Pubkey) -> Option<usize> {
        self.account_keys.iter().position(|k| k == key)
    }

    pub fn contains(&self, key: &Pubkey) -> bool {
        self.position_of(key).is_some()
    }
}
