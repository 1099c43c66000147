//! Solana wire-format transaction decoder.
//!
//! The bytes come straight from a public RPC node, so nothing here trusts a
//! length field: every count is checked against the bytes that remain before
//! anything is read or allocated. Only the generic envelope is decoded;
//! instruction data is kept as opaque bytes.
//!
//! Layout:
//!
//! ```text
//! compact-u16 n | n * 64-byte signature
//! [0x80 | version]            (versioned messages only)
//! header: 3 bytes
//! compact-u16 k | k * 32-byte account key
//! 32-byte recent blockhash
//! compact-u16 i | i * (u8 program | compact [u8] accounts | compact [u8] data)
//! compact-u16 l | l * (32-byte table | compact [u8] writable | compact [u8] readonly)   (v0 only)
//! ```

use crate::models::{
    AddressTableLookup, CompiledInstruction, DecodedMessage, LoadedAddresses, MessageHeader,
    MessageVersion, Pubkey, Signature, PUBKEY_LEN, SIGNATURE_LEN,
};
use thiserror::Error;

const VERSION_PREFIX_MASK: u8 = 0x80;
const BLOCKHASH_LEN: usize = 32;
/// program index + empty accounts + empty data
const MIN_INSTRUCTION_LEN: usize = 3;
/// table key + empty writable + empty readonly
const MIN_LOOKUP_LEN: usize = PUBKEY_LEN + 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("invalid compact-u16 length for {field}")]
    InvalidLength { field: &'static str },

    #[error("unsupported message version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid message header: {0}")]
    InvalidHeader(String),

    #[error("address lookups do not match loaded addresses: {0}")]
    LookupMismatch(String),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        if len > self.remaining() {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1, field)?[0])
    }

    fn peek_u8(&self, field: &'static str) -> Result<u8, DecodeError> {
        self.buf.get(self.pos).copied().ok_or(DecodeError::Truncated {
            field,
            needed: 1,
            remaining: 0,
        })
    }

    fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Solana's short-vec length: little-endian 7-bit groups, at most three
    /// bytes, canonical encoding only.
    fn read_compact_u16(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let mut value: u32 = 0;
        for i in 0..3 {
            let byte = self.read_u8(field)?;
            value |= u32::from(byte & 0x7f) << (i * 7);
            if byte & 0x80 == 0 {
                // a zero continuation byte is an alias of a shorter encoding
                if i > 0 && byte == 0 {
                    return Err(DecodeError::InvalidLength { field });
                }
                return u16::try_from(value).map_err(|_| DecodeError::InvalidLength { field });
            }
        }
        Err(DecodeError::InvalidLength { field })
    }

    /// Reads an element count and checks that `count * min_elem_len` bytes
    /// are still available.
    fn read_count(&mut self, field: &'static str, min_elem_len: usize) -> Result<usize, DecodeError> {
        let count = usize::from(self.read_compact_u16(field)?);
        let needed = count * min_elem_len;
        if needed > self.remaining() {
            return Err(DecodeError::Truncated {
                field,
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    fn read_compact_bytes(&mut self, field: &'static str) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_count(field, 1)?;
        Ok(self.read_bytes(len, field)?.to_vec())
    }
}

/// Decodes a wire-format transaction.
///
/// `loaded` carries the node-resolved lookup-table keys; for v0 messages they
/// are appended to the static keys so that indexes line up with the node's
/// balance arrays. Bytes after the last core field are ignored.
pub fn decode(bytes: &[u8], loaded: &LoadedAddresses) -> Result<DecodedMessage, DecodeError> {
    let mut reader = Reader::new(bytes);

    let signature_count = reader.read_count("signatures", SIGNATURE_LEN)?;
    let signatures = (0..signature_count)
        .map(|_| reader.read_array::<SIGNATURE_LEN>("signatures").map(Signature::from))
        .collect::<Result<Vec<_>, _>>()?;

    let prefix = reader.peek_u8("message header")?;
    let version = if prefix & VERSION_PREFIX_MASK != 0 {
        reader.read_u8("message version")?;
        match prefix & !VERSION_PREFIX_MASK {
            0 => MessageVersion::V0,
            other => return Err(DecodeError::UnsupportedVersion(other)),
        }
    } else {
        MessageVersion::Legacy
    };

    let header_bytes = reader.read_array::<3>("message header")?;
    let header = MessageHeader {
        num_required_signatures: header_bytes[0],
        num_readonly_signed_accounts: header_bytes[1],
        num_readonly_unsigned_accounts: header_bytes[2],
    };

    let key_count = reader.read_count("account keys", PUBKEY_LEN)?;
    let static_keys = (0..key_count)
        .map(|_| reader.read_array::<PUBKEY_LEN>("account keys").map(Pubkey::from))
        .collect::<Result<Vec<_>, _>>()?;

    check_header(&header, signatures.len(), static_keys.len())?;

    let recent_blockhash = reader.read_array::<BLOCKHASH_LEN>("recent blockhash")?;

    let instruction_count = reader.read_count("instructions", MIN_INSTRUCTION_LEN)?;
    let mut instructions = Vec::with_capacity(instruction_count);
    for _ in 0..instruction_count {
        let program_id_index = reader.read_u8("instruction program index")?;
        let accounts = reader.read_compact_bytes("instruction accounts")?;
        let data = reader.read_compact_bytes("instruction data")?;
        instructions.push(CompiledInstruction {
            program_id_index,
            accounts,
            data,
        });
    }

    let address_table_lookups = match version {
        MessageVersion::Legacy => Vec::new(),
        MessageVersion::V0 => {
            let lookup_count = reader.read_count("address table lookups", MIN_LOOKUP_LEN)?;
            let mut lookups = Vec::with_capacity(lookup_count);
            for _ in 0..lookup_count {
                let account_key = Pubkey::from(reader.read_array::<PUBKEY_LEN>("lookup table key")?);
                let writable_indexes = reader.read_compact_bytes("lookup writable indexes")?;
                let readonly_indexes = reader.read_compact_bytes("lookup readonly indexes")?;
                lookups.push(AddressTableLookup {
                    account_key,
                    writable_indexes,
                    readonly_indexes,
                });
            }
            lookups
        }
    };

    check_loaded_addresses(&address_table_lookups, loaded)?;

    if reader.remaining() > 0 {
        tracing::debug!(trailing = reader.remaining(), "ignoring trailing transaction bytes");
    }

    let mut account_keys = static_keys;
    account_keys.extend(loaded.writable.iter().copied());
    account_keys.extend(loaded.readonly.iter().copied());

    Ok(DecodedMessage {
        version,
        signatures,
        header,
        account_keys,
        recent_blockhash,
        instructions,
        address_table_lookups,
    })
}

fn check_header(
    header: &MessageHeader,
    signature_count: usize,
    static_key_count: usize,
) -> Result<(), DecodeError> {
    let required = usize::from(header.num_required_signatures);
    if required == 0 {
        return Err(DecodeError::InvalidHeader("no required signatures".to_string()));
    }
    if required != signature_count {
        return Err(DecodeError::InvalidHeader(format!(
            "{} signatures present, header requires {}",
            signature_count, required
        )));
    }
    if header.num_readonly_signed_accounts >= header.num_required_signatures {
        return Err(DecodeError::InvalidHeader(
            "fee payer must be writable".to_string(),
        ));
    }
    if required + usize::from(header.num_readonly_unsigned_accounts) > static_key_count {
        return Err(DecodeError::InvalidHeader(format!(
            "header references more accounts than the {} static keys",
            static_key_count
        )));
    }
    Ok(())
}

/// The node's loaded addresses must account for exactly the lookup indexes
/// the message declares, otherwise balance indexes would be misaligned.
fn check_loaded_addresses(
    lookups: &[AddressTableLookup],
    loaded: &LoadedAddresses,
) -> Result<(), DecodeError> {
    let writable: usize = lookups.iter().map(|l| l.writable_indexes.len()).sum();
    let readonly: usize = lookups.iter().map(|l| l.readonly_indexes.len()).sum();

    if writable != loaded.writable.len() || readonly != loaded.readonly.len() {
        return Err(DecodeError::LookupMismatch(format!(
            "message declares {}+{} lookups, node loaded {}+{}",
            writable,
            readonly,
            loaded.writable.len(),
            loaded.readonly.len()
        )));
    }
    Ok(())
}
