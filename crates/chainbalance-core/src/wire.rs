//! Wire decode adapters.
//!
//! Two message shapes are seen on the feed. Both normalize into the same
//! [`Block`]; pick one per deployment with [`WireFormat`].
//!
//! **Plain** (legacy): integer fields (amounts of any width, as a JSON
//! integer or a decimal string), string addresses, and the
//! transaction index carried on each balance entry:
//! ```json
//! {"block_number": 19000000, "block_timestamp": 1705000000,
//!  "transactions": [{"balances": [{"address": "0xAb…", "smart_contract": "",
//!                                  "decimals": 18, "amount": 1500,
//!                                  "transaction_index": 3}]}]}
//! ```
//!
//! **Bytes** (canonical): big-endian byte fields encoded as hex strings:
//! ```json
//! {"header": {"number": "0x0121eac0", "time": 1705000000},
//!  "transactions": [{"index": 3, "balance_updates": [
//!     {"address": "0xab…", "currency": {"smart_contract": "0x", "decimals": 18},
//!      "post_balance": "0x05dc"}]}]}
//! ```

use alloy_primitives::U256;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::codec::bytes_to_uint;
use crate::error::DecodeError;
use crate::types::{Asset, BalanceEntry, Block, Transaction};

/// Decodes one feed payload into a canonical [`Block`].
pub trait BlockDecoder: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn decode(&self, payload: &[u8]) -> Result<Block, DecodeError>;
}

/// Wire variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Bytes,
    Plain,
}

impl WireFormat {
    pub fn decoder(self) -> Box<dyn BlockDecoder> {
        match self {
            Self::Bytes => Box::new(ByteFieldJsonDecoder),
            Self::Plain => Box::new(PlainJsonDecoder),
        }
    }
}

// ─── Plain variant ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PlainBlockMessage {
    block_number: u64,
    #[serde(default)]
    block_timestamp: i64,
    #[serde(default)]
    transactions: Vec<PlainTransaction>,
}

#[derive(Deserialize)]
struct PlainTransaction {
    #[serde(default)]
    balances: Vec<PlainBalance>,
}

#[derive(Deserialize)]
struct PlainBalance {
    #[serde(default)]
    address: String,
    #[serde(default)]
    smart_contract: String,
    #[serde(default)]
    decimals: u32,
    #[serde(default, deserialize_with = "deserialize_amount")]
    amount: U256,
    #[serde(default)]
    transaction_index: u64,
}

/// Accepts an amount as a bare JSON integer of any width or a decimal string.
///
/// Reads the raw token so integers above `u64::MAX` are never routed
/// through `f64`.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Box<RawValue> = Deserialize::deserialize(deserializer)?;
    let text = raw.get().trim();
    let digits = if text.starts_with('"') {
        serde_json::from_str::<String>(text).map_err(D::Error::custom)?
    } else {
        text.to_string()
    };
    U256::from_str_radix(digits.trim(), 10).map_err(|e| {
        D::Error::custom(format!("amount '{digits}' is not a 256-bit unsigned integer: {e}"))
    })
}

/// Decoder for the legacy plain-integer JSON shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainJsonDecoder;

impl BlockDecoder for PlainJsonDecoder {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn decode(&self, payload: &[u8]) -> Result<Block, DecodeError> {
        let msg: PlainBlockMessage = serde_json::from_slice(payload)?;

        // The index lives on each entry here, so every run of entries with
        // the same index becomes its own canonical transaction.
        let mut transactions: Vec<Transaction> = Vec::new();
        for wire_tx in msg.transactions {
            let mut current: Option<Transaction> = None;
            for b in wire_tx.balances {
                let entry = BalanceEntry {
                    address: b.address,
                    asset: Asset {
                        contract_identifier: b.smart_contract.trim().to_string(),
                        decimals: b.decimals,
                    },
                    post_balance: b.amount.to_be_bytes::<32>().to_vec(),
                };
                match current.as_mut() {
                    Some(tx) if tx.index == b.transaction_index => tx.balances.push(entry),
                    _ => {
                        transactions.extend(current.take());
                        current = Some(Transaction {
                            index: b.transaction_index,
                            balances: vec![entry],
                        });
                    }
                }
            }
            transactions.extend(current);
        }

        Ok(Block {
            number: U256::from(msg.block_number),
            timestamp: msg.block_timestamp,
            transactions,
        })
    }
}

// ─── Byte-field variant ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ByteBlockMessage {
    header: ByteHeader,
    #[serde(default)]
    transactions: Vec<ByteTransaction>,
}

#[derive(Deserialize)]
struct ByteHeader {
    number: String,
    #[serde(default)]
    time: i64,
}

#[derive(Deserialize)]
struct ByteTransaction {
    #[serde(default)]
    index: u64,
    #[serde(default)]
    balance_updates: Vec<ByteBalanceUpdate>,
}

#[derive(Deserialize)]
struct ByteBalanceUpdate {
    address: String,
    #[serde(default)]
    currency: ByteCurrency,
    #[serde(default)]
    post_balance: String,
}

#[derive(Deserialize, Default)]
struct ByteCurrency {
    #[serde(default)]
    smart_contract: String,
    #[serde(default)]
    decimals: u32,
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, DecodeError> {
    let body = value.trim();
    let body = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
        .unwrap_or(body);
    let result = if body.len() % 2 == 1 {
        hex::decode(format!("0{body}"))
    } else {
        hex::decode(body)
    };
    result.map_err(|e| DecodeError::Hex {
        field,
        reason: e.to_string(),
    })
}

/// Decoder for the canonical byte-field JSON shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteFieldJsonDecoder;

impl BlockDecoder for ByteFieldJsonDecoder {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn decode(&self, payload: &[u8]) -> Result<Block, DecodeError> {
        let msg: ByteBlockMessage = serde_json::from_slice(payload)?;

        let number_bytes = decode_hex("header.number", &msg.header.number)?;
        let number = bytes_to_uint(&number_bytes).map_err(|source| DecodeError::Integer {
            field: "header.number",
            source,
        })?;

        let mut transactions = Vec::with_capacity(msg.transactions.len());
        for wire_tx in msg.transactions {
            let mut balances = Vec::with_capacity(wire_tx.balance_updates.len());
            for update in wire_tx.balance_updates {
                let address = decode_hex("address", &update.address)?;
                let contract =
                    decode_hex("currency.smart_contract", &update.currency.smart_contract)?;
                let contract_identifier = if contract.is_empty() {
                    String::new()
                } else {
                    format!("0x{}", hex::encode(contract))
                };
                balances.push(BalanceEntry {
                    address: format!("0x{}", hex::encode(address)),
                    asset: Asset {
                        contract_identifier,
                        decimals: update.currency.decimals,
                    },
                    // Width is checked by the reconciler so an oversized
                    // balance fails one record, not the whole block.
                    post_balance: decode_hex("post_balance", &update.post_balance)?,
                });
            }
            transactions.push(Transaction {
                index: wire_tx.index,
                balances,
            });
        }

        Ok(Block {
            number,
            timestamp: msg.header.time,
            transactions,
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
