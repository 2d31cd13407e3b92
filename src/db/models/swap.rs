use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One bridge swap (row of the swap fact table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub block_timestamp: NaiveDateTime,
    pub tx_hash: String,
    /// Swapper address
    pub sender: String,
    pub source_chain: String,
    pub destination_chain: String,
    pub token_symbol: String,
}

impl SwapRecord {
    pub fn new(
        block_timestamp: NaiveDateTime,
        tx_hash: impl Into<String>,
        sender: impl Into<String>,
        source_chain: impl Into<String>,
        destination_chain: impl Into<String>,
        token_symbol: impl Into<String>,
    ) -> Self {
        Self {
            block_timestamp,
            tx_hash: tx_hash.into(),
            sender: sender.into(),
            source_chain: source_chain.into(),
            destination_chain: destination_chain.into(),
            token_symbol: token_symbol.into(),
        }
    }

    /// `source_chain <separator> destination_chain`
    pub fn path(&self, separator: &str) -> String {
        format!("{}{}{}", self.source_chain, separator, self.destination_chain)
    }
}
