use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One block (row of the block fact table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub fact_blocks_id: i64,
    pub block_timestamp: NaiveDateTime,
    pub tx_count: i64,
}

impl BlockRecord {
    pub fn new(fact_blocks_id: i64, block_timestamp: NaiveDateTime, tx_count: i64) -> Self {
        Self {
            fact_blocks_id,
            block_timestamp,
            tx_count,
        }
    }
}
