// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transaction receipts as delivered by the block ingestion layer.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::version::ChainPosition;

/// A single log entry of a receipt, undecoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: u64,
    #[serde(default)]
    pub transaction_log_index: Option<u64>,
}

impl RawLogEntry {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Identifies the transaction an event was emitted in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub hash: B256,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_index: u64,
}

impl TransactionContext {
    pub fn position(&self) -> ChainPosition {
        ChainPosition::new(self.block_number, self.transaction_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_index: u64,
    #[serde(default)]
    pub logs: Vec<RawLogEntry>,
}

impl TransactionReceipt {
    pub fn context(&self) -> TransactionContext {
        TransactionContext {
            hash: self.transaction_hash,
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
            transaction_index: self.transaction_index,
        }
    }

    pub fn position(&self) -> ChainPosition {
        ChainPosition::new(self.block_number, self.transaction_index)
    }
}
