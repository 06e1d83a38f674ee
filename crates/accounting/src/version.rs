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

//! Selection of the reward computation variant that applies to a report.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a transaction in the chain, ordered by block number then transaction index.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ChainPosition {
    pub block_number: u64,
    pub transaction_index: u64,
}

impl ChainPosition {
    pub const GENESIS: ChainPosition = ChainPosition::new(0, 0);

    pub const fn new(block_number: u64, transaction_index: u64) -> Self {
        Self { block_number, transaction_index }
    }
}

impl fmt::Display for ChainPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {} tx {}", self.block_number, self.transaction_index)
    }
}

/// Historical reward computation variants, in the order they were introduced.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ProtocolVersion {
    /// Beacon-balance rewards only.
    V1,
    /// Adds execution-layer rewards received in the report transaction.
    V2,
    /// Fee mints emit `Transfer`/`TransferShares` pairs that expose the actual split.
    V3,
    /// Accounting-oracle reports (`ETHDistributed` followed by `TokenRebased`).
    V4,
}

impl ProtocolVersion {
    pub fn has_execution_layer_rewards(self) -> bool {
        self >= ProtocolVersion::V2
    }

    pub fn emits_mint_transfers(self) -> bool {
        self >= ProtocolVersion::V3
    }

    pub fn uses_accounting_oracle(self) -> bool {
        self == ProtocolVersion::V4
    }

    /// Variant implied by the on-chain contract version counter, if any.
    pub fn from_contract_version(version: u64) -> Option<Self> {
        (version >= 2).then_some(ProtocolVersion::V4)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolVersion::V1 => "v1",
            ProtocolVersion::V2 => "v2",
            ProtocolVersion::V3 => "v3",
            ProtocolVersion::V4 => "v4",
        };
        f.write_str(name)
    }
}

/// First chain position at which each later variant applies on a given network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSchedule {
    pub execution_layer_rewards: ChainPosition,
    pub mint_transfers: ChainPosition,
    pub accounting_oracle: ChainPosition,
}

impl UpgradeSchedule {
    /// Schedule for networks deployed directly with the accounting oracle.
    pub const LATEST: UpgradeSchedule = UpgradeSchedule {
        execution_layer_rewards: ChainPosition::GENESIS,
        mint_transfers: ChainPosition::GENESIS,
        accounting_oracle: ChainPosition::GENESIS,
    };

    /// Schedule that never leaves [ProtocolVersion::V1].
    pub const NEVER: UpgradeSchedule = UpgradeSchedule {
        execution_layer_rewards: ChainPosition::new(u64::MAX, u64::MAX),
        mint_transfers: ChainPosition::new(u64::MAX, u64::MAX),
        accounting_oracle: ChainPosition::new(u64::MAX, u64::MAX),
    };
}

/// Select the variant for a report at the given block and transaction index.
///
/// The result is the highest variant whose threshold has been reached. Thresholds are absolute,
/// so the selection never regresses as the position advances, whatever order receipts are
/// (re)processed in.
pub fn select_variant(
    block_number: u64,
    transaction_index: u64,
    schedule: &UpgradeSchedule,
) -> ProtocolVersion {
    let position = ChainPosition::new(block_number, transaction_index);
    if position >= schedule.accounting_oracle {
        ProtocolVersion::V4
    } else if position >= schedule.mint_transfers {
        ProtocolVersion::V3
    } else if position >= schedule.execution_layer_rewards {
        ProtocolVersion::V2
    } else {
        ProtocolVersion::V1
    }
}
