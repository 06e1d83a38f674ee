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

//! Distribution of the node operators' fee across operators.

use alloy_primitives::{Address, U256};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Shares paid to one recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorShare {
    pub recipient: Address,
    pub shares: U256,
}

/// Read-only query for the split of the node operators' fee, as done by the on-chain node
/// operator registry.
///
/// Implementations return `(recipient, shares)` entries summing to at most `total_shares`.
pub trait NodeOperatorsRewards {
    fn rewards_distribution(&self, total_shares: U256) -> anyhow::Result<Vec<OperatorShare>>;
}

impl<F> NodeOperatorsRewards for F
where
    F: Fn(U256) -> anyhow::Result<Vec<OperatorShare>>,
{
    fn rewards_distribution(&self, total_shares: U256) -> anyhow::Result<Vec<OperatorShare>> {
        self(total_shares)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOperator {
    pub name: String,
    pub reward_address: Address,
    pub active_validators: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Splits the fee proportionally to each active operator's number of active validators,
/// truncating every share. The remainder stays undistributed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidatorWeightedDistribution {
    pub operators: Vec<NodeOperator>,
}

impl ValidatorWeightedDistribution {
    pub fn new(operators: Vec<NodeOperator>) -> Self {
        Self { operators }
    }

    /// Parse a JSON list of operators.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("Failed to parse node operators")
    }

    fn eligible(&self) -> impl Iterator<Item = &NodeOperator> {
        self.operators.iter().filter(|op| op.active && op.active_validators > 0)
    }
}

impl NodeOperatorsRewards for ValidatorWeightedDistribution {
    fn rewards_distribution(&self, total_shares: U256) -> anyhow::Result<Vec<OperatorShare>> {
        let total_validators: U256 =
            self.eligible().map(|op| U256::from(op.active_validators)).sum();
        if total_validators.is_zero() {
            tracing::debug!("no active validators; nothing to distribute");
            return Ok(Vec::new());
        }
        self.eligible()
            .map(|op| {
                let shares = total_shares
                    .checked_mul(U256::from(op.active_validators))
                    .context("Operator share overflow")?
                    / total_validators;
                Ok(OperatorShare { recipient: op.reward_address, shares })
            })
            .collect()
    }
}
