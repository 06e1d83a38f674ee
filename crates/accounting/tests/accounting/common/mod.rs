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

#![allow(dead_code)]

use alloy_primitives::{address, keccak256, Address, U256};
use alloy_sol_types::SolEvent;
use staking_accounting::{
    AccountingState, BeaconSnapshot, Deployment, FeeParameters, IStakingPool, Ledger, NodeOperator,
    RawLogEntry, ReceiptProcessor, Totals, TransactionReceipt, UpgradeSchedule,
    ValidatorWeightedDistribution,
};

pub const POOL: Address = address!("0x00000000000000000000000000000000000000aa");
pub const ORACLE: Address = address!("0x00000000000000000000000000000000000000bb");
pub const TREASURY: Address = address!("0x00000000000000000000000000000000000000e1");
pub const INSURANCE: Address = address!("0x00000000000000000000000000000000000000e2");
pub const OPERATOR_A: Address = address!("0x00000000000000000000000000000000000000a1");
pub const OPERATOR_B: Address = address!("0x00000000000000000000000000000000000000a2");
pub const ALICE: Address = address!("0x1111111111111111111111111111111111111111");
pub const BOB: Address = address!("0x2222222222222222222222222222222222222222");

/// One day after the genesis timestamp used by [ReceiptBuilder].
pub const DAY: u64 = 86_400;
pub const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

/// Schedule with each variant starting at its own block: V2 at 100, V3 at 200, V4 at 300.
pub const STAGED: UpgradeSchedule = UpgradeSchedule {
    execution_layer_rewards: staking_accounting::ChainPosition::new(100, 0),
    mint_transfers: staking_accounting::ChainPosition::new(200, 0),
    accounting_oracle: staking_accounting::ChainPosition::new(300, 0),
};

pub fn deployment(upgrades: UpgradeSchedule) -> Deployment {
    Deployment::builder()
        .pool_address(POOL)
        .legacy_oracle_address(ORACLE)
        .treasury_address(TREASURY)
        .insurance_fund_address(INSURANCE)
        .upgrades(upgrades)
        .build()
        .unwrap()
}

/// Two operators with one validator each.
pub fn operators() -> ValidatorWeightedDistribution {
    ValidatorWeightedDistribution::new(vec![
        NodeOperator {
            name: "a".into(),
            reward_address: OPERATOR_A,
            active_validators: 1,
            active: true,
        },
        NodeOperator {
            name: "b".into(),
            reward_address: OPERATOR_B,
            active_validators: 1,
            active: true,
        },
    ])
}

pub fn processor(upgrades: UpgradeSchedule) -> ReceiptProcessor<ValidatorWeightedDistribution> {
    ReceiptProcessor::new(deployment(upgrades), operators()).unwrap()
}

/// State with `value` pooled and `shares` shares, all held by [ALICE].
pub fn funded_state(value: u128, shares: u128) -> AccountingState {
    let totals = Totals::new(U256::from(value), U256::from(shares));
    let ledger = Ledger::from_parts(totals, [(ALICE, U256::from(shares))]).unwrap();
    AccountingState::with_ledger(ledger)
}

/// [funded_state] with 1000 value and 1000 shares, a 10% fee split evenly between insurance and
/// operators, and a previous report of 500 on one validator.
pub fn reporting_state() -> AccountingState {
    let mut state = funded_state(1000, 1000);
    state.fees = FeeParameters { fee: 1000, treasury: 0, insurance: 5000, operators: 5000 };
    state.beacon = Some(BeaconSnapshot {
        balance: U256::from(500),
        validators: U256::from(1),
        timestamp: GENESIS_TIMESTAMP,
    });
    state
}

pub fn log(emitter: Address, event: &impl SolEvent, log_index: u64) -> RawLogEntry {
    let data = event.encode_log_data();
    RawLogEntry {
        address: emitter,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        log_index,
        transaction_log_index: Some(log_index),
    }
}

/// Builds receipts with consecutive log indices.
pub struct ReceiptBuilder {
    receipt: TransactionReceipt,
}

impl ReceiptBuilder {
    pub fn new(block_number: u64, transaction_index: u64) -> Self {
        Self {
            receipt: TransactionReceipt {
                transaction_hash: keccak256(format!("{block_number}:{transaction_index}")),
                block_number,
                block_timestamp: GENESIS_TIMESTAMP + DAY,
                transaction_index,
                logs: Vec::new(),
            },
        }
    }

    pub fn timestamp(mut self, block_timestamp: u64) -> Self {
        self.receipt.block_timestamp = block_timestamp;
        self
    }

    pub fn event(mut self, emitter: Address, event: &impl SolEvent) -> Self {
        let log_index = self.receipt.logs.len() as u64;
        self.receipt.logs.push(log(emitter, event, log_index));
        self
    }

    /// A fee mint as emitted by the pool: `Transfer` then `TransferShares` from the zero address.
    pub fn mint(self, to: Address, value: u64, shares: u64) -> Self {
        let transfer =
            IStakingPool::Transfer { from: Address::ZERO, to, value: U256::from(value) };
        let shares = IStakingPool::TransferShares {
            from: Address::ZERO,
            to,
            sharesValue: U256::from(shares),
        };
        self.event(POOL, &transfer).event(POOL, &shares)
    }

    pub fn build(self) -> TransactionReceipt {
        self.receipt
    }
}
