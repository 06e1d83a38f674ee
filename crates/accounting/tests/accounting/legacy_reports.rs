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

use alloy_primitives::{I256, U256};
use staking_accounting::{
    AccountingError, BeaconSnapshot, FeeParameters, ILegacyOracle, IStakingPool, LedgerError,
    OperatorShare, ProtocolVersion, ReceiptProcessor, Totals,
};

use super::common::{
    deployment, funded_state, processor, reporting_state, ReceiptBuilder, ALICE, DAY,
    GENESIS_TIMESTAMP, INSURANCE, OPERATOR_A, OPERATOR_B, ORACLE, POOL, STAGED, TREASURY,
};

const ETHER: u128 = 1_000_000_000_000_000_000;
const DEPOSIT: u128 = 32 * ETHER;

fn completed(balance: u128, validators: u128) -> ILegacyOracle::Completed {
    ILegacyOracle::Completed {
        epochId: U256::from(1),
        beaconBalance: balance,
        beaconValidators: validators,
    }
}

fn int(value: i64) -> I256 {
    I256::try_from(value).unwrap()
}

fn shares(values: &[(alloy_primitives::Address, u64)]) -> Vec<OperatorShare> {
    values
        .iter()
        .map(|&(recipient, s)| OperatorShare { recipient, shares: U256::from(s) })
        .collect()
}

#[test]
fn v1_report_mints_fee_shares() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(600, 1)).build();

    let processed = processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(processed.primary_events, 1);
    assert_eq!(processed.reports, 1);

    let report = state.reports.latest().unwrap();
    assert_eq!(report.version, ProtocolVersion::V1);
    assert_eq!(report.reward_base, U256::from(500));
    assert_eq!(report.raw_reward, int(100));
    // 100 * 1000 * 1000 / (1100 * 10000 - 1000 * 100) = 9.17
    assert_eq!(report.shares_minted, U256::from(9));
    assert_eq!(report.insurance_fee, U256::from(4));
    assert_eq!(report.operators_fee, U256::from(4));
    assert_eq!(report.operator_fees, shares(&[(OPERATOR_A, 2), (OPERATOR_B, 2)]));
    // No treasury fee configured: the remainder is dust.
    assert_eq!(report.treasury_fee, U256::ZERO);
    assert_eq!(report.dust, U256::from(1));
    assert_eq!(report.totals_after, Totals::new(U256::from(1100), U256::from(1009)));
    assert_eq!(report.time_elapsed, DAY);
    assert!(report.apr_raw.unwrap().is_positive());
    assert!(report.apr.unwrap() > 0.0);

    assert_eq!(state.ledger.shares_of(&ALICE), U256::from(1000));
    assert_eq!(state.ledger.shares_of(&INSURANCE), U256::from(4));
    assert_eq!(state.ledger.shares_of(&OPERATOR_A), U256::from(2));
    assert_eq!(state.ledger.shares_of(&TREASURY), U256::from(1));
    assert_eq!(state.beacon.unwrap().balance, U256::from(600));
    assert_eq!(state.operator_fees[&OPERATOR_B].total_shares, U256::from(2));
    assert!(state.reports.get(&receipt.transaction_hash).is_some());
}

#[test]
fn treasury_fee_is_not_dust() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    state.fees = FeeParameters { fee: 1000, treasury: 2500, insurance: 2500, operators: 5000 };
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(600, 1)).build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.shares_minted, U256::from(9));
    assert_eq!(report.insurance_fee, U256::from(2));
    assert_eq!(report.operators_fee, U256::from(4));
    assert_eq!(report.treasury_fee, U256::from(3));
    assert_eq!(report.dust, U256::ZERO);
}

#[test]
fn loss_does_not_dilute_holders() {
    let failing = |_: U256| -> anyhow::Result<Vec<OperatorShare>> {
        anyhow::bail!("operators must not be queried on a loss")
    };
    let processor = ReceiptProcessor::new(deployment(STAGED), failing).unwrap();
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(450, 1)).build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.raw_reward, int(-50));
    assert!(report.shares_minted.is_zero());
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(950), U256::from(1000)));
    assert_eq!(state.ledger.shares_of(&ALICE), U256::from(1000));
    assert!(report.apr_raw.unwrap().is_negative());
}

#[test]
fn deposits_of_new_validators_are_not_rewards() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(600 + DEPOSIT, 2)).build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.appeared_validators, int(1));
    assert_eq!(report.reward_base, U256::from(500 + DEPOSIT));
    assert_eq!(report.raw_reward, int(100));
    assert_eq!(report.shares_minted, U256::from(9));
}

#[test]
fn first_report_has_no_previous_balance() {
    let processor = processor(STAGED);
    let value = 2 * DEPOSIT;
    let mut state = funded_state(value, value);
    state.fees = FeeParameters { fee: 1000, treasury: 0, insurance: 5000, operators: 5000 };
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(2 * DEPOSIT, 2)).build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.pre_beacon_balance, U256::ZERO);
    assert_eq!(report.reward_base, U256::from(2 * DEPOSIT));
    assert_eq!(report.raw_reward, I256::ZERO);
    assert!(report.shares_minted.is_zero());
    assert_eq!(report.time_elapsed, 0);
    assert!(report.apr_raw.is_none());
    assert_eq!(
        state.beacon,
        Some(BeaconSnapshot {
            balance: U256::from(2 * DEPOSIT),
            validators: U256::from(2),
            timestamp: GENESIS_TIMESTAMP + DAY,
        })
    );
}

#[test]
fn v2_counts_execution_layer_rewards() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(150, 0)
        .event(POOL, &IStakingPool::ELRewardsReceived { amount: U256::from(25) })
        .event(POOL, &IStakingPool::ELRewardsReceived { amount: U256::from(15) })
        .event(ORACLE, &completed(560, 1))
        .build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.version, ProtocolVersion::V2);
    assert_eq!(report.auxiliary_income, U256::from(40));
    assert_eq!(report.raw_reward, int(100));
    assert_eq!(report.shares_minted, U256::from(9));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1100), U256::from(1009)));
}

#[test]
fn v1_ignores_execution_layer_rewards() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(50, 0)
        .event(POOL, &IStakingPool::ELRewardsReceived { amount: U256::from(40) })
        .event(ORACLE, &completed(560, 1))
        .build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.auxiliary_income, U256::ZERO);
    assert_eq!(report.raw_reward, int(60));
}

#[test]
fn v3_uses_observed_operator_mints() {
    let failing = |_: U256| -> anyhow::Result<Vec<OperatorShare>> {
        anyhow::bail!("observed mints take precedence")
    };
    let processor = ReceiptProcessor::new(deployment(STAGED), failing).unwrap();
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(250, 0)
        .mint(INSURANCE, 4, 4)
        .mint(OPERATOR_A, 3, 3)
        .mint(OPERATOR_B, 1, 1)
        .mint(TREASURY, 1, 1)
        .event(ORACLE, &completed(600, 1))
        .build();
    let processed = processor.process_receipt(&mut state, &receipt).unwrap();
    // Mint transfers from the zero address are handled with the report.
    assert_eq!(processed.primary_events, 5);

    let report = state.reports.latest().unwrap();
    assert_eq!(report.version, ProtocolVersion::V3);
    assert_eq!(report.shares_minted, U256::from(9));
    assert_eq!(report.operator_fees, shares(&[(OPERATOR_A, 3), (OPERATOR_B, 1)]));
    assert_eq!(report.operators_fee, U256::from(4));
    assert_eq!(report.dust, U256::from(1));
    assert_eq!(state.ledger.shares_of(&OPERATOR_A), U256::from(3));
    assert_eq!(state.ledger.totals().total_shares, U256::from(1009));
}

#[test]
fn v3_ignores_transfers_of_other_tokens() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let token = alloy_primitives::Address::repeat_byte(0x77);
    let receipt = ReceiptBuilder::new(250, 0)
        .mint(OPERATOR_A, 3, 3)
        .event(token, &IStakingPool::Transfer { from: ALICE, to: POOL, value: U256::from(1) })
        .event(ORACLE, &completed(600, 1))
        .build();
    let processed = processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(processed.reports, 1);

    let report = state.reports.latest().unwrap();
    assert_eq!(report.shares_minted, U256::from(9));
    assert_eq!(report.insurance_fee, U256::from(4));
    assert_eq!(report.operator_fees, shares(&[(OPERATOR_A, 3)]));
    assert_eq!(report.dust, U256::from(2));
    assert_eq!(state.ledger.shares_of(&ALICE), U256::from(1000));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1100), U256::from(1009)));
}

#[test]
fn v3_without_mints_falls_back_to_operator_distribution() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(250, 0)
        .event(POOL, &IStakingPool::ELRewardsReceived { amount: U256::ZERO })
        .event(ORACLE, &completed(600, 1))
        .build();
    processor.process_receipt(&mut state, &receipt).unwrap();

    let report = state.reports.latest().unwrap();
    assert_eq!(report.operator_fees, shares(&[(OPERATOR_A, 2), (OPERATOR_B, 2)]));
}

#[test]
fn v3_unpaired_mint_aborts_report() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let receipt = ReceiptBuilder::new(250, 0)
        .event(
            POOL,
            &IStakingPool::TransferShares {
                from: alloy_primitives::Address::ZERO,
                to: OPERATOR_A,
                sharesValue: U256::from(3),
            },
        )
        .event(ORACLE, &completed(600, 1))
        .build();
    let err = processor.process_receipt(&mut state, &receipt).unwrap_err();
    assert!(matches!(err, AccountingError::Unpaired(_)));
    assert!(state.reports.is_empty());
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1000), U256::from(1000)));
}

#[test]
fn distribution_failure_leaves_state_untouched() {
    let failing =
        |_: U256| -> anyhow::Result<Vec<OperatorShare>> { anyhow::bail!("registry unavailable") };
    let processor = ReceiptProcessor::new(deployment(STAGED), failing).unwrap();
    let mut state = reporting_state();
    let before = state.ledger.snapshot();
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(600, 1)).build();

    let err = processor.process_receipt(&mut state, &receipt).unwrap_err();
    assert!(matches!(err, AccountingError::Distribution(_)));
    assert!(!err.is_fatal());
    assert_eq!(state.ledger.snapshot(), before);
    assert!(state.reports.is_empty());
    assert_eq!(state.beacon.unwrap().balance, U256::from(500));
    assert!(state.operator_fees.is_empty());
}

#[test]
fn loss_beyond_pooled_value_halts() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    state.beacon = Some(BeaconSnapshot { balance: U256::from(5000), ..state.beacon.unwrap() });
    let receipt = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(3000, 1)).build();

    let err = processor.process_receipt(&mut state, &receipt).unwrap_err();
    assert!(err.is_fatal());
    assert!(state.ledger.is_halted());
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1000), U256::from(1000)));

    let next = ReceiptBuilder::new(51, 0).event(ORACLE, &completed(600, 1)).build();
    let err = processor.process_receipt(&mut state, &next).unwrap_err();
    assert!(matches!(err, AccountingError::Ledger(LedgerError::Halted)));
}

#[test]
fn consecutive_reports_chain() {
    let processor = processor(STAGED);
    let mut state = reporting_state();
    let first = ReceiptBuilder::new(50, 0).event(ORACLE, &completed(600, 1)).build();
    let second = ReceiptBuilder::new(60, 0)
        .timestamp(GENESIS_TIMESTAMP + 2 * DAY)
        .event(ORACLE, &completed(700, 1))
        .build();
    processor.process_receipt(&mut state, &first).unwrap();
    processor.process_receipt(&mut state, &second).unwrap();

    assert_eq!(state.reports.len(), 2);
    let report = state.reports.latest().unwrap();
    assert_eq!(report.pre_beacon_balance, U256::from(600));
    assert_eq!(report.totals_before, Totals::new(U256::from(1100), U256::from(1009)));
    assert_eq!(report.raw_reward, int(100));
    assert_eq!(report.time_elapsed, DAY);
    // 100 * 1000 * 1009 / (1200 * 10000 - 1000 * 100)
    assert_eq!(report.shares_minted, U256::from(8));
    assert_eq!(state.operator_fees[&OPERATOR_A].reports, 2);
}
