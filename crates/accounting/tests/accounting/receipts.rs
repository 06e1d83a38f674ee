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

use alloy_primitives::{Address, U256};
use staking_accounting::{
    AccountingError, AccountingState, ChainPosition, Deployment, FeeParameters, ILegacyOracle,
    IStakingPool, LedgerError, MemoryStore, ReceiptProcessor, Totals, TotalsCorrection,
    UpgradeSchedule,
};

use super::common::{
    funded_state, operators, processor, reporting_state, ReceiptBuilder, ALICE, BOB, INSURANCE,
    ORACLE, POOL, STAGED, TREASURY,
};

fn submitted(sender: Address, amount: u64) -> IStakingPool::Submitted {
    IStakingPool::Submitted { sender, amount: U256::from(amount), referral: Address::ZERO }
}

fn transfer(from: Address, to: Address, value: u64) -> IStakingPool::Transfer {
    IStakingPool::Transfer { from, to, value: U256::from(value) }
}

fn transfer_shares(from: Address, to: Address, shares: u64) -> IStakingPool::TransferShares {
    IStakingPool::TransferShares { from, to, sharesValue: U256::from(shares) }
}

#[test]
fn first_submissions_mint_one_to_one() {
    let processor = processor(STAGED);
    let mut state = AccountingState::new();
    let receipt = ReceiptBuilder::new(50, 0)
        .event(POOL, &submitted(ALICE, 100))
        .event(POOL, &submitted(BOB, 50))
        .build();

    let processed = processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(processed.primary_events, 2);
    assert_eq!(state.ledger.shares_of(&ALICE), U256::from(100));
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(50));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(150), U256::from(150)));
    assert_eq!(state.last_processed, Some(ChainPosition::new(50, 0)));
}

#[test]
fn submission_after_rewards_gets_fewer_shares() {
    let processor = processor(STAGED);
    let mut state = funded_state(1100, 1000);
    let receipt = ReceiptBuilder::new(50, 0).event(POOL, &submitted(BOB, 110)).build();
    processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(100));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1210), U256::from(1100)));
}

#[test]
fn submission_uses_exact_shares_when_emitted() {
    let processor = processor(STAGED);
    let mut state = funded_state(1100, 1000);
    let receipt = ReceiptBuilder::new(250, 0)
        .event(POOL, &submitted(BOB, 110))
        .event(POOL, &transfer(Address::ZERO, BOB, 110))
        .event(POOL, &transfer_shares(Address::ZERO, BOB, 99))
        .build();

    let processed = processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(processed.primary_events, 2);
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(99));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1210), U256::from(1099)));
}

#[test]
fn transfers_move_shares() {
    let processor = processor(STAGED);
    let mut state = funded_state(1100, 1000);

    let by_value = ReceiptBuilder::new(50, 0).event(POOL, &transfer(ALICE, BOB, 110)).build();
    processor.process_receipt(&mut state, &by_value).unwrap();
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(100));

    let by_shares = ReceiptBuilder::new(250, 0)
        .event(POOL, &transfer(ALICE, BOB, 110))
        .event(POOL, &transfer_shares(ALICE, BOB, 101))
        .build();
    processor.process_receipt(&mut state, &by_shares).unwrap();
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(201));
    assert_eq!(state.ledger.shares_of(&ALICE), U256::from(799));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1100), U256::from(1000)));
}

#[test]
fn mismatched_transfer_shares_fall_back_to_rate() {
    let processor = processor(STAGED);
    let mut state = funded_state(1100, 1000);
    let receipt = ReceiptBuilder::new(250, 0)
        .event(POOL, &transfer(ALICE, BOB, 110))
        .event(POOL, &transfer_shares(ALICE, INSURANCE, 7))
        .build();
    processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(100));
}

#[test]
fn overdraft_aborts_receipt_without_halting() {
    let processor = processor(STAGED);
    let mut state = funded_state(1100, 1000);
    let receipt = ReceiptBuilder::new(50, 0)
        .event(POOL, &transfer(ALICE, BOB, 110))
        .event(POOL, &transfer(BOB, ALICE, 1100))
        .build();

    let err = processor.process_receipt(&mut state, &receipt).unwrap_err();
    assert!(matches!(err, AccountingError::Ledger(LedgerError::InsufficientShares { .. })));
    assert!(!err.is_fatal());
    assert!(!state.ledger.is_halted());
    // Events are atomic one by one: the first transfer stays applied.
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(100));
    assert_eq!(state.last_processed, None);
}

#[test]
fn burns_reduce_shares_only() {
    let processor = processor(STAGED);
    let mut state = funded_state(1000, 1000);
    let burnt = IStakingPool::SharesBurnt {
        account: ALICE,
        preRebaseTokenAmount: U256::from(400),
        postRebaseTokenAmount: U256::from(400),
        sharesAmount: U256::from(400),
    };
    let receipt = ReceiptBuilder::new(50, 0).event(POOL, &burnt).build();
    processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(state.ledger.shares_of(&ALICE), U256::from(600));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(1000), U256::from(600)));
}

#[test]
fn fee_events_update_parameters() {
    let processor = processor(STAGED);
    let mut state = AccountingState::new();
    let receipt = ReceiptBuilder::new(1, 0)
        .event(POOL, &IStakingPool::FeeSet { feeBasisPoints: 1000 })
        .event(
            POOL,
            &IStakingPool::FeeDistributionSet {
                treasuryFeeBasisPoints: 0,
                insuranceFeeBasisPoints: 5000,
                operatorsFeeBasisPoints: 5000,
            },
        )
        .build();
    processor.process_receipt(&mut state, &receipt).unwrap();
    assert_eq!(
        state.fees,
        FeeParameters { fee: 1000, treasury: 0, insurance: 5000, operators: 5000 }
    );
}

#[test]
fn corrections_apply_once_per_block() {
    static CORRECTIONS: [TotalsCorrection; 1] = [TotalsCorrection {
        block_number: 10,
        total_pooled_value: U256::from_limbs([2000, 0, 0, 0]),
    }];
    let deployment = Deployment::builder()
        .pool_address(POOL)
        .legacy_oracle_address(ORACLE)
        .treasury_address(TREASURY)
        .insurance_fund_address(INSURANCE)
        .upgrades(UpgradeSchedule::NEVER)
        .corrections(&CORRECTIONS[..])
        .build()
        .unwrap();
    let processor = ReceiptProcessor::new(deployment, operators()).unwrap();
    let mut state = funded_state(1000, 1000);

    let first = ReceiptBuilder::new(10, 0).event(POOL, &submitted(BOB, 100)).build();
    processor.process_receipt(&mut state, &first).unwrap();
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(50));

    let second = ReceiptBuilder::new(10, 1).event(POOL, &submitted(BOB, 100)).build();
    processor.process_receipt(&mut state, &second).unwrap();
    assert_eq!(state.ledger.shares_of(&BOB), U256::from(100));
    assert_eq!(state.ledger.totals(), Totals::new(U256::from(2200), U256::from(1100)));
    assert!(state.applied_corrections.contains(&10));
}

#[test]
fn resumes_from_checkpoint() {
    let processor = processor(STAGED);
    let completed = |balance: u128| ILegacyOracle::Completed {
        epochId: U256::from(1),
        beaconBalance: balance,
        beaconValidators: 1,
    };
    let receipts = [
        ReceiptBuilder::new(50, 0).event(POOL, &submitted(BOB, 100)).build(),
        ReceiptBuilder::new(60, 0).event(ORACLE, &completed(650)).build(),
        ReceiptBuilder::new(70, 0).event(POOL, &transfer(BOB, ALICE, 30)).build(),
        ReceiptBuilder::new(80, 0).event(ORACLE, &completed(700)).build(),
    ];

    let mut uninterrupted = reporting_state();
    for receipt in &receipts {
        processor.process_receipt(&mut uninterrupted, receipt).unwrap();
    }

    let mut first_half = reporting_state();
    for receipt in &receipts[..2] {
        processor.process_receipt(&mut first_half, receipt).unwrap();
    }
    let mut store = MemoryStore::new();
    first_half.checkpoint(&mut store).unwrap();
    let json = serde_json::to_string(&store).unwrap();

    let store: MemoryStore = serde_json::from_str(&json).unwrap();
    let mut resumed = AccountingState::restore(&store).unwrap();
    assert_eq!(resumed.last_processed, Some(ChainPosition::new(60, 0)));
    for receipt in &receipts[2..] {
        processor.process_receipt(&mut resumed, receipt).unwrap();
    }

    assert_eq!(resumed.ledger.snapshot(), uninterrupted.ledger.snapshot());
    let summary = |state: &AccountingState| -> Vec<_> {
        state
            .reports
            .iter()
            .map(|r| (r.tx, r.raw_reward, r.shares_minted, r.totals_after, r.apr_raw))
            .collect()
    };
    assert_eq!(summary(&resumed), summary(&uninterrupted));
    assert_eq!(resumed.beacon, uninterrupted.beacon);
    assert_eq!(resumed.operator_fees, uninterrupted.operator_fees);
}
