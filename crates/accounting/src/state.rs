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

//! Accounting state threaded through receipt processing, its checkpoints and its reconciliation
//! against the chain.

use std::collections::{BTreeSet, HashMap};

use alloy_primitives::{Address, B256, I256, U256};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AccountingError, StoreError},
    ledger::{Ledger, LedgerSnapshot},
    rewards::{formula::signed_difference, FeeParameters, OperatorShare, ReportLog, RewardReport},
    store::{self, find_or_create_entry, sequence_id, Entity, EntityStore, Loaded},
    version::ChainPosition,
};

/// Consensus layer figures of the last legacy oracle report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconSnapshot {
    pub balance: U256,
    pub validators: U256,
    pub timestamp: u64,
}

/// Cumulative fee shares received by one recipient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorFeeTotals {
    pub recipient: Address,
    pub total_shares: U256,
    pub reports: u64,
    pub last_tx: B256,
}

impl OperatorFeeTotals {
    pub fn new(recipient: Address) -> Self {
        Self { recipient, total_shares: U256::ZERO, reports: 0, last_tx: B256::ZERO }
    }
}

/// Everything derived from the receipts processed so far.
#[derive(Clone, Debug, Default)]
pub struct AccountingState {
    pub ledger: Ledger,
    pub reports: ReportLog,
    /// `None` until the first legacy oracle report.
    pub beacon: Option<BeaconSnapshot>,
    pub fees: FeeParameters,
    pub contract_version: u64,
    pub operator_fees: HashMap<Address, OperatorFeeTotals>,
    /// Blocks whose totals correction has been applied.
    pub applied_corrections: BTreeSet<u64>,
    pub last_processed: Option<ChainPosition>,
}

/// Scalar part of [AccountingState], stored as a single entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ProtocolState {
    beacon: Option<BeaconSnapshot>,
    fees: FeeParameters,
    contract_version: u64,
    applied_corrections: BTreeSet<u64>,
    last_processed: Option<ChainPosition>,
}

impl Entity for ProtocolState {
    const KIND: &'static str = "ProtocolState";
}

impl Entity for LedgerSnapshot {
    const KIND: &'static str = "Ledger";
}

impl Entity for RewardReport {
    const KIND: &'static str = "RewardReport";
}

impl Entity for OperatorFeeTotals {
    const KIND: &'static str = "OperatorFees";
}

const SINGLETON_ID: &str = "current";

impl AccountingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ledger(ledger: Ledger) -> Self {
        Self { ledger, ..Self::default() }
    }

    /// Add minted fee shares to each recipient's running totals.
    pub fn record_operator_fees(&mut self, tx_hash: B256, fees: &[OperatorShare]) {
        for fee in fees {
            let loaded = find_or_create_entry(&mut self.operator_fees, fee.recipient, || {
                OperatorFeeTotals::new(fee.recipient)
            });
            if loaded.is_created() {
                tracing::debug!("first fee shares for {}", fee.recipient);
            }
            let totals = loaded.into_inner();
            totals.total_shares = totals.total_shares.saturating_add(fee.shares);
            totals.reports += 1;
            totals.last_tx = tx_hash;
        }
    }

    /// Write the whole state into `store`.
    ///
    /// Reports are append-only, so only those not yet in the store are written.
    pub fn checkpoint<S: EntityStore + ?Sized>(&self, store: &mut S) -> Result<(), StoreError> {
        store::save(store, SINGLETON_ID, &self.ledger.snapshot())?;
        let scalars = ProtocolState {
            beacon: self.beacon,
            fees: self.fees,
            contract_version: self.contract_version,
            applied_corrections: self.applied_corrections.clone(),
            last_processed: self.last_processed,
        };
        store::save(store, SINGLETON_ID, &scalars)?;

        let stored = store.ids(RewardReport::KIND)?.len();
        for (seq, report) in self.reports.iter().enumerate().skip(stored) {
            store::save(store, &sequence_id(seq as u64), report)?;
        }
        for (recipient, totals) in &self.operator_fees {
            store::save(store, &recipient.to_string(), totals)?;
        }
        Ok(())
    }

    /// Rebuild a state from a checkpoint. An empty store yields a fresh state.
    pub fn restore<S: EntityStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let ledger = match store::find_or_create(store, SINGLETON_ID, LedgerSnapshot::default)? {
            Loaded::Existing(snapshot) => Ledger::from_snapshot(snapshot)?,
            Loaded::Created(_) => Ledger::new(),
        };
        let scalars =
            store::find_or_create(store, SINGLETON_ID, ProtocolState::default)?.into_inner();

        let mut reports = ReportLog::new();
        for id in store.ids(RewardReport::KIND)? {
            if let Some(report) = store::load::<RewardReport, _>(store, &id)? {
                reports.append(report);
            }
        }
        let mut operator_fees = HashMap::new();
        for id in store.ids(OperatorFeeTotals::KIND)? {
            if let Some(totals) = store::load::<OperatorFeeTotals, _>(store, &id)? {
                operator_fees.insert(totals.recipient, totals);
            }
        }

        Ok(Self {
            ledger,
            reports,
            beacon: scalars.beacon,
            fees: scalars.fees,
            contract_version: scalars.contract_version,
            operator_fees,
            applied_corrections: scalars.applied_corrections,
            last_processed: scalars.last_processed,
        })
    }
}

/// Read-only query of the pooled value held on chain at a block.
pub trait PooledValueSource {
    fn total_pooled_value(&self, block_number: u64) -> anyhow::Result<U256>;
}

impl<F> PooledValueSource for F
where
    F: Fn(u64) -> anyhow::Result<U256>,
{
    fn total_pooled_value(&self, block_number: u64) -> anyhow::Result<U256> {
        self(block_number)
    }
}

/// Comparison of the ledger's pooled value with the chain's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub block_number: u64,
    pub ledger_value: U256,
    pub chain_value: U256,
    /// `chain_value - ledger_value`
    pub difference: I256,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.difference.is_zero()
    }
}

/// Compare the ledger's pooled value with the value reported by `source` at `block_number`.
pub fn reconcile_totals<S: PooledValueSource + ?Sized>(
    ledger: &Ledger,
    source: &S,
    block_number: u64,
) -> Result<Reconciliation, AccountingError> {
    let chain_value =
        source.total_pooled_value(block_number).map_err(AccountingError::ChainState)?;
    let ledger_value = ledger.totals().total_pooled_value;
    let reconciliation = Reconciliation {
        block_number,
        ledger_value,
        chain_value,
        difference: signed_difference(chain_value, ledger_value)?,
    };
    if !reconciliation.is_consistent() {
        tracing::warn!(
            "pooled value at block {block_number} differs from chain: \
             ledger {ledger_value}, chain {chain_value}"
        );
    }
    Ok(reconciliation)
}
