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

//! Audit records of processed reports.

use std::collections::HashMap;

use alloy_primitives::{B256, I256, U256};
use serde::{Deserialize, Serialize};

use super::{formula::FeeParameters, operators::OperatorShare};
use crate::{ledger::Totals, receipt::TransactionContext, version::ProtocolVersion};

/// Before/after snapshot of one report and the fee mint it caused.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardReport {
    /// Transaction that carried the report
    pub tx: TransactionContext,
    /// Log index of the report event
    pub log_index: u64,
    /// Computation variant applied to the report
    pub version: ProtocolVersion,
    /// Ledger totals before the report
    pub totals_before: Totals,
    /// Ledger totals after the report and its fee mint
    pub totals_after: Totals,
    /// Consensus layer balance at the previous report (zero for the first report)
    pub pre_beacon_balance: U256,
    /// Consensus layer balance reported
    pub post_beacon_balance: U256,
    /// Validator count at the previous report. Not reported by accounting oracle reports.
    pub pre_beacon_validators: U256,
    /// Validator count reported
    pub post_beacon_validators: U256,
    /// Change of the validator count; may be negative
    pub appeared_validators: I256,
    /// Value withdrawn from the consensus layer (accounting oracle reports only)
    pub withdrawals_withdrawn: U256,
    /// Previous balance plus deposits of appeared validators
    pub reward_base: U256,
    /// Execution layer rewards received in the same transaction
    pub auxiliary_income: U256,
    /// Reward before fees; negative on a loss
    pub raw_reward: I256,
    /// Fee parameters at report time
    pub fees: FeeParameters,
    /// Total shares minted as fees
    pub shares_minted: U256,
    /// Shares minted to the insurance fund
    pub insurance_fee: U256,
    /// Shares minted to node operators
    pub operators_fee: U256,
    /// Shares minted to the treasury as its fee
    pub treasury_fee: U256,
    /// Rounding remainder minted to the treasury while it takes no fee
    pub dust: U256,
    /// Per-operator breakdown of `operators_fee`
    pub operator_fees: Vec<OperatorShare>,
    /// Seconds since the previous report (zero for the first report)
    pub time_elapsed: u64,
    /// Annualized share rate change in parts per million
    pub apr_raw: Option<I256>,
    /// Annualized share rate change in percent
    pub apr: Option<f64>,
}

impl RewardReport {
    pub fn tx_hash(&self) -> B256 {
        self.tx.hash
    }
}

/// Append-only sequence of [RewardReport]s, addressable by transaction hash.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<RewardReport>", into = "Vec<RewardReport>")]
pub struct ReportLog {
    reports: Vec<RewardReport>,
    by_tx: HashMap<B256, usize>,
}

impl ReportLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a report and return its sequence number.
    pub fn append(&mut self, report: RewardReport) -> usize {
        let seq = self.reports.len();
        if self.by_tx.insert(report.tx_hash(), seq).is_some() {
            tracing::warn!("transaction {} carries more than one report", report.tx_hash());
        }
        self.reports.push(report);
        seq
    }

    /// The report of the given transaction. If a transaction carried several, the last one.
    pub fn get(&self, tx_hash: &B256) -> Option<&RewardReport> {
        self.by_tx.get(tx_hash).map(|&seq| &self.reports[seq])
    }

    /// The most recent report, which the next report builds on.
    pub fn latest(&self) -> Option<&RewardReport> {
        self.reports.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RewardReport> {
        self.reports.iter()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

impl std::ops::Index<usize> for ReportLog {
    type Output = RewardReport;

    fn index(&self, seq: usize) -> &RewardReport {
        &self.reports[seq]
    }
}

impl From<Vec<RewardReport>> for ReportLog {
    fn from(reports: Vec<RewardReport>) -> Self {
        let mut log = ReportLog::new();
        for report in reports {
            log.append(report);
        }
        log
    }
}

impl From<ReportLog> for Vec<RewardReport> {
    fn from(log: ReportLog) -> Self {
        log.reports
    }
}
