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

//! Reward distribution for oracle reports.
//!
//! Legacy oracle reports (`Completed`, variants 1 to 3) derive the reward from the change of the
//! consensus layer balance and mint the fee with [formula::shares_to_mint]. Accounting oracle
//! reports (`ETHDistributed` followed by `TokenRebased`, variant 4) take the new pooled value and
//! the minted fee shares from the events of the report transaction.

pub mod formula;
pub mod operators;
pub mod report;

use alloy_primitives::{Address, I256, U256};

use crate::{
    contracts::{ILegacyOracle, IStakingPool},
    decoder::ReconstructedEvent,
    deployments::Deployment,
    error::AccountingError,
    events::ObservedMint,
    ledger::Totals,
    pairs::extract_pairs,
    reconstruct::Reconstruction,
    state::{AccountingState, BeaconSnapshot},
    version::ProtocolVersion,
};

pub use formula::FeeParameters;
use formula::{
    annual_rate_ppm, classify_treasury_share, fee_portion, ppm_to_percent, shares_to_mint,
    signed_difference, DEPOSIT_SIZE,
};
pub use operators::{
    NodeOperator, NodeOperatorsRewards, OperatorShare, ValidatorWeightedDistribution,
};
pub use report::{ReportLog, RewardReport};

/// Fee shares of one report, by recipient.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct FeeSplit {
    shares_minted: U256,
    insurance_fee: U256,
    operators_fee: U256,
    treasury_fee: U256,
    dust: U256,
    operator_fees: Vec<OperatorShare>,
}

impl FeeSplit {
    fn treasury_share(&self) -> U256 {
        self.treasury_fee + self.dust
    }
}

fn overflow(what: &'static str) -> AccountingError {
    AccountingError::Overflow(what)
}

fn signed(value: U256, what: &'static str) -> Result<I256, AccountingError> {
    I256::try_from(value).map_err(|_| overflow(what))
}

/// Add `shares` to `recipient`'s entry, keeping the order recipients were first seen in.
fn accumulate(
    fees: &mut Vec<OperatorShare>,
    recipient: Address,
    shares: U256,
) -> Result<(), AccountingError> {
    match fees.iter_mut().find(|fee| fee.recipient == recipient) {
        Some(fee) => {
            fee.shares = fee.shares.checked_add(shares).ok_or(overflow("operator fee"))?;
        }
        None => fees.push(OperatorShare { recipient, shares }),
    }
    Ok(())
}

fn sum_shares(fees: &[OperatorShare]) -> Result<U256, AccountingError> {
    fees.iter()
        .try_fold(U256::ZERO, |sum, fee| sum.checked_add(fee.shares))
        .ok_or(overflow("operator fee total"))
}

/// Computes and applies the effects of oracle reports.
///
/// Sibling events are read from the [Reconstruction] of the report transaction, which callers
/// restrict to the protocol's own contracts.
#[derive(Clone, Copy)]
pub struct RewardEngine<'a> {
    deployment: &'a Deployment,
    operators: &'a dyn NodeOperatorsRewards,
}

impl<'a> RewardEngine<'a> {
    pub fn new(deployment: &'a Deployment, operators: &'a dyn NodeOperatorsRewards) -> Self {
        Self { deployment, operators }
    }

    /// Process a legacy oracle report.
    ///
    /// Nothing in `state` changes unless the whole report is applied.
    pub fn handle_oracle_report<'s>(
        &self,
        state: &'s mut AccountingState,
        events: &Reconstruction<'_>,
        log_index: u64,
        report: &ILegacyOracle::Completed,
        version: ProtocolVersion,
    ) -> Result<&'s RewardReport, AccountingError> {
        let context = *events.context();
        if state.beacon.is_none() {
            tracing::info!("First oracle report at {}", context.position());
        }
        let previous = state.beacon.unwrap_or_default();
        let post_balance = U256::from(report.beaconBalance);
        let post_validators = U256::from(report.beaconValidators);

        let appeared = signed_difference(post_validators, previous.validators)?;
        let deposits = if appeared.is_positive() {
            appeared.unsigned_abs().checked_mul(DEPOSIT_SIZE).ok_or(overflow("deposits"))?
        } else {
            if appeared.is_negative() {
                tracing::warn!(
                    "validator count dropped by {} at {}; no deposits deducted",
                    appeared.unsigned_abs(),
                    context.position()
                );
            }
            U256::ZERO
        };
        let reward_base = previous.balance.checked_add(deposits).ok_or(overflow("reward base"))?;

        let auxiliary_income = if version.has_execution_layer_rewards() {
            execution_layer_rewards(events)?
        } else {
            U256::ZERO
        };
        let gross = post_balance.checked_add(auxiliary_income).ok_or(overflow("gross balance"))?;
        let raw_reward = signed_difference(gross, reward_base)?;

        let fees = state.fees;
        let totals_before = state.ledger.totals();
        let split = if raw_reward.is_positive() {
            let reward = raw_reward.unsigned_abs();
            let value_after = totals_before
                .total_pooled_value
                .checked_add(reward)
                .ok_or(overflow("pooled value"))?;
            let mint = shares_to_mint(reward, fees.fee, totals_before.total_shares, value_after)?;
            self.split_legacy_mint(mint, &fees, version, events)?
        } else {
            tracing::info!(
                "Non-positive reward {raw_reward} at {}; no fee minted",
                context.position()
            );
            FeeSplit::default()
        };

        state.ledger.transact(|tx| {
            tx.apply_value_change(raw_reward)?;
            if !split.shares_minted.is_zero() {
                tx.apply_share_change(signed(split.shares_minted, "shares minted")?)?;
                tx.credit_shares(self.deployment.insurance_fund_address, split.insurance_fee)?;
                for fee in &split.operator_fees {
                    tx.credit_shares(fee.recipient, fee.shares)?;
                }
                tx.credit_shares(self.deployment.treasury_address, split.treasury_share())?;
            }
            Ok::<_, AccountingError>(())
        })?;

        let totals_after = state.ledger.totals();
        let time_elapsed = state
            .beacon
            .map(|b| context.block_timestamp.saturating_sub(b.timestamp))
            .unwrap_or_default();
        let apr_raw = annual_rate_ppm(&totals_before, &totals_after, time_elapsed);
        let record = RewardReport {
            tx: context,
            log_index,
            version,
            totals_before,
            totals_after,
            pre_beacon_balance: previous.balance,
            post_beacon_balance: post_balance,
            pre_beacon_validators: previous.validators,
            post_beacon_validators: post_validators,
            appeared_validators: appeared,
            withdrawals_withdrawn: U256::ZERO,
            reward_base,
            auxiliary_income,
            raw_reward,
            fees,
            shares_minted: split.shares_minted,
            insurance_fee: split.insurance_fee,
            operators_fee: split.operators_fee,
            treasury_fee: split.treasury_fee,
            dust: split.dust,
            operator_fees: split.operator_fees,
            time_elapsed,
            apr_raw,
            apr: apr_raw.map(ppm_to_percent),
        };
        state.beacon = Some(BeaconSnapshot {
            balance: post_balance,
            validators: post_validators,
            timestamp: context.block_timestamp,
        });
        Ok(self.commit(state, record))
    }

    /// Process an accounting oracle report.
    pub fn handle_eth_distributed<'s>(
        &self,
        state: &'s mut AccountingState,
        events: &Reconstruction<'_>,
        log_index: u64,
        distributed: &IStakingPool::ETHDistributed,
    ) -> Result<&'s RewardReport, AccountingError> {
        let context = *events.context();
        let rebased_event = events.first_after("TokenRebased", log_index).ok_or(
            AccountingError::MissingSibling {
                tx_hash: context.hash,
                name: "TokenRebased",
                after: log_index,
            },
        )?;
        let rebased: IStakingPool::TokenRebased = rebased_event.decode_as()?;
        let mints = observed_mints(events.between(log_index, rebased_event.log_index))?;

        let cl_gross = distributed
            .postCLBalance
            .checked_add(distributed.withdrawalsWithdrawn)
            .ok_or(overflow("consensus layer balance"))?;
        let cl_reward = signed_difference(cl_gross, distributed.preCLBalance)?;
        let auxiliary_income = distributed.executionLayerRewardsWithdrawn;
        let raw_reward = cl_reward
            .checked_add(signed(auxiliary_income, "execution layer rewards")?)
            .ok_or(overflow("raw reward"))?;

        let split = if cl_reward.is_positive() {
            self.split_observed_mints(&mints)?
        } else {
            if !mints.is_empty() {
                tracing::warn!(
                    "{} fee mints observed in {} without consensus layer rewards; ignored",
                    mints.len(),
                    context.hash
                );
            }
            FeeSplit::default()
        };
        if split.shares_minted != rebased.sharesMintedAsFees {
            tracing::warn!(
                "observed {} fee shares in {}, report states {}",
                split.shares_minted,
                context.hash,
                rebased.sharesMintedAsFees
            );
        }

        let totals_before = state.ledger.totals();
        state.ledger.transact(|tx| {
            tx.set_total_pooled_value(rebased.postTotalEther);
            if !split.shares_minted.is_zero() {
                tx.apply_share_change(signed(split.shares_minted, "shares minted")?)?;
                tx.credit_shares(self.deployment.insurance_fund_address, split.insurance_fee)?;
                for fee in &split.operator_fees {
                    tx.credit_shares(fee.recipient, fee.shares)?;
                }
                tx.credit_shares(self.deployment.treasury_address, split.treasury_share())?;
            }
            Ok::<_, AccountingError>(())
        })?;

        let time_elapsed = rebased.timeElapsed.saturating_to::<u64>();
        let apr_raw = annual_rate_ppm(
            &Totals::new(rebased.preTotalEther, rebased.preTotalShares),
            &Totals::new(rebased.postTotalEther, rebased.postTotalShares),
            time_elapsed,
        );
        let record = RewardReport {
            tx: context,
            log_index,
            version: ProtocolVersion::V4,
            totals_before,
            totals_after: state.ledger.totals(),
            pre_beacon_balance: distributed.preCLBalance,
            post_beacon_balance: distributed.postCLBalance,
            pre_beacon_validators: U256::ZERO,
            post_beacon_validators: U256::ZERO,
            appeared_validators: I256::ZERO,
            withdrawals_withdrawn: distributed.withdrawalsWithdrawn,
            reward_base: distributed.preCLBalance,
            auxiliary_income,
            raw_reward,
            fees: state.fees,
            shares_minted: split.shares_minted,
            insurance_fee: split.insurance_fee,
            operators_fee: split.operators_fee,
            treasury_fee: split.treasury_fee,
            dust: split.dust,
            operator_fees: split.operator_fees,
            time_elapsed,
            apr_raw,
            apr: apr_raw.map(ppm_to_percent),
        };
        Ok(self.commit(state, record))
    }

    fn commit<'s>(&self, state: &'s mut AccountingState, record: RewardReport) -> &'s RewardReport {
        tracing::info!(
            "Processed {} report in {}: raw reward {}, minted {} shares \
             (treasury {}, operators {}, insurance {}, dust {})",
            record.version,
            record.tx.hash,
            record.raw_reward,
            record.shares_minted,
            record.treasury_fee,
            record.operators_fee,
            record.insurance_fee,
            record.dust
        );
        state.record_operator_fees(record.tx.hash, &record.operator_fees);
        let seq = state.reports.append(record);
        &state.reports[seq]
    }

    fn split_legacy_mint(
        &self,
        mint: U256,
        fees: &FeeParameters,
        version: ProtocolVersion,
        events: &Reconstruction<'_>,
    ) -> Result<FeeSplit, AccountingError> {
        if mint.is_zero() {
            return Ok(FeeSplit::default());
        }
        let insurance_fee = fee_portion(mint, fees.insurance)?;
        let operators_share = fee_portion(mint, fees.operators)?;

        let operator_fees = if version.emits_mint_transfers() {
            let mints = observed_mints(events.events().iter().cloned())?;
            let observed = self.observed_operator_fees(&mints)?;
            if observed.is_empty() {
                tracing::warn!(
                    "no operator fee mints in {}; querying node operator distribution",
                    events.context().hash
                );
                self.distribute(operators_share)?
            } else {
                observed
            }
        } else {
            self.distribute(operators_share)?
        };
        let operators_fee = sum_shares(&operator_fees)?;

        let treasury_share = mint
            .checked_sub(insurance_fee)
            .and_then(|rest| rest.checked_sub(operators_fee))
            .ok_or(overflow("treasury share"))?;
        let (treasury_fee, dust) = classify_treasury_share(treasury_share, fees.treasury);
        Ok(FeeSplit {
            shares_minted: mint,
            insurance_fee,
            operators_fee,
            treasury_fee,
            dust,
            operator_fees,
        })
    }

    /// Split the fee shares actually minted in an accounting oracle report. Whatever the
    /// treasury receives is its fee; there is no dust.
    fn split_observed_mints(&self, mints: &[ObservedMint]) -> Result<FeeSplit, AccountingError> {
        let mut split = FeeSplit::default();
        for mint in mints {
            let bucket = if mint.recipient == self.deployment.treasury_address {
                &mut split.treasury_fee
            } else if mint.recipient == self.deployment.insurance_fund_address {
                &mut split.insurance_fee
            } else {
                accumulate(&mut split.operator_fees, mint.recipient, mint.shares)?;
                &mut split.operators_fee
            };
            *bucket = bucket.checked_add(mint.shares).ok_or(overflow("fee split"))?;
            split.shares_minted =
                split.shares_minted.checked_add(mint.shares).ok_or(overflow("fee split"))?;
        }
        Ok(split)
    }

    fn observed_operator_fees(
        &self,
        mints: &[ObservedMint],
    ) -> Result<Vec<OperatorShare>, AccountingError> {
        let mut fees = Vec::new();
        for mint in mints {
            if mint.recipient != self.deployment.treasury_address
                && mint.recipient != self.deployment.insurance_fund_address
            {
                accumulate(&mut fees, mint.recipient, mint.shares)?;
            }
        }
        Ok(fees)
    }

    /// Ask the node operator distribution for the split of `shares`.
    fn distribute(&self, shares: U256) -> Result<Vec<OperatorShare>, AccountingError> {
        if shares.is_zero() {
            return Ok(Vec::new());
        }
        let distribution = self
            .operators
            .rewards_distribution(shares)
            .map_err(AccountingError::Distribution)?;
        let distributed = sum_shares(&distribution)?;
        if distributed > shares {
            tracing::error!("node operators distributed {distributed} of {shares} shares");
            return Err(AccountingError::Distribution(anyhow::anyhow!(
                "distributed {distributed} shares, more than the {shares} available"
            )));
        }
        Ok(distribution)
    }
}

/// Total execution layer rewards received in the transaction.
fn execution_layer_rewards(events: &Reconstruction<'_>) -> Result<U256, AccountingError> {
    let mut total = U256::ZERO;
    for event in events.named("ELRewardsReceived") {
        let received: IStakingPool::ELRewardsReceived = event.decode_as()?;
        total = total.checked_add(received.amount).ok_or(overflow("execution layer rewards"))?;
    }
    Ok(total)
}

/// Fee mints among `events`, from their `Transfer`/`TransferShares` pairs.
fn observed_mints(
    events: impl IntoIterator<Item = ReconstructedEvent>,
) -> Result<Vec<ObservedMint>, AccountingError> {
    let mut mints = Vec::new();
    for pair in extract_pairs(events, "Transfer", "TransferShares")? {
        let Some((transfer, shares)) = pair.split("Transfer", "TransferShares") else {
            continue;
        };
        if let Some(mint) = ObservedMint::from_pair(transfer, shares)? {
            mints.push(mint);
        }
    }
    Ok(mints)
}
