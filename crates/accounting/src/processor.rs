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

//! Processing of whole transaction receipts.

use alloy_primitives::{Address, I256, U256};

use crate::{
    contracts::{IStakingPool, PrimaryEvent, ProtocolEvent},
    deployments::Deployment,
    error::{AccountingError, LedgerError},
    receipt::{RawLogEntry, TransactionReceipt},
    reconstruct::{reconstruct, Reconstruction},
    registry::SignatureRegistry,
    rewards::{NodeOperatorsRewards, RewardEngine},
    state::AccountingState,
    version::{select_variant, ChainPosition, ProtocolVersion},
};

/// What processing a receipt did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessedReceipt {
    /// Primary events handled
    pub primary_events: usize,
    /// Oracle reports applied
    pub reports: usize,
}

/// Applies receipts of a [Deployment] to an [AccountingState].
pub struct ReceiptProcessor<D> {
    registry: SignatureRegistry,
    deployment: Deployment,
    operators: D,
}

fn signed(value: U256, what: &'static str) -> Result<I256, AccountingError> {
    I256::try_from(value).map_err(|_| AccountingError::Overflow(what))
}

impl<D: NodeOperatorsRewards> ReceiptProcessor<D> {
    /// Create a processor that reconstructs events with the protocol's own signatures.
    pub fn new(deployment: Deployment, operators: D) -> Result<Self, AccountingError> {
        Ok(Self::with_registry(SignatureRegistry::protocol_events()?, deployment, operators))
    }

    pub fn with_registry(
        registry: SignatureRegistry,
        deployment: Deployment,
        operators: D,
    ) -> Self {
        Self { registry, deployment, operators }
    }

    pub fn registry(&self) -> &SignatureRegistry {
        &self.registry
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    fn engine(&self) -> RewardEngine<'_> {
        RewardEngine::new(&self.deployment, &self.operators)
    }

    /// Variant in effect at `position`. A contract version counter of 2 or more forces the
    /// accounting oracle variant regardless of the schedule.
    pub fn protocol_version(
        &self,
        state: &AccountingState,
        position: ChainPosition,
    ) -> ProtocolVersion {
        let scheduled = select_variant(
            position.block_number,
            position.transaction_index,
            &self.deployment.upgrades,
        );
        match ProtocolVersion::from_contract_version(state.contract_version) {
            Some(version) => version.max(scheduled),
            None => scheduled,
        }
    }

    /// Apply every primary event of `receipt` to `state`, in log order.
    ///
    /// Each primary event is applied atomically. On error, the events before the failing one
    /// stay applied and the rest of the receipt is skipped.
    pub fn process_receipt(
        &self,
        state: &mut AccountingState,
        receipt: &TransactionReceipt,
    ) -> Result<ProcessedReceipt, AccountingError> {
        let result = self.process_logs(state, receipt);
        match &result {
            Err(err) if err.is_fatal() => {
                tracing::error!("Halting at {}: {err}", receipt.position());
            }
            Err(err) => {
                tracing::warn!("Skipping rest of {}: {err}", receipt.transaction_hash);
            }
            Ok(_) => {}
        }
        result
    }

    fn process_logs(
        &self,
        state: &mut AccountingState,
        receipt: &TransactionReceipt,
    ) -> Result<ProcessedReceipt, AccountingError> {
        if state.ledger.is_halted() {
            return Err(LedgerError::Halted.into());
        }
        self.apply_correction(state, receipt.block_number)?;

        let mut logs: Vec<&RawLogEntry> = receipt
            .logs
            .iter()
            .filter(|log| self.deployment.is_protocol_emitter(&log.address))
            .collect();
        logs.sort_by_key(|log| log.log_index);

        // Sibling events of other contracts can share a signature with the protocol's own.
        let siblings = reconstruct(&self.registry, receipt)
            .emitted_by(|address| self.deployment.is_protocol_emitter(address));

        let mut processed = ProcessedReceipt::default();
        for log in logs {
            let event = ProtocolEvent::from_log(log).map_err(|source| {
                AccountingError::PrimaryDecode { log_index: log.log_index, source }
            })?;
            let Some(event) = event else {
                continue;
            };
            processed.primary_events += 1;
            let primary = PrimaryEvent { log_index: log.log_index, event };
            if self.handle_event(state, &siblings, primary)? {
                processed.reports += 1;
            }
        }
        state.last_processed = Some(receipt.position());
        Ok(processed)
    }

    fn apply_correction(
        &self,
        state: &mut AccountingState,
        block_number: u64,
    ) -> Result<(), AccountingError> {
        let Some(correction) = self.deployment.correction_at(block_number) else {
            return Ok(());
        };
        if state.applied_corrections.contains(&block_number) {
            return Ok(());
        }
        let before = state.ledger.totals().total_pooled_value;
        state.ledger.transact(|tx| {
            tx.set_total_pooled_value(correction.total_pooled_value);
            Ok::<_, LedgerError>(())
        })?;
        state.applied_corrections.insert(block_number);
        tracing::warn!(
            "Applied totals correction at block {block_number}: pooled value {before} -> {}",
            correction.total_pooled_value
        );
        Ok(())
    }

    /// Returns whether an oracle report was applied.
    fn handle_event(
        &self,
        state: &mut AccountingState,
        siblings: &Reconstruction<'_>,
        primary: PrimaryEvent,
    ) -> Result<bool, AccountingError> {
        let position = siblings.context().position();
        let version = self.protocol_version(state, position);
        let PrimaryEvent { log_index, event } = primary;
        tracing::trace!("{} at {position} log {log_index} under {version}", event.name());

        match event {
            ProtocolEvent::Submitted(submitted) => {
                let sender = submitted.sender;
                let exact =
                    self.sibling_shares(siblings, log_index, Address::ZERO, sender, version)?;
                let shares = match exact {
                    Some(shares) => shares,
                    None => state
                        .ledger
                        .totals()
                        .shares_for_value(submitted.amount)
                        .ok_or(AccountingError::Overflow("submitted shares"))?,
                };
                state.ledger.transact(|tx| {
                    tx.apply_value_change(signed(submitted.amount, "submitted value")?)?;
                    tx.mint_shares(submitted.sender, shares)?;
                    Ok::<_, AccountingError>(())
                })?;
            }
            ProtocolEvent::Transfer(transfer) => {
                if transfer.from == Address::ZERO || transfer.to == Address::ZERO {
                    tracing::debug!("skipping mint or burn transfer at log {log_index}");
                    return Ok(false);
                }
                let (from, to) = (transfer.from, transfer.to);
                let exact = self.sibling_shares(siblings, log_index, from, to, version)?;
                let shares = match exact {
                    Some(shares) => shares,
                    None => state
                        .ledger
                        .totals()
                        .shares_for_value(transfer.value)
                        .ok_or(AccountingError::Overflow("transferred shares"))?,
                };
                state.ledger.transact(|tx| tx.transfer_shares(from, to, shares))?;
            }
            ProtocolEvent::SharesBurnt(burnt) => {
                state.ledger.transact(|tx| tx.burn_shares(burnt.account, burnt.sharesAmount))?;
            }
            ProtocolEvent::FeeSet(fee) => {
                tracing::info!("Protocol fee set to {} bps", fee.feeBasisPoints);
                state.fees.fee = fee.feeBasisPoints;
            }
            ProtocolEvent::FeeDistributionSet(distribution) => {
                tracing::info!(
                    "Fee distribution set to treasury {}, insurance {}, operators {} bps",
                    distribution.treasuryFeeBasisPoints,
                    distribution.insuranceFeeBasisPoints,
                    distribution.operatorsFeeBasisPoints
                );
                state.fees.treasury = distribution.treasuryFeeBasisPoints;
                state.fees.insurance = distribution.insuranceFeeBasisPoints;
                state.fees.operators = distribution.operatorsFeeBasisPoints;
            }
            ProtocolEvent::ContractVersionSet(set) => {
                let contract_version = set.version.saturating_to::<u64>();
                tracing::info!("Contract version set to {contract_version} at {position}");
                state.contract_version = contract_version;
            }
            ProtocolEvent::OracleReport(report) => {
                if version.uses_accounting_oracle() {
                    tracing::debug!("ignoring legacy oracle report at {position}; superseded");
                    return Ok(false);
                }
                self.engine().handle_oracle_report(state, siblings, log_index, &report, version)?;
                return Ok(true);
            }
            ProtocolEvent::EthDistributed(distributed) => {
                if !version.uses_accounting_oracle() {
                    return Err(AccountingError::VersionMismatch {
                        event: "ETHDistributed",
                        position,
                        version,
                    });
                }
                self.engine().handle_eth_distributed(state, siblings, log_index, &distributed)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Exact share amount of a movement, from the `TransferShares` event that follows it.
    /// Only variants that emit share transfers carry one.
    fn sibling_shares(
        &self,
        siblings: &Reconstruction<'_>,
        log_index: u64,
        from: Address,
        to: Address,
        version: ProtocolVersion,
    ) -> Result<Option<U256>, AccountingError> {
        if !version.emits_mint_transfers() {
            return Ok(None);
        }
        let Some(event) = siblings.first_after("TransferShares", log_index) else {
            return Ok(None);
        };
        let shares: IStakingPool::TransferShares = event.decode_as()?;
        if shares.from != from || shares.to != to {
            tracing::debug!(
                "TransferShares at log {} does not match the movement at log {log_index}",
                event.log_index
            );
            return Ok(None);
        }
        Ok(Some(shares.sharesValue))
    }
}
