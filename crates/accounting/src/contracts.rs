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

//! Event bindings for the staking pool and its legacy oracle.

use alloy_primitives::B256;
use alloy_sol_types::{sol, SolEvent};

use crate::receipt::RawLogEntry;

sol! {
    #[sol(all_derives)]
    interface IStakingPool {
        event Submitted(address indexed sender, uint256 amount, address referral);
        event Transfer(address indexed from, address indexed to, uint256 value);
        event TransferShares(address indexed from, address indexed to, uint256 sharesValue);
        event SharesBurnt(
            address indexed account,
            uint256 preRebaseTokenAmount,
            uint256 postRebaseTokenAmount,
            uint256 sharesAmount
        );
        event ELRewardsReceived(uint256 amount);
        event ETHDistributed(
            uint256 indexed reportTimestamp,
            uint256 preCLBalance,
            uint256 postCLBalance,
            uint256 withdrawalsWithdrawn,
            uint256 executionLayerRewardsWithdrawn,
            uint256 postBufferedEther
        );
        event TokenRebased(
            uint256 indexed reportTimestamp,
            uint256 timeElapsed,
            uint256 preTotalShares,
            uint256 preTotalEther,
            uint256 postTotalShares,
            uint256 postTotalEther,
            uint256 sharesMintedAsFees
        );
        event FeeSet(uint16 feeBasisPoints);
        event FeeDistributionSet(
            uint16 treasuryFeeBasisPoints,
            uint16 insuranceFeeBasisPoints,
            uint16 operatorsFeeBasisPoints
        );
        event ContractVersionSet(uint256 version);
    }

    #[sol(all_derives)]
    interface ILegacyOracle {
        event Completed(uint256 epochId, uint128 beaconBalance, uint128 beaconValidators);
    }
}

/// Primary events that drive the ledger, decoded from a log of the pool or its oracle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolEvent {
    Submitted(IStakingPool::Submitted),
    Transfer(IStakingPool::Transfer),
    SharesBurnt(IStakingPool::SharesBurnt),
    FeeSet(IStakingPool::FeeSet),
    FeeDistributionSet(IStakingPool::FeeDistributionSet),
    ContractVersionSet(IStakingPool::ContractVersionSet),
    OracleReport(ILegacyOracle::Completed),
    EthDistributed(IStakingPool::ETHDistributed),
}

fn decode<E: SolEvent>(log: &RawLogEntry) -> Result<E, alloy_sol_types::Error> {
    E::decode_raw_log(log.topics.iter().copied(), &log.data)
}

impl ProtocolEvent {
    /// Decode a primary event. Logs of any other event yield `Ok(None)`; a log that matches a
    /// primary event signature but does not decode is an error.
    pub fn from_log(log: &RawLogEntry) -> Result<Option<Self>, alloy_sol_types::Error> {
        let Some(topic0) = log.topic0() else {
            return Ok(None);
        };
        let event = match *topic0 {
            h if h == IStakingPool::Submitted::SIGNATURE_HASH => Self::Submitted(decode(log)?),
            h if h == IStakingPool::Transfer::SIGNATURE_HASH => Self::Transfer(decode(log)?),
            h if h == IStakingPool::SharesBurnt::SIGNATURE_HASH => Self::SharesBurnt(decode(log)?),
            h if h == IStakingPool::FeeSet::SIGNATURE_HASH => Self::FeeSet(decode(log)?),
            h if h == IStakingPool::FeeDistributionSet::SIGNATURE_HASH => {
                Self::FeeDistributionSet(decode(log)?)
            }
            h if h == IStakingPool::ContractVersionSet::SIGNATURE_HASH => {
                Self::ContractVersionSet(decode(log)?)
            }
            h if h == ILegacyOracle::Completed::SIGNATURE_HASH => {
                Self::OracleReport(decode(log)?)
            }
            h if h == IStakingPool::ETHDistributed::SIGNATURE_HASH => {
                Self::EthDistributed(decode(log)?)
            }
            _ => {
                tracing::trace!("skipping log {}; not a primary event", log.log_index);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Submitted(_) => "Submitted",
            Self::Transfer(_) => "Transfer",
            Self::SharesBurnt(_) => "SharesBurnt",
            Self::FeeSet(_) => "FeeSet",
            Self::FeeDistributionSet(_) => "FeeDistributionSet",
            Self::ContractVersionSet(_) => "ContractVersionSet",
            Self::OracleReport(_) => "Completed",
            Self::EthDistributed(_) => "ETHDistributed",
        }
    }

    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::Submitted(_) => IStakingPool::Submitted::SIGNATURE_HASH,
            Self::Transfer(_) => IStakingPool::Transfer::SIGNATURE_HASH,
            Self::SharesBurnt(_) => IStakingPool::SharesBurnt::SIGNATURE_HASH,
            Self::FeeSet(_) => IStakingPool::FeeSet::SIGNATURE_HASH,
            Self::FeeDistributionSet(_) => IStakingPool::FeeDistributionSet::SIGNATURE_HASH,
            Self::ContractVersionSet(_) => IStakingPool::ContractVersionSet::SIGNATURE_HASH,
            Self::OracleReport(_) => ILegacyOracle::Completed::SIGNATURE_HASH,
            Self::EthDistributed(_) => IStakingPool::ETHDistributed::SIGNATURE_HASH,
        }
    }
}

/// A primary event together with the index of the log it was decoded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryEvent {
    pub log_index: u64,
    pub event: ProtocolEvent,
}
