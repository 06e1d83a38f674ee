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

//! Typed records for the sibling events reconstructed from a receipt.

use alloy_primitives::{Address, U256};

use crate::{
    contracts::{ILegacyOracle, IStakingPool},
    decoder::{FromReconstructed, ReconstructedEvent},
    error::ConversionError,
};

fn uint(
    event: &ReconstructedEvent,
    name: &'static str,
    index: usize,
) -> Result<U256, ConversionError> {
    event.uint_param(index).ok_or(ConversionError::ParamMismatch {
        event: name,
        index,
        expected: "uint",
    })
}

fn address(
    event: &ReconstructedEvent,
    name: &'static str,
    index: usize,
) -> Result<Address, ConversionError> {
    event.address_param(index).ok_or(ConversionError::ParamMismatch {
        event: name,
        index,
        expected: "address",
    })
}

fn uint128(
    event: &ReconstructedEvent,
    name: &'static str,
    index: usize,
) -> Result<u128, ConversionError> {
    uint(event, name, index)?.try_into().map_err(|_| ConversionError::ParamMismatch {
        event: name,
        index,
        expected: "uint128",
    })
}

impl FromReconstructed for IStakingPool::ELRewardsReceived {
    const NAME: &'static str = "ELRewardsReceived";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self { amount: uint(event, Self::NAME, 0)? })
    }
}

impl FromReconstructed for IStakingPool::Transfer {
    const NAME: &'static str = "Transfer";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self {
            from: address(event, Self::NAME, 0)?,
            to: address(event, Self::NAME, 1)?,
            value: uint(event, Self::NAME, 2)?,
        })
    }
}

impl FromReconstructed for IStakingPool::TransferShares {
    const NAME: &'static str = "TransferShares";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self {
            from: address(event, Self::NAME, 0)?,
            to: address(event, Self::NAME, 1)?,
            sharesValue: uint(event, Self::NAME, 2)?,
        })
    }
}

impl FromReconstructed for IStakingPool::SharesBurnt {
    const NAME: &'static str = "SharesBurnt";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self {
            account: address(event, Self::NAME, 0)?,
            preRebaseTokenAmount: uint(event, Self::NAME, 1)?,
            postRebaseTokenAmount: uint(event, Self::NAME, 2)?,
            sharesAmount: uint(event, Self::NAME, 3)?,
        })
    }
}

impl FromReconstructed for IStakingPool::TokenRebased {
    const NAME: &'static str = "TokenRebased";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self {
            reportTimestamp: uint(event, Self::NAME, 0)?,
            timeElapsed: uint(event, Self::NAME, 1)?,
            preTotalShares: uint(event, Self::NAME, 2)?,
            preTotalEther: uint(event, Self::NAME, 3)?,
            postTotalShares: uint(event, Self::NAME, 4)?,
            postTotalEther: uint(event, Self::NAME, 5)?,
            sharesMintedAsFees: uint(event, Self::NAME, 6)?,
        })
    }
}

impl FromReconstructed for IStakingPool::ETHDistributed {
    const NAME: &'static str = "ETHDistributed";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self {
            reportTimestamp: uint(event, Self::NAME, 0)?,
            preCLBalance: uint(event, Self::NAME, 1)?,
            postCLBalance: uint(event, Self::NAME, 2)?,
            withdrawalsWithdrawn: uint(event, Self::NAME, 3)?,
            executionLayerRewardsWithdrawn: uint(event, Self::NAME, 4)?,
            postBufferedEther: uint(event, Self::NAME, 5)?,
        })
    }
}

impl FromReconstructed for ILegacyOracle::Completed {
    const NAME: &'static str = "Completed";

    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError> {
        Ok(Self {
            epochId: uint(event, Self::NAME, 0)?,
            beaconBalance: uint128(event, Self::NAME, 1)?,
            beaconValidators: uint128(event, Self::NAME, 2)?,
        })
    }
}

/// A fee mint observed as a `Transfer`/`TransferShares` pair from the zero address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObservedMint {
    pub recipient: Address,
    pub value: U256,
    pub shares: U256,
    pub log_index: u64,
}

impl ObservedMint {
    /// Combine a `Transfer` and its `TransferShares` counterpart. Returns `None` when the pair
    /// is not a mint.
    pub fn from_pair(
        transfer: &ReconstructedEvent,
        transfer_shares: &ReconstructedEvent,
    ) -> Result<Option<Self>, ConversionError> {
        let value: IStakingPool::Transfer = transfer.decode_as()?;
        let shares: IStakingPool::TransferShares = transfer_shares.decode_as()?;
        if value.from != Address::ZERO || shares.from != Address::ZERO {
            return Ok(None);
        }
        Ok(Some(Self {
            recipient: shares.to,
            value: value.value,
            shares: shares.sharesValue,
            log_index: transfer.log_index.min(transfer_shares.log_index),
        }))
    }
}
