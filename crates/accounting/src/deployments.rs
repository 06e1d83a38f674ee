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

use alloy_primitives::{address, Address, U256};
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::version::{ChainPosition, UpgradeSchedule};

pub use alloy_chains::NamedChain;

/// Hand-set pooled value at a block, applied before the first event processed at that block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalsCorrection {
    pub block_number: u64,
    pub total_pooled_value: U256,
}

/// Configuration for a deployment of the staking pool.
// NOTE: See https://github.com/clap-rs/clap/issues/5092#issuecomment-1703980717 about clap usage.
#[non_exhaustive]
#[derive(Clone, Debug, Builder, Args)]
#[group(
    requires = "pool_address",
    requires = "legacy_oracle_address",
    requires = "treasury_address",
    requires = "insurance_fund_address"
)]
pub struct Deployment {
    /// EIP-155 chain ID of the network.
    #[clap(long, env)]
    #[builder(setter(into, strip_option), default)]
    pub chain_id: Option<u64>,

    /// Address of the [IStakingPool] contract.
    ///
    /// [IStakingPool]: crate::contracts::IStakingPool
    #[clap(long, env, required = false, long_help = "Address of the staking pool contract")]
    #[builder(setter(into))]
    pub pool_address: Address,

    /// Address of the [ILegacyOracle] contract.
    ///
    /// [ILegacyOracle]: crate::contracts::ILegacyOracle
    #[clap(long, env, required = false, long_help = "Address of the legacy oracle contract")]
    #[builder(setter(into))]
    pub legacy_oracle_address: Address,

    /// Recipient of the treasury fee.
    #[clap(long, env, required = false)]
    #[builder(setter(into))]
    pub treasury_address: Address,

    /// Recipient of the insurance fee.
    #[clap(long, env, required = false)]
    #[builder(setter(into))]
    pub insurance_fund_address: Address,

    /// Positions at which each reward computation variant takes effect.
    #[clap(skip)]
    #[builder(default)]
    pub upgrades: UpgradeSchedule,

    /// Totals corrections for this network, in block order.
    #[clap(skip)]
    #[builder(default)]
    pub corrections: &'static [TotalsCorrection],
}

impl Deployment {
    /// Create a new [DeploymentBuilder].
    pub fn builder() -> DeploymentBuilder {
        Default::default()
    }

    /// Lookup the [Deployment] for a named chain.
    pub const fn from_chain(chain: NamedChain) -> Option<Deployment> {
        match chain {
            NamedChain::Mainnet => Some(MAINNET),
            _ => None,
        }
    }

    /// Lookup the [Deployment] by chain ID.
    pub fn from_chain_id(chain_id: impl Into<u64>) -> Option<Deployment> {
        let chain = NamedChain::try_from(chain_id.into()).ok()?;
        Self::from_chain(chain)
    }

    /// Whether primary events are decoded from logs of `emitter`.
    pub fn is_protocol_emitter(&self, emitter: &Address) -> bool {
        *emitter == self.pool_address || *emitter == self.legacy_oracle_address
    }

    /// Correction to apply at `block_number`, if any.
    pub fn correction_at(&self, block_number: u64) -> Option<&TotalsCorrection> {
        self.corrections.iter().find(|c| c.block_number == block_number)
    }
}

/// [Deployment] for Ethereum mainnet.
pub const MAINNET: Deployment = Deployment {
    chain_id: Some(NamedChain::Mainnet as u64),
    pool_address: address!("0xae7ab96520de3a18e5e111b5eaab095312d7fe84"),
    legacy_oracle_address: address!("0x442af784a788a5bd6f42a01ebe9f287a871243fb"),
    treasury_address: address!("0x3e40d73eb977dc6a537af587d48316fee66e9c8c"),
    insurance_fund_address: address!("0x8b3f33234abd88493c0cd28de33d583b70bede35"),
    upgrades: UpgradeSchedule {
        execution_layer_rewards: ChainPosition::new(14_860_268, 0),
        mint_transfers: ChainPosition::new(14_860_268, 0),
        accounting_oracle: ChainPosition::new(17_266_004, 0),
    },
    corrections: &[],
};
