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

//! Integer arithmetic of the fee mint, replicating the pool contract.

use alloy_primitives::{uint, I256, U256};
use serde::{Deserialize, Serialize};

use crate::{error::AccountingError, ledger::Totals};

/// Denominator of all fee basis point figures.
pub const FEE_BASIS_POINTS_UNIT: U256 = uint!(10000_U256);

/// Value deposited per validator.
pub const DEPOSIT_SIZE: U256 = uint!(32_000_000_000_000_000_000_U256);

/// Fixed point precision of share rates used for the annual rate.
pub const SHARE_RATE_PRECISION: U256 = uint!(1_000_000_000_000_000_000_000_000_000_U256);

pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

/// Fee parameters in basis points, as last set on chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParameters {
    /// Total protocol fee taken from rewards.
    pub fee: u16,
    /// Portions of the fee, summing to [FEE_BASIS_POINTS_UNIT].
    pub treasury: u16,
    pub insurance: u16,
    pub operators: u16,
}

/// Shares to mint so that the minted shares are worth `fee_bps` of `raw_reward` after the
/// reward is added to the pool.
///
/// `raw_reward * fee * shares / (value_after * UNIT - fee * raw_reward)`, truncated once at the
/// end. `total_value_after` already includes `raw_reward`.
pub fn shares_to_mint(
    raw_reward: U256,
    fee_bps: u16,
    total_shares_before: U256,
    total_value_after: U256,
) -> Result<U256, AccountingError> {
    let fee = U256::from(fee_bps);
    if raw_reward.is_zero() || fee.is_zero() {
        return Ok(U256::ZERO);
    }
    let numerator = raw_reward
        .checked_mul(fee)
        .and_then(|n| n.checked_mul(total_shares_before))
        .ok_or(AccountingError::Overflow("shares to mint numerator"))?;
    let fee_value = fee.checked_mul(raw_reward);
    let denominator = total_value_after
        .checked_mul(FEE_BASIS_POINTS_UNIT)
        .zip(fee_value)
        .and_then(|(d, f)| d.checked_sub(f))
        .filter(|d| !d.is_zero())
        .ok_or(AccountingError::Overflow("shares to mint denominator"))?;
    Ok(numerator / denominator)
}

/// Portion `bps` of `shares`, truncated.
pub fn fee_portion(shares: U256, bps: u16) -> Result<U256, AccountingError> {
    shares
        .checked_mul(U256::from(bps))
        .map(|n| n / FEE_BASIS_POINTS_UNIT)
        .ok_or(AccountingError::Overflow("fee portion"))
}

/// Classify the treasury remainder of a mint as `(treasury_fee, dust)`.
///
/// With no treasury fee configured, the remainder only exists because of truncation and is
/// dust. Exactly one of the two is nonzero whenever the remainder is.
pub fn classify_treasury_share(treasury_share: U256, treasury_bps: u16) -> (U256, U256) {
    if treasury_bps == 0 {
        (U256::ZERO, treasury_share)
    } else {
        (treasury_share, U256::ZERO)
    }
}

/// `a - b` as a signed value.
pub fn signed_difference(a: U256, b: U256) -> Result<I256, AccountingError> {
    let overflow = || AccountingError::Overflow("signed difference");
    if a >= b {
        I256::try_from(a - b).map_err(|_| overflow())
    } else {
        I256::try_from(b - a).map(|d| -d).map_err(|_| overflow())
    }
}

/// Share rate scaled by [SHARE_RATE_PRECISION]. `None` for an empty pool.
pub fn share_rate(totals: &Totals) -> Option<U256> {
    if totals.total_shares.is_zero() {
        return None;
    }
    Some(totals.total_pooled_value.checked_mul(SHARE_RATE_PRECISION)? / totals.total_shares)
}

/// Annualized change of the share rate between two states, in parts per million.
///
/// The rate after the report already accounts for the fee shares, so the result is net of fees.
pub fn annual_rate_ppm(before: &Totals, after: &Totals, elapsed: u64) -> Option<I256> {
    if elapsed == 0 {
        return None;
    }
    let rate_before = share_rate(before).filter(|r| !r.is_zero())?;
    let rate_after = share_rate(after)?;
    let (delta, negative) = if rate_after >= rate_before {
        (rate_after - rate_before, false)
    } else {
        (rate_before - rate_after, true)
    };
    let scaled = delta
        .checked_mul(U256::from(SECONDS_PER_YEAR))?
        .checked_mul(U256::from(1_000_000u64))?
        / rate_before.checked_mul(U256::from(elapsed))?;
    let scaled = I256::try_from(scaled).ok()?;
    Some(if negative { -scaled } else { scaled })
}

/// Percentage for a rate in parts per million.
pub fn ppm_to_percent(ppm: I256) -> f64 {
    let magnitude = ppm.unsigned_abs().saturating_to::<u64>() as f64 / 10_000.0;
    if ppm.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}
