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

//! Pooled value, total shares and per-account share balances.
//!
//! Every mutation goes through [Ledger::transact], which applies a group of operations
//! all-or-nothing. A non-negativity breach, or a commit where the account balances no longer
//! sum to the total shares, halts the ledger for good.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{Address, I256, U256};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total_pooled_value: U256,
    pub total_shares: U256,
}

impl Totals {
    pub const fn new(total_pooled_value: U256, total_shares: U256) -> Self {
        Self { total_pooled_value, total_shares }
    }

    /// Shares backed by `value` at the current rate, 1:1 while the pool is empty. `None` on
    /// overflow.
    pub fn shares_for_value(&self, value: U256) -> Option<U256> {
        if self.total_pooled_value.is_zero() || self.total_shares.is_zero() {
            return Some(value);
        }
        Some(value.checked_mul(self.total_shares)? / self.total_pooled_value)
    }

    /// Value owed for `shares` at the current rate. `None` on overflow.
    pub fn value_of_shares(&self, shares: U256) -> Option<U256> {
        if self.total_shares.is_zero() {
            return Some(U256::ZERO);
        }
        Some(shares.checked_mul(self.total_pooled_value)? / self.total_shares)
    }
}

/// Serializable form of a [Ledger], used for checkpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub totals: Totals,
    pub shares: BTreeMap<Address, U256>,
}

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    totals: Totals,
    shares: HashMap<Address, U256>,
    // Sum of `shares`, maintained incrementally.
    attributed: U256,
    halted: bool,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from existing totals and balances, checking that the balances sum to the
    /// total shares.
    pub fn from_parts(
        totals: Totals,
        shares: impl IntoIterator<Item = (Address, U256)>,
    ) -> Result<Self, LedgerError> {
        let mut balances = HashMap::new();
        let mut attributed = U256::ZERO;
        for (account, amount) in shares {
            if amount.is_zero() {
                continue;
            }
            attributed = attributed.checked_add(amount).ok_or_else(|| {
                LedgerError::InvariantViolation("account shares overflow".to_string())
            })?;
            *balances.entry(account).or_insert(U256::ZERO) += amount;
        }
        if attributed != totals.total_shares {
            return Err(LedgerError::InvariantViolation(format!(
                "account shares sum to {attributed}, total shares are {}",
                totals.total_shares
            )));
        }
        Ok(Self { totals, shares: balances, attributed, halted: false })
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        Self::from_parts(snapshot.totals, snapshot.shares)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            totals: self.totals,
            shares: self.shares.iter().map(|(a, s)| (*a, *s)).collect(),
        }
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn shares_of(&self, account: &Address) -> U256 {
        self.shares.get(account).copied().unwrap_or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.shares.iter()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Apply a group of mutations atomically.
    ///
    /// If `f` fails, or the resulting state breaks the share sum, every change made by `f` is
    /// rolled back. Invariant violations also leave the ledger halted, so that every later call
    /// fails with [LedgerError::Halted].
    pub fn transact<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&mut LedgerTx<'_>) -> Result<T, E>,
    {
        if self.halted {
            return Err(LedgerError::Halted.into());
        }
        let totals = self.totals;
        let attributed = self.attributed;
        let mut tx = LedgerTx { ledger: &mut *self, journal: HashMap::new() };
        let result = match f(&mut tx) {
            Ok(value) => tx.verify().map(|()| value).map_err(E::from),
            Err(err) => Err(err),
        };
        let journal = tx.journal;
        if result.is_err() {
            self.totals = totals;
            self.attributed = attributed;
            for (account, previous) in journal {
                match previous {
                    Some(balance) => self.shares.insert(account, balance),
                    None => self.shares.remove(&account),
                };
            }
        }
        result
    }
}

/// Handle for mutating a [Ledger] inside [Ledger::transact].
pub struct LedgerTx<'l> {
    ledger: &'l mut Ledger,
    // Balance of each touched account before the transaction.
    journal: HashMap<Address, Option<U256>>,
}

impl LedgerTx<'_> {
    pub fn totals(&self) -> Totals {
        self.ledger.totals
    }

    pub fn shares_of(&self, account: &Address) -> U256 {
        self.ledger.shares_of(account)
    }

    fn violation(&mut self, message: String) -> LedgerError {
        tracing::error!("ledger invariant violated: {message}");
        self.ledger.halted = true;
        LedgerError::InvariantViolation(message)
    }

    fn apply_delta(&mut self, current: U256, delta: I256, what: &str) -> Result<U256, LedgerError> {
        let magnitude = delta.unsigned_abs();
        let next = if delta.is_negative() {
            current.checked_sub(magnitude)
        } else {
            current.checked_add(magnitude)
        };
        match next {
            Some(next) => Ok(next),
            None => Err(self.violation(format!("{what} {current} cannot change by {delta}"))),
        }
    }

    pub fn apply_value_change(&mut self, delta: I256) -> Result<(), LedgerError> {
        let current = self.ledger.totals.total_pooled_value;
        self.ledger.totals.total_pooled_value =
            self.apply_delta(current, delta, "total pooled value")?;
        Ok(())
    }

    /// Overwrite the pooled value with an externally reported figure.
    pub fn set_total_pooled_value(&mut self, value: U256) {
        self.ledger.totals.total_pooled_value = value;
    }

    pub fn apply_share_change(&mut self, delta: I256) -> Result<(), LedgerError> {
        let current = self.ledger.totals.total_shares;
        self.ledger.totals.total_shares = self.apply_delta(current, delta, "total shares")?;
        Ok(())
    }

    fn record(&mut self, account: Address) {
        let previous = self.ledger.shares.get(&account).copied();
        self.journal.entry(account).or_insert(previous);
    }

    pub fn credit_shares(&mut self, account: Address, amount: U256) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.shares_of(&account);
        let (Some(next), Some(attributed)) =
            (balance.checked_add(amount), self.ledger.attributed.checked_add(amount))
        else {
            return Err(self.violation(format!("crediting {amount} shares to {account} overflows")));
        };
        self.record(account);
        self.ledger.shares.insert(account, next);
        self.ledger.attributed = attributed;
        Ok(())
    }

    pub fn debit_shares(&mut self, account: Address, amount: U256) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.shares_of(&account);
        if amount > balance {
            return Err(LedgerError::InsufficientShares { account, balance, requested: amount });
        }
        let Some(attributed) = self.ledger.attributed.checked_sub(amount) else {
            let message = format!("debiting {amount} shares from {account} underflows");
            return Err(self.violation(message));
        };
        self.record(account);
        let next = balance - amount;
        if next.is_zero() {
            self.ledger.shares.remove(&account);
        } else {
            self.ledger.shares.insert(account, next);
        }
        self.ledger.attributed = attributed;
        Ok(())
    }

    /// Move shares between accounts. A transfer to self is a no-op whatever the balance.
    pub fn transfer_shares(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if from == to {
            return Ok(());
        }
        self.debit_shares(from, amount)?;
        self.credit_shares(to, amount)
    }

    /// Create `amount` new shares owned by `to`.
    pub fn mint_shares(&mut self, to: Address, amount: U256) -> Result<(), LedgerError> {
        let total = self.ledger.totals.total_shares;
        let Some(next) = total.checked_add(amount) else {
            return Err(self.violation(format!("total shares {total} cannot grow by {amount}")));
        };
        self.ledger.totals.total_shares = next;
        self.credit_shares(to, amount)
    }

    /// Destroy `amount` shares owned by `from`.
    pub fn burn_shares(&mut self, from: Address, amount: U256) -> Result<(), LedgerError> {
        self.debit_shares(from, amount)?;
        let total = self.ledger.totals.total_shares;
        let Some(next) = total.checked_sub(amount) else {
            return Err(self.violation(format!("total shares {total} cannot shrink by {amount}")));
        };
        self.ledger.totals.total_shares = next;
        Ok(())
    }

    fn verify(&mut self) -> Result<(), LedgerError> {
        let Totals { total_shares, .. } = self.ledger.totals;
        if self.ledger.attributed != total_shares {
            let attributed = self.ledger.attributed;
            return Err(self.violation(format!(
                "account shares sum to {attributed}, total shares are {total_shares}"
            )));
        }
        Ok(())
    }
}
