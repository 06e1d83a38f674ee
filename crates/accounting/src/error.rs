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

use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

use crate::version::{ChainPosition, ProtocolVersion};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("signature {hash} already registered as {existing}, cannot register {attempted}")]
    DuplicateSignature { hash: B256, existing: String, attempted: String },

    #[error("invalid parameter type {tag:?}: {reason}")]
    InvalidType { tag: String, reason: String },

    #[error("invalid signature hash {0:?}")]
    InvalidHash(String),
}

/// Failure to convert a [ReconstructedEvent](crate::decoder::ReconstructedEvent) into a
/// concrete event record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("expected event {expected}, found {found}")]
    NameMismatch { expected: &'static str, found: String },

    #[error("event {event} parameter {index} is not a valid {expected}")]
    ParamMismatch { event: &'static str, index: usize, expected: &'static str },
}

/// An expected event pair was left incomplete at the end of a scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unpaired {name} event at log index {log_index} in transaction {tx_hash}")]
pub struct UnpairedEventError {
    pub name: String,
    pub log_index: u64,
    pub tx_hash: B256,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {account} holds {balance} shares, cannot debit {requested}")]
    InsufficientShares { account: Address, balance: U256, requested: U256 },

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("ledger is halted after an invariant violation")]
    Halted,
}

impl LedgerError {
    /// Whether the error leaves the ledger unusable for the rest of the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::InvariantViolation(_) | LedgerError::Halted)
    }
}

#[derive(Error, Debug)]
pub enum AccountingError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Unpaired(#[from] UnpairedEventError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to decode primary event at log index {log_index}")]
    PrimaryDecode {
        log_index: u64,
        #[source]
        source: alloy_sol_types::Error,
    },

    #[error("transaction {tx_hash} has no {name} event after log index {after}")]
    MissingSibling { tx_hash: B256, name: &'static str, after: u64 },

    #[error("{event} at {position} is not valid under protocol {version}")]
    VersionMismatch { event: &'static str, position: ChainPosition, version: ProtocolVersion },

    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),

    #[error("node operator reward distribution failed: {0:#}")]
    Distribution(anyhow::Error),

    #[error("chain state query failed: {0:#}")]
    ChainState(anyhow::Error),
}

impl AccountingError {
    /// Fatal errors halt all further processing. Every other error aborts only the receipt
    /// being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AccountingError::Ledger(err) if err.is_fatal())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to (de)serialize {kind} entity {id}")]
    Serde {
        kind: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
