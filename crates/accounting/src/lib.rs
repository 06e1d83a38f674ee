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

//! Share ledger and reward distribution accounting for a pooled staking protocol, driven by the
//! logs of its transaction receipts.

// Declare modules
pub mod contracts;
pub mod decoder;
pub mod deployments;
pub mod error;
pub mod events;
pub mod ledger;
pub mod pairs;
pub mod processor;
pub mod receipt;
pub mod reconstruct;
pub mod registry;
pub mod rewards;
pub mod state;
pub mod store;
pub mod version;

// Re-export commonly used types
pub use contracts::{ILegacyOracle, IStakingPool, PrimaryEvent, ProtocolEvent};

pub use decoder::{FromReconstructed, LogDecoder, ReconstructedEvent};

pub use deployments::{Deployment, NamedChain, TotalsCorrection, MAINNET};

pub use error::{
    AccountingError, ConversionError, LedgerError, RegistryError, StoreError, UnpairedEventError,
};

pub use events::ObservedMint;

pub use ledger::{Ledger, LedgerSnapshot, LedgerTx, Totals};

pub use pairs::{extract_pairs, EventPair};

pub use processor::{ProcessedReceipt, ReceiptProcessor};

pub use receipt::{RawLogEntry, TransactionContext, TransactionReceipt};

pub use reconstruct::{reconstruct, Reconstruction};

pub use registry::{ParamType, SignatureEntry, SignatureRegistry};

pub use rewards::{
    FeeParameters, NodeOperator, NodeOperatorsRewards, OperatorShare, ReportLog, RewardEngine,
    RewardReport, ValidatorWeightedDistribution,
};

pub use state::{
    reconcile_totals, AccountingState, BeaconSnapshot, OperatorFeeTotals, PooledValueSource,
    Reconciliation,
};

pub use store::{EntityStore, Loaded, MemoryStore};

pub use version::{select_variant, ChainPosition, ProtocolVersion, UpgradeSchedule};
