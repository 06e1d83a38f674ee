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

//! Registry of event signatures used to decode sibling logs in a receipt.

use std::{collections::HashMap, str::FromStr};

use alloy_dyn_abi::DynSolType;
use alloy_primitives::{keccak256, B256};

use crate::error::RegistryError;

/// Events the reward engine reconstructs from receipts, as `(name, parameter types)`.
pub const PROTOCOL_EVENTS: &[(&str, &str)] = &[
    ("ELRewardsReceived", "uint256"),
    ("Transfer", "address indexed,address indexed,uint256"),
    ("TransferShares", "address indexed,address indexed,uint256"),
    ("SharesBurnt", "address indexed,uint256,uint256,uint256"),
    ("Submitted", "address indexed,uint256,address"),
    ("ETHDistributed", "uint256 indexed,uint256,uint256,uint256,uint256,uint256"),
    ("TokenRebased", "uint256 indexed,uint256,uint256,uint256,uint256,uint256,uint256"),
    ("Completed", "uint256,uint128,uint128"),
];

/// Type of one event parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamType {
    pub kind: DynSolType,
    /// Indexed parameters are carried in the log topics rather than its data.
    pub indexed: bool,
}

impl ParamType {
    pub fn new(kind: DynSolType) -> Self {
        Self { kind, indexed: false }
    }

    pub fn indexed(kind: DynSolType) -> Self {
        Self { kind, indexed: true }
    }

    /// Parse a single type tag such as `uint256` or `address indexed`.
    pub fn parse(tag: &str) -> Result<Self, RegistryError> {
        let tag = tag.trim();
        let (ty, indexed) = match tag.strip_suffix("indexed") {
            Some(ty) if ty.ends_with(char::is_whitespace) => (ty.trim_end(), true),
            _ => (tag, false),
        };
        let kind = DynSolType::parse(ty).map_err(|err| RegistryError::InvalidType {
            tag: tag.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self { kind, indexed })
    }
}

/// Parse a comma-joined list of type tags. Commas nested in tuple types are not separators.
pub fn parse_type_list(types: &str) -> Result<Vec<ParamType>, RegistryError> {
    if types.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in types.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                params.push(ParamType::parse(&types[start..i])?);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(ParamType::parse(&types[start..])?);
    Ok(params)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureEntry {
    pub signature_hash: B256,
    pub event_name: String,
    pub param_types: Vec<ParamType>,
}

impl SignatureEntry {
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub fn canonical_signature(&self) -> String {
        canonical_signature(&self.event_name, &self.param_types)
    }

    pub fn indexed_count(&self) -> usize {
        self.param_types.iter().filter(|p| p.indexed).count()
    }

    fn descriptor(&self) -> String {
        let types: Vec<_> = self
            .param_types
            .iter()
            .map(|p| {
                if p.indexed {
                    format!("{} indexed", p.kind.sol_type_name())
                } else {
                    p.kind.sol_type_name().into_owned()
                }
            })
            .collect();
        format!("{}({})", self.event_name, types.join(","))
    }
}

fn canonical_signature(name: &str, params: &[ParamType]) -> String {
    let types: Vec<_> = params.iter().map(|p| p.kind.sol_type_name()).collect();
    format!("{name}({})", types.join(","))
}

/// Lookup table from event signature hash (topic 0) to the event's name and parameter layout.
///
/// Built once before processing and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct SignatureRegistry {
    entries: HashMap<B256, SignatureEntry>,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding [PROTOCOL_EVENTS].
    pub fn protocol_events() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (name, types) in PROTOCOL_EVENTS {
            registry.register_event(name, types)?;
        }
        Ok(registry)
    }

    /// Load a generated table of `(signature hash hex, event name, comma-joined types)` rows.
    pub fn from_table(rows: &[(&str, &str, &str)]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (hash, name, types) in rows {
            let signature_hash =
                B256::from_str(hash).map_err(|_| RegistryError::InvalidHash(hash.to_string()))?;
            let param_types = parse_type_list(types)?;
            let expected = keccak256(canonical_signature(name, &param_types));
            if expected != signature_hash {
                tracing::warn!(
                    "signature hash {signature_hash} does not match {name}({types}), \
                     expected {expected}"
                );
            }
            registry.register(signature_hash, *name, param_types)?;
        }
        Ok(registry)
    }

    /// Register an entry. Registering an identical entry twice is a no-op.
    pub fn register(
        &mut self,
        signature_hash: B256,
        name: impl Into<String>,
        param_types: Vec<ParamType>,
    ) -> Result<(), RegistryError> {
        let entry = SignatureEntry { signature_hash, event_name: name.into(), param_types };
        match self.entries.get(&signature_hash) {
            Some(existing) if *existing == entry => {
                tracing::debug!("signature {} already registered", entry.descriptor());
                Ok(())
            }
            Some(existing) => Err(RegistryError::DuplicateSignature {
                hash: signature_hash,
                existing: existing.descriptor(),
                attempted: entry.descriptor(),
            }),
            None => {
                self.entries.insert(signature_hash, entry);
                Ok(())
            }
        }
    }

    /// Register an event by name and type list, deriving the signature hash. Returns the hash.
    pub fn register_event(&mut self, name: &str, types: &str) -> Result<B256, RegistryError> {
        let param_types = parse_type_list(types)?;
        let signature_hash = keccak256(canonical_signature(name, &param_types));
        self.register(signature_hash, name, param_types)?;
        Ok(signature_hash)
    }

    pub fn lookup(&self, signature_hash: &B256) -> Option<&SignatureEntry> {
        self.entries.get(signature_hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignatureEntry> {
        self.entries.values()
    }
}
