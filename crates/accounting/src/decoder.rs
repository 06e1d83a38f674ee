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

//! Decoding of raw log entries against the [SignatureRegistry].

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::{
    error::ConversionError,
    receipt::{RawLogEntry, TransactionContext},
    registry::{SignatureEntry, SignatureRegistry},
};

/// A log decoded into its event name and parameter values, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconstructedEvent {
    pub name: String,
    pub params: Vec<DynSolValue>,
    pub emitter: Address,
    pub log_index: u64,
    pub tx: TransactionContext,
}

impl ReconstructedEvent {
    pub fn param(&self, index: usize) -> Option<&DynSolValue> {
        self.params.get(index)
    }

    pub fn uint_param(&self, index: usize) -> Option<U256> {
        self.param(index)?.as_uint().map(|(value, _)| value)
    }

    pub fn address_param(&self, index: usize) -> Option<Address> {
        self.param(index)?.as_address()
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// Checked conversion into a concrete event record.
    pub fn decode_as<T: FromReconstructed>(&self) -> Result<T, ConversionError> {
        if self.name != T::NAME {
            return Err(ConversionError::NameMismatch {
                expected: T::NAME,
                found: self.name.clone(),
            });
        }
        T::from_params(self)
    }
}

/// Concrete event records that can be recovered from a [ReconstructedEvent].
pub trait FromReconstructed: Sized {
    const NAME: &'static str;

    /// Build the record from the event's parameters. The name has already been checked.
    fn from_params(event: &ReconstructedEvent) -> Result<Self, ConversionError>;
}

#[derive(Error, Debug)]
enum DecodeError {
    #[error("expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },

    #[error(transparent)]
    Abi(#[from] alloy_dyn_abi::Error),

    #[error("decoded data has the wrong shape")]
    Shape,
}

#[derive(Clone, Copy, Debug)]
pub struct LogDecoder<'a> {
    registry: &'a SignatureRegistry,
}

impl<'a> LogDecoder<'a> {
    pub fn new(registry: &'a SignatureRegistry) -> Self {
        Self { registry }
    }

    /// Decode a log. Logs of unregistered events, and logs whose topics or data do not fit the
    /// registered layout, yield `None`.
    pub fn decode(
        &self,
        log: &RawLogEntry,
        tx: &TransactionContext,
    ) -> Option<ReconstructedEvent> {
        let entry = self.registry.lookup(log.topic0()?)?;
        match decode_params(entry, log) {
            Ok(params) => Some(ReconstructedEvent {
                name: entry.event_name.clone(),
                params,
                emitter: log.address,
                log_index: log.log_index,
                tx: *tx,
            }),
            Err(err) => {
                tracing::debug!(
                    "skipping log {} of {}: cannot decode as {}: {err}",
                    log.log_index,
                    tx.hash,
                    entry.canonical_signature()
                );
                None
            }
        }
    }
}

fn decode_params(
    entry: &SignatureEntry,
    log: &RawLogEntry,
) -> Result<Vec<DynSolValue>, DecodeError> {
    let expected = 1 + entry.indexed_count();
    if log.topics.len() != expected {
        return Err(DecodeError::TopicCount { expected, found: log.topics.len() });
    }

    let body: Vec<DynSolType> =
        entry.param_types.iter().filter(|p| !p.indexed).map(|p| p.kind.clone()).collect();
    let mut body = match DynSolType::Tuple(body).abi_decode_params(&log.data)? {
        DynSolValue::Tuple(values) => values.into_iter(),
        _ => return Err(DecodeError::Shape),
    };

    let mut topics = log.topics.iter().skip(1);
    let mut params = Vec::with_capacity(entry.param_types.len());
    for param in &entry.param_types {
        let value = if param.indexed {
            let topic = topics.next().ok_or(DecodeError::Shape)?;
            if param.kind.is_dynamic() {
                // Only the hash of a dynamic indexed value is logged.
                DynSolValue::FixedBytes(*topic, 32)
            } else {
                param.kind.abi_decode(topic.as_slice())?
            }
        } else {
            body.next().ok_or(DecodeError::Shape)?
        };
        params.push(value);
    }
    Ok(params)
}
