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

//! Reconstruction of the sibling events of a transaction from its receipt.

use std::cell::OnceCell;

use alloy_primitives::Address;

use crate::{
    decoder::{LogDecoder, ReconstructedEvent},
    receipt::{TransactionContext, TransactionReceipt},
    registry::SignatureRegistry,
};

/// The decodable events of one receipt, in ascending log index order.
///
/// Decoding happens lazily on iteration. The sequence has no side effects and can be iterated
/// any number of times, always yielding the same events. Lookups by name decode the receipt once
/// and reuse the result.
#[derive(Clone, Debug)]
pub struct Reconstruction<'a> {
    decoder: LogDecoder<'a>,
    receipt: &'a TransactionReceipt,
    context: TransactionContext,
    order: Vec<usize>,
    decoded: OnceCell<Vec<ReconstructedEvent>>,
}

/// Reconstruct the events of `receipt`.
///
/// A receipt with fewer than two logs only carries the primary event and yields an empty
/// sequence; its log is never decoded.
pub fn reconstruct<'a>(
    registry: &'a SignatureRegistry,
    receipt: &'a TransactionReceipt,
) -> Reconstruction<'a> {
    let order = if receipt.logs.len() < 2 {
        Vec::new()
    } else {
        let mut order: Vec<usize> = (0..receipt.logs.len()).collect();
        order.sort_by_key(|&i| receipt.logs[i].log_index);
        order
    };
    Reconstruction {
        decoder: LogDecoder::new(registry),
        receipt,
        context: receipt.context(),
        order,
        decoded: OnceCell::new(),
    }
}

impl<'a> Reconstruction<'a> {
    pub fn iter(&self) -> ReconstructedEvents<'_, 'a> {
        ReconstructedEvents { reconstruction: self, next: 0 }
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    /// Keep only the logs of emitters for which `keep` holds. Logs of other contracts can share
    /// a signature with the events of interest, e.g. any token's `Transfer`.
    pub fn emitted_by(mut self, keep: impl Fn(&Address) -> bool) -> Self {
        let receipt = self.receipt;
        self.order.retain(|&i| keep(&receipt.logs[i].address));
        self.decoded = OnceCell::new();
        self
    }

    /// Every decodable event, decoded on first use.
    pub fn events(&self) -> &[ReconstructedEvent] {
        self.decoded.get_or_init(|| self.iter().collect())
    }

    /// Events with the given name.
    pub fn named(&self, name: &str) -> Vec<ReconstructedEvent> {
        self.events().iter().filter(|event| event.is(name)).cloned().collect()
    }

    /// First event with the given name emitted after `log_index`.
    pub fn first_after(&self, name: &str, log_index: u64) -> Option<ReconstructedEvent> {
        self.events().iter().find(|event| event.log_index > log_index && event.is(name)).cloned()
    }

    /// Events emitted strictly between two log indices.
    pub fn between(
        &self,
        after: u64,
        before: u64,
    ) -> impl Iterator<Item = ReconstructedEvent> + '_ {
        self.events()
            .iter()
            .filter(move |event| event.log_index > after && event.log_index < before)
            .cloned()
    }
}

/// Iterator over a [Reconstruction].
#[derive(Clone, Debug)]
pub struct ReconstructedEvents<'r, 'a> {
    reconstruction: &'r Reconstruction<'a>,
    next: usize,
}

impl Iterator for ReconstructedEvents<'_, '_> {
    type Item = ReconstructedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let Reconstruction { decoder, receipt, context, order, .. } = self.reconstruction;
        while let Some(&i) = order.get(self.next) {
            self.next += 1;
            if let Some(event) = decoder.decode(&receipt.logs[i], context) {
                return Some(event);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.reconstruction.order.len() - self.next))
    }
}

impl<'r, 'a> IntoIterator for &'r Reconstruction<'a> {
    type Item = ReconstructedEvent;
    type IntoIter = ReconstructedEvents<'r, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
