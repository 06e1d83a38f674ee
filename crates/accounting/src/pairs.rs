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

//! Grouping of events that the contract always emits together.

use crate::{decoder::ReconstructedEvent, error::UnpairedEventError};

/// Two related events, or a single event that is not part of a pair.
#[derive(Clone, Debug, PartialEq)]
pub struct EventPair {
    /// The earlier of the two events.
    pub first: ReconstructedEvent,
    pub second: Option<ReconstructedEvent>,
}

impl EventPair {
    pub fn single(event: ReconstructedEvent) -> Self {
        Self { first: event, second: None }
    }

    pub fn is_pair(&self) -> bool {
        self.second.is_some()
    }

    /// The event of the pair with the given name.
    pub fn get(&self, name: &str) -> Option<&ReconstructedEvent> {
        std::iter::once(&self.first).chain(&self.second).find(|event| event.is(name))
    }

    /// Both events, ordered as `(name_a, name_b)`. `None` for singletons.
    pub fn split(
        &self,
        name_a: &str,
        name_b: &str,
    ) -> Option<(&ReconstructedEvent, &ReconstructedEvent)> {
        let second = self.second.as_ref()?;
        if self.first.is(name_a) && second.is(name_b) {
            Some((&self.first, second))
        } else if self.first.is(name_b) && second.is(name_a) {
            Some((second, &self.first))
        } else {
            None
        }
    }
}

/// Group occurrences of `name_a` and `name_b` into pairs.
///
/// The scan keeps at most one pending event per name. An occurrence of a name that is already
/// pending is not paired and passes through as a singleton, so the first occurrence is the one
/// that meets the counterpart. Each pair takes the position of its earlier event; events with
/// other names pass through at their own position. A pending event left without a counterpart at
/// the end of the sequence is an error.
pub fn extract_pairs(
    events: impl IntoIterator<Item = ReconstructedEvent>,
    name_a: &str,
    name_b: &str,
) -> Result<Vec<EventPair>, UnpairedEventError> {
    let mut slots: Vec<Option<EventPair>> = Vec::new();
    let mut pending: [Option<(usize, ReconstructedEvent)>; 2] = [None, None];

    for event in events {
        let side = if event.is(name_a) && pending[0].is_none() {
            0
        } else if event.is(name_b) && pending[1].is_none() {
            1
        } else {
            if event.is(name_a) || event.is(name_b) {
                tracing::debug!(
                    "{} at log index {} repeats a pending event; not paired",
                    event.name,
                    event.log_index
                );
            }
            slots.push(Some(EventPair::single(event)));
            continue;
        };
        pending[side] = Some((slots.len(), event));
        slots.push(None);

        if let [Some(_), Some(_)] = &pending {
            if let [Some((slot_a, a)), Some((slot_b, b))] = std::mem::take(&mut pending) {
                let (slot, first, second) =
                    if slot_a < slot_b { (slot_a, a, b) } else { (slot_b, b, a) };
                slots[slot] = Some(EventPair { first, second: Some(second) });
            }
        }
    }

    if let Some((_, event)) = pending.iter().flatten().next() {
        tracing::error!(
            "unpaired {} at log index {} in {}; expected {name_a}/{name_b} pairs",
            event.name,
            event.log_index,
            event.tx.hash
        );
        return Err(UnpairedEventError {
            name: event.name.clone(),
            log_index: event.log_index,
            tx_hash: event.tx.hash,
        });
    }
    Ok(slots.into_iter().flatten().collect())
}
