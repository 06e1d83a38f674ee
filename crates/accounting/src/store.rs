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

//! Key-value entity storage and explicit find-or-create loading.

use std::{
    collections::{hash_map, BTreeMap, HashMap},
    hash::Hash,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::StoreError;

/// Result of a find-or-create lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loaded<T> {
    Existing(T),
    Created(T),
}

impl<T> Loaded<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Loaded::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Loaded::Existing(value) | Loaded::Created(value) => value,
        }
    }

    pub fn get(&self) -> &T {
        match self {
            Loaded::Existing(value) | Loaded::Created(value) => value,
        }
    }
}

/// A record kept in an [EntityStore].
pub trait Entity: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// Storage of serialized entities keyed by kind and id.
pub trait EntityStore {
    fn get(&self, kind: &str, id: &str) -> Result<Option<serde_json::Value>, StoreError>;

    fn set(&mut self, kind: &str, id: &str, value: serde_json::Value) -> Result<(), StoreError>;

    fn remove(&mut self, kind: &str, id: &str) -> Result<(), StoreError>;

    /// Ids of all entities of a kind, in ascending order.
    fn ids(&self, kind: &str) -> Result<Vec<String>, StoreError>;
}

pub fn load<E: Entity, S: EntityStore + ?Sized>(
    store: &S,
    id: &str,
) -> Result<Option<E>, StoreError> {
    store
        .get(E::KIND, id)?
        .map(serde_json::from_value::<E>)
        .transpose()
        .map_err(|source| StoreError::Serde { kind: E::KIND, id: id.to_string(), source })
}

pub fn save<E: Entity, S: EntityStore + ?Sized>(
    store: &mut S,
    id: &str,
    entity: &E,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(entity)
        .map_err(|source| StoreError::Serde { kind: E::KIND, id: id.to_string(), source })?;
    store.set(E::KIND, id, value)
}

/// Load the entity `id`, or build it with `create` if it does not exist. A created entity is
/// not saved.
pub fn find_or_create<E: Entity, S: EntityStore + ?Sized>(
    store: &S,
    id: &str,
    create: impl FnOnce() -> E,
) -> Result<Loaded<E>, StoreError> {
    Ok(match load(store, id)? {
        Some(entity) => Loaded::Existing(entity),
        None => Loaded::Created(create()),
    })
}

/// In-memory counterpart of [find_or_create] for maps held in process.
pub fn find_or_create_entry<K: Eq + Hash, V>(
    map: &mut HashMap<K, V>,
    key: K,
    create: impl FnOnce() -> V,
) -> Loaded<&mut V> {
    match map.entry(key) {
        hash_map::Entry::Occupied(entry) => Loaded::Existing(entry.into_mut()),
        hash_map::Entry::Vacant(entry) => Loaded::Created(entry.insert(create())),
    }
}

/// Zero-padded id, so that lexicographic order of ids is numeric order.
pub fn sequence_id(seq: u64) -> String {
    format!("{seq:0>20}")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    entities: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, kind: &str, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entities.get(kind).and_then(|ids| ids.get(id)).cloned())
    }

    fn set(&mut self, kind: &str, id: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.entities.entry(kind.to_string()).or_default().insert(id.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, kind: &str, id: &str) -> Result<(), StoreError> {
        if let Some(ids) = self.entities.get_mut(kind) {
            ids.remove(id);
        }
        Ok(())
    }

    fn ids(&self, kind: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.entities.get(kind).map(|ids| ids.keys().cloned().collect()).unwrap_or_default())
    }
}
