// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Routes an artifact reference to one of the referrer stores declared by a
//! fragment.
//!
//! A router is built once per fragment and never mutated afterwards. When
//! the fragment changes a new router is built from scratch.

use backends::{ReferrerStore, Registry};
use log::debug;

use crate::{
    fragment::BackendOptions,
    pattern::{self, Pattern},
    Error, Result,
};

struct StoreEntry {
    pattern: Pattern,
    store: Box<dyn ReferrerStore>,
}

#[derive(Default)]
pub struct StoreRouter {
    stores: Vec<StoreEntry>,
}

impl StoreRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct every store through `registry` and register it under its
    /// pattern. The first failure aborts the whole build.
    pub async fn build(
        registry: &Registry<dyn ReferrerStore>,
        specs: &[(String, BackendOptions)],
    ) -> Result<Self> {
        let mut router = Self::new();
        for (pattern, options) in specs {
            let store = registry
                .construct(&options.type_name, options.parameters.clone())
                .await?;
            router.register(pattern, store)?;
        }

        Ok(router)
    }

    pub fn register(&mut self, pattern: &str, store: Box<dyn ReferrerStore>) -> Result<()> {
        let pattern = Pattern::new(pattern)?;
        if self.stores.iter().any(|entry| entry.pattern == pattern) {
            return Err(Error::DuplicateStorePattern(pattern.as_str().to_string()));
        }

        debug!("register store route `{}`", pattern.as_str());
        self.stores.push(StoreEntry { pattern, store });
        Ok(())
    }

    /// The store registered under the most specific pattern matching
    /// `reference`.
    pub fn resolve(&self, reference: &str) -> Result<&dyn ReferrerStore> {
        self.resolve_entry(reference).map(|(_, store)| store)
    }

    /// Like [`StoreRouter::resolve`], also returning the matched pattern.
    pub fn resolve_entry(&self, reference: &str) -> Result<(&str, &dyn ReferrerStore)> {
        pattern::most_specific(
            reference,
            self.stores
                .iter()
                .map(|entry| (&entry.pattern, entry.store.as_ref())),
        )
        .map(|(pattern, store)| (pattern.as_str(), store))
        .ok_or_else(|| Error::NoMatchingStore(reference.to_string()))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(|entry| entry.pattern.as_str())
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}
