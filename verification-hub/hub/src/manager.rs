// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The scoped executor manager.
//!
//! The manager owns the raw fragments submitted by the reconciliation
//! layer. Every change rebuilds all scoped execution units from scratch and,
//! only when every fragment built, publishes them as a new
//! [`ExecutionSnapshot`]. Readers call [`ScopedExecutorManager::get`], which
//! never blocks.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use backends::Registries;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    fragment::{Fragment, FragmentSpec},
    snapshot::{ExecutionSnapshot, ScopedExecutionUnit},
    Error, PublishedHandle, Result,
};

/// The outcome of the latest change to one fragment, in the shape of a
/// status subresource.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FragmentStatus {
    pub succeeded: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub last_updated: DateTime<Utc>,
}

impl FragmentStatus {
    fn succeeded() -> Self {
        Self {
            succeeded: true,
            error: None,
            last_updated: Utc::now(),
        }
    }

    fn failed(error: &Error) -> Self {
        Self {
            succeeded: false,
            error: Some(error.status_message()),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Default)]
struct FragmentStore {
    fragments: BTreeMap<String, Fragment>,
    statuses: HashMap<String, FragmentStatus>,
    generation: u64,
}

impl FragmentStore {
    fn mark_all_succeeded(&mut self) {
        for identity in self.fragments.keys() {
            self.statuses
                .insert(identity.clone(), FragmentStatus::succeeded());
        }
    }

    /// Record `error` against `identity` and against the fragment the error
    /// is attributed to, if that is another one.
    fn mark_failed(&mut self, identity: &str, error: &Error) {
        self.statuses
            .insert(identity.to_string(), FragmentStatus::failed(error));
        if let Some(culprit) = error.fragment_identity() {
            if culprit != identity && self.fragments.contains_key(culprit) {
                self.statuses
                    .insert(culprit.to_string(), FragmentStatus::failed(error));
            }
        }
    }
}

pub struct ScopedExecutorManager {
    registries: Arc<Registries>,
    store: Mutex<FragmentStore>,
    published: PublishedHandle<ExecutionSnapshot>,
}

impl ScopedExecutorManager {
    pub fn new(registries: Arc<Registries>) -> Self {
        Self {
            registries,
            store: Mutex::new(FragmentStore::default()),
            published: PublishedHandle::empty(),
        }
    }

    /// The currently published snapshot, `None` before the first successful
    /// rebuild.
    pub fn get(&self) -> Option<Arc<ExecutionSnapshot>> {
        self.published.load()
    }

    /// Create or replace the fragment `identity`, then rebuild.
    ///
    /// A fragment that fails validation is not recorded. A fragment that
    /// validates but fails to build is recorded, and the previously published
    /// snapshot stays in place until it is fixed or deleted.
    pub async fn upsert(&self, identity: &str, spec: FragmentSpec) -> Result<()> {
        let converted = if identity.is_empty() {
            Err(Error::InvalidFragment("identity must not be empty".into()))
        } else {
            Fragment::try_from(spec)
        };

        let mut store = self.store.lock().await;
        let fragment = match converted {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!("reject fragment `{identity}`: {}", e.status_message());
                store.mark_failed(identity, &e);
                return Err(e);
            }
        };

        store.fragments.insert(identity.to_string(), fragment);
        match self.rebuild(&mut store).await {
            Ok(_) => {
                store.mark_all_succeeded();
                Ok(())
            }
            Err(e) => {
                warn!(
                    "upsert of fragment `{identity}` not published: {}",
                    e.status_message()
                );
                store.mark_failed(identity, &e);
                Err(e)
            }
        }
    }

    /// Remove the fragment `identity`, then rebuild.
    pub async fn delete(&self, identity: &str) -> Result<()> {
        let mut store = self.store.lock().await;
        store.statuses.remove(identity);
        if store.fragments.remove(identity).is_none() {
            return Err(Error::UnknownFragment(identity.to_string()));
        }

        match self.rebuild(&mut store).await {
            Ok(_) => {
                store.mark_all_succeeded();
                Ok(())
            }
            Err(e) => {
                warn!(
                    "delete of fragment `{identity}` not published: {}",
                    e.status_message()
                );
                if let Some(culprit) = e.fragment_identity().map(str::to_string) {
                    store.mark_failed(&culprit, &e);
                }
                Err(e)
            }
        }
    }

    pub async fn status(&self, identity: &str) -> Option<FragmentStatus> {
        self.store.lock().await.statuses.get(identity).cloned()
    }

    /// The identities of every recorded fragment, sorted.
    pub async fn identities(&self) -> Vec<String> {
        self.store.lock().await.fragments.keys().cloned().collect()
    }

    async fn rebuild(&self, store: &mut FragmentStore) -> Result<Arc<ExecutionSnapshot>> {
        check_scope_conflicts(
            store
                .fragments
                .iter()
                .map(|(identity, fragment)| (identity.as_str(), fragment)),
        )?;

        let mut units = Vec::with_capacity(store.fragments.len());
        for (identity, fragment) in &store.fragments {
            let unit = ScopedExecutionUnit::build(identity, fragment, &self.registries)
                .await
                .map_err(|source| Error::BuildFragment {
                    identity: identity.clone(),
                    source: Box::new(source),
                })?;
            units.push(unit);
        }

        store.generation += 1;
        let snapshot = self
            .published
            .publish(ExecutionSnapshot::new(store.generation, units));
        info!(
            "published execution snapshot generation {} with {} units",
            snapshot.generation(),
            snapshot.len()
        );
        Ok(snapshot)
    }
}

/// Fail if two fragments declare the same scope pattern. The conflict is
/// attributed to the later of the two fragments.
pub fn check_scope_conflicts<'a>(
    fragments: impl IntoIterator<Item = (&'a str, &'a Fragment)>,
) -> Result<()> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    for (identity, fragment) in fragments {
        for scope in fragment.scope_names() {
            if let Some(existing) = owners.insert(scope, identity) {
                return Err(Error::ScopeConflict {
                    scope: scope.to_string(),
                    identity: identity.to_string(),
                    existing: existing.to_string(),
                });
            }
        }
    }
    Ok(())
}
