// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! The composition root: wires registries, fragments and TLS material
//! together from a [`HubConfig`].

use std::sync::Arc;

use backends::Registries;
use log::info;

use crate::{
    tls::CertWatcher, Error, ExecutionSnapshot, HubConfig, Result, ScopedExecutorManager,
    VerificationResult,
};

pub struct Hub {
    manager: Arc<ScopedExecutorManager>,
    cert_watcher: Option<CertWatcher>,
}

impl Hub {
    /// Load every configured fragment and start the certificate watcher.
    ///
    /// Any fragment that fails to load or build fails the whole start-up.
    pub async fn new(config: HubConfig, registries: Registries) -> Result<Self> {
        let manager = Arc::new(ScopedExecutorManager::new(Arc::new(registries)));
        for (identity, spec) in config.load_fragments().await? {
            manager.upsert(&identity, spec).await?;
        }

        let cert_watcher = match config.tls {
            Some(paths) => {
                let watcher = CertWatcher::new(paths);
                watcher.start()?;
                Some(watcher)
            }
            None => None,
        };

        info!(
            "verification hub started with {} fragments",
            manager.identities().await.len()
        );
        Ok(Self {
            manager,
            cert_watcher,
        })
    }

    /// The manager, for the reconciliation layer to upsert and delete
    /// fragments.
    pub fn manager(&self) -> Arc<ScopedExecutorManager> {
        self.manager.clone()
    }

    pub fn cert_watcher(&self) -> Option<&CertWatcher> {
        self.cert_watcher.as_ref()
    }

    pub fn snapshot(&self) -> Option<Arc<ExecutionSnapshot>> {
        self.manager.get()
    }

    /// Verify `subject` against the currently published snapshot.
    pub async fn verify(&self, subject: &str) -> Result<VerificationResult> {
        let snapshot = self.snapshot().ok_or(Error::NoSnapshot)?;
        snapshot.verify_subject(subject).await
    }
}
