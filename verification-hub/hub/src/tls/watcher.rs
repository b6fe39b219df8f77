// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};
use notify::{
    event::{AccessKind, AccessMode, ModifyKind},
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use rustls::{server::ClientHello, ServerConfig};

use super::{CertBundle, CertPaths, Result, TlsError};
use crate::PublishedHandle;

/// How often a removed file is looked for again before giving up on it.
const REWATCH_ATTEMPTS: u32 = 10;

const REWATCH_INTERVAL: Duration = Duration::from_millis(100);

type SharedWatcher = Arc<Mutex<Option<RecommendedWatcher>>>;

/// Keeps a [`CertBundle`] in sync with the files in [`CertPaths`].
pub struct CertWatcher {
    paths: CertPaths,
    current: Arc<PublishedHandle<CertBundle>>,
    watcher: SharedWatcher,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CertWatcher {
    pub fn new(paths: CertPaths) -> Self {
        Self {
            paths,
            current: Arc::new(PublishedHandle::empty()),
            watcher: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
        }
    }

    pub fn paths(&self) -> &CertPaths {
        &self.paths
    }

    /// Start watching the files, then load and publish the initial bundle.
    ///
    /// Fails if the files cannot be watched or the initial bundle cannot be
    /// loaded, and then nothing is published. Calling `start` on a running
    /// watcher does nothing.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            debug!("certificate watcher already started");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).map_err(|source| TlsError::Watch {
            path: self.paths.cert_path.clone(),
            source,
        })?;
        for path in self.paths.watched() {
            watcher
                .watch(&path, RecursiveMode::NonRecursive)
                .map_err(|source| TlsError::Watch { path, source })?;
        }

        // the worker reloads under this lock, so events queued while starting
        // are applied after the initial bundle
        let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(watcher);

        let context = ReloadContext {
            paths: self.paths.clone(),
            current: self.current.clone(),
            watcher: self.watcher.clone(),
        };
        let handle = match thread::Builder::new()
            .name("cert-watcher".into())
            .spawn(move || context.run(rx))
        {
            Ok(handle) => handle,
            Err(e) => {
                *slot = None;
                return Err(TlsError::Spawn(e));
            }
        };

        let bundle = match CertBundle::load(&self.paths) {
            Ok(bundle) => bundle,
            Err(e) => {
                // closes the event channel
                *slot = None;
                drop(slot);
                if handle.join().is_err() {
                    error!("certificate watcher worker panicked");
                }
                return Err(e);
            }
        };
        self.current.publish(bundle);
        info!("loaded TLS certificate from {:?}", self.paths.cert_path);

        drop(slot);
        *worker = Some(handle);
        Ok(())
    }

    /// Release the file watch and wait for the reload worker to exit.
    pub fn stop(&self) {
        // dropping the watcher closes the event channel, which ends the worker
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(watcher);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("certificate watcher worker panicked");
            }
            debug!("certificate watcher stopped");
        }
    }

    /// The server config for a new connection, built from the latest
    /// published bundle.
    pub fn config_for_client(&self, hello: &ClientHello<'_>) -> Result<Arc<ServerConfig>> {
        debug!("serve TLS config for SNI {:?}", hello.server_name());
        self.current_config()
    }

    pub fn current_config(&self) -> Result<Arc<ServerConfig>> {
        self.current_bundle().map(|bundle| bundle.server_config())
    }

    pub fn current_bundle(&self) -> Result<Arc<CertBundle>> {
        self.current.load().ok_or(TlsError::NotStarted)
    }
}

impl Drop for CertWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReloadContext {
    paths: CertPaths,
    current: Arc<PublishedHandle<CertBundle>>,
    watcher: SharedWatcher,
}

impl ReloadContext {
    fn run(self, events: mpsc::Receiver<notify::Result<Event>>) {
        for event in events {
            match event {
                Ok(event) => self.handle(event),
                Err(e) => warn!("certificate watch error: {e}"),
            }
        }
        debug!("certificate event channel closed");
    }

    fn handle(&self, event: Event) {
        if !triggers_reload(&event.kind) {
            return;
        }
        debug!("certificate file event {:?} on {:?}", event.kind, event.paths);

        if let EventKind::Remove(_) = event.kind {
            for path in &event.paths {
                self.rewatch(path);
            }
        }
        self.reload();
    }

    /// Watch `path` again after it was removed, waiting for it to be
    /// recreated.
    fn rewatch(&self, path: &Path) {
        let path = self.watched_path(path);
        for attempt in 1..=REWATCH_ATTEMPTS {
            {
                let mut slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(watcher) = slot.as_mut() else {
                    // stopped
                    return;
                };
                let _ = watcher.unwatch(&path);
                match watcher.watch(&path, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        debug!("re-watching {path:?} after {attempt} attempts");
                        return;
                    }
                    Err(e) if attempt == REWATCH_ATTEMPTS => {
                        warn!("cannot watch {path:?} again, further changes are missed: {e}");
                        return;
                    }
                    Err(_) => {}
                }
            }
            thread::sleep(REWATCH_INTERVAL);
        }
    }

    /// Map an event path back to the configured path it belongs to.
    fn watched_path(&self, path: &Path) -> PathBuf {
        self.paths
            .watched()
            .into_iter()
            .find(|watched| path.ends_with(watched) || watched.ends_with(path))
            .unwrap_or_else(|| path.to_path_buf())
    }

    fn reload(&self) {
        let slot = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            // stopped
            return;
        }
        match CertBundle::load(&self.paths) {
            Ok(bundle) => {
                self.current.publish(bundle);
                info!("reloaded TLS certificate from {:?}", self.paths.cert_path);
            }
            Err(e) => error!("reload TLS certificate failed, keep serving the previous one: {e:?}"),
        }
    }
}

fn triggers_reload(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        _ => false,
    }
}
