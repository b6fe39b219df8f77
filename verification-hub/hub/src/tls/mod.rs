// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! TLS material for the hub's listener, hot reloaded from disk.
//!
//! [`CertWatcher`] watches the certificate, private key and optional client
//! CA files. Every change rebuilds a [`CertBundle`] and publishes it; the
//! listener asks [`CertWatcher::config_for_client`] for the server config
//! on every handshake.

use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub mod bundle;
pub use bundle::CertBundle;

pub mod watcher;
pub use watcher::CertWatcher;

pub type Result<T> = std::result::Result<T, TlsError>;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("read {path:?} failed")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("invalid private key: {0}")]
    PrivateKey(String),

    #[error("invalid client CA certificate: {0}")]
    ClientCa(String),

    #[error("build TLS server config failed")]
    ServerConfig(#[source] rustls::Error),

    #[error("watch {path:?} failed")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("spawn certificate watcher thread failed")]
    Spawn(#[source] std::io::Error),

    #[error("no certificate has been loaded, the watcher is not started")]
    NotStarted,
}

/// Where the listener's TLS material lives.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CertPaths {
    /// PEM certificates of the CAs trusted to sign client certificates.
    /// When set, every client must present a certificate.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// PEM certificate chain, leaf first.
    pub cert_path: PathBuf,

    /// PEM private key of the leaf certificate.
    pub key_path: PathBuf,
}

impl CertPaths {
    pub fn new(
        ca_cert_path: Option<PathBuf>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            ca_cert_path,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Every file that has to be watched.
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.cert_path.clone(), self.key_path.clone()];
        paths.extend(self.ca_cert_path.clone());
        paths
    }
}
