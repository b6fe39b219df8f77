// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{path::Path, sync::Arc};

use rustls::{
    crypto::ring,
    pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer},
    server::WebPkiClientVerifier,
    RootCertStore, ServerConfig,
};

use super::{CertPaths, Result, TlsError};

/// One consistent set of TLS material, with the server config built from it.
#[derive(Debug)]
pub struct CertBundle {
    cert_chain: Vec<CertificateDer<'static>>,
    client_ca: Option<Arc<RootCertStore>>,
    server_config: Arc<ServerConfig>,
}

impl CertBundle {
    /// Read and parse every file of `paths`.
    pub fn load(paths: &CertPaths) -> Result<Self> {
        let cert = read(&paths.cert_path)?;
        let key = read(&paths.key_path)?;
        let ca = paths.ca_cert_path.as_deref().map(read).transpose()?;
        Self::from_pem(&cert, &key, ca.as_deref())
    }

    pub fn from_pem(cert: &[u8], key: &[u8], ca: Option<&[u8]>) -> Result<Self> {
        let cert_chain = CertificateDer::pem_slice_iter(cert)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TlsError::Certificate(format!("{e:?}")))?;
        if cert_chain.is_empty() {
            return Err(TlsError::Certificate("no certificate in PEM".into()));
        }

        let key = PrivateKeyDer::from_pem_slice(key)
            .map_err(|e| TlsError::PrivateKey(format!("{e:?}")))?;

        let client_ca = ca.map(parse_roots).transpose()?.map(Arc::new);

        let provider = Arc::new(ring::default_provider());
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(TlsError::ServerConfig)?;
        let builder = match &client_ca {
            Some(roots) => {
                let verifier = WebPkiClientVerifier::builder_with_provider(roots.clone(), provider)
                    .build()
                    .map_err(|e| TlsError::ClientCa(e.to_string()))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };
        let server_config = builder
            .with_single_cert(cert_chain.clone(), key)
            .map_err(TlsError::ServerConfig)?;

        Ok(Self {
            cert_chain,
            client_ca,
            server_config: Arc::new(server_config),
        })
    }

    /// The certificate chain presented to clients, leaf first.
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn requires_client_auth(&self) -> bool {
        self.client_ca.is_some()
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_roots(pem: &[u8]) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(pem) {
        let cert = cert.map_err(|e| TlsError::ClientCa(format!("{e:?}")))?;
        roots
            .add(cert)
            .map_err(|e| TlsError::ClientCa(e.to_string()))?;
    }
    if roots.is_empty() {
        return Err(TlsError::ClientCa("no certificate in PEM".into()));
    }
    Ok(roots)
}
