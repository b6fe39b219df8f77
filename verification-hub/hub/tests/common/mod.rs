// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

#![allow(dead_code)]

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use backends::{
    ArtifactDescriptor, ProviderSettings, ReferrerStore, Registries, Verifier, VerifierResult,
};
use serde::Deserialize;
use serde_json::json;
use verification_hub::fragment::FragmentSpec;

pub const MOCK_VERIFIER: &str = "mock-verifier";
pub const MOCK_STORE: &str = "mock-store";

/// A store type whose constructor always fails.
pub const BROKEN_STORE: &str = "broken-store";

pub const SIGNATURE: &str = "application/vnd.cncf.notary.signature";

/// Accepts every artifact whose digest does not start with `bad`.
pub struct MockVerifier;

#[async_trait]
impl Verifier for MockVerifier {
    fn can_verify(&self, artifact_type: &str) -> bool {
        artifact_type == SIGNATURE
    }

    async fn verify(
        &self,
        _subject: &str,
        artifact: &ArtifactDescriptor,
        _store: &dyn ReferrerStore,
    ) -> anyhow::Result<VerifierResult> {
        if artifact.digest.starts_with("bad") {
            return Ok(VerifierResult::failure("signature mismatch"));
        }
        Ok(VerifierResult::success("signature verified"))
    }
}

#[derive(Deserialize, Default)]
pub struct MockStoreOptions {
    /// subject -> digests of the signatures referring to it
    #[serde(default)]
    pub signatures: HashMap<String, Vec<String>>,
}

pub struct MockStore {
    signatures: HashMap<String, Vec<String>>,
}

#[async_trait]
impl ReferrerStore for MockStore {
    async fn list_referrers(&self, subject: &str) -> anyhow::Result<Vec<ArtifactDescriptor>> {
        Ok(self
            .signatures
            .get(subject)
            .into_iter()
            .flatten()
            .map(|digest| ArtifactDescriptor {
                artifact_type: SIGNATURE.to_string(),
                digest: digest.clone(),
                ..Default::default()
            })
            .collect())
    }

    async fn get_blob(&self, _subject: &str, digest: &str) -> anyhow::Result<Vec<u8>> {
        Ok(digest.as_bytes().to_vec())
    }
}

pub fn registries() -> Registries {
    let mut registries = Registries::with_builtins();
    registries
        .verifiers
        .register(MOCK_VERIFIER, |_: ProviderSettings| async move {
            Ok(Box::new(MockVerifier) as Box<dyn Verifier>)
        });
    registries
        .stores
        .register(MOCK_STORE, |options: MockStoreOptions| async move {
            Ok(Box::new(MockStore {
                signatures: options.signatures,
            }) as Box<dyn ReferrerStore>)
        });
    registries
        .stores
        .register(BROKEN_STORE, |_: ProviderSettings| async move {
            Err::<Box<dyn ReferrerStore>, _>(anyhow::anyhow!("registry endpoint unreachable"))
        });
    registries
}

pub fn shared_registries() -> Arc<Registries> {
    Arc::new(registries())
}

/// `{scopes: [scope], verifiers: [v1], stores: {"*": store_type}}`
pub fn fragment(scope: &str, store_type: &str) -> FragmentSpec {
    serde_json::from_value(json!({
        "scopes": [scope],
        "verifiers": [{"name": "v1", "type": MOCK_VERIFIER}],
        "stores": {"*": {"type": store_type}}
    }))
    .expect("fragment spec")
}

pub fn test_data(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_data")
        .join(path)
}
