// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! # Api definitions for verification backends
//!
//! Three kinds of backends take part in deciding whether an artifact
//! reference (the *subject*) is allowed:
//! - [`ReferrerStore`]: fetches the artifacts (signatures, attestations,
//! SBOMs, ...) that refer to a subject.
//! - [`Verifier`]: checks one referring artifact.
//! - [`PolicyEnforcer`]: folds all the verifier reports of a subject into a
//! single decision.
//!
//! Every backend is created from a [`ProviderSettings`] object. The json map
//! style keeps the parameter schema owned by each backend; the registry
//! decodes it into the backend's own options struct before calling the
//! constructor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// ProviderSettings are the parameters to create a backend instance.
pub type ProviderSettings = Map<String, Value>;

/// Describes one artifact that refers to a subject.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub artifact_type: String,

    pub digest: String,

    #[serde(default)]
    pub media_type: String,

    #[serde(default)]
    pub size: u64,
}

/// What a [`Verifier`] concluded about one artifact.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifierResult {
    pub is_success: bool,

    #[serde(default)]
    pub message: String,
}

impl VerifierResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            is_success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
        }
    }
}

/// A [`VerifierResult`] tagged with the verifier and artifact it is about.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifierReport {
    pub verifier_name: String,

    pub subject: String,

    pub artifact_type: String,

    pub is_success: bool,

    pub message: String,
}

#[async_trait]
pub trait ReferrerStore: Send + Sync {
    /// List the artifacts referring to `subject`.
    async fn list_referrers(&self, subject: &str) -> anyhow::Result<Vec<ArtifactDescriptor>>;

    /// Fetch the content of the blob `digest` stored alongside `subject`.
    async fn get_blob(&self, subject: &str, digest: &str) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Whether this verifier understands artifacts of `artifact_type`.
    fn can_verify(&self, artifact_type: &str) -> bool;

    /// Verify `artifact` which refers to `subject`. The `store` is the one
    /// the artifact was listed from, so that its blobs can be fetched.
    async fn verify(
        &self,
        subject: &str,
        artifact: &ArtifactDescriptor,
        store: &dyn ReferrerStore,
    ) -> anyhow::Result<VerifierResult>;
}

pub trait PolicyEnforcer: Send + Sync {
    /// Decide whether `subject` is allowed given every verifier report
    /// produced for it.
    fn overall_verify_result(&self, subject: &str, reports: &[VerifierReport]) -> bool;
}
