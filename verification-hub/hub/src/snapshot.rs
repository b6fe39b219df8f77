// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Scoped execution units and the execution snapshot that bundles them.
//!
//! Both are immutable once built. A snapshot owns every backend instance
//! of every unit; nothing is shared between units or between snapshot
//! generations.

use backends::{PolicyEnforcer, Registries, Verifier, VerifierReport, VerifierResult};
use log::{debug, warn};
use serde::Serialize;

use crate::{
    fragment::Fragment,
    pattern::{self, Pattern},
    router::StoreRouter,
    Error, Result,
};

pub struct VerifierEntry {
    pub name: String,
    pub verifier: Box<dyn Verifier>,
}

/// The backends materialized from one fragment.
pub struct ScopedExecutionUnit {
    identity: String,
    scopes: Vec<Pattern>,
    verifiers: Vec<VerifierEntry>,
    router: StoreRouter,
    policy_enforcer: Option<Box<dyn PolicyEnforcer>>,
}

/// The outcome of verifying one subject.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub subject: String,

    /// The fragment whose unit handled the subject.
    pub identity: String,

    /// The scope pattern that selected the unit.
    pub scope: String,

    pub is_success: bool,

    pub reports: Vec<VerifierReport>,
}

impl ScopedExecutionUnit {
    /// Construct every backend declared by `fragment`. The first failure
    /// aborts the build.
    pub async fn build(identity: &str, fragment: &Fragment, registries: &Registries) -> Result<Self> {
        let mut verifiers = Vec::with_capacity(fragment.verifiers.len());
        for options in &fragment.verifiers {
            let verifier = registries
                .verifiers
                .construct(&options.backend.type_name, options.backend.parameters.clone())
                .await?;
            verifiers.push(VerifierEntry {
                name: options.name.clone(),
                verifier,
            });
        }

        let router = StoreRouter::build(&registries.stores, &fragment.stores).await?;

        let policy_enforcer = match &fragment.policy_enforcer {
            Some(options) => Some(
                registries
                    .policy_enforcers
                    .construct(&options.type_name, options.parameters.clone())
                    .await?,
            ),
            None => None,
        };

        debug!(
            "built unit `{identity}` with {} verifiers and {} stores",
            verifiers.len(),
            router.len()
        );
        Ok(Self {
            identity: identity.to_string(),
            scopes: fragment.scopes.clone(),
            verifiers,
            router,
            policy_enforcer,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn scopes(&self) -> &[Pattern] {
        &self.scopes
    }

    pub fn verifiers(&self) -> &[VerifierEntry] {
        &self.verifiers
    }

    pub fn router(&self) -> &StoreRouter {
        &self.router
    }

    pub fn has_policy_enforcer(&self) -> bool {
        self.policy_enforcer.is_some()
    }

    /// Run every applicable verifier against the referrers of `subject` and
    /// return the reports together with the overall decision.
    pub async fn verify(&self, subject: &str) -> Result<(bool, Vec<VerifierReport>)> {
        let store = self.router.resolve(subject)?;
        let referrers =
            store
                .list_referrers(subject)
                .await
                .map_err(|source| Error::ListReferrers {
                    subject: subject.to_string(),
                    source,
                })?;

        let mut reports = Vec::new();
        for artifact in &referrers {
            for entry in &self.verifiers {
                if !entry.verifier.can_verify(&artifact.artifact_type) {
                    continue;
                }

                let result = match entry.verifier.verify(subject, artifact, store).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(
                            "verifier `{}` failed on {} of {subject}: {e:?}",
                            entry.name, artifact.digest
                        );
                        VerifierResult::failure(format!("{e:#}"))
                    }
                };
                reports.push(VerifierReport {
                    verifier_name: entry.name.clone(),
                    subject: subject.to_string(),
                    artifact_type: artifact.artifact_type.clone(),
                    is_success: result.is_success,
                    message: result.message,
                });
            }
        }

        let is_success = match &self.policy_enforcer {
            Some(policy) => policy.overall_verify_result(subject, &reports),
            None => !reports.is_empty() && reports.iter().all(|r| r.is_success),
        };
        Ok((is_success, reports))
    }
}

/// One complete generation of execution configuration.
pub struct ExecutionSnapshot {
    generation: u64,
    units: Vec<ScopedExecutionUnit>,
}

impl ExecutionSnapshot {
    pub fn new(generation: u64, units: Vec<ScopedExecutionUnit>) -> Self {
        Self { generation, units }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn units(&self) -> &[ScopedExecutionUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The unit built from fragment `identity`.
    pub fn unit(&self, identity: &str) -> Option<&ScopedExecutionUnit> {
        self.units.iter().find(|unit| unit.identity == identity)
    }

    /// The unit whose scope is the most specific match for `subject`.
    pub fn unit_for(&self, subject: &str) -> Option<&ScopedExecutionUnit> {
        self.scope_for(subject).map(|(_, unit)| unit)
    }

    fn scope_for(&self, subject: &str) -> Option<(&Pattern, &ScopedExecutionUnit)> {
        pattern::most_specific(
            subject,
            self.units
                .iter()
                .flat_map(|unit| unit.scopes.iter().map(move |scope| (scope, unit))),
        )
    }

    pub async fn verify_subject(&self, subject: &str) -> Result<VerificationResult> {
        let (scope, unit) = self
            .scope_for(subject)
            .ok_or_else(|| Error::NoMatchingScope(subject.to_string()))?;
        let (is_success, reports) = unit.verify(subject).await?;
        debug!(
            "{subject} verified by `{}` under scope `{}`: {is_success}",
            unit.identity,
            scope.as_str()
        );

        Ok(VerificationResult {
            subject: subject.to_string(),
            identity: unit.identity.clone(),
            scope: scope.as_str().to_string(),
            is_success,
            reports,
        })
    }
}
