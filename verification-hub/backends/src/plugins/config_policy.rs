// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! A policy enforcer driven by one rule per artifact type.
//!
//! ```json
//! {
//!     "type": "config-policy",
//!     "parameters": {
//!         "artifactVerificationPolicies": {
//!             "application/vnd.cncf.notary.signature": "any",
//!             "default": "all"
//!         }
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::Deserialize;
use strum::AsRefStr;

use crate::{PolicyEnforcer, VerifierReport};

pub const TYPE_NAME: &str = "config-policy";

/// The artifact type key whose rule applies to every unlisted type.
pub const DEFAULT_ARTIFACT_TYPE: &str = "default";

#[derive(AsRefStr, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerificationRule {
    /// At least one report of the artifact type succeeded.
    Any,

    /// Every report of the artifact type succeeded.
    #[default]
    All,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq)]
pub struct ConfigPolicyOptions {
    #[serde(default, rename = "artifactVerificationPolicies")]
    pub artifact_verification_policies: HashMap<String, VerificationRule>,
}

pub struct ConfigPolicyEnforcer {
    rules: HashMap<String, VerificationRule>,
    default_rule: VerificationRule,
}

impl ConfigPolicyEnforcer {
    pub fn new(options: ConfigPolicyOptions) -> Self {
        let mut rules = options.artifact_verification_policies;
        let default_rule = rules.remove(DEFAULT_ARTIFACT_TYPE).unwrap_or_default();
        Self {
            rules,
            default_rule,
        }
    }

    fn rule_for(&self, artifact_type: &str) -> VerificationRule {
        self.rules
            .get(artifact_type)
            .copied()
            .unwrap_or(self.default_rule)
    }
}

impl PolicyEnforcer for ConfigPolicyEnforcer {
    fn overall_verify_result(&self, subject: &str, reports: &[VerifierReport]) -> bool {
        if reports.is_empty() {
            debug!("no verifier report for {subject}, deny");
            return false;
        }

        let mut by_type: BTreeMap<&str, Vec<&VerifierReport>> = BTreeMap::new();
        for report in reports {
            by_type
                .entry(report.artifact_type.as_str())
                .or_default()
                .push(report);
        }

        by_type.into_iter().all(|(artifact_type, reports)| {
            let rule = self.rule_for(artifact_type);
            let satisfied = match rule {
                VerificationRule::Any => reports.iter().any(|r| r.is_success),
                VerificationRule::All => reports.iter().all(|r| r.is_success),
            };
            if !satisfied {
                debug!(
                    "{subject}: rule `{}` not satisfied for artifact type {artifact_type}",
                    rule.as_ref()
                );
            }
            satisfied
        })
    }
}
