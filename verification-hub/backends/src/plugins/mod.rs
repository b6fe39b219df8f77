// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Backend plugins shipped with this crate.
//!
//! Other backends live in their own crates and register themselves into a
//! [`Registries`] the same way [`register_builtins`] does.

use crate::Registries;

#[cfg(feature = "config-policy")]
pub mod config_policy;

/// Register every plugin enabled by the crate features.
pub fn register_builtins(_registries: &mut Registries) {
    #[cfg(feature = "config-policy")]
    _registries.policy_enforcers.register(
        config_policy::TYPE_NAME,
        |options: config_policy::ConfigPolicyOptions| async move {
            Ok(Box::new(config_policy::ConfigPolicyEnforcer::new(options))
                as Box<dyn crate::PolicyEnforcer>)
        },
    );
}
