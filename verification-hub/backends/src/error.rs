// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use thiserror::Error;

use crate::BackendKind;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing a backend from user supplied
/// configuration. These are always recoverable by the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} type name must not be empty")]
    EmptyTypeName { kind: BackendKind },

    #[error("Unsupported {kind} provider: {type_name}")]
    UnsupportedProvider {
        kind: BackendKind,
        type_name: String,
    },

    #[error("illegal parameters for {kind} `{type_name}`")]
    InvalidParameters {
        kind: BackendKind,
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("create {kind} `{type_name}` failed")]
    Construct {
        kind: BackendKind,
        type_name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Wiring mistakes made while registering plugins at process start.
///
/// [`crate::Registry::register`] turns these into a panic.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("cannot register a {kind} plugin with an empty type name")]
    EmptyTypeName { kind: BackendKind },

    #[error("{kind} plugin `{type_name}` is already registered")]
    Duplicate {
        kind: BackendKind,
        type_name: String,
    },
}
