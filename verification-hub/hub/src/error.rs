// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::path::PathBuf;

use thiserror::Error;

use crate::tls;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("pattern must not be empty")]
    EmptyPattern,

    #[error("illegal pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("store pattern `{0}` is already registered")]
    DuplicateStorePattern(String),

    #[error("no matching store for {0}")]
    NoMatchingStore(String),

    #[error("no execution snapshot has been published yet")]
    NoSnapshot,

    #[error("no scope matches subject {0}")]
    NoMatchingScope(String),

    #[error("invalid fragment: {0}")]
    InvalidFragment(String),

    #[error("create backend failed")]
    Backend(#[from] backends::Error),

    #[error("scope `{scope}` of fragment `{identity}` is already declared by fragment `{existing}`")]
    ScopeConflict {
        scope: String,
        identity: String,
        existing: String,
    },

    #[error("build fragment `{identity}` failed")]
    BuildFragment {
        identity: String,
        #[source]
        source: Box<Error>,
    },

    #[error("fragment `{0}` not found")]
    UnknownFragment(String),

    #[error("list referrers of {subject} failed")]
    ListReferrers {
        subject: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("read fragment file {path:?} failed")]
    ReadFragment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse fragment file {path:?} failed")]
    ParseFragment {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("certificate watcher failed")]
    Tls(#[from] tls::TlsError),
}

impl Error {
    /// The fragment this error is attributed to, if any.
    pub fn fragment_identity(&self) -> Option<&str> {
        match self {
            Error::BuildFragment { identity, .. } | Error::ScopeConflict { identity, .. } => {
                Some(identity)
            }
            _ => None,
        }
    }

    /// The error and all its causes on one line, suitable for a status
    /// subresource.
    pub fn status_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}
