// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Configuration fragments.
//!
//! A [`FragmentSpec`] is the raw declarative document an administrator
//! submits, either as a CRD object or as a json file:
//!
//! ```json
//! {
//!     "scopes": ["example.com"],
//!     "verifiers": [{"name": "notation", "type": "notation", "parameters": {}}],
//!     "stores": {"*": {"type": "oras", "parameters": {}}},
//!     "policyEnforcer": {"type": "config-policy", "parameters": {}}
//! }
//! ```
//!
//! Converting it into a [`Fragment`] validates the document and splits the
//! parameters into backend options. No backend is constructed here.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use backends::ProviderSettings;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{pattern::Pattern, Error, Result};

/// One backend declaration: `{"type": ..., "parameters": {...}}`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendSpec {
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub parameters: Value,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct VerifierSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default)]
    pub parameters: Value,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSpec {
    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default)]
    pub verifiers: Vec<VerifierSpec>,

    /// Store declarations keyed by reference pattern.
    #[serde(default)]
    pub stores: BTreeMap<String, BackendSpec>,

    #[serde(default)]
    pub policy_enforcer: Option<BackendSpec>,
}

/// The type name and decoded parameters a backend is constructed from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendOptions {
    pub type_name: String,
    pub parameters: ProviderSettings,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VerifierOptions {
    pub name: String,
    pub backend: BackendOptions,
}

/// A validated fragment, ready to be built into a scoped execution unit.
#[derive(Clone, Debug)]
pub struct Fragment {
    pub scopes: Vec<Pattern>,
    pub verifiers: Vec<VerifierOptions>,
    pub stores: Vec<(String, BackendOptions)>,
    pub policy_enforcer: Option<BackendOptions>,
}

impl TryFrom<FragmentSpec> for Fragment {
    type Error = Error;

    fn try_from(spec: FragmentSpec) -> Result<Self> {
        if spec.scopes.is_empty() {
            return Err(Error::InvalidFragment("at least one scope is required".into()));
        }
        if spec.verifiers.is_empty() {
            return Err(Error::InvalidFragment(
                "at least one verifier is required".into(),
            ));
        }
        if spec.stores.is_empty() {
            return Err(Error::InvalidFragment("at least one store is required".into()));
        }

        let mut scopes: Vec<Pattern> = Vec::with_capacity(spec.scopes.len());
        for scope in &spec.scopes {
            let pattern = Pattern::new(scope)?;
            if scopes.contains(&pattern) {
                return Err(Error::InvalidFragment(format!(
                    "scope `{scope}` is declared twice"
                )));
            }
            scopes.push(pattern);
        }

        let mut names = HashSet::new();
        let mut verifiers = Vec::with_capacity(spec.verifiers.len());
        for verifier in spec.verifiers {
            if verifier.name.is_empty() {
                return Err(Error::InvalidFragment("verifier name must not be empty".into()));
            }
            if !names.insert(verifier.name.clone()) {
                return Err(Error::InvalidFragment(format!(
                    "verifier name `{}` is used twice",
                    verifier.name
                )));
            }
            let backend = backend_options(
                &format!("verifier `{}`", verifier.name),
                verifier.type_name,
                verifier.parameters,
            )?;
            verifiers.push(VerifierOptions {
                name: verifier.name,
                backend,
            });
        }

        let mut stores = Vec::with_capacity(spec.stores.len());
        for (pattern, store) in spec.stores {
            // compile once to reject bad patterns before anything is built
            Pattern::new(&pattern)?;
            let options = backend_options(
                &format!("store `{pattern}`"),
                store.type_name,
                store.parameters,
            )?;
            stores.push((pattern, options));
        }

        let policy_enforcer = spec
            .policy_enforcer
            .map(|policy| backend_options("policy enforcer", policy.type_name, policy.parameters))
            .transpose()?;

        Ok(Self {
            scopes,
            verifiers,
            stores,
            policy_enforcer,
        })
    }
}

fn backend_options(owner: &str, type_name: String, parameters: Value) -> Result<BackendOptions> {
    if type_name.is_empty() {
        return Err(Error::InvalidFragment(format!("{owner} has no type")));
    }

    let parameters = match parameters {
        Value::Null => ProviderSettings::new(),
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidFragment(format!(
                "parameters of {owner} must be an object, got {other}"
            )))
        }
    };

    Ok(BackendOptions {
        type_name,
        parameters,
    })
}

impl Fragment {
    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(Pattern::as_str)
    }
}

/// Read one fragment file. The identity of the fragment is the file stem.
pub async fn load_fragment_file(path: &Path) -> Result<(String, FragmentSpec)> {
    let identity = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            Error::InvalidFragment(format!("cannot derive an identity from {path:?}"))
        })?
        .to_string();

    let content = tokio::fs::read(path)
        .await
        .map_err(|source| Error::ReadFragment {
            path: path.to_path_buf(),
            source,
        })?;
    let spec = serde_json::from_slice(&content).map_err(|source| Error::ParseFragment {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("loaded fragment `{identity}` from {path:?}");
    Ok((identity, spec))
}

/// Every `*.json` file directly inside `dir`, sorted by path.
pub async fn fragment_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_error = |source| Error::ReadFragment {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_error)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
