// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Typed plugin factory registries.
//!
//! A [`Registry`] maps a backend type name (e.g. `config-policy`) to the
//! constructor of that backend. There is one registry per [`BackendKind`],
//! bundled together in [`Registries`]. The composition root fills the
//! registries once at start-up and then shares them read-only.
//!
//! Registering is a wiring step: an empty or duplicated type name is a
//! programming mistake and [`Registry::register`] panics on it. Constructing
//! is driven by user configuration, so [`Registry::construct`] only ever
//! returns errors.

use std::{collections::HashMap, future::Future};

use futures::{future::BoxFuture, FutureExt};
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::{AsRefStr, Display};

use crate::{
    plugins, Error, PolicyEnforcer, ProviderSettings, ReferrerStore, RegistrationError, Result,
    Verifier,
};

#[derive(AsRefStr, Display, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[strum(serialize_all = "kebab-case")]
pub enum BackendKind {
    Verifier,
    Store,
    PolicyEnforcer,
}

type Constructor<T> =
    Box<dyn Fn(ProviderSettings) -> BoxFuture<'static, Result<Box<T>>> + Send + Sync>;

pub struct Registry<T: ?Sized> {
    kind: BackendKind,
    constructors: HashMap<String, Constructor<T>>,
}

impl<T> Registry<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            constructors: HashMap::new(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Register `constructor` under `type_name`.
    ///
    /// The constructor takes the backend's own options type `O`. When a
    /// backend is constructed, the raw [`ProviderSettings`] are decoded into
    /// `O` first, so each backend owns its parameter schema.
    ///
    /// On error the registry is left unchanged.
    pub fn try_register<O, F, Fut>(
        &mut self,
        type_name: &str,
        constructor: F,
    ) -> std::result::Result<(), RegistrationError>
    where
        O: DeserializeOwned + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Box<T>>> + Send + 'static,
    {
        if type_name.is_empty() {
            return Err(RegistrationError::EmptyTypeName { kind: self.kind });
        }

        if self.constructors.contains_key(type_name) {
            return Err(RegistrationError::Duplicate {
                kind: self.kind,
                type_name: type_name.to_string(),
            });
        }

        let kind = self.kind;
        let name = type_name.to_string();
        let constructor: Constructor<T> = Box::new(
            move |settings: ProviderSettings| -> BoxFuture<'static, Result<Box<T>>> {
                let type_name = name.clone();
                match serde_json::from_value::<O>(Value::Object(settings)) {
                    Ok(options) => {
                        let pending = constructor(options);
                        async move {
                            pending.await.map_err(|source| Error::Construct {
                                kind,
                                type_name,
                                source,
                            })
                        }
                        .boxed()
                    }
                    Err(source) => futures::future::ready(Err(Error::InvalidParameters {
                        kind,
                        type_name,
                        source,
                    }))
                    .boxed(),
                }
            },
        );

        debug!("register {} plugin `{type_name}`", self.kind);
        self.constructors.insert(type_name.to_string(), constructor);
        Ok(())
    }

    /// Same as [`Registry::try_register`], but a wiring mistake aborts.
    pub fn register<O, F, Fut>(&mut self, type_name: &str, constructor: F)
    where
        O: DeserializeOwned + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Box<T>>> + Send + 'static,
    {
        if let Err(e) = self.try_register(type_name, constructor) {
            panic!("{e}");
        }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// All registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Create a new backend of `type_name` with the given parameters.
    pub async fn construct(&self, type_name: &str, parameters: ProviderSettings) -> Result<Box<T>> {
        if type_name.is_empty() {
            return Err(Error::EmptyTypeName { kind: self.kind });
        }

        let constructor =
            self.constructors
                .get(type_name)
                .ok_or_else(|| Error::UnsupportedProvider {
                    kind: self.kind,
                    type_name: type_name.to_string(),
                })?;

        constructor(parameters).await
    }
}

/// One [`Registry`] per backend kind.
pub struct Registries {
    pub verifiers: Registry<dyn Verifier>,
    pub stores: Registry<dyn ReferrerStore>,
    pub policy_enforcers: Registry<dyn PolicyEnforcer>,
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl Registries {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            verifiers: Registry::new(BackendKind::Verifier),
            stores: Registry::new(BackendKind::Store),
            policy_enforcers: Registry::new(BackendKind::PolicyEnforcer),
        }
    }

    /// Registries with every plugin shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registries = Self::new();
        plugins::register_builtins(&mut registries);
        registries
    }
}
