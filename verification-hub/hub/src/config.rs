// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use config::{Config, File};
use log::{debug, info};
use serde::Deserialize;

use crate::{
    fragment::{self, FragmentSpec},
    tls::CertPaths,
};

/// Environment variable naming the hub's config file.
pub const CONFIG_PATH_ENV: &str = "VERIFICATION_HUB_CONFIG_PATH";

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct HubConfig {
    /// Fragment files to load, one json fragment per file.
    #[serde(default)]
    pub fragments: Vec<PathBuf>,

    /// A directory whose `*.json` files are all loaded as fragments.
    #[serde(default)]
    pub fragment_dir: Option<PathBuf>,

    /// TLS material of the listener. Without it no certificate is watched.
    #[serde(default)]
    pub tls: Option<CertPaths>,
}

impl HubConfig {
    pub fn new(config_path: Option<String>) -> Result<Self> {
        let config_path = config_path.or_else(|| {
            if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
                debug!("Read hub's config path from env: {env_path}");
                return Some(env_path);
            }
            None
        });

        match config_path {
            Some(path) => {
                info!("Use configuration file {path}");
                if !Path::new(&path).exists() {
                    bail!("Config file {path} not found.")
                }

                Self::from_file(&path)
            }
            None => {
                info!("No config path specified, use a default config without fragments.");
                Ok(Self::default())
            }
        }
    }

    /// Load `HubConfig` from a configuration file. Supported formats are all
    /// formats supported by the `config` crate.
    pub fn from_file(config_path: &str) -> Result<Self> {
        let c = Config::builder()
            .add_source(File::with_name(config_path))
            .build()?;

        let res = c.try_deserialize().context("invalid config")?;
        Ok(res)
    }

    /// Every configured fragment file: the explicit ones first, then the
    /// contents of `fragment_dir`.
    pub async fn fragment_files(&self) -> crate::Result<Vec<PathBuf>> {
        let mut files = self.fragments.clone();
        if let Some(dir) = &self.fragment_dir {
            files.extend(fragment::fragment_files_in(dir).await?);
        }
        Ok(files)
    }

    /// Read every configured fragment, keyed by identity.
    ///
    /// Two files with the same stem would declare the same identity, so that
    /// is rejected.
    pub async fn load_fragments(&self) -> crate::Result<Vec<(String, FragmentSpec)>> {
        let mut sources: HashMap<String, PathBuf> = HashMap::new();
        let mut fragments = Vec::new();
        for path in self.fragment_files().await? {
            let (identity, spec) = fragment::load_fragment_file(&path).await?;
            if let Some(existing) = sources.get(&identity) {
                return Err(crate::Error::InvalidFragment(format!(
                    "fragment `{identity}` is declared by both {existing:?} and {path:?}"
                )));
            }
            sources.insert(identity.clone(), path);
            fragments.push((identity, spec));
        }
        Ok(fragments)
    }
}
