// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Offline checks of a verification hub configuration.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use verification_hub::{
    fragment::Fragment,
    manager::check_scope_conflicts,
    pattern::{self, Pattern},
    HubConfig,
};

#[derive(Parser)]
#[command(name = "hub_oneshot")]
#[command(bin_name = "hub_oneshot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Operation,

    /// Hub's config path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
#[command(author, version, about, long_about = None)]
enum Operation {
    /// Parse and validate every configured fragment without constructing
    /// any backend
    Check,

    /// Print the fragment and scope that handle the given reference
    MatchScope(MatchScopeArgs),
}

#[derive(Args)]
#[command(author, version, about, long_about = None)]
struct MatchScopeArgs {
    /// Artifact reference, e.g. `example.com/app:v1`
    reference: String,
}

/// Every configured fragment, validated and sorted by identity the way the
/// manager orders its execution units.
async fn load_fragments(config: &HubConfig) -> Result<Vec<(String, Fragment)>> {
    let mut fragments = Vec::new();
    for (identity, spec) in config.load_fragments().await? {
        let fragment = Fragment::try_from(spec)
            .with_context(|| format!("fragment `{identity}` is invalid"))?;
        fragments.push((identity, fragment));
    }
    fragments.sort_by(|(a, _), (b, _)| a.cmp(b));
    check_scope_conflicts(
        fragments
            .iter()
            .map(|(identity, fragment)| (identity.as_str(), fragment)),
    )?;
    Ok(fragments)
}

/// The identity and scope of the fragment that handles `reference`.
fn match_scope<'a>(
    reference: &str,
    fragments: &'a [(String, Fragment)],
) -> Option<(&'a str, &'a Pattern)> {
    let scopes = fragments.iter().flat_map(|(identity, fragment)| {
        fragment
            .scopes
            .iter()
            .map(move |scope| (scope, identity.as_str()))
    });
    pattern::most_specific(reference, scopes).map(|(scope, identity)| (identity, scope))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();
    let config = HubConfig::new(args.config)?;
    let fragments = load_fragments(&config).await?;

    match args.operation {
        Operation::Check => println!("{} fragments OK", fragments.len()),
        Operation::MatchScope(op_args) => {
            let Some((identity, scope)) = match_scope(&op_args.reference, &fragments) else {
                bail!("no scope matches {}", op_args.reference);
            };
            println!("{identity}\t{}", scope.as_str());
        }
    }

    Ok(())
}
