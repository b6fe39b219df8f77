// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Scope and store patterns.
//!
//! A pattern without any glob meta character (`*`, `?`, `[`, `{`, `\`) is a
//! reference prefix. It matches a reference that equals it, or that
//! continues it after one of `:`, `/` or `@`. So `example.com` matches
//! `example.com/app:v1` and `example.com:5000/app`, but not
//! `example.community/app`.
//!
//! Any other pattern is a glob that must match the whole reference. `*`
//! also matches `/`, so `example.com/team/*` matches every repository
//! below `example.com/team/`.
//!
//! When several patterns match a reference the most specific one wins, see
//! [`Specificity`].

use std::cmp::Ordering;

use globset::{GlobBuilder, GlobMatcher};

use crate::{Error, Result};

const META_CHARACTERS: [char; 5] = ['*', '?', '[', '{', '\\'];

const REFERENCE_SEPARATORS: [char; 3] = [':', '/', '@'];

#[derive(Clone, Debug)]
enum Matcher {
    Prefix,
    Glob(GlobMatcher),
}

#[derive(Clone, Debug)]
pub struct Pattern {
    raw: String,
    matcher: Matcher,
    specificity: Specificity,
}

/// Orders matching patterns. The longest literal prefix (the characters
/// before the first wildcard) wins; on equal prefix a pattern without
/// wildcard beats a glob, then the longer pattern wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    literal_prefix_len: usize,
    literal: bool,
    len: usize,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::EmptyPattern);
        }

        let literal_prefix_len = raw.find(&META_CHARACTERS[..]).unwrap_or(raw.len());
        let literal = literal_prefix_len == raw.len();
        let matcher = if literal {
            Matcher::Prefix
        } else {
            let glob = GlobBuilder::new(raw)
                .literal_separator(false)
                .build()
                .map_err(|source| Error::InvalidPattern {
                    pattern: raw.to_string(),
                    source,
                })?;
            Matcher::Glob(glob.compile_matcher())
        };

        Ok(Self {
            raw: raw.to_string(),
            matcher,
            specificity: Specificity {
                literal_prefix_len,
                literal,
                len: raw.len(),
            },
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn specificity(&self) -> Specificity {
        self.specificity
    }

    pub fn is_match(&self, reference: &str) -> bool {
        match &self.matcher {
            Matcher::Prefix => match_reference_prefix(reference, &self.raw),
            Matcher::Glob(glob) => glob.is_match(reference),
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Pattern {}

fn match_reference_prefix(reference: &str, prefix: &str) -> bool {
    match reference.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => {
            prefix.ends_with(&REFERENCE_SEPARATORS[..]) || rest.starts_with(&REFERENCE_SEPARATORS[..])
        }
        None => false,
    }
}

/// Pick the entry whose pattern is the most specific match for
/// `reference`. Ties go to the earliest entry.
pub fn most_specific<'a, T>(
    reference: &str,
    entries: impl IntoIterator<Item = (&'a Pattern, T)>,
) -> Option<(&'a Pattern, T)> {
    let mut best: Option<(&'a Pattern, T)> = None;
    for (pattern, value) in entries {
        if !pattern.is_match(reference) {
            continue;
        }

        let better = match &best {
            Some((current, _)) => {
                pattern.specificity().cmp(&current.specificity()) == Ordering::Greater
            }
            None => true,
        };
        if better {
            best = Some((pattern, value));
        }
    }
    best
}
