// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! A single atomically swappable reference to an immutable value.
//!
//! Writers build a complete new value and [`PublishedHandle::publish`] it;
//! readers [`PublishedHandle::load`] whatever is current without taking a
//! lock. A reader keeps the value it loaded alive for as long as it holds the
//! returned [`Arc`], so a publish never disturbs in-flight work.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

pub struct PublishedHandle<T> {
    current: ArcSwapOption<T>,
}

impl<T> Default for PublishedHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> PublishedHandle<T> {
    /// A handle with nothing published yet.
    pub fn empty() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Replace the published value, returning the one now visible.
    pub fn publish(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.current.store(Some(value.clone()));
        value
    }

    pub fn load(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    pub fn is_published(&self) -> bool {
        self.current.load().is_some()
    }
}
