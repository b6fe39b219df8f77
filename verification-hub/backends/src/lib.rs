// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

pub mod api;
pub use api::*;

pub mod error;
pub use error::*;

pub mod registry;
pub use registry::{BackendKind, Registries, Registry};

pub mod plugins;
pub use plugins::register_builtins;
