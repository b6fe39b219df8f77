// Copyright (c) 2025 The Confidential Container Authors
//
// SPDX-License-Identifier: Apache-2.0
//

pub mod config;
pub use config::HubConfig;

pub mod error;
pub use error::*;

pub mod fragment;
pub mod hub;
pub mod manager;
pub mod pattern;
pub mod published;
pub mod router;
pub mod snapshot;
pub mod tls;

pub use manager::{FragmentStatus, ScopedExecutorManager};
pub use published::PublishedHandle;
pub use snapshot::{ExecutionSnapshot, ScopedExecutionUnit, VerificationResult};
