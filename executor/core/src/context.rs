// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use executor_config::{HeightConfigTable, Parameters};
use executor_types::ExecutorKey;

use crate::metrics::Metrics;

/// Context contains the configuration and metrics shared by all components of
/// this executor node.
#[derive(Clone)]
pub struct Context {
    /// Public identity of this executor within contract cohorts.
    pub own_key: ExecutorKey,
    /// Operational parameters of this node.
    pub parameters: Parameters,
    /// Network-wide configuration versioned by block height.
    pub height_configs: HeightConfigTable,
    /// Metrics of this node.
    pub metrics: Arc<Metrics>,
}

impl Context {
    pub fn new(
        own_key: ExecutorKey,
        parameters: Parameters,
        height_configs: HeightConfigTable,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            own_key,
            parameters,
            height_configs,
            metrics,
        }
    }
}
