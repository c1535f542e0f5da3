// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};

pub(crate) struct NodeMetrics {
    pub contracts: IntGauge,
    pub batches_opened: IntCounter,
    pub batches_succeeded: IntCounter,
    pub batches_failed: IntCounter,
    pub calls_executed: IntCounter,
    pub opinions_sent: IntCounter,
    pub opinions_received: IntCounter,
    pub opinions_rejected: IntCounter,
    pub messenger_restarts: IntCounter,
    pub block_cache_hits: IntCounter,
    pub block_cache_misses: IntCounter,
}

impl NodeMetrics {
    fn new(registry: &Registry) -> Self {
        Self {
            contracts: register_int_gauge_with_registry!(
                "contracts",
                "Number of contracts currently assigned to this executor",
                registry
            )
            .unwrap(),
            batches_opened: register_int_counter_with_registry!(
                "batches_opened",
                "Number of batch execution tasks started",
                registry
            )
            .unwrap(),
            batches_succeeded: register_int_counter_with_registry!(
                "batches_succeeded",
                "Number of batches finalized as successful",
                registry
            )
            .unwrap(),
            batches_failed: register_int_counter_with_registry!(
                "batches_failed",
                "Number of batches finalized as unsuccessful",
                registry
            )
            .unwrap(),
            calls_executed: register_int_counter_with_registry!(
                "calls_executed",
                "Number of contract calls executed through the virtual machine",
                registry
            )
            .unwrap(),
            opinions_sent: register_int_counter_with_registry!(
                "opinions_sent",
                "Number of end-batch opinions broadcast to peers",
                registry
            )
            .unwrap(),
            opinions_received: register_int_counter_with_registry!(
                "opinions_received",
                "Number of end-batch opinions received from peers",
                registry
            )
            .unwrap(),
            opinions_rejected: register_int_counter_with_registry!(
                "opinions_rejected",
                "Number of received opinions dropped as malformed or unexpected",
                registry
            )
            .unwrap(),
            messenger_restarts: register_int_counter_with_registry!(
                "messenger_restarts",
                "Number of messenger session restarts after stream errors",
                registry
            )
            .unwrap(),
            block_cache_hits: register_int_counter_with_registry!(
                "block_cache_hits",
                "Block requests answered from the cache",
                registry
            )
            .unwrap(),
            block_cache_misses: register_int_counter_with_registry!(
                "block_cache_misses",
                "Block requests forwarded to the blockchain gateway",
                registry
            )
            .unwrap(),
        }
    }
}

pub struct Metrics {
    pub(crate) node_metrics: NodeMetrics,
}

pub fn initialise_metrics(registry: &Registry) -> Arc<Metrics> {
    Arc::new(Metrics {
        node_metrics: NodeMetrics::new(registry),
    })
}

#[cfg(test)]
pub(crate) fn test_metrics() -> Arc<Metrics> {
    initialise_metrics(&Registry::new())
}
