// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Operational configuration of an executor node.
///
/// All fields should tolerate inconsistencies among the executors of a cohort
/// without affecting safety: anything that changes what gets signed belongs in
/// [`HeightConfig`], which is versioned by block height across the network.
///
/// NOTE: default values should make sense, so most operators should not need
/// to specify any field.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Parameters {
    /// Delay before opening the next batch after a successful one published.
    #[serde(default = "Parameters::default_successful_execution_delay")]
    pub successful_execution_delay: Duration,

    /// Delay before opening the next batch after an unsuccessful one.
    #[serde(default = "Parameters::default_unsuccessful_execution_delay")]
    pub unsuccessful_execution_delay: Duration,

    /// Backoff before retrying a service that reported itself unavailable.
    #[serde(default = "Parameters::default_service_unavailable_timeout")]
    pub service_unavailable_timeout: Duration,

    /// Period between rebroadcasts of the own end-batch opinion while waiting
    /// for a quorum.
    #[serde(default = "Parameters::default_share_opinion_timeout")]
    pub share_opinion_timeout: Duration,

    /// Wait before re-opening a messenger or host session after an error.
    #[serde(default = "Parameters::default_session_restart_delay")]
    pub session_restart_delay: Duration,

    /// How many per-batch commitments are retained for verifying peer batch
    /// proofs that reach back to older batches.
    #[serde(default = "Parameters::default_max_batches_history_size")]
    pub max_batches_history_size: u64,

    /// Upper bound of the block cache fronting the blockchain gateway.
    #[serde(default = "Parameters::default_max_block_cache_size")]
    pub max_block_cache_size: usize,

    /// Network identifier byte folded into every emitted transaction version.
    #[serde(default)]
    pub network_identifier: u8,
}

impl Parameters {
    pub fn default_successful_execution_delay() -> Duration {
        Duration::from_secs(10)
    }

    pub fn default_unsuccessful_execution_delay() -> Duration {
        Duration::from_secs(10)
    }

    pub fn default_service_unavailable_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn default_share_opinion_timeout() -> Duration {
        Duration::from_secs(120)
    }

    pub fn default_session_restart_delay() -> Duration {
        Duration::from_secs(15)
    }

    pub fn default_max_batches_history_size() -> u64 {
        10_000
    }

    pub fn default_max_block_cache_size() -> usize {
        10_000
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            successful_execution_delay: Parameters::default_successful_execution_delay(),
            unsuccessful_execution_delay: Parameters::default_unsuccessful_execution_delay(),
            service_unavailable_timeout: Parameters::default_service_unavailable_timeout(),
            share_opinion_timeout: Parameters::default_share_opinion_timeout(),
            session_restart_delay: Parameters::default_session_restart_delay(),
            max_batches_history_size: Parameters::default_max_batches_history_size(),
            max_block_cache_size: Parameters::default_max_block_cache_size(),
            network_identifier: 0,
        }
    }
}

/// Configuration that is agreed network-wide and versioned by the block height
/// it becomes valid from. Everything here influences signed outputs, so all
/// executors of a cohort must resolve identical values for a given height.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HeightConfig {
    #[serde(default = "HeightConfig::default_autorun_sc_limit")]
    pub autorun_sc_limit: u64,

    #[serde(default = "HeightConfig::default_autorun_file")]
    pub autorun_file: String,

    #[serde(default = "HeightConfig::default_autorun_function")]
    pub autorun_function: String,

    #[serde(default = "HeightConfig::default_max_autorun_executable_size")]
    pub max_autorun_executable_size: u64,

    #[serde(default = "HeightConfig::default_max_automatic_executable_size")]
    pub max_automatic_executable_size: u64,

    #[serde(default = "HeightConfig::default_max_manual_executable_size")]
    pub max_manual_executable_size: u64,

    #[serde(default = "HeightConfig::default_storage_path_prefix")]
    pub storage_path_prefix: String,

    #[serde(default = "HeightConfig::default_internet_buffer_size")]
    pub internet_buffer_size: u32,

    /// Human-facing execution payments are multiplied by this factor to obtain
    /// the execution gas limit handed to the virtual machine.
    #[serde(default = "HeightConfig::default_execution_payment_to_gas_multiplier")]
    pub execution_payment_to_gas_multiplier: u64,

    /// Same conversion for download payments and download gas.
    #[serde(default = "HeightConfig::default_download_payment_to_gas_multiplier")]
    pub download_payment_to_gas_multiplier: u64,
}

impl HeightConfig {
    pub fn default_autorun_sc_limit() -> u64 {
        100_000
    }

    pub fn default_autorun_file() -> String {
        "autorun.wasm".to_string()
    }

    pub fn default_autorun_function() -> String {
        "run".to_string()
    }

    pub fn default_max_autorun_executable_size() -> u64 {
        1024
    }

    pub fn default_max_automatic_executable_size() -> u64 {
        5 * 1024 * 1024
    }

    pub fn default_max_manual_executable_size() -> u64 {
        5 * 1024 * 1024
    }

    pub fn default_storage_path_prefix() -> String {
        "SC_DATA".to_string()
    }

    pub fn default_internet_buffer_size() -> u32 {
        16 * 1024
    }

    pub fn default_execution_payment_to_gas_multiplier() -> u64 {
        1_000_000_000
    }

    pub fn default_download_payment_to_gas_multiplier() -> u64 {
        1_000_000
    }
}

impl Default for HeightConfig {
    fn default() -> Self {
        Self {
            autorun_sc_limit: HeightConfig::default_autorun_sc_limit(),
            autorun_file: HeightConfig::default_autorun_file(),
            autorun_function: HeightConfig::default_autorun_function(),
            max_autorun_executable_size: HeightConfig::default_max_autorun_executable_size(),
            max_automatic_executable_size: HeightConfig::default_max_automatic_executable_size(),
            max_manual_executable_size: HeightConfig::default_max_manual_executable_size(),
            storage_path_prefix: HeightConfig::default_storage_path_prefix(),
            internet_buffer_size: HeightConfig::default_internet_buffer_size(),
            execution_payment_to_gas_multiplier:
                HeightConfig::default_execution_payment_to_gas_multiplier(),
            download_payment_to_gas_multiplier:
                HeightConfig::default_download_payment_to_gas_multiplier(),
        }
    }
}

/// Height-indexed table of [`HeightConfig`]. A lookup picks the entry whose
/// valid-from height is the largest one not exceeding the requested height.
/// The table always contains an entry for height 0.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HeightConfigTable {
    configs: BTreeMap<u64, HeightConfig>,
}

impl HeightConfigTable {
    pub fn insert(&mut self, valid_from_height: u64, config: HeightConfig) {
        self.configs.insert(valid_from_height, config);
    }

    pub fn config_at(&self, height: u64) -> &HeightConfig {
        self.configs
            .range(..=height)
            .next_back()
            .expect("config table always holds a height 0 entry")
            .1
    }
}

impl Default for HeightConfigTable {
    fn default() -> Self {
        let mut configs = BTreeMap::new();
        configs.insert(0, HeightConfig::default());
        Self { configs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_lookup_picks_largest_not_exceeding_height() {
        // GIVEN a table with overrides at heights 100 and 200.
        let mut table = HeightConfigTable::default();
        table.insert(
            100,
            HeightConfig {
                autorun_sc_limit: 111,
                ..Default::default()
            },
        );
        table.insert(
            200,
            HeightConfig {
                autorun_sc_limit: 222,
                ..Default::default()
            },
        );

        // THEN lookups resolve to the entry in force at each height.
        assert_eq!(
            table.config_at(0).autorun_sc_limit,
            HeightConfig::default_autorun_sc_limit()
        );
        assert_eq!(
            table.config_at(99).autorun_sc_limit,
            HeightConfig::default_autorun_sc_limit()
        );
        assert_eq!(table.config_at(100).autorun_sc_limit, 111);
        assert_eq!(table.config_at(199).autorun_sc_limit, 111);
        assert_eq!(table.config_at(200).autorun_sc_limit, 222);
        assert_eq!(table.config_at(u64::MAX).autorun_sc_limit, 222);
    }
}
