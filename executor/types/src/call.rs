// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use executor_config::HeightConfig;
use serde::{Deserialize, Serialize};

use crate::{AggregatedTransaction, CallId, CallerKey, DriveKey};

/// Tier of a call inside a batch. Autorun is the bootstrap call of a freshly
/// deployed contract, automatic calls are synthesized from the contract's
/// autorun configuration, manual calls are submitted by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallLevel {
    Autorun,
    Automatic,
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePayment {
    pub mosaic_id: u64,
    pub amount: u64,
}

/// A caller-submitted call, as delivered by the hosting node. Payments are
/// human-facing units; the conversion to VM gas happens when the call is
/// placed into a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCallRequest {
    pub call_id: CallId,
    pub file: String,
    pub function: String,
    pub arguments: Vec<u8>,
    pub execution_payment: u64,
    pub download_payment: u64,
    pub caller_key: CallerKey,
    pub block_height: u64,
    pub service_payments: Vec<ServicePayment>,
}

impl ManualCallRequest {
    /// Converts the request into the descriptor handed to the virtual
    /// machine, mapping payments to gas via the configured multipliers.
    pub fn to_vm_request(
        &self,
        config: &HeightConfig,
        drive_key: DriveKey,
        proof_of_execution_prefix: u64,
    ) -> VmCallRequest {
        VmCallRequest {
            call_id: self.call_id,
            file: self.file.clone(),
            function: self.function.clone(),
            params: self.arguments.clone(),
            execution_gas_limit: self
                .execution_payment
                .saturating_mul(config.execution_payment_to_gas_multiplier),
            download_gas_limit: self
                .download_payment
                .saturating_mul(config.download_payment_to_gas_multiplier),
            call_level: CallLevel::Manual,
            proof_of_execution_prefix,
            drive_key,
            caller_key: Some(self.caller_key),
            block_height: self.block_height,
        }
    }
}

/// Call descriptor as the virtual machine sees it. The VM deals in gas only;
/// payments never cross this boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmCallRequest {
    pub call_id: CallId,
    pub file: String,
    pub function: String,
    pub params: Vec<u8>,
    pub execution_gas_limit: u64,
    pub download_gas_limit: u64,
    pub call_level: CallLevel,
    pub proof_of_execution_prefix: u64,
    pub drive_key: DriveKey,
    pub caller_key: Option<CallerKey>,
    pub block_height: u64,
}

/// Outcome of one call as reported by the virtual machine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExecutionResult {
    pub success: bool,
    pub return_value: u32,
    pub execution_gas_consumed: u64,
    pub download_gas_consumed: u64,
    /// Secret per-call output feeding the proof-of-execution chain.
    pub poex_secret: u64,
    /// Transaction released by the call, to be aggregated and announced.
    pub released_transaction: Option<AggregatedTransaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_to_gas_conversion() {
        let config = HeightConfig::default();
        let request = ManualCallRequest {
            call_id: CallId::new([1; 32]),
            file: "token.wasm".to_string(),
            function: "transfer".to_string(),
            arguments: vec![1, 2, 3],
            execution_payment: 7,
            download_payment: 3,
            caller_key: CallerKey::new([2; 32]),
            block_height: 42,
            service_payments: vec![],
        };

        let vm_request = request.to_vm_request(&config, DriveKey::new([3; 32]), 0);
        assert_eq!(
            vm_request.execution_gas_limit,
            7 * config.execution_payment_to_gas_multiplier
        );
        assert_eq!(
            vm_request.download_gas_limit,
            3 * config.download_payment_to_gas_multiplier
        );
        assert_eq!(vm_request.call_level, CallLevel::Manual);
        assert_eq!(vm_request.caller_key, Some(request.caller_key));
    }
}
