// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Sha3_256};

use crate::{
    CallExecutorParticipation, CallId, ContractKey, CurvePoint, ExecutorKey, Proofs, Signature,
    StorageHash, TransactionHash,
};

/// Outcome of one call as committed on-chain by a successful batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulCallExecutionInfo {
    pub call_id: CallId,
    pub manual: bool,
    pub call_execution_status: u16,
    pub released_transaction: TransactionHash,
    pub executors_participation: Vec<CallExecutorParticipation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsuccessfulCallExecutionInfo {
    pub call_id: CallId,
    pub manual: bool,
    pub executors_participation: Vec<CallExecutorParticipation>,
}

/// Batch-level storage summary carried by a successful end-batch transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulBatchSummary {
    pub storage_hash: StorageHash,
    pub used_storage_size: u64,
    pub meta_files_size: u64,
    pub poex_verification: CurvePoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccessfulEndBatchExecutionTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub automatic_executions_checked_up_to: u64,
    pub successful_batch_info: SuccessfulBatchSummary,
    pub calls_execution_info: Vec<SuccessfulCallExecutionInfo>,
    pub proofs: Vec<Proofs>,
    pub executor_keys: Vec<ExecutorKey>,
    pub signatures: Vec<Signature>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnsuccessfulEndBatchExecutionTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub automatic_executions_checked_up_to: u64,
    pub calls_execution_info: Vec<UnsuccessfulCallExecutionInfo>,
    pub proofs: Vec<Proofs>,
    pub executor_keys: Vec<ExecutorKey>,
    pub signatures: Vec<Signature>,
}

/// Fallback submission carrying only the local proof, emitted when the cohort
/// cannot reach a quorum, so peers can still follow this executor's chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndBatchExecutionSingleTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub proof_of_execution: Proofs,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SynchronizationSingleTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
}

// region published notifications

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishedEndBatchExecutionTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub batch_success: bool,
    pub drive_state: StorageHash,
    pub poex_verification: CurvePoint,
    pub automatic_executions_checked_up_to: u64,
    pub cosigners: BTreeSet<ExecutorKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishedEndBatchExecutionSingleTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailedEndBatchExecutionTransactionInfo {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub batch_success: bool,
}

// endregion

// region released transactions

/// A transaction a call asked to release on-chain, before serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedTransaction {
    pub entity_type: u16,
    pub version: u32,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedTransaction {
    pub max_fee: u64,
    pub transactions: Vec<EmbeddedTransaction>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAggregatedTransaction {
    pub max_fee: u64,
    pub transactions: Vec<Vec<u8>>,
}

fn version_with_network_id(network_identifier: u8, version: u32) -> u32 {
    (network_identifier as u32) << 24 | version
}

/// Serializes one embedded transaction:
/// `[u32 size][contract key][u32 version_with_network_id][u16 entity type][payload]`.
pub fn build_embedded_transaction(
    network_identifier: u8,
    contract_key: &ContractKey,
    transaction: &EmbeddedTransaction,
) -> Vec<u8> {
    let version = version_with_network_id(network_identifier, transaction.version);
    let size = (4 + 32 + 4 + 2 + transaction.payload.len()) as u32;

    let mut payload = Vec::with_capacity(size as usize);
    payload.extend_from_slice(&size.to_le_bytes());
    payload.extend_from_slice(contract_key.as_ref());
    payload.extend_from_slice(&version.to_le_bytes());
    payload.extend_from_slice(&transaction.entity_type.to_le_bytes());
    payload.extend_from_slice(&transaction.payload);
    payload
}

/// Serializes an aggregated transaction and computes its hash:
/// SHA3-256 over `max_fee ∥ concat(embedded transactions)`.
pub fn build_aggregated_transaction(
    network_identifier: u8,
    contract_key: &ContractKey,
    transaction: &AggregatedTransaction,
) -> (TransactionHash, SerializedAggregatedTransaction) {
    let serialized = SerializedAggregatedTransaction {
        max_fee: transaction.max_fee,
        transactions: transaction
            .transactions
            .iter()
            .map(|embedded| build_embedded_transaction(network_identifier, contract_key, embedded))
            .collect(),
    };

    let mut hasher = Sha3_256::new();
    hasher.update(serialized.max_fee.to_le_bytes());
    for transaction in &serialized.transactions {
        hasher.update(transaction);
    }
    let hash: [u8; 32] = hasher.finalize().into();

    (TransactionHash::new(hash), serialized)
}

// endregion

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_transaction_layout() {
        let contract_key = ContractKey::new([7; 32]);
        let transaction = EmbeddedTransaction {
            entity_type: 0x4143,
            version: 1,
            payload: vec![0xDE, 0xAD],
        };

        let bytes = build_embedded_transaction(0x90, &contract_key, &transaction);
        assert_eq!(bytes.len(), 4 + 32 + 4 + 2 + 2);
        assert_eq!(&bytes[..4], &(44u32).to_le_bytes());
        assert_eq!(&bytes[4..36], &[7; 32]);
        // network id lands in the top byte of the version word
        assert_eq!(&bytes[36..40], &(0x9000_0001u32).to_le_bytes());
        assert_eq!(&bytes[40..42], &0x4143u16.to_le_bytes());
        assert_eq!(&bytes[42..], &[0xDE, 0xAD]);
    }

    #[test]
    fn aggregated_hash_binds_fee_and_payloads() {
        let contract_key = ContractKey::new([7; 32]);
        let aggregated = AggregatedTransaction {
            max_fee: 1000,
            transactions: vec![
                EmbeddedTransaction {
                    entity_type: 1,
                    version: 1,
                    payload: vec![1],
                },
                EmbeddedTransaction {
                    entity_type: 2,
                    version: 1,
                    payload: vec![2],
                },
            ],
        };

        let (hash, serialized) = build_aggregated_transaction(0, &contract_key, &aggregated);
        assert_eq!(serialized.transactions.len(), 2);

        let (same_hash, _) = build_aggregated_transaction(0, &contract_key, &aggregated);
        assert_eq!(hash, same_hash);

        let mut with_other_fee = aggregated.clone();
        with_other_fee.max_fee = 1001;
        let (other_hash, _) = build_aggregated_transaction(0, &contract_key, &with_other_fee);
        assert_ne!(hash, other_hash);
    }
}
