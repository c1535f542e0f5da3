// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use executor_config::{ExecutorKeyPair, ExecutorKeySignature, ExecutorPublicKey};
use serde::{Deserialize, Serialize};

use crate::{CallId, ContractKey, CurvePoint, ExecutorKey, Proofs, Signature, StorageHash};

/// Gas consumed by one executor while running one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExecutorParticipation {
    pub sc_consumed: u64,
    pub sm_consumed: u64,
}

/// Storage effects of one call, present only in successful batch opinions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulCallInfo {
    pub call_execution_success: bool,
    pub call_sandbox_size_delta: i64,
    pub call_state_size_delta: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExecutionOpinion {
    pub call_id: CallId,
    pub successful_call_info: Option<SuccessfulCallInfo>,
    pub executor_participation: CallExecutorParticipation,
}

/// Storage state the batch settled on, as seen by one executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulBatchInfo {
    pub storage_hash: StorageHash,
    pub used_storage_size: u64,
    pub meta_files_size: u64,
    pub file_structure_size: u64,
    pub poex_verification: CurvePoint,
}

/// One executor's signed verdict on a finished batch, exchanged across the
/// cohort under the END_BATCH tag.
///
/// The signature covers the canonical concatenation produced by
/// [`Self::signed_info`]; proof, executor key and signature ride along as
/// metadata outside the preimage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndBatchExecutionOpinion {
    pub contract_key: ContractKey,
    pub batch_index: u64,
    pub successful_batch_info: Option<SuccessfulBatchInfo>,
    pub calls_execution_info: Vec<CallExecutionOpinion>,
    pub proof: Proofs,
    pub executor_key: ExecutorKey,
    pub signature: Signature,
}

impl EndBatchExecutionOpinion {
    pub fn is_successful(&self) -> bool {
        self.successful_batch_info.is_some()
    }

    /// A successful opinion must carry per-call success info for every call;
    /// an unsuccessful one must carry none.
    pub fn has_valid_form(&self) -> bool {
        let successful = self.is_successful();
        self.calls_execution_info
            .iter()
            .all(|call| call.successful_call_info.is_some() == successful)
    }

    /// Two opinions agree when the committed outcome is identical: batch
    /// info, call list and per-call storage effects. Proofs, signatures and
    /// gas participation are per-executor and excluded.
    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.contract_key == other.contract_key
            && self.batch_index == other.batch_index
            && self.successful_batch_info == other.successful_batch_info
            && self.calls_execution_info.len() == other.calls_execution_info.len()
            && self
                .calls_execution_info
                .iter()
                .zip(&other.calls_execution_info)
                .all(|(own, their)| {
                    own.call_id == their.call_id
                        && own.successful_call_info == their.successful_call_info
                })
    }

    pub fn sign(&mut self, keypair: &ExecutorKeyPair) {
        self.executor_key = ExecutorKey::from(&keypair.public());
        let signature = keypair.sign(&self.signed_info());
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(signature.to_bytes());
        self.signature = Signature::new(bytes);
    }

    pub fn verify(&self) -> bool {
        let Ok(public_key) = ExecutorPublicKey::from_bytes(self.executor_key.as_bytes()) else {
            return false;
        };
        let Ok(signature) = ExecutorKeySignature::from_bytes(self.signature.as_bytes()) else {
            return false;
        };
        public_key.verify(&self.signed_info(), &signature).is_ok()
    }

    /// Canonical signed preimage. The layout is part of the network protocol
    /// and must not change: little-endian integers, one byte per bool, no
    /// length prefixes.
    pub fn signed_info(&self) -> Vec<u8> {
        let mut buffer = Vec::new();

        buffer.extend_from_slice(self.contract_key.as_ref());
        buffer.extend_from_slice(&self.batch_index.to_le_bytes());

        buffer.push(self.is_successful() as u8);
        if let Some(info) = &self.successful_batch_info {
            buffer.extend_from_slice(info.storage_hash.as_ref());
            buffer.extend_from_slice(&info.used_storage_size.to_le_bytes());
            buffer.extend_from_slice(&info.meta_files_size.to_le_bytes());
            buffer.extend_from_slice(&info.file_structure_size.to_le_bytes());
        }

        for call in &self.calls_execution_info {
            buffer.extend_from_slice(call.call_id.as_ref());

            if let Some(info) = &call.successful_call_info {
                buffer.push(info.call_execution_success as u8);
                buffer.extend_from_slice(&info.call_sandbox_size_delta.to_le_bytes());
                buffer.extend_from_slice(&info.call_state_size_delta.to_le_bytes());
            }

            let participation = &call.executor_participation;
            buffer.extend_from_slice(&participation.sc_consumed.to_le_bytes());
            buffer.extend_from_slice(&participation.sm_consumed.to_le_bytes());
        }

        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use executor_config::local_executor_keys;

    fn successful_opinion() -> EndBatchExecutionOpinion {
        EndBatchExecutionOpinion {
            contract_key: ContractKey::new([1; 32]),
            batch_index: 3,
            successful_batch_info: Some(SuccessfulBatchInfo {
                storage_hash: StorageHash::new([2; 32]),
                used_storage_size: 4096,
                meta_files_size: 512,
                file_structure_size: 128,
                poex_verification: CurvePoint::identity(),
            }),
            calls_execution_info: vec![CallExecutionOpinion {
                call_id: CallId::new([3; 32]),
                successful_call_info: Some(SuccessfulCallInfo {
                    call_execution_success: true,
                    call_sandbox_size_delta: 100,
                    call_state_size_delta: -20,
                }),
                executor_participation: CallExecutorParticipation {
                    sc_consumed: 604,
                    sm_consumed: 0,
                },
            }],
            proof: Proofs::default(),
            executor_key: ExecutorKey::default(),
            signature: Signature::default(),
        }
    }

    #[test]
    fn signed_preimage_layout() {
        let opinion = successful_opinion();
        let info = opinion.signed_info();

        // key + index + flag + batch info + call id + call info + participation
        assert_eq!(info.len(), 32 + 8 + 1 + (32 + 8 + 8 + 8) + 32 + (1 + 8 + 8) + 16);
        assert_eq!(&info[..32], &[1; 32]);
        assert_eq!(&info[32..40], &3u64.to_le_bytes());
        assert_eq!(info[40], 1);
        assert_eq!(&info[41..73], &[2; 32]);
        assert_eq!(&info[73..81], &4096u64.to_le_bytes());
    }

    #[test]
    fn sign_and_verify() {
        let keys = local_executor_keys(1);
        let keypair = &keys[0];
        let mut opinion = successful_opinion();
        opinion.sign(keypair);

        assert_eq!(opinion.executor_key, ExecutorKey::from(&keypair.public()));
        assert!(opinion.verify());
    }

    #[test]
    fn tampering_any_signed_field_breaks_verification() {
        let keys = local_executor_keys(1);
        let keypair = &keys[0];
        let mut opinion = successful_opinion();
        opinion.sign(keypair);

        let mut tampered = opinion.clone();
        tampered.batch_index += 1;
        assert!(!tampered.verify());

        let mut tampered = opinion.clone();
        tampered.successful_batch_info.as_mut().unwrap().used_storage_size = 1;
        assert!(!tampered.verify());

        let mut tampered = opinion.clone();
        tampered.calls_execution_info[0]
            .executor_participation
            .sc_consumed = 0;
        assert!(!tampered.verify());

        let mut tampered = opinion.clone();
        tampered.executor_key = ExecutorKey::new([9; 32]);
        assert!(!tampered.verify());
    }

    #[test]
    fn valid_form_requires_consistent_call_infos() {
        let mut opinion = successful_opinion();
        assert!(opinion.has_valid_form());

        // A successful opinion with a call missing its info is malformed.
        opinion.calls_execution_info[0].successful_call_info = None;
        assert!(!opinion.has_valid_form());

        // An unsuccessful opinion must not carry per-call success info.
        let mut unsuccessful = successful_opinion();
        unsuccessful.successful_batch_info = None;
        assert!(!unsuccessful.has_valid_form());
        unsuccessful.calls_execution_info[0].successful_call_info = None;
        assert!(unsuccessful.has_valid_form());
    }

    #[test]
    fn structural_equality_ignores_executor_metadata() {
        let keys = local_executor_keys(2);
        let mut first = successful_opinion();
        first.sign(&keys[0]);
        let mut second = successful_opinion();
        // Gas consumption legitimately differs between executors.
        second.calls_execution_info[0]
            .executor_participation
            .sc_consumed = 999;
        second.sign(&keys[1]);

        assert_ne!(first, second);
        assert!(first.structurally_equal(&second));

        second.successful_batch_info.as_mut().unwrap().used_storage_size += 1;
        assert!(!first.structurally_equal(&second));

        let mut third = successful_opinion();
        third.calls_execution_info[0]
            .successful_call_info
            .as_mut()
            .unwrap()
            .call_sandbox_size_delta = 7;
        assert!(!first.structurally_equal(&third));
    }
}
