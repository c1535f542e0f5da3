// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use executor_config::{HeightConfig, HeightConfigTable};
use executor_types::{
    verify_batch_proof, verify_t_proof, AddContractRequest, CallId, CallLevel, ContractKey,
    CurvePoint, DriveKey, EndBatchExecutionOpinion, ExecutorKey, ManualCallRequest, Proofs,
    StorageHash, VmCallRequest,
};
use sha3::{Digest as _, Sha3_256};
use std::time::Duration;

use crate::{
    async_query::QueryHandle, batch_task::BatchTask, event_loop::Timer, executor::Executor,
    proof_of_execution::ProofOfExecution,
};

/// Automatic-execution configuration of one contract, plus the running SC
/// allowance bookkeeping.
pub(crate) struct AutomaticExecutions {
    pub file: String,
    pub function: String,
    pub sc_limit: u64,
    pub sm_limit: u64,
    /// Block height automatic executions are enabled from; `None` disables
    /// them.
    pub enabled_since: Option<u64>,
    /// SC gas consumed by automatic calls since enabling.
    pub sc_spent: u64,
}

impl AutomaticExecutions {
    fn is_configured(&self) -> bool {
        !self.file.is_empty()
    }

    fn is_enabled_at(&self, height: u64) -> bool {
        self.is_configured() && self.enabled_since.is_some_and(|since| since <= height)
    }

    fn remaining_sc(&self) -> u64 {
        self.sc_limit.saturating_sub(self.sc_spent)
    }
}

/// The last proof of a peer that made it into a committed batch, anchoring
/// the verification of the peer's later batch proofs.
pub(crate) struct PeerChainInfo {
    pub last_batch: u64,
    pub proof: Proofs,
}

/// One atomic execution unit: a deterministic ordered list of calls producing
/// one on-chain transaction.
pub(crate) struct Batch {
    pub batch_index: u64,
    pub calls: VecDeque<VmCallRequest>,
    /// The manual requests the batch consumed, kept so they can be requeued
    /// if the batch has to be retried.
    pub manual_requests: Vec<ManualCallRequest>,
}

/// Per-contract state owned by the event loop.
pub(crate) struct Contract {
    pub key: ContractKey,
    pub drive_key: DriveKey,
    /// The peer cohort; never contains this executor's own key.
    pub executors: BTreeSet<ExecutorKey>,
    pub automatic: AutomaticExecutions,
    pub pending_calls: VecDeque<ManualCallRequest>,
    /// Next batch number to execute; monotonic.
    pub batch_index: u64,
    /// Number of batches proven published.
    pub batches_executed: u64,
    pub active_batch: Option<BatchTask>,
    pub proof_chain: ProofOfExecution,
    /// Per-batch commitments, used to verify peer batch proofs reaching back
    /// to older batches. Append-on-close, oldest evicted.
    pub recent_batch_commitments: BTreeMap<u64, CurvePoint>,
    /// Last committed proof per peer, for verifying proof-chain continuity.
    pub peer_proofs: BTreeMap<ExecutorKey, PeerChainInfo>,
    /// Opinions that arrived for the next batch before its task exists.
    pub pending_opinions_successful: BTreeMap<ExecutorKey, EndBatchExecutionOpinion>,
    pub pending_opinions_unsuccessful: BTreeMap<ExecutorKey, EndBatchExecutionOpinion>,
    /// Batches whose published storage state this executor still has to catch
    /// up to before the next batch may start.
    pub synchronization_queue: VecDeque<(u64, StorageHash)>,
    /// In-flight storage synchronization, cancelled with the contract.
    pub sync_query: Option<QueryHandle<Executor, ()>>,
    pub sync_retry_timer: Option<Timer>,
    pub last_known_block_height: u64,
    pub automatic_checked_up_to: u64,
    pub unsuccessful_approval_expectation: Duration,
    /// Set between a batch finalizing and the configured execution delay
    /// elapsing; no batch may open while pending.
    pub delay_pending: bool,
    pub next_batch_timer: Option<Timer>,
}

impl Contract {
    pub(crate) fn new(key: ContractKey, request: AddContractRequest, own_key: &ExecutorKey) -> Self {
        let mut executors = request.executors;
        executors.remove(own_key);
        Self {
            key,
            drive_key: request.drive_key,
            executors,
            automatic: AutomaticExecutions {
                file: request.automatic_executions_file_name,
                function: request.automatic_executions_function_name,
                sc_limit: request.automatic_executions_sc_limit,
                sm_limit: request.automatic_executions_sm_limit,
                enabled_since: None,
                sc_spent: 0,
            },
            pending_calls: VecDeque::new(),
            batch_index: request.batches_executed,
            batches_executed: request.batches_executed,
            active_batch: None,
            proof_chain: ProofOfExecution::new(key, request.batches_executed),
            recent_batch_commitments: request.recent_batches_information,
            peer_proofs: BTreeMap::new(),
            pending_opinions_successful: BTreeMap::new(),
            pending_opinions_unsuccessful: BTreeMap::new(),
            synchronization_queue: VecDeque::new(),
            sync_query: None,
            sync_retry_timer: None,
            last_known_block_height: 0,
            automatic_checked_up_to: 0,
            unsuccessful_approval_expectation: Duration::from_millis(
                request.unsuccessful_approval_expectation_ms,
            ),
            delay_pending: false,
            next_batch_timer: None,
        }
    }

    /// Whether a new batch may be opened right now.
    pub(crate) fn can_open_batch(&self) -> bool {
        self.active_batch.is_none() && self.synchronization_queue.is_empty() && !self.delay_pending
    }

    /// Seals the currently available work into a batch: the autorun bootstrap
    /// on the deployment batch, then at most one automatic call, then all
    /// pending manual calls in FIFO order. Returns `None` when there is no
    /// work.
    pub(crate) fn form_batch(&mut self, configs: &HeightConfigTable) -> Option<Batch> {
        let height = self.last_known_block_height;
        let config = configs.config_at(height);
        let mut calls = VecDeque::new();

        if self.batch_index == 0 && self.batches_executed == 0 && self.automatic.is_configured() {
            calls.push_back(self.autorun_call(config));
        }

        if self.automatic.is_enabled_at(height) && self.automatic.remaining_sc() > 0 {
            calls.push_back(self.automatic_call(height));
        }

        let mut manual_requests = Vec::new();
        while let Some(manual) = self.pending_calls.pop_front() {
            let config = configs.config_at(manual.block_height);
            calls.push_back(manual.to_vm_request(config, self.drive_key, self.batch_index));
            manual_requests.push(manual);
        }

        if calls.is_empty() {
            return None;
        }
        Some(Batch {
            batch_index: self.batch_index,
            calls,
            manual_requests,
        })
    }

    fn autorun_call(&self, config: &HeightConfig) -> VmCallRequest {
        VmCallRequest {
            call_id: synthesized_call_id(&self.key, self.batch_index, b"AUTORUN"),
            file: config.autorun_file.clone(),
            function: config.autorun_function.clone(),
            params: Vec::new(),
            execution_gas_limit: config.autorun_sc_limit,
            download_gas_limit: 0,
            call_level: CallLevel::Autorun,
            proof_of_execution_prefix: self.batch_index,
            drive_key: self.drive_key,
            caller_key: None,
            block_height: self.last_known_block_height,
        }
    }

    fn automatic_call(&self, height: u64) -> VmCallRequest {
        VmCallRequest {
            call_id: synthesized_call_id(&self.key, self.batch_index, b"AUTOMATIC"),
            file: self.automatic.file.clone(),
            function: self.automatic.function.clone(),
            params: Vec::new(),
            execution_gas_limit: self.automatic.remaining_sc(),
            download_gas_limit: self.automatic.sm_limit,
            call_level: CallLevel::Automatic,
            proof_of_execution_prefix: self.batch_index,
            drive_key: self.drive_key,
            caller_key: None,
            block_height: height,
        }
    }

    /// Verifies the proof of execution carried by a peer's opinion.
    ///
    /// The T-proof must always hold. For a successful opinion the batch proof
    /// must additionally connect the peer's last committed proof to the
    /// claimed commitment; when the anchor batch has fallen out of the
    /// commitment window this executor abstains from the continuity check.
    pub(crate) fn verify_peer_proof(&self, opinion: &EndBatchExecutionOpinion) -> bool {
        if !verify_t_proof(&opinion.proof, &self.key) {
            return false;
        }
        let Some(batch_info) = &opinion.successful_batch_info else {
            return true;
        };
        let Some(anchor) = self.peer_proofs.get(&opinion.executor_key) else {
            return true;
        };
        let Some(anchor_commitment) = self.recent_batch_commitments.get(&anchor.last_batch) else {
            return true;
        };
        verify_batch_proof(
            &opinion.proof,
            &anchor.proof,
            batch_info.poex_verification - *anchor_commitment,
        )
    }

    /// Records a closed batch's commitment, evicting the oldest entries past
    /// the history bound. Lookups for evicted indices fail gracefully at the
    /// caller.
    pub(crate) fn record_batch_commitment(
        &mut self,
        batch_index: u64,
        commitment: CurvePoint,
        max_history: u64,
    ) {
        self.recent_batch_commitments.insert(batch_index, commitment);
        while self.recent_batch_commitments.len() as u64 > max_history {
            self.recent_batch_commitments.pop_first();
        }
    }
}

/// Deterministic id for a synthesized (non-manual) call, identical across the
/// cohort.
fn synthesized_call_id(contract_key: &ContractKey, batch_index: u64, domain: &[u8]) -> CallId {
    let mut hasher = Sha3_256::new();
    hasher.update(contract_key.as_ref());
    hasher.update(batch_index.to_le_bytes());
    hasher.update(domain);
    let bytes: [u8; 32] = hasher.finalize().into();
    CallId::new(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::proof_of_execution::ProofOfExecution;
    use executor_types::{CallerKey, ModificationId, Signature, SuccessfulBatchInfo};

    fn test_request(executors: BTreeSet<ExecutorKey>) -> AddContractRequest {
        AddContractRequest {
            drive_key: DriveKey::new([1; 32]),
            executors,
            recent_batches_information: BTreeMap::new(),
            contract_deployment_base_modification_id: ModificationId::default(),
            automatic_executions_file_name: String::new(),
            automatic_executions_function_name: String::new(),
            automatic_executions_sc_limit: 0,
            automatic_executions_sm_limit: 0,
            batches_executed: 0,
            unsuccessful_approval_expectation_ms: 60_000,
        }
    }

    fn manual_call(id: u8) -> ManualCallRequest {
        ManualCallRequest {
            call_id: CallId::new([id; 32]),
            file: "contract.wasm".to_string(),
            function: "run".to_string(),
            arguments: vec![id],
            execution_payment: 1,
            download_payment: 1,
            caller_key: CallerKey::new([9; 32]),
            block_height: 5,
            service_payments: vec![],
        }
    }

    #[test]
    fn own_key_is_stripped_from_the_cohort() {
        let own = ExecutorKey::new([1; 32]);
        let peer = ExecutorKey::new([2; 32]);
        let contract = Contract::new(
            ContractKey::new([0; 32]),
            test_request(BTreeSet::from([own, peer])),
            &own,
        );
        assert_eq!(contract.executors, BTreeSet::from([peer]));
    }

    #[test]
    fn empty_contract_forms_no_batch() {
        let own = ExecutorKey::new([1; 32]);
        let mut contract = Contract::new(
            ContractKey::new([0; 32]),
            test_request(BTreeSet::from([own])),
            &own,
        );
        assert!(contract.form_batch(&HeightConfigTable::default()).is_none());
    }

    #[test]
    fn manual_calls_are_batched_in_fifo_order() {
        let own = ExecutorKey::new([1; 32]);
        let mut contract = Contract::new(
            ContractKey::new([0; 32]),
            test_request(BTreeSet::from([own])),
            &own,
        );
        contract.pending_calls.push_back(manual_call(1));
        contract.pending_calls.push_back(manual_call(2));

        let batch = contract.form_batch(&HeightConfigTable::default()).unwrap();
        assert_eq!(batch.batch_index, 0);
        assert_eq!(batch.calls.len(), 2);
        assert_eq!(batch.calls[0].call_id, CallId::new([1; 32]));
        assert_eq!(batch.calls[1].call_id, CallId::new([2; 32]));
        assert!(contract.pending_calls.is_empty());
    }

    #[test]
    fn automatic_call_leads_the_batch_when_enabled() {
        let own = ExecutorKey::new([1; 32]);
        let mut request = test_request(BTreeSet::from([own]));
        request.automatic_executions_file_name = "auto.wasm".to_string();
        request.automatic_executions_function_name = "tick".to_string();
        request.automatic_executions_sc_limit = 1000;
        request.batches_executed = 3;

        let mut contract = Contract::new(ContractKey::new([0; 32]), request, &own);
        contract.last_known_block_height = 10;
        contract.pending_calls.push_back(manual_call(1));

        // Not enabled yet: only the manual call.
        let batch = contract.form_batch(&HeightConfigTable::default()).unwrap();
        assert_eq!(batch.calls.len(), 1);

        contract.pending_calls.push_back(manual_call(1));
        contract.automatic.enabled_since = Some(8);
        let batch = contract.form_batch(&HeightConfigTable::default()).unwrap();
        assert_eq!(batch.calls.len(), 2);
        assert_eq!(batch.calls[0].call_level, CallLevel::Automatic);
        assert_eq!(batch.calls[0].file, "auto.wasm");
        assert_eq!(batch.calls[1].call_level, CallLevel::Manual);
    }

    #[test]
    fn exhausted_sc_allowance_stops_automatic_calls() {
        let own = ExecutorKey::new([1; 32]);
        let mut request = test_request(BTreeSet::from([own]));
        request.automatic_executions_file_name = "auto.wasm".to_string();
        request.automatic_executions_sc_limit = 1000;
        request.batches_executed = 3;

        let mut contract = Contract::new(ContractKey::new([0; 32]), request, &own);
        contract.last_known_block_height = 10;
        contract.automatic.enabled_since = Some(0);
        contract.automatic.sc_spent = 1000;

        assert!(contract.form_batch(&HeightConfigTable::default()).is_none());
    }

    #[test]
    fn autorun_bootstraps_the_deployment_batch() {
        let own = ExecutorKey::new([1; 32]);
        let mut request = test_request(BTreeSet::from([own]));
        request.automatic_executions_file_name = "auto.wasm".to_string();

        let mut contract = Contract::new(ContractKey::new([0; 32]), request, &own);
        contract.pending_calls.push_back(manual_call(1));

        let configs = HeightConfigTable::default();
        let batch = contract.form_batch(&configs).unwrap();
        assert_eq!(batch.calls[0].call_level, CallLevel::Autorun);
        assert_eq!(batch.calls[0].file, configs.config_at(0).autorun_file);
        assert_eq!(
            batch.calls[0].execution_gas_limit,
            configs.config_at(0).autorun_sc_limit
        );
        assert_eq!(batch.calls[1].call_level, CallLevel::Manual);
    }

    #[test]
    fn peer_proof_verification_follows_the_commitment_chain() {
        let own = ExecutorKey::new([1; 32]);
        let peer = ExecutorKey::new([2; 32]);
        let contract_key = ContractKey::new([0; 32]);
        let mut contract = Contract::new(
            contract_key,
            test_request(BTreeSet::from([own, peer])),
            &own,
        );

        // The peer's chain over two committed batches.
        let mut poex = ProofOfExecution::new(contract_key, 0);
        poex.add_to_proof(11);
        let proof_0 = poex.build_proof();
        let commitment_0 = poex.batch_commitment();
        poex.reset();
        poex.add_to_proof(22);
        let proof_1 = poex.build_proof();
        let commitment_1 = poex.batch_commitment();

        contract.record_batch_commitment(0, commitment_0, 100);
        contract.peer_proofs.insert(
            peer,
            PeerChainInfo {
                last_batch: 0,
                proof: proof_0,
            },
        );

        let opinion = EndBatchExecutionOpinion {
            contract_key,
            batch_index: 1,
            successful_batch_info: Some(SuccessfulBatchInfo {
                storage_hash: StorageHash::default(),
                used_storage_size: 0,
                meta_files_size: 0,
                file_structure_size: 0,
                poex_verification: commitment_1,
            }),
            calls_execution_info: vec![],
            proof: proof_1,
            executor_key: peer,
            signature: Signature::default(),
        };
        assert!(contract.verify_peer_proof(&opinion));

        // A blinding nonce that does not match the chain fails continuity.
        let mut tampered = opinion.clone();
        tampered.proof.batch_proof.r = tampered.proof.t_proof.k;
        assert!(!contract.verify_peer_proof(&tampered));

        // A corrupted T fails the T-proof outright.
        let mut tampered = opinion.clone();
        tampered.proof.batch_proof.t = CurvePoint::base_point();
        assert!(!contract.verify_peer_proof(&tampered));

        // An anchor outside the commitment window abstains, not rejects.
        contract.recent_batch_commitments.clear();
        assert!(contract.verify_peer_proof(&opinion));
    }

    #[test]
    fn commitment_history_is_bounded() {
        let own = ExecutorKey::new([1; 32]);
        let mut contract = Contract::new(
            ContractKey::new([0; 32]),
            test_request(BTreeSet::from([own])),
            &own,
        );

        for index in 0..5 {
            contract.record_batch_commitment(index, CurvePoint::identity(), 3);
        }
        assert_eq!(contract.recent_batch_commitments.len(), 3);
        assert!(!contract.recent_batch_commitments.contains_key(&0));
        assert!(contract.recent_batch_commitments.contains_key(&4));
    }
}
