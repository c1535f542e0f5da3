// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The batch execution task: drives one batch of calls through the virtual
//! machine, forms this executor's end-batch opinion, exchanges opinions with
//! the peer cohort, and emits the endorsed transaction once a supermajority
//! agrees. At most one task exists per contract at any time.

use std::collections::BTreeMap;

use executor_types::{
    build_aggregated_transaction, CallExecutionResult, CallExecutorParticipation, CallId,
    CallLevel, ContractKey, EndBatchExecutionOpinion, EndBatchExecutionSingleTransactionInfo,
    ExecutorKey, FailedEndBatchExecutionTransactionInfo, ManualCallRequest, MessageTag,
    OutputMessage, PublishedEndBatchExecutionTransactionInfo, SerializedAggregatedTransaction,
    SuccessfulBatchInfo, SuccessfulBatchSummary, SuccessfulCallExecutionInfo, SuccessfulCallInfo,
    SuccessfulEndBatchExecutionTransactionInfo, SynchronizationSingleTransactionInfo,
    TransactionHash, UnsuccessfulCallExecutionInfo, UnsuccessfulEndBatchExecutionTransactionInfo,
    VmCallRequest, CallExecutionOpinion,
};
use tracing::{debug, warn};

use crate::{
    async_query::{spawn_query, QueryHandle},
    contract::{Batch, Contract},
    error::ExecutorResult,
    event_loop::Timer,
    executor::Executor,
    host::HostAnnouncement,
    messenger::MessengerAdapter,
    storage::{SandboxDeltas, StorageState},
};

pub(crate) struct BatchTask {
    pub batch_index: u64,
    pub calls: Vec<VmCallRequest>,
    manual_requests: Vec<ManualCallRequest>,
    next_call: usize,
    outcomes: Vec<Option<CallExecutionResult>>,
    deltas: Vec<Option<SandboxDeltas>>,
    /// Cleared when a service-level failure makes the whole batch
    /// unsuccessful.
    batch_success: bool,
    /// Contributions fed into the proof chain by this batch, to be popped if
    /// the batch does not commit.
    pub poex_added: usize,
    own_opinion: Option<EndBatchExecutionOpinion>,
    peer_opinions_successful: BTreeMap<ExecutorKey, EndBatchExecutionOpinion>,
    peer_opinions_unsuccessful: BTreeMap<ExecutorKey, EndBatchExecutionOpinion>,
    released: Vec<(CallId, TransactionHash, SerializedAggregatedTransaction)>,
    emitted: bool,

    init_query: Option<QueryHandle<Executor, ()>>,
    vm_query: Option<QueryHandle<Executor, CallExecutionResult>>,
    sandbox_query: Option<QueryHandle<Executor, SandboxDeltas>>,
    evaluate_query: Option<QueryHandle<Executor, StorageState>>,
    rebroadcast_timer: Option<Timer>,
    approval_timer: Option<Timer>,
}

impl BatchTask {
    pub(crate) fn new(
        batch: Batch,
        buffered_successful: BTreeMap<ExecutorKey, EndBatchExecutionOpinion>,
        buffered_unsuccessful: BTreeMap<ExecutorKey, EndBatchExecutionOpinion>,
    ) -> Self {
        let calls: Vec<_> = batch.calls.into();
        let count = calls.len();
        let batch_index = batch.batch_index;
        let matches = |opinion: &EndBatchExecutionOpinion| opinion.batch_index == batch_index;
        Self {
            batch_index,
            calls,
            manual_requests: batch.manual_requests,
            next_call: 0,
            outcomes: vec![None; count],
            deltas: vec![None; count],
            batch_success: true,
            poex_added: 0,
            own_opinion: None,
            peer_opinions_successful: buffered_successful
                .into_iter()
                .filter(|(_, opinion)| matches(opinion))
                .collect(),
            peer_opinions_unsuccessful: buffered_unsuccessful
                .into_iter()
                .filter(|(_, opinion)| matches(opinion))
                .collect(),
            released: Vec::new(),
            emitted: false,
            init_query: None,
            vm_query: None,
            sandbox_query: None,
            evaluate_query: None,
            rebroadcast_timer: None,
            approval_timer: None,
        }
    }

    pub(crate) fn insert_peer_opinion(&mut self, opinion: EndBatchExecutionOpinion) {
        let map = if opinion.is_successful() {
            &mut self.peer_opinions_successful
        } else {
            &mut self.peer_opinions_unsuccessful
        };
        map.insert(opinion.executor_key, opinion);
    }
}

impl Executor {
    fn contract_with_batch(
        &mut self,
        key: &ContractKey,
        batch_index: u64,
    ) -> Option<&mut Contract> {
        let contract = self.contracts.get_mut(key)?;
        let matches = contract
            .active_batch
            .as_ref()
            .is_some_and(|task| task.batch_index == batch_index);
        matches.then_some(contract)
    }

    /// Opens a new batch when the contract has work and nothing blocks it.
    pub(crate) fn try_start_batch(&mut self, key: ContractKey) {
        let configs = self.context.height_configs.clone();
        let metrics = self.context.metrics.clone();
        let Some(contract) = self.contracts.get_mut(&key) else {
            return;
        };
        if !contract.can_open_batch() {
            return;
        }
        let Some(batch) = contract.form_batch(&configs) else {
            return;
        };

        debug!(
            "Opening batch {} of {key:?} with {} calls",
            batch.batch_index,
            batch.calls.len()
        );
        let buffered_successful = std::mem::take(&mut contract.pending_opinions_successful);
        let buffered_unsuccessful = std::mem::take(&mut contract.pending_opinions_unsuccessful);
        contract.active_batch = Some(BatchTask::new(
            batch,
            buffered_successful,
            buffered_unsuccessful,
        ));
        metrics.node_metrics.batches_opened.inc();

        self.start_initiate_modifications(key);
    }

    // region P1: open the storage modification round

    fn start_initiate_modifications(&mut self, key: ContractKey) {
        let storage = self.storage.clone();
        let sender = self.loop_sender.clone();
        let Some(contract) = self.contracts.get_mut(&key) else {
            return;
        };
        let drive_key = contract.drive_key;
        let Some(task) = contract.active_batch.as_mut() else {
            return;
        };
        let batch_index = task.batch_index;

        task.init_query = Some(spawn_query(
            &sender,
            true,
            async move { storage.initiate_modifications(drive_key, batch_index).await },
            move |state: &mut Executor, result| {
                state.on_modifications_initiated(key, batch_index, result)
            },
        ));
    }

    fn on_modifications_initiated(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        result: ExecutorResult<()>,
    ) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let task = contract.active_batch.as_mut().unwrap();
        task.init_query = None;

        match result {
            Ok(()) => self.execute_next_call(key, batch_index),
            Err(err) => {
                warn!("Could not initiate modifications for batch {batch_index} of {key:?}: {err}");
                task.batch_success = false;
                self.seal_batch(key, batch_index);
            }
        }
    }

    // endregion

    // region P2: per-call execution loop

    fn execute_next_call(&mut self, key: ContractKey, batch_index: u64) {
        let vm = self.vm.clone();
        let sender = self.loop_sender.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let drive_key = contract.drive_key;
        let task = contract.active_batch.as_mut().unwrap();

        if task.next_call >= task.calls.len() {
            self.seal_batch(key, batch_index);
            return;
        }
        let call = task.calls[task.next_call].clone();

        let services = self.call_services(drive_key, batch_index);
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let task = contract.active_batch.as_mut().unwrap();
        task.vm_query = Some(spawn_query(
            &sender,
            true,
            async move { vm.execute_call(key, call, services).await },
            move |state: &mut Executor, result| state.on_call_executed(key, batch_index, result),
        ));
    }

    fn on_call_executed(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        result: ExecutorResult<CallExecutionResult>,
    ) {
        let storage = self.storage.clone();
        let sender = self.loop_sender.clone();
        let metrics = self.context.metrics.clone();
        let network_identifier = self.context.parameters.network_identifier;
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let drive_key = contract.drive_key;
        let Contract {
            active_batch,
            proof_chain,
            ..
        } = contract;
        let task = active_batch.as_mut().unwrap();
        task.vm_query = None;

        match result {
            Ok(outcome) => {
                metrics.node_metrics.calls_executed.inc();
                proof_chain.add_to_proof(outcome.poex_secret);
                task.poex_added += 1;

                if let Some(transaction) = &outcome.released_transaction {
                    let call_id = task.calls[task.next_call].call_id;
                    let (hash, serialized) =
                        build_aggregated_transaction(network_identifier, &key, transaction);
                    task.released.push((call_id, hash, serialized));
                }

                let call_success = outcome.success;
                task.outcomes[task.next_call] = Some(outcome);
                task.sandbox_query = Some(spawn_query(
                    &sender,
                    true,
                    async move {
                        storage
                            .apply_sandbox_modifications(drive_key, batch_index, call_success)
                            .await
                    },
                    move |state: &mut Executor, result| {
                        state.on_sandbox_applied(key, batch_index, result)
                    },
                ));
            }
            Err(err) => {
                // A service-level failure poisons the batch; the remaining
                // calls keep their null outcomes so the call list stays
                // deterministic across peers.
                warn!("Call execution failed in batch {batch_index} of {key:?}: {err}");
                task.batch_success = false;
                self.seal_batch(key, batch_index);
            }
        }
    }

    fn on_sandbox_applied(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        result: ExecutorResult<SandboxDeltas>,
    ) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let task = contract.active_batch.as_mut().unwrap();
        task.sandbox_query = None;

        match result {
            Ok(deltas) => {
                task.deltas[task.next_call] = Some(deltas);
                task.next_call += 1;
                self.execute_next_call(key, batch_index);
            }
            Err(err) => {
                warn!(
                    "Could not apply sandbox modifications in batch {batch_index} of {key:?}: {err}"
                );
                task.batch_success = false;
                self.seal_batch(key, batch_index);
            }
        }
    }

    // endregion

    // region P3: seal the batch into an opinion

    fn seal_batch(&mut self, key: ContractKey, batch_index: u64) {
        let storage = self.storage.clone();
        let sender = self.loop_sender.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let drive_key = contract.drive_key;
        let task = contract.active_batch.as_mut().unwrap();

        let successful = task.batch_success
            && task
                .outcomes
                .iter()
                .flatten()
                .any(|outcome| outcome.success);
        if !successful {
            self.finish_seal(key, batch_index, None);
            return;
        }

        task.evaluate_query = Some(spawn_query(
            &sender,
            true,
            async move { storage.evaluate_storage_hash(drive_key, batch_index).await },
            move |state: &mut Executor, result| {
                state.on_storage_hash_evaluated(key, batch_index, result)
            },
        ));
    }

    fn on_storage_hash_evaluated(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        result: ExecutorResult<StorageState>,
    ) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let task = contract.active_batch.as_mut().unwrap();
        task.evaluate_query = None;

        match result {
            Ok(storage_state) => self.finish_seal(key, batch_index, Some(storage_state)),
            Err(err) => {
                warn!("Could not evaluate storage hash for batch {batch_index} of {key:?}: {err}");
                task.batch_success = false;
                self.finish_seal(key, batch_index, None);
            }
        }
    }

    /// Builds and signs this executor's opinion, then moves to the exchange
    /// phase.
    fn finish_seal(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        storage_state: Option<StorageState>,
    ) {
        let keypair = self.keypair.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };

        contract.automatic_checked_up_to = contract
            .automatic_checked_up_to
            .max(contract.last_known_block_height);

        let Contract {
            active_batch,
            proof_chain,
            ..
        } = contract;
        let task = active_batch.as_mut().unwrap();

        let proof = proof_chain.build_proof();
        let successful_batch_info = storage_state.map(|state| SuccessfulBatchInfo {
            storage_hash: state.storage_hash,
            used_storage_size: state.used_storage_size,
            meta_files_size: state.meta_files_size,
            file_structure_size: state.file_structure_size,
            poex_verification: proof_chain.batch_commitment(),
        });

        let calls_execution_info = task
            .calls
            .iter()
            .enumerate()
            .map(|(index, call)| CallExecutionOpinion {
                call_id: call.call_id,
                successful_call_info: successful_batch_info.is_some().then(|| {
                    let outcome = task.outcomes[index]
                        .as_ref()
                        .expect("a successful batch executed every call");
                    let deltas = task.deltas[index].unwrap_or_default();
                    SuccessfulCallInfo {
                        call_execution_success: outcome.success,
                        call_sandbox_size_delta: deltas.sandbox_size_delta,
                        call_state_size_delta: deltas.state_size_delta,
                    }
                }),
                executor_participation: task.outcomes[index]
                    .as_ref()
                    .map(|outcome| CallExecutorParticipation {
                        sc_consumed: outcome.execution_gas_consumed,
                        sm_consumed: outcome.download_gas_consumed,
                    })
                    .unwrap_or_default(),
            })
            .collect();

        let mut opinion = EndBatchExecutionOpinion {
            contract_key: key,
            batch_index,
            successful_batch_info,
            calls_execution_info,
            proof,
            executor_key: ExecutorKey::default(),
            signature: Default::default(),
        };
        opinion.sign(&keypair);
        task.own_opinion = Some(opinion);

        self.broadcast_own_opinion(key, batch_index);
        self.schedule_rebroadcast(key, batch_index);
        // Bounds the whole exchange: expires into a single transaction when
        // no quorum forms or the emitted transaction never publishes.
        self.start_approval_expectation(key, batch_index);
        self.evaluate_quorum(key, batch_index);
    }

    // endregion

    // region P4/P5: opinion exchange and quorum

    fn broadcast_own_opinion(&mut self, key: ContractKey, batch_index: u64) {
        let metrics = self.context.metrics.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let Some(opinion) = contract
            .active_batch
            .as_ref()
            .unwrap()
            .own_opinion
            .as_ref()
        else {
            return;
        };
        let content = bcs::to_bytes(opinion).expect("opinion serialization should not fail");
        let peers: Vec<ExecutorKey> = contract.executors.iter().copied().collect();

        for peer in peers {
            MessengerAdapter::send(
                self,
                Self::messenger_project,
                OutputMessage {
                    receiver: peer,
                    tag: MessageTag::EndBatch.as_str().to_string(),
                    content: content.clone(),
                },
            );
            metrics.node_metrics.opinions_sent.inc();
        }
    }

    fn schedule_rebroadcast(&mut self, key: ContractKey, batch_index: u64) {
        let timeout = self.context.parameters.share_opinion_timeout;
        let sender = self.loop_sender.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let task = contract.active_batch.as_mut().unwrap();
        task.rebroadcast_timer = Some(sender.schedule(timeout, move |state: &mut Executor| {
            state.on_share_opinion_timeout(key, batch_index)
        }));
    }

    fn on_share_opinion_timeout(&mut self, key: ContractKey, batch_index: u64) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        if contract.active_batch.as_ref().unwrap().emitted {
            return;
        }
        debug!("Rebroadcasting opinion for batch {batch_index} of {key:?}");
        self.broadcast_own_opinion(key, batch_index);
        self.schedule_rebroadcast(key, batch_index);
    }

    /// A supermajority of structurally identical opinions (including our
    /// own) commits the batch one way or the other.
    pub(crate) fn evaluate_quorum(&mut self, key: ContractKey, batch_index: u64) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let task = contract.active_batch.as_ref().unwrap();
        if task.emitted {
            return;
        }
        let Some(own) = task.own_opinion.as_ref() else {
            return;
        };

        let cohort_size = contract.executors.len() + 1;
        let threshold = (2 * cohort_size).div_ceil(3);

        let peers = if own.is_successful() {
            &task.peer_opinions_successful
        } else {
            &task.peer_opinions_unsuccessful
        };
        let agreeing: Vec<ExecutorKey> = peers
            .iter()
            .filter(|(peer, opinion)| {
                contract.executors.contains(*peer) && opinion.structurally_equal(own)
            })
            .map(|(peer, _)| *peer)
            .collect();

        if 1 + agreeing.len() < threshold {
            return;
        }

        let successful = own.is_successful();
        if successful {
            self.emit_successful(key, batch_index, agreeing);
        } else {
            self.emit_unsuccessful(key, batch_index, agreeing);
        }
    }

    // endregion

    // region P6: transaction emission

    fn emit_successful(&mut self, key: ContractKey, batch_index: u64, agreeing: Vec<ExecutorKey>) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let automatic_executions_checked_up_to = contract.automatic_checked_up_to;
        {
            let task = contract.active_batch.as_mut().unwrap();
            task.emitted = true;
            task.rebroadcast_timer = None;
        }
        let task = contract.active_batch.as_ref().unwrap();
        let own = task.own_opinion.as_ref().unwrap();

        let mut participants: BTreeMap<ExecutorKey, &EndBatchExecutionOpinion> = BTreeMap::new();
        participants.insert(own.executor_key, own);
        for peer in &agreeing {
            participants.insert(*peer, &task.peer_opinions_successful[peer]);
        }

        let batch_info = own
            .successful_batch_info
            .expect("a successful quorum requires a successful own opinion");
        let info = SuccessfulEndBatchExecutionTransactionInfo {
            contract_key: key,
            batch_index,
            automatic_executions_checked_up_to,
            successful_batch_info: SuccessfulBatchSummary {
                storage_hash: batch_info.storage_hash,
                used_storage_size: batch_info.used_storage_size,
                meta_files_size: batch_info.meta_files_size,
                poex_verification: batch_info.poex_verification,
            },
            calls_execution_info: task
                .calls
                .iter()
                .enumerate()
                .map(|(index, call)| SuccessfulCallExecutionInfo {
                    call_id: call.call_id,
                    manual: call.call_level == CallLevel::Manual,
                    call_execution_status: own.calls_execution_info[index]
                        .successful_call_info
                        .map(|info| (!info.call_execution_success) as u16)
                        .unwrap_or_default(),
                    released_transaction: task
                        .released
                        .iter()
                        .find(|(id, _, _)| *id == call.call_id)
                        .map(|(_, hash, _)| *hash)
                        .unwrap_or_default(),
                    executors_participation: participants
                        .values()
                        .map(|opinion| opinion.calls_execution_info[index].executor_participation)
                        .collect(),
                })
                .collect(),
            proofs: participants.values().map(|opinion| opinion.proof).collect(),
            executor_keys: participants.keys().copied().collect(),
            signatures: participants
                .values()
                .map(|opinion| opinion.signature)
                .collect(),
        };
        let released = task.released.clone();

        self.announce(HostAnnouncement::SuccessfulEndBatchTransactionIsReady(info));
        for (_, transactions_hash, transactions) in released {
            self.announce(HostAnnouncement::ReleasedTransactionsAreReady {
                contract_key: key,
                transactions_hash,
                transactions,
            });
        }
        self.start_approval_expectation(key, batch_index);
    }

    fn emit_unsuccessful(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        agreeing: Vec<ExecutorKey>,
    ) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let automatic_executions_checked_up_to = contract.automatic_checked_up_to;
        {
            let task = contract.active_batch.as_mut().unwrap();
            task.emitted = true;
            task.rebroadcast_timer = None;
        }
        let task = contract.active_batch.as_ref().unwrap();
        let own = task.own_opinion.as_ref().unwrap();

        let mut participants: BTreeMap<ExecutorKey, &EndBatchExecutionOpinion> = BTreeMap::new();
        participants.insert(own.executor_key, own);
        for peer in &agreeing {
            participants.insert(*peer, &task.peer_opinions_unsuccessful[peer]);
        }

        let info = UnsuccessfulEndBatchExecutionTransactionInfo {
            contract_key: key,
            batch_index,
            automatic_executions_checked_up_to,
            calls_execution_info: task
                .calls
                .iter()
                .enumerate()
                .map(|(index, call)| UnsuccessfulCallExecutionInfo {
                    call_id: call.call_id,
                    manual: call.call_level == CallLevel::Manual,
                    executors_participation: participants
                        .values()
                        .map(|opinion| opinion.calls_execution_info[index].executor_participation)
                        .collect(),
                })
                .collect(),
            proofs: participants.values().map(|opinion| opinion.proof).collect(),
            executor_keys: participants.keys().copied().collect(),
            signatures: participants
                .values()
                .map(|opinion| opinion.signature)
                .collect(),
        };

        self.announce(HostAnnouncement::UnsuccessfulEndBatchTransactionIsReady(
            info,
        ));
        self.start_approval_expectation(key, batch_index);
    }

    fn start_approval_expectation(&mut self, key: ContractKey, batch_index: u64) {
        let sender = self.loop_sender.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        let expectation = contract.unsuccessful_approval_expectation;
        let task = contract.active_batch.as_mut().unwrap();
        task.approval_timer = Some(sender.schedule(expectation, move |state: &mut Executor| {
            state.on_approval_expectation_expired(key, batch_index)
        }));
    }

    /// The emitted transaction was not observed on-chain in time: persist the
    /// local proof through a single transaction so peers can still follow
    /// this executor's chain, and retry the batch.
    fn on_approval_expectation_expired(&mut self, key: ContractKey, batch_index: u64) {
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };
        warn!("Batch {batch_index} of {key:?} was not observed as published in time");
        let proof = contract
            .active_batch
            .as_ref()
            .unwrap()
            .own_opinion
            .as_ref()
            .map(|opinion| opinion.proof)
            .unwrap_or_default();

        self.announce(HostAnnouncement::EndBatchExecutionSingleTransactionIsReady(
            EndBatchExecutionSingleTransactionInfo {
                contract_key: key,
                batch_index,
                proof_of_execution: proof,
            },
        ));
        self.abandon_batch(key, batch_index);
    }

    // endregion

    // region P7: post-publication reconciliation

    pub(crate) fn handle_end_batch_published(
        &mut self,
        info: PublishedEndBatchExecutionTransactionInfo,
    ) {
        let params = self.context.parameters.clone();
        let metrics = self.context.metrics.clone();
        let own_key = self.context.own_key;
        let storage_apply = self.storage.clone();
        let sender = self.loop_sender.clone();
        let key = info.contract_key;

        let Some(contract) = self.contracts.get_mut(&key) else {
            debug!("Publication for unknown contract {key:?}");
            return;
        };
        if info.batch_index < contract.batches_executed {
            debug!(
                "Stale publication for batch {} of {key:?}",
                info.batch_index
            );
            return;
        }

        let had_matching_task = contract
            .active_batch
            .as_ref()
            .is_some_and(|task| task.batch_index == info.batch_index);
        if had_matching_task {
            // Dropping the task cancels its outstanding queries and timers.
            let task = contract.active_batch.take().unwrap();
            if info.batch_success {
                let commitment = contract.proof_chain.batch_commitment();
                contract.record_batch_commitment(
                    info.batch_index,
                    commitment,
                    params.max_batches_history_size,
                );
                contract.proof_chain.reset();
                // Cosigners' proofs become the anchors for verifying their
                // next batch proofs.
                for (peer, opinion) in &task.peer_opinions_successful {
                    if info.cosigners.contains(peer) {
                        contract.peer_proofs.insert(
                            *peer,
                            crate::contract::PeerChainInfo {
                                last_batch: info.batch_index,
                                proof: opinion.proof,
                            },
                        );
                    }
                }
                for (call, outcome) in task.calls.iter().zip(&task.outcomes) {
                    if call.call_level != CallLevel::Manual {
                        if let Some(outcome) = outcome {
                            contract.automatic.sc_spent += outcome.execution_gas_consumed;
                        }
                    }
                }
                metrics.node_metrics.batches_succeeded.inc();
            } else {
                for _ in 0..task.poex_added {
                    contract.proof_chain.pop_from_proof();
                }
                metrics.node_metrics.batches_failed.inc();
            }

            let drive_key = contract.drive_key;
            let batch_index = info.batch_index;
            let success = info.batch_success;
            sender.runtime().spawn(async move {
                if let Err(err) = storage_apply
                    .apply_storage_modifications(drive_key, batch_index, success)
                    .await
                {
                    warn!("Could not apply storage modifications of batch {batch_index}: {err}");
                }
            });
        } else {
            // The cohort moved past whatever this executor was still working
            // on; the stale task is dropped and its contributions retracted.
            if let Some(task) = contract.active_batch.take() {
                for _ in 0..task.poex_added {
                    contract.proof_chain.pop_from_proof();
                }
            }
            // This executor did not run the batch; trust the published
            // commitment for verifying future peer proofs.
            contract.record_batch_commitment(
                info.batch_index,
                info.poex_verification,
                params.max_batches_history_size,
            );
        }

        contract.pending_opinions_successful.clear();
        contract.pending_opinions_unsuccessful.clear();
        contract.batch_index = info.batch_index + 1;
        contract.batches_executed = info.batch_index + 1;
        contract.automatic_checked_up_to = contract
            .automatic_checked_up_to
            .max(info.automatic_executions_checked_up_to);

        // Not co-signing a committed batch means our drive diverged; catch up
        // before executing anything else.
        let needs_synchronization = info.batch_success && !info.cosigners.contains(&own_key);
        if needs_synchronization {
            contract
                .synchronization_queue
                .push_back((info.batch_index, info.drive_state));
        }

        let delay = if info.batch_success {
            params.successful_execution_delay
        } else {
            params.unsuccessful_execution_delay
        };
        contract.delay_pending = true;
        contract.next_batch_timer = Some(sender.schedule(delay, move |state: &mut Executor| {
            if let Some(contract) = state.contracts.get_mut(&key) {
                contract.delay_pending = false;
                contract.next_batch_timer = None;
            }
            state.try_start_batch(key);
        }));

        if needs_synchronization {
            self.start_storage_synchronization(key, info.batch_index, info.drive_state);
        }
    }

    /// Brings the drive to a published state this executor missed, retrying
    /// while the storage service is unavailable. Completion is announced as a
    /// synchronization single transaction.
    fn start_storage_synchronization(
        &mut self,
        key: ContractKey,
        batch_index: u64,
        drive_state: executor_types::StorageHash,
    ) {
        let storage = self.storage.clone();
        let sender = self.loop_sender.clone();
        let retry_delay = self.context.parameters.service_unavailable_timeout;
        let Some(contract) = self.contracts.get_mut(&key) else {
            return;
        };
        let drive_key = contract.drive_key;
        contract.sync_retry_timer = None;

        contract.sync_query = Some(spawn_query(
            &sender,
            true,
            async move { storage.synchronize_storage(drive_key, drive_state).await },
            move |state: &mut Executor, result| {
                let sender = state.loop_sender.clone();
                let Some(contract) = state.contracts.get_mut(&key) else {
                    return;
                };
                contract.sync_query = None;
                match result {
                    Ok(()) => state.announce(
                        HostAnnouncement::SynchronizationSingleTransactionIsReady(
                            SynchronizationSingleTransactionInfo {
                                contract_key: key,
                                batch_index,
                            },
                        ),
                    ),
                    Err(err) => {
                        warn!("Storage synchronization failed for {key:?}, will retry: {err}");
                        contract.sync_retry_timer =
                            Some(sender.schedule(retry_delay, move |state: &mut Executor| {
                                state.start_storage_synchronization(key, batch_index, drive_state)
                            }));
                    }
                }
            },
        ));
    }

    pub(crate) fn handle_end_batch_failed(&mut self, info: FailedEndBatchExecutionTransactionInfo) {
        debug!(
            "End-batch transaction failed for batch {} of {:?}",
            info.batch_index, info.contract_key
        );
        self.abandon_batch(info.contract_key, info.batch_index);
    }

    /// Destroys the batch without an on-chain commit: proof contributions are
    /// retracted and the consumed manual calls requeued so the batch can be
    /// retried after the unsuccessful-execution delay.
    fn abandon_batch(&mut self, key: ContractKey, batch_index: u64) {
        let metrics = self.context.metrics.clone();
        let delay = self.context.parameters.unsuccessful_execution_delay;
        let sender = self.loop_sender.clone();
        let Some(contract) = self.contract_with_batch(&key, batch_index) else {
            return;
        };

        let mut task = contract.active_batch.take().unwrap();
        for _ in 0..task.poex_added {
            contract.proof_chain.pop_from_proof();
        }
        for request in task.manual_requests.drain(..).rev() {
            contract.pending_calls.push_front(request);
        }
        contract.pending_opinions_successful.clear();
        contract.pending_opinions_unsuccessful.clear();
        metrics.node_metrics.batches_failed.inc();

        contract.delay_pending = true;
        contract.next_batch_timer = Some(sender.schedule(delay, move |state: &mut Executor| {
            if let Some(contract) = state.contracts.get_mut(&key) {
                contract.delay_pending = false;
                contract.next_batch_timer = None;
            }
            state.try_start_batch(key);
        }));
    }

    pub(crate) fn handle_storage_synchronized(&mut self, key: ContractKey, batch_index: u64) {
        let Some(contract) = self.contracts.get_mut(&key) else {
            debug!("Storage synchronization for unknown contract {key:?}");
            return;
        };
        while contract
            .synchronization_queue
            .front()
            .is_some_and(|(index, _)| *index <= batch_index)
        {
            contract.synchronization_queue.pop_front();
        }
        self.try_start_batch(key);
    }

    // endregion
}
