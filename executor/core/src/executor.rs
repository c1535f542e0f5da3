// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeMap, sync::Arc};

use executor_config::{ExecutorKeyPair, HeightConfigTable, Parameters};
use executor_types::{
    AddContractRequest, ContractKey, CurvePoint, DriveKey, EndBatchExecutionOpinion, ExecutorKey,
    InputMessage, ManualCallRequest, MessageTag,
};
use prometheus::Registry;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::{
    blockchain::{Block, Blockchain, CachedBlockchain},
    context::Context,
    contract::Contract,
    error::ExecutorResult,
    event_loop::{self, EventLoopHandle, EventLoopSender},
    host::{HostAnnouncement, HostCommand, HostLink},
    messenger::{MessengerAdapter, MessengerTransport},
    metrics::initialise_metrics,
    service::HostAdapter,
    storage::Storage,
    vm::{CallServices, VirtualMachine},
};

/// Handles to the external services this node coordinates.
pub struct ExecutorServices {
    pub vm: Arc<dyn VirtualMachine>,
    pub storage: Arc<dyn Storage>,
    pub blockchain: Arc<dyn Blockchain>,
    pub messenger: Arc<dyn MessengerTransport>,
    pub host: Arc<dyn HostLink>,
}

/// The executor root: owns the contracts map and the service adapters, and
/// routes every inbound event to the right contract. Lives on the event-loop
/// thread; all methods taking `&mut self` run there.
pub struct Executor {
    pub(crate) context: Arc<Context>,
    pub(crate) keypair: ExecutorKeyPair,
    pub(crate) vm: Arc<dyn VirtualMachine>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) blockchain: CachedBlockchain<Executor>,
    pub(crate) messenger: MessengerAdapter<Executor>,
    pub(crate) host: HostAdapter<Executor>,
    pub(crate) contracts: BTreeMap<ContractKey, Contract>,
    pub(crate) loop_sender: EventLoopSender<Executor>,
    shutdown: watch::Sender<bool>,
}

impl Executor {
    fn new(
        keypair: ExecutorKeyPair,
        context: Arc<Context>,
        services: ExecutorServices,
        loop_sender: EventLoopSender<Executor>,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        let blockchain = CachedBlockchain::new(
            services.blockchain,
            context.parameters.max_block_cache_size,
            context.metrics.clone(),
        );
        let messenger = MessengerAdapter::new(
            services.messenger,
            loop_sender.clone(),
            Self::on_message_received,
            context.parameters.session_restart_delay,
            context.metrics.clone(),
        );
        let host = HostAdapter::new(
            services.host,
            loop_sender.clone(),
            |state, command| state.dispatch(command),
            Self::on_host_failed,
        );
        Self {
            context,
            keypair,
            vm: services.vm,
            storage: services.storage,
            blockchain,
            messenger,
            host,
            contracts: BTreeMap::new(),
            loop_sender,
            shutdown,
        }
    }

    /// Subscribes messenger tags and opens the service sessions.
    fn bootstrap(state: &mut Executor) {
        for tag in MessageTag::all() {
            MessengerAdapter::subscribe(state, Self::messenger_project, tag.as_str().to_string());
        }
        MessengerAdapter::start(state, Self::messenger_project);
        HostAdapter::start(state, Self::host_project);
    }

    pub(crate) fn messenger_project(state: &mut Executor) -> &mut MessengerAdapter<Executor> {
        &mut state.messenger
    }

    fn host_project(state: &mut Executor) -> &mut HostAdapter<Executor> {
        &mut state.host
    }

    /// Routes one hosting-node command.
    pub fn dispatch(&mut self, command: HostCommand) {
        self.loop_sender.on_event_loop();
        match command {
            HostCommand::AddContract {
                contract_key,
                request,
            } => self.add_contract(contract_key, request),
            HostCommand::RemoveContract { contract_key } => self.remove_contract(contract_key),
            HostCommand::AddManualCall {
                contract_key,
                request,
            } => self.add_manual_call(contract_key, request),
            HostCommand::AddBlockInfo {
                contract_key,
                height,
                block,
            } => self.add_block_info(contract_key, height, block),
            HostCommand::AddBlock {
                contract_key,
                height,
            } => self.add_block(contract_key, height),
            HostCommand::SetExecutors {
                contract_key,
                executors,
            } => self.set_executors(contract_key, executors),
            HostCommand::SetAutomaticExecutionsEnabledSince {
                contract_key,
                height,
            } => self.set_automatic_executions_enabled_since(contract_key, height),
            HostCommand::EndBatchExecutionPublished(info) => self.handle_end_batch_published(info),
            HostCommand::EndBatchExecutionSingleTransactionPublished(info) => {
                debug!(
                    "End-batch single transaction published for {:?} batch {}",
                    info.contract_key, info.batch_index
                );
            }
            HostCommand::EndBatchExecutionFailed(info) => self.handle_end_batch_failed(info),
            HostCommand::StorageSynchronizedPublished {
                contract_key,
                batch_index,
            } => self.handle_storage_synchronized(contract_key, batch_index),
        }
    }

    // region contract lifecycle

    fn add_contract(&mut self, key: ContractKey, request: AddContractRequest) {
        if self.contracts.contains_key(&key) {
            return;
        }

        if !request.executors.contains(&self.context.own_key) {
            error!("This executor is not in the executor list of contract {key:?}");
            return;
        }

        info!(
            "Adding contract {key:?} with a cohort of {}",
            request.executors.len()
        );
        let contract = Contract::new(key, request, &self.context.own_key);
        self.contracts.insert(key, contract);
        self.context.metrics.node_metrics.contracts.inc();
        self.try_start_batch(key);
    }

    fn remove_contract(&mut self, key: ContractKey) {
        // Dropping the contract terminates its batch task, which cancels the
        // outstanding VM query and drops all timers.
        if self.contracts.remove(&key).is_some() {
            info!("Removed contract {key:?}");
            self.context.metrics.node_metrics.contracts.dec();
        } else {
            error!("Removing non-existing contract {key:?}");
        }
    }

    fn add_manual_call(&mut self, key: ContractKey, request: ManualCallRequest) {
        let Some(contract) = self.contracts.get_mut(&key) else {
            error!("Added call to non-existing contract {key:?}");
            return;
        };
        contract.pending_calls.push_back(request);
        self.try_start_batch(key);
    }

    fn add_block_info(&mut self, key: ContractKey, height: u64, block: Block) {
        self.blockchain.add_block(height, block);
        self.add_block(key, height);
    }

    fn add_block(&mut self, key: ContractKey, height: u64) {
        let Some(contract) = self.contracts.get_mut(&key) else {
            error!("Added block to non-existing contract {key:?}");
            return;
        };
        contract.last_known_block_height = contract.last_known_block_height.max(height);
        // A new height may enable automatic executions.
        self.try_start_batch(key);
    }

    fn set_executors(
        &mut self,
        key: ContractKey,
        mut executors: std::collections::BTreeSet<ExecutorKey>,
    ) {
        if !executors.remove(&self.context.own_key) {
            error!("This executor is not in the updated executor list of contract {key:?}");
            return;
        }
        let Some(contract) = self.contracts.get_mut(&key) else {
            error!("Set executors of non-existing contract {key:?}");
            return;
        };
        contract.executors = executors;
        // Opinions from removed peers stop counting at the next evaluation;
        // a shrunken cohort may already satisfy the quorum.
        if let Some(task) = &contract.active_batch {
            let batch_index = task.batch_index;
            self.evaluate_quorum(key, batch_index);
        }
    }

    fn set_automatic_executions_enabled_since(&mut self, key: ContractKey, height: Option<u64>) {
        let Some(contract) = self.contracts.get_mut(&key) else {
            error!("Set automatic executions of non-existing contract {key:?}");
            return;
        };
        contract.automatic.enabled_since = height;
        self.try_start_batch(key);
    }

    // endregion

    // region messenger subscriber

    fn on_message_received(state: &mut Executor, message: InputMessage) {
        match MessageTag::parse(&message.tag) {
            Some(MessageTag::EndBatch) => {
                match bcs::from_bytes::<EndBatchExecutionOpinion>(&message.content) {
                    Ok(opinion) => state.on_opinion_received(opinion),
                    Err(err) => {
                        warn!("Received invalid end-batch opinion: {err}");
                        state
                            .context
                            .metrics
                            .node_metrics
                            .opinions_rejected
                            .inc();
                    }
                }
            }
            None => warn!("Received message with unknown tag: {}", message.tag),
        }
    }

    fn on_opinion_received(&mut self, opinion: EndBatchExecutionOpinion) {
        let metrics = self.context.metrics.clone();
        metrics.node_metrics.opinions_received.inc();

        if !opinion.has_valid_form() || !opinion.verify() {
            warn!(
                "Dropping malformed or badly signed opinion from {:?}",
                opinion.executor_key
            );
            metrics.node_metrics.opinions_rejected.inc();
            return;
        }

        let Some(contract) = self.contracts.get_mut(&opinion.contract_key) else {
            debug!("Opinion for unknown contract {:?}", opinion.contract_key);
            return;
        };
        if !contract.executors.contains(&opinion.executor_key) {
            warn!(
                "Dropping opinion from {:?} which is not in the cohort of {:?}",
                opinion.executor_key, opinion.contract_key
            );
            metrics.node_metrics.opinions_rejected.inc();
            return;
        }
        if !contract.verify_peer_proof(&opinion) {
            warn!(
                "Dropping opinion from {:?} with an invalid proof of execution",
                opinion.executor_key
            );
            metrics.node_metrics.opinions_rejected.inc();
            return;
        }

        let contract_key = opinion.contract_key;
        let next_index = contract.batch_index;
        if let Some(task) = contract.active_batch.as_mut() {
            if task.batch_index == opinion.batch_index {
                task.insert_peer_opinion(opinion);
                self.evaluate_quorum(contract_key, next_index);
            } else {
                debug!(
                    "Dropping opinion for batch {} of {contract_key:?}, executing batch {}",
                    opinion.batch_index, next_index
                );
            }
        } else if opinion.batch_index == next_index {
            // Peers can finish the next batch before this executor even
            // starts it; buffer their opinions for the coming task.
            if opinion.is_successful() {
                contract
                    .pending_opinions_successful
                    .insert(opinion.executor_key, opinion);
            } else {
                contract
                    .pending_opinions_unsuccessful
                    .insert(opinion.executor_key, opinion);
            }
        } else {
            debug!(
                "Dropping opinion for batch {} of {contract_key:?}, next batch is {}",
                opinion.batch_index, next_index
            );
        }
    }

    // endregion

    pub(crate) fn announce(&mut self, announcement: HostAnnouncement) {
        HostAdapter::send(self, Self::host_project, announcement);
    }

    /// Call-scoped service handles handed to the VM for the duration of one
    /// call: blockchain reads resolve through this node's block cache.
    pub(crate) fn call_services(&self, drive_key: DriveKey, batch_index: u64) -> CallServices {
        let sender = self.loop_sender.clone();
        let blockchain = Arc::new(move |height| {
            let (reply_tx, reply_rx) = oneshot::channel::<ExecutorResult<Block>>();
            sender.post(move |state: &mut Executor| {
                let loop_sender = state.loop_sender.clone();
                CachedBlockchain::block(
                    state,
                    &loop_sender,
                    |state| &mut state.blockchain,
                    height,
                    Box::new(move |_state, result| {
                        let _ = reply_tx.send(result);
                    }),
                );
            });
            reply_rx
        });
        CallServices::new(blockchain, self.storage.clone(), drive_key, batch_index)
    }

    fn on_host_failed(state: &mut Executor) {
        // The host owns this executor's lifecycle: without the stream there
        // is nobody to deliver transactions to.
        state.contracts.clear();
        state.shutdown.send(true).ok();
    }

    // region introspection

    pub fn has_contract(&self, key: &ContractKey) -> bool {
        self.contracts.contains_key(key)
    }

    pub fn contract_batch_index(&self, key: &ContractKey) -> Option<u64> {
        self.contracts.get(key).map(|contract| contract.batch_index)
    }

    pub fn has_active_batch(&self, key: &ContractKey) -> bool {
        self.contracts
            .get(key)
            .is_some_and(|contract| contract.active_batch.is_some())
    }

    pub fn recent_batch_commitment(&self, key: &ContractKey, batch_index: u64) -> Option<CurvePoint> {
        self.contracts
            .get(key)?
            .recent_batch_commitments
            .get(&batch_index)
            .copied()
    }

    // endregion
}

/// A running executor node: the event loop plus its external sessions.
pub struct ExecutorNode {
    sender: EventLoopSender<Executor>,
    handle: EventLoopHandle<Executor>,
    shutdown: watch::Receiver<bool>,
}

impl ExecutorNode {
    /// Starts the node. Must be called within a tokio runtime, which backs
    /// the timers and RPC futures; core state lives on its own thread.
    pub fn start(
        keypair: ExecutorKeyPair,
        parameters: Parameters,
        height_configs: HeightConfigTable,
        registry: &Registry,
        services: ExecutorServices,
    ) -> Self {
        let metrics = initialise_metrics(registry);
        let own_key = ExecutorKey::from(&keypair.public());
        info!("Starting executor {own_key:?}");
        let context = Arc::new(Context::new(own_key, parameters, height_configs, metrics));

        let (shutdown_sender, shutdown) = watch::channel(false);
        let (sender, handle) = event_loop::start("executor-core", move |loop_sender| {
            let mut executor =
                Executor::new(keypair, context, services, loop_sender, shutdown_sender);
            Executor::bootstrap(&mut executor);
            executor
        });

        Self {
            sender,
            handle,
            shutdown,
        }
    }

    /// Runs a closure on the event loop with exclusive access to the
    /// executor; the entry point used by tests and by embedding code.
    pub fn execute(&self, task: impl FnOnce(&mut Executor) + Send + 'static) {
        self.sender.post(task);
    }

    /// Resolves once the executor shut itself down (host stream failure).
    pub async fn wait_for_shutdown(&mut self) {
        while !*self.shutdown.borrow_and_update() {
            if self.shutdown.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn stop(self) {
        self.handle.stop();
    }
}
