// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end batch execution scenarios driven through a full executor node
//! with scripted service fakes.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use executor_config::{local_executor_keys, ExecutorKeyPair, HeightConfigTable, Parameters};
use executor_core::{
    Block, Blockchain, CallServices, Executor, ExecutorNode, ExecutorServices, ExecutorError,
    ExecutorResult, HostAnnouncement, HostCommand, HostLink, HostSession, MessengerSession,
    MessengerTransport, SandboxDeltas, Storage, StorageState, VirtualMachine,
};
use executor_types::{
    AddContractRequest, BlockHash, CallExecutionResult, CallId, CallerKey, ContractKey, DriveKey,
    EndBatchExecutionOpinion, ExecutorKey, InputMessage, ManualCallRequest, ModificationId,
    OutputMessage, PublishedEndBatchExecutionTransactionInfo, StorageHash, VmCallRequest,
};
use parking_lot::Mutex;
use prometheus::Registry;
use tokio::sync::oneshot;

const CONTRACT: ContractKey = ContractKey::new([7; 32]);
const DRIVE: DriveKey = DriveKey::new([8; 32]);
const DRIVE_STATE: StorageHash = StorageHash::new([9; 32]);

// region service fakes

struct ScriptedVm {
    results: Mutex<VecDeque<CallExecutionResult>>,
}

impl ScriptedVm {
    fn new(results: Vec<CallExecutionResult>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl VirtualMachine for ScriptedVm {
    async fn execute_call(
        &self,
        _contract_key: ContractKey,
        _request: VmCallRequest,
        _services: CallServices,
    ) -> ExecutorResult<CallExecutionResult> {
        match self.results.lock().pop_front() {
            Some(result) => Ok(result),
            None => Err(ExecutorError::ServiceUnavailable {
                service: "vm",
                reason: "no scripted result".to_string(),
            }),
        }
    }
}

/// A VM whose call never completes; used to observe cancellation.
struct HangingVm {
    started: Arc<tokio::sync::Notify>,
    cancelled: Arc<AtomicBool>,
}

struct CancellationGuard(Arc<AtomicBool>);

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VirtualMachine for HangingVm {
    async fn execute_call(
        &self,
        _contract_key: ContractKey,
        _request: VmCallRequest,
        _services: CallServices,
    ) -> ExecutorResult<CallExecutionResult> {
        let _guard = CancellationGuard(self.cancelled.clone());
        self.started.notify_one();
        futures::future::pending().await
    }
}

struct OkStorage;

#[async_trait]
impl Storage for OkStorage {
    async fn synchronize_storage(
        &self,
        _drive_key: DriveKey,
        _storage_hash: StorageHash,
    ) -> ExecutorResult<()> {
        Ok(())
    }

    async fn initiate_modifications(
        &self,
        _drive_key: DriveKey,
        _batch_index: u64,
    ) -> ExecutorResult<()> {
        Ok(())
    }

    async fn sandbox_operation(
        &self,
        _drive_key: DriveKey,
        _batch_index: u64,
        _operation: Vec<u8>,
    ) -> ExecutorResult<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn apply_sandbox_modifications(
        &self,
        _drive_key: DriveKey,
        _batch_index: u64,
        _success: bool,
    ) -> ExecutorResult<SandboxDeltas> {
        Ok(SandboxDeltas::default())
    }

    async fn evaluate_storage_hash(
        &self,
        _drive_key: DriveKey,
        _batch_index: u64,
    ) -> ExecutorResult<StorageState> {
        Ok(StorageState {
            storage_hash: DRIVE_STATE,
            used_storage_size: 4096,
            meta_files_size: 256,
            file_structure_size: 64,
        })
    }

    async fn apply_storage_modifications(
        &self,
        _drive_key: DriveKey,
        _batch_index: u64,
        _success: bool,
    ) -> ExecutorResult<()> {
        Ok(())
    }
}

struct StaticBlockchain;

#[async_trait]
impl Blockchain for StaticBlockchain {
    async fn block(&self, height: u64) -> ExecutorResult<Block> {
        let mut hash = [0u8; 32];
        hash[..8].copy_from_slice(&height.to_le_bytes());
        Ok(Block {
            hash: BlockHash::new(hash),
            block_time: height,
        })
    }
}

/// Loopback messenger: outbound messages are recorded, inbound messages are
/// whatever the test pushes.
#[derive(Default)]
struct MessengerHub {
    inbound: Mutex<VecDeque<InputMessage>>,
    outbound: Mutex<Vec<OutputMessage>>,
}

impl MessengerHub {
    fn push_opinion(&self, opinion: &EndBatchExecutionOpinion) {
        self.inbound.lock().push_back(InputMessage {
            tag: "END_BATCH".to_string(),
            content: bcs::to_bytes(opinion).unwrap(),
        });
    }
}

struct HubTransport(Arc<MessengerHub>);

#[async_trait]
impl MessengerTransport for HubTransport {
    async fn connect(&self) -> ExecutorResult<Box<dyn MessengerSession>> {
        Ok(Box::new(HubSession(self.0.clone())))
    }
}

struct HubSession(Arc<MessengerHub>);

#[async_trait]
impl MessengerSession for HubSession {
    async fn subscribe(&self, _tag: String) -> ExecutorResult<()> {
        Ok(())
    }

    async fn write(&self, message: OutputMessage) -> ExecutorResult<()> {
        self.0.outbound.lock().push(message);
        Ok(())
    }

    async fn read(&self) -> ExecutorResult<InputMessage> {
        loop {
            if let Some(message) = self.0.inbound.lock().pop_front() {
                return Ok(message);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[derive(Default)]
struct RecordingHost {
    announcements: Mutex<Vec<HostAnnouncement>>,
}

struct RecordingHostLink(Arc<RecordingHost>);

#[async_trait]
impl HostLink for RecordingHostLink {
    async fn connect(&self) -> ExecutorResult<Box<dyn HostSession>> {
        Ok(Box::new(RecordingHostSession(self.0.clone())))
    }
}

struct RecordingHostSession(Arc<RecordingHost>);

#[async_trait]
impl HostSession for RecordingHostSession {
    async fn recv(&self) -> ExecutorResult<HostCommand> {
        futures::future::pending().await
    }

    async fn send(&self, announcement: HostAnnouncement) -> ExecutorResult<()> {
        self.0.announcements.lock().push(announcement);
        Ok(())
    }
}

// endregion

// region harness

struct TestNode {
    node: ExecutorNode,
    hub: Arc<MessengerHub>,
    host: Arc<RecordingHost>,
    keys: Vec<ExecutorKeyPair>,
}

impl TestNode {
    fn start(cohort_size: usize, vm: Arc<dyn VirtualMachine>) -> Self {
        let keys = local_executor_keys(cohort_size);
        let hub = Arc::new(MessengerHub::default());
        let host = Arc::new(RecordingHost::default());

        let services = ExecutorServices {
            vm,
            storage: Arc::new(OkStorage),
            blockchain: Arc::new(StaticBlockchain),
            messenger: Arc::new(HubTransport(hub.clone())),
            host: Arc::new(RecordingHostLink(host.clone())),
        };
        let parameters = Parameters {
            successful_execution_delay: Duration::from_millis(50),
            unsuccessful_execution_delay: Duration::from_millis(50),
            share_opinion_timeout: Duration::from_secs(60),
            session_restart_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let node = ExecutorNode::start(
            keys[0].clone(),
            parameters,
            HeightConfigTable::default(),
            &Registry::new(),
            services,
        );

        Self {
            node,
            hub,
            host,
            keys,
        }
    }

    fn cohort_keys(&self) -> BTreeSet<ExecutorKey> {
        self.keys
            .iter()
            .map(|keypair| ExecutorKey::from(&keypair.public()))
            .collect()
    }

    fn own_key(&self) -> ExecutorKey {
        ExecutorKey::from(&self.keys[0].public())
    }

    fn add_contract(&self) {
        let request = AddContractRequest {
            drive_key: DRIVE,
            executors: self.cohort_keys(),
            recent_batches_information: BTreeMap::new(),
            contract_deployment_base_modification_id: ModificationId::default(),
            automatic_executions_file_name: String::new(),
            automatic_executions_function_name: String::new(),
            automatic_executions_sc_limit: 0,
            automatic_executions_sm_limit: 0,
            batches_executed: 0,
            unsuccessful_approval_expectation_ms: 60_000,
        };
        self.dispatch(HostCommand::AddContract {
            contract_key: CONTRACT,
            request,
        });
    }

    fn add_manual_call(&self, id: u8) {
        self.dispatch(HostCommand::AddManualCall {
            contract_key: CONTRACT,
            request: ManualCallRequest {
                call_id: CallId::new([id; 32]),
                file: "token.wasm".to_string(),
                function: "run".to_string(),
                arguments: vec![id],
                execution_payment: 1,
                download_payment: 0,
                caller_key: CallerKey::new([4; 32]),
                block_height: 0,
                service_payments: vec![],
            },
        });
    }

    fn dispatch(&self, command: HostCommand) {
        self.node.execute(move |executor| executor.dispatch(command));
    }

    async fn query<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&mut Executor) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.node.execute(move |executor| {
            tx.send(f(executor)).ok();
        });
        rx.await.unwrap()
    }

    fn announcements(&self) -> Vec<HostAnnouncement> {
        self.host.announcements.lock().clone()
    }

    async fn wait_for_announcement<R>(
        &self,
        matcher: impl Fn(&HostAnnouncement) -> Option<R>,
    ) -> R {
        for _ in 0..400 {
            if let Some(result) = self.announcements().iter().find_map(&matcher) {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected announcement never arrived");
    }

    /// Waits for the opinion this node broadcast to its peers for the given
    /// batch.
    async fn wait_for_broadcast(&self, batch_index: u64) -> EndBatchExecutionOpinion {
        for _ in 0..400 {
            let found = self.hub.outbound.lock().iter().find_map(|message| {
                let opinion: EndBatchExecutionOpinion = bcs::from_bytes(&message.content).ok()?;
                (opinion.batch_index == batch_index).then_some(opinion)
            });
            if let Some(opinion) = found {
                return opinion;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("own opinion was never broadcast");
    }
}

fn successful_result() -> CallExecutionResult {
    CallExecutionResult {
        success: true,
        return_value: 2,
        execution_gas_consumed: 604,
        download_gas_consumed: 0,
        poex_secret: 0,
        released_transaction: None,
    }
}

fn published(
    batch_index: u64,
    summary: &executor_types::SuccessfulBatchSummary,
    cosigners: BTreeSet<ExecutorKey>,
) -> PublishedEndBatchExecutionTransactionInfo {
    PublishedEndBatchExecutionTransactionInfo {
        contract_key: CONTRACT,
        batch_index,
        batch_success: true,
        drive_state: summary.storage_hash,
        poex_verification: summary.poex_verification,
        automatic_executions_checked_up_to: 0,
        cosigners,
    }
}

// endregion

#[tokio::test]
async fn single_executor_commits_a_successful_batch() {
    let test = TestNode::start(1, ScriptedVm::new(vec![successful_result()]));
    test.add_contract();
    test.add_manual_call(1);

    let info = test
        .wait_for_announcement(|announcement| match announcement {
            HostAnnouncement::SuccessfulEndBatchTransactionIsReady(info) => Some(info.clone()),
            _ => None,
        })
        .await;

    assert_eq!(info.contract_key, CONTRACT);
    assert_eq!(info.batch_index, 0);
    assert_eq!(info.calls_execution_info.len(), 1);
    assert_eq!(info.calls_execution_info[0].call_id, CallId::new([1; 32]));
    assert!(info.calls_execution_info[0].manual);
    assert_eq!(info.calls_execution_info[0].executors_participation.len(), 1);
    assert_eq!(
        info.calls_execution_info[0].executors_participation[0].sc_consumed,
        604
    );
    assert_eq!(info.executor_keys, vec![test.own_key()]);
    assert_eq!(info.signatures.len(), 1);
    assert_eq!(info.proofs.len(), 1);
    assert_eq!(info.successful_batch_info.storage_hash, DRIVE_STATE);

    test.node.stop();
}

#[tokio::test]
async fn failing_calls_produce_an_unsuccessful_batch() {
    let result = CallExecutionResult {
        success: false,
        return_value: 0,
        execution_gas_consumed: 1_000_000_000,
        download_gas_consumed: 0,
        poex_secret: 0,
        released_transaction: None,
    };
    let test = TestNode::start(1, ScriptedVm::new(vec![result]));
    test.add_contract();
    test.add_manual_call(1);

    let info = test
        .wait_for_announcement(|announcement| match announcement {
            HostAnnouncement::UnsuccessfulEndBatchTransactionIsReady(info) => Some(info.clone()),
            _ => None,
        })
        .await;

    assert_eq!(info.batch_index, 0);
    assert_eq!(info.calls_execution_info.len(), 1);
    assert_eq!(info.calls_execution_info[0].call_id, CallId::new([1; 32]));
    assert_eq!(
        info.calls_execution_info[0].executors_participation[0].sc_consumed,
        1_000_000_000
    );

    test.node.stop();
}

#[tokio::test]
async fn publication_finalizes_the_batch_and_schedules_the_next() {
    let test = TestNode::start(
        1,
        ScriptedVm::new(vec![successful_result(), successful_result()]),
    );
    test.add_contract();
    test.add_manual_call(1);

    let first = test
        .wait_for_announcement(|announcement| match announcement {
            HostAnnouncement::SuccessfulEndBatchTransactionIsReady(info)
                if info.batch_index == 0 =>
            {
                Some(info.clone())
            }
            _ => None,
        })
        .await;

    // Queue more work, then observe the publication of batch 0.
    test.add_manual_call(2);
    test.dispatch(HostCommand::EndBatchExecutionPublished(published(
        0,
        &first.successful_batch_info,
        BTreeSet::from([test.own_key()]),
    )));

    // The commitment window now holds batch 0 and batch 1 runs after the
    // configured delay.
    let second = test
        .wait_for_announcement(|announcement| match announcement {
            HostAnnouncement::SuccessfulEndBatchTransactionIsReady(info)
                if info.batch_index == 1 =>
            {
                Some(info.clone())
            }
            _ => None,
        })
        .await;
    assert_eq!(second.calls_execution_info[0].call_id, CallId::new([2; 32]));

    let commitment = test
        .query(|executor| executor.recent_batch_commitment(&CONTRACT, 0))
        .await;
    assert_eq!(commitment, Some(first.successful_batch_info.poex_verification));

    test.node.stop();
}

#[tokio::test]
async fn quorum_requires_a_supermajority_of_identical_opinions() {
    for cohort_size in 2usize..=10 {
        let threshold = (2 * cohort_size).div_ceil(3);
        let test = TestNode::start(cohort_size, ScriptedVm::new(vec![successful_result()]));
        test.add_contract();
        test.add_manual_call(1);

        let own_opinion = test.wait_for_broadcast(0).await;

        // One less than the required peer count: no transaction may appear.
        for peer in 1..threshold - 1 {
            let mut peer_opinion = own_opinion.clone();
            peer_opinion.sign(&test.keys[peer]);
            test.hub.push_opinion(&peer_opinion);
        }
        // A structurally different opinion never counts.
        let mut diverging = own_opinion.clone();
        diverging
            .successful_batch_info
            .as_mut()
            .unwrap()
            .used_storage_size += 1;
        diverging.sign(&test.keys[cohort_size - 1]);
        test.hub.push_opinion(&diverging);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(
            !test
                .announcements()
                .iter()
                .any(|a| matches!(a, HostAnnouncement::SuccessfulEndBatchTransactionIsReady(_))),
            "cohort of {cohort_size} must not commit below the threshold of {threshold}"
        );

        // The final agreeing opinion tips the count to the threshold.
        let mut peer_opinion = own_opinion.clone();
        peer_opinion.sign(&test.keys[threshold - 1]);
        test.hub.push_opinion(&peer_opinion);

        let info = test
            .wait_for_announcement(|announcement| match announcement {
                HostAnnouncement::SuccessfulEndBatchTransactionIsReady(info) => Some(info.clone()),
                _ => None,
            })
            .await;
        assert_eq!(info.signatures.len(), threshold);
        assert_eq!(info.executor_keys.len(), threshold);
        // Signatures are ordered by executor key.
        let mut sorted = info.executor_keys.clone();
        sorted.sort();
        assert_eq!(info.executor_keys, sorted);

        test.node.stop();
    }
}

#[tokio::test]
async fn opinions_from_outside_the_cohort_are_ignored() {
    let test = TestNode::start(2, ScriptedVm::new(vec![successful_result()]));
    test.add_contract();
    test.add_manual_call(1);

    let own_opinion = test.wait_for_broadcast(0).await;

    // Signed by a key that is not part of the cohort.
    let strangers = local_executor_keys(10);
    let mut stray = own_opinion.clone();
    stray.sign(&strangers[9]);
    test.hub.push_opinion(&stray);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!test
        .announcements()
        .iter()
        .any(|a| matches!(a, HostAnnouncement::SuccessfulEndBatchTransactionIsReady(_))));

    // The actual cohort peer commits the batch.
    let mut peer_opinion = own_opinion.clone();
    peer_opinion.sign(&test.keys[1]);
    test.hub.push_opinion(&peer_opinion);

    test.wait_for_announcement(|announcement| match announcement {
        HostAnnouncement::SuccessfulEndBatchTransactionIsReady(_) => Some(()),
        _ => None,
    })
    .await;

    test.node.stop();
}

#[tokio::test]
async fn re_adding_a_contract_is_a_no_op() {
    let test = TestNode::start(1, ScriptedVm::new(vec![successful_result()]));
    test.add_contract();
    test.add_manual_call(1);

    test.wait_for_announcement(|announcement| match announcement {
        HostAnnouncement::SuccessfulEndBatchTransactionIsReady(_) => Some(()),
        _ => None,
    })
    .await;

    // Re-admission must not reset the contract's batch progress.
    test.add_contract();
    let (exists, batch_index, active) = test
        .query(|executor| {
            (
                executor.has_contract(&CONTRACT),
                executor.contract_batch_index(&CONTRACT),
                executor.has_active_batch(&CONTRACT),
            )
        })
        .await;
    assert!(exists);
    assert_eq!(batch_index, Some(0));
    assert!(active, "the in-flight batch survives re-admission");

    test.node.stop();
}

#[tokio::test]
async fn removing_a_contract_cancels_the_in_flight_call() {
    let started = Arc::new(tokio::sync::Notify::new());
    let cancelled = Arc::new(AtomicBool::new(false));
    let vm = Arc::new(HangingVm {
        started: started.clone(),
        cancelled: cancelled.clone(),
    });

    let test = TestNode::start(1, vm);
    test.add_contract();
    test.add_manual_call(1);

    started.notified().await;
    assert!(!cancelled.load(Ordering::SeqCst));

    test.dispatch(HostCommand::RemoveContract {
        contract_key: CONTRACT,
    });

    // Dropping the contract aborts the VM query; its future is dropped.
    for _ in 0..200 {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cancelled.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(test.announcements().is_empty(), "no transaction may appear");

    test.node.stop();
}
