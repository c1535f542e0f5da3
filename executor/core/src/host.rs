// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use executor_types::{
    AddContractRequest, ContractKey, EndBatchExecutionSingleTransactionInfo, ExecutorKey,
    FailedEndBatchExecutionTransactionInfo, ManualCallRequest,
    PublishedEndBatchExecutionSingleTransactionInfo, PublishedEndBatchExecutionTransactionInfo,
    SerializedAggregatedTransaction, SuccessfulEndBatchExecutionTransactionInfo,
    SynchronizationSingleTransactionInfo, TransactionHash,
    UnsuccessfulEndBatchExecutionTransactionInfo,
};
use std::collections::BTreeSet;

use crate::{blockchain::Block, error::ExecutorResult};

/// Commands the hosting node sends down the bidirectional stream. Each
/// contract lifecycle command carries the contract key it concerns.
#[derive(Debug)]
pub enum HostCommand {
    AddContract {
        contract_key: ContractKey,
        request: AddContractRequest,
    },
    RemoveContract {
        contract_key: ContractKey,
    },
    AddManualCall {
        contract_key: ContractKey,
        request: ManualCallRequest,
    },
    AddBlockInfo {
        contract_key: ContractKey,
        height: u64,
        block: Block,
    },
    AddBlock {
        contract_key: ContractKey,
        height: u64,
    },
    SetExecutors {
        contract_key: ContractKey,
        executors: BTreeSet<ExecutorKey>,
    },
    SetAutomaticExecutionsEnabledSince {
        contract_key: ContractKey,
        height: Option<u64>,
    },
    EndBatchExecutionPublished(PublishedEndBatchExecutionTransactionInfo),
    EndBatchExecutionSingleTransactionPublished(PublishedEndBatchExecutionSingleTransactionInfo),
    EndBatchExecutionFailed(FailedEndBatchExecutionTransactionInfo),
    StorageSynchronizedPublished {
        contract_key: ContractKey,
        batch_index: u64,
    },
}

/// Announcements this executor sends up to the hosting node, which submits
/// the corresponding transactions to the blockchain.
#[derive(Clone, Debug)]
pub enum HostAnnouncement {
    SuccessfulEndBatchTransactionIsReady(SuccessfulEndBatchExecutionTransactionInfo),
    UnsuccessfulEndBatchTransactionIsReady(UnsuccessfulEndBatchExecutionTransactionInfo),
    EndBatchExecutionSingleTransactionIsReady(EndBatchExecutionSingleTransactionInfo),
    SynchronizationSingleTransactionIsReady(SynchronizationSingleTransactionInfo),
    ReleasedTransactionsAreReady {
        contract_key: ContractKey,
        transactions_hash: TransactionHash,
        transactions: SerializedAggregatedTransaction,
    },
}

/// Dialer for the hosting-node stream.
#[async_trait]
pub trait HostLink: Send + Sync + 'static {
    async fn connect(&self) -> ExecutorResult<Box<dyn HostSession>>;
}

/// One established bidirectional session with the hosting node.
#[async_trait]
pub trait HostSession: Send + Sync {
    async fn recv(&self) -> ExecutorResult<HostCommand>;
    async fn send(&self, announcement: HostAnnouncement) -> ExecutorResult<()>;
}
