// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use executor_types::{CallExecutionResult, ContractKey, VmCallRequest};
use tokio::sync::oneshot;

use executor_types::DriveKey;

use crate::{
    blockchain::Block,
    error::{ExecutorError, ExecutorResult},
    storage::Storage,
};

/// Call-scoped handles the virtual machine uses to satisfy sub-requests a
/// contract issues while executing: blockchain reads resolve through the
/// node's block cache, sandbox I/O is forwarded to the storage service
/// opaquely. Internet requests terminate at the VM service itself.
#[derive(Clone)]
pub struct CallServices {
    blockchain: Arc<dyn Fn(u64) -> oneshot::Receiver<ExecutorResult<Block>> + Send + Sync>,
    storage: Arc<dyn Storage>,
    drive_key: DriveKey,
    batch_index: u64,
}

impl CallServices {
    pub fn new(
        blockchain: Arc<dyn Fn(u64) -> oneshot::Receiver<ExecutorResult<Block>> + Send + Sync>,
        storage: Arc<dyn Storage>,
        drive_key: DriveKey,
        batch_index: u64,
    ) -> Self {
        Self {
            blockchain,
            storage,
            drive_key,
            batch_index,
        }
    }

    /// Resolves a block for an executing call, served through the node's
    /// block cache.
    pub async fn block(&self, height: u64) -> ExecutorResult<Block> {
        (self.blockchain)(height)
            .await
            .map_err(|_| ExecutorError::Shutdown)?
    }

    /// Forwards one sandbox I/O operation of the executing call.
    pub async fn sandbox_operation(&self, operation: Vec<u8>) -> ExecutorResult<Vec<u8>> {
        self.storage
            .sandbox_operation(self.drive_key, self.batch_index, operation)
            .await
    }
}

/// The WebAssembly virtual machine, external to this node. Executes one call
/// at a time per contract; cancelling the returned future cancels the
/// server-side call.
#[async_trait]
pub trait VirtualMachine: Send + Sync + 'static {
    async fn execute_call(
        &self,
        contract_key: ContractKey,
        request: VmCallRequest,
        services: CallServices,
    ) -> ExecutorResult<CallExecutionResult>;
}
