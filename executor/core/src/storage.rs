// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use executor_types::{DriveKey, StorageHash};

use crate::error::ExecutorResult;

/// Storage summary the batch settles on once all sandbox modifications are
/// applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StorageState {
    pub storage_hash: StorageHash,
    pub used_storage_size: u64,
    pub meta_files_size: u64,
    pub file_structure_size: u64,
}

/// Size effects of applying one call's sandbox modifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SandboxDeltas {
    pub sandbox_size_delta: i64,
    pub state_size_delta: i64,
}

/// The storage service, external to this node. Per-file sandbox I/O is driven
/// by the virtual machine directly; the executor only steers the batch-level
/// modification rounds.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Brings the drive to the given published state; used when this executor
    /// missed a batch and must catch up before executing the next one.
    async fn synchronize_storage(
        &self,
        drive_key: DriveKey,
        storage_hash: StorageHash,
    ) -> ExecutorResult<()>;

    /// Opens the modification round backing one batch.
    async fn initiate_modifications(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
    ) -> ExecutorResult<()>;

    /// Forwards one opaque sandbox I/O operation issued by an executing call
    /// (file and directory primitives, interpreted by the storage service).
    async fn sandbox_operation(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
        operation: Vec<u8>,
    ) -> ExecutorResult<Vec<u8>>;

    /// Commits or rolls back the sandbox effects of the call that just
    /// finished executing, reporting the resulting size deltas.
    async fn apply_sandbox_modifications(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
        success: bool,
    ) -> ExecutorResult<SandboxDeltas>;

    /// Evaluates the drive state the batch would commit.
    async fn evaluate_storage_hash(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
    ) -> ExecutorResult<StorageState>;

    /// Applies or discards the whole batch's modifications.
    async fn apply_storage_modifications(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
        success: bool,
    ) -> ExecutorResult<()>;
}
