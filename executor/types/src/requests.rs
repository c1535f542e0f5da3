// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{CurvePoint, DriveKey, ExecutorKey, ModificationId};

/// Everything the hosting node provides when assigning a contract to this
/// executor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddContractRequest {
    pub drive_key: DriveKey,
    /// The full cohort, including this executor.
    pub executors: BTreeSet<ExecutorKey>,
    /// Per-batch commitments of already published batches, seeding the
    /// window used to verify peer batch proofs.
    pub recent_batches_information: BTreeMap<u64, CurvePoint>,
    pub contract_deployment_base_modification_id: ModificationId,
    pub automatic_executions_file_name: String,
    pub automatic_executions_function_name: String,
    pub automatic_executions_sc_limit: u64,
    pub automatic_executions_sm_limit: u64,
    /// Number of batches already published for this contract.
    pub batches_executed: u64,
    /// How long to wait for an emitted transaction to be observed on-chain
    /// before falling back to a single transaction, in milliseconds.
    pub unsuccessful_approval_expectation_ms: u64,
}
