// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

mod async_query;
mod batch_task;
mod blockchain;
mod context;
mod contract;
mod error;
mod event_loop;
mod executor;
mod host;
mod messenger;
mod metrics;
mod proof_of_execution;
pub mod rpc;
mod service;
mod storage;
mod vm;

pub use blockchain::{Blockchain, Block, CachedBlockchain};
pub use context::Context;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{Executor, ExecutorNode, ExecutorServices};
pub use host::{HostAnnouncement, HostCommand, HostLink, HostSession};
pub use messenger::{MessengerSession, MessengerTransport};
pub use metrics::{initialise_metrics, Metrics};
pub use storage::{SandboxDeltas, Storage, StorageState};
pub use vm::{CallServices, VirtualMachine};
