// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use executor_types::{ContractKey, ExecutorKey};
use thiserror::Error;

/// Errors that can occur while coordinating contract batch execution.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExecutorError {
    #[error("{service} service is unavailable: {reason}")]
    ServiceUnavailable {
        service: &'static str,
        reason: String,
    },

    #[error("malformed request: {0}")]
    IncorrectQuery(String),

    #[error("failed to deserialize message: {0}")]
    MalformedMessage(String),

    #[error("opinion signature verification failed")]
    InvalidOpinionSignature,

    #[error("opinion from {0} which is not in the contract cohort")]
    UnknownPeer(ExecutorKey),

    #[error("unknown contract {0}")]
    UnknownContract(ContractKey),

    #[error("rpc failure: {0}")]
    RpcFailure(String),

    #[error("session closed")]
    SessionClosed,

    #[error("executor is shutting down")]
    Shutdown,
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

impl From<bcs::Error> for ExecutorError {
    fn from(err: bcs::Error) -> Self {
        ExecutorError::MalformedMessage(err.to_string())
    }
}

impl From<tonic::Status> for ExecutorError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::Unavailable => ExecutorError::ServiceUnavailable {
                service: "rpc",
                reason: status.message().to_string(),
            },
            tonic::Code::InvalidArgument => {
                ExecutorError::IncorrectQuery(status.message().to_string())
            }
            _ => ExecutorError::RpcFailure(status.to_string()),
        }
    }
}
