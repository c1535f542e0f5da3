// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! gRPC-backed implementations of the external service interfaces. Channels
//! are dialed lazily, so construction never blocks; per-request clients are
//! cheap clones of the shared channel.

pub mod proto;

use async_trait::async_trait;
use executor_types::{
    CallExecutionResult, ContractKey, InputMessage, ManualCallRequest, VmCallRequest,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;

use crate::{
    blockchain::{Block, Blockchain},
    error::{ExecutorError, ExecutorResult},
    host::{HostAnnouncement, HostCommand, HostLink, HostSession},
    messenger::{MessengerSession, MessengerTransport},
    storage::{SandboxDeltas, Storage, StorageState},
    vm::{CallServices, VirtualMachine},
};
use executor_types::{BlockHash, DriveKey, ExecutorKey, OutputMessage, StorageHash};

fn to_array_32(bytes: &[u8]) -> ExecutorResult<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| ExecutorError::MalformedMessage(format!("expected 32 bytes, got {}", bytes.len())))
}

// region blockchain

pub struct RpcBlockchain {
    client: proto::blockchain_client::BlockchainClient<Channel>,
}

impl RpcBlockchain {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::blockchain_client::BlockchainClient::new(channel),
        }
    }
}

#[async_trait]
impl Blockchain for RpcBlockchain {
    async fn block(&self, height: u64) -> ExecutorResult<Block> {
        let mut client = self.client.clone();
        let response = client.block(proto::BlockRequest { height }).await?;
        let response = response.into_inner();
        Ok(Block {
            hash: BlockHash::new(to_array_32(&response.hash)?),
            block_time: response.block_time,
        })
    }
}

// endregion

// region storage

pub struct RpcStorage {
    client: proto::storage_client::StorageClient<Channel>,
}

impl RpcStorage {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::storage_client::StorageClient::new(channel),
        }
    }
}

#[async_trait]
impl Storage for RpcStorage {
    async fn synchronize_storage(
        &self,
        drive_key: DriveKey,
        storage_hash: StorageHash,
    ) -> ExecutorResult<()> {
        let mut client = self.client.clone();
        client
            .synchronize_storage(proto::SynchronizeStorageRequest {
                drive_key: drive_key.as_ref().to_vec(),
                storage_hash: storage_hash.as_ref().to_vec(),
            })
            .await?;
        Ok(())
    }

    async fn initiate_modifications(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
    ) -> ExecutorResult<()> {
        let mut client = self.client.clone();
        client
            .initiate_modifications(proto::InitiateModificationsRequest {
                drive_key: drive_key.as_ref().to_vec(),
                batch_index,
            })
            .await?;
        Ok(())
    }

    async fn sandbox_operation(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
        operation: Vec<u8>,
    ) -> ExecutorResult<Vec<u8>> {
        let mut client = self.client.clone();
        let response = client
            .sandbox_operation(proto::SandboxOperationRequest {
                drive_key: drive_key.as_ref().to_vec(),
                batch_index,
                operation,
            })
            .await?
            .into_inner();
        Ok(response.result)
    }

    async fn apply_sandbox_modifications(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
        success: bool,
    ) -> ExecutorResult<SandboxDeltas> {
        let mut client = self.client.clone();
        let response = client
            .apply_sandbox_modifications(proto::ApplySandboxModificationsRequest {
                drive_key: drive_key.as_ref().to_vec(),
                batch_index,
                success,
            })
            .await?
            .into_inner();
        Ok(SandboxDeltas {
            sandbox_size_delta: response.sandbox_size_delta,
            state_size_delta: response.state_size_delta,
        })
    }

    async fn evaluate_storage_hash(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
    ) -> ExecutorResult<StorageState> {
        let mut client = self.client.clone();
        let response = client
            .evaluate_storage_hash(proto::EvaluateStorageHashRequest {
                drive_key: drive_key.as_ref().to_vec(),
                batch_index,
            })
            .await?
            .into_inner();
        Ok(StorageState {
            storage_hash: StorageHash::new(to_array_32(&response.storage_hash)?),
            used_storage_size: response.used_storage_size,
            meta_files_size: response.meta_files_size,
            file_structure_size: response.file_structure_size,
        })
    }

    async fn apply_storage_modifications(
        &self,
        drive_key: DriveKey,
        batch_index: u64,
        success: bool,
    ) -> ExecutorResult<()> {
        let mut client = self.client.clone();
        client
            .apply_storage_modifications(proto::ApplyStorageModificationsRequest {
                drive_key: drive_key.as_ref().to_vec(),
                batch_index,
                success,
            })
            .await?;
        Ok(())
    }
}

// endregion

// region virtual machine

pub struct RpcVirtualMachine {
    client: proto::virtual_machine_client::VirtualMachineClient<Channel>,
}

impl RpcVirtualMachine {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::virtual_machine_client::VirtualMachineClient::new(channel),
        }
    }
}

#[async_trait]
impl VirtualMachine for RpcVirtualMachine {
    /// Opens the call stream, then serves VM-initiated sub-requests inline
    /// until the call returns. Dropping the future cancels the server-side
    /// call.
    async fn execute_call(
        &self,
        contract_key: ContractKey,
        request: VmCallRequest,
        services: CallServices,
    ) -> ExecutorResult<CallExecutionResult> {
        let mut client = self.client.clone();
        let (outbound, receiver) = mpsc::channel::<proto::ExecuteClientMessage>(16);

        let call = bcs::to_bytes(&(contract_key, &request))?;
        outbound
            .send(proto::ExecuteClientMessage {
                payload: Some(proto::execute_client_message::Payload::Call(call)),
            })
            .await
            .map_err(|_| ExecutorError::SessionClosed)?;

        let mut inbound = client
            .execute_call(ReceiverStream::new(receiver))
            .await?
            .into_inner();

        while let Some(message) = inbound.message().await? {
            match message.payload {
                Some(proto::execute_server_message::Payload::Returns(bytes)) => {
                    return Ok(bcs::from_bytes(&bytes)?);
                }
                Some(proto::execute_server_message::Payload::BlockQuery(query)) => {
                    let response = match services.block(query.height).await {
                        Ok(block) => proto::CallBlockResponse {
                            query_id: query.query_id,
                            found: true,
                            hash: block.hash.as_ref().to_vec(),
                            block_time: block.block_time,
                        },
                        Err(_) => proto::CallBlockResponse {
                            query_id: query.query_id,
                            found: false,
                            hash: Vec::new(),
                            block_time: 0,
                        },
                    };
                    outbound
                        .send(proto::ExecuteClientMessage {
                            payload: Some(proto::execute_client_message::Payload::BlockResponse(
                                response,
                            )),
                        })
                        .await
                        .map_err(|_| ExecutorError::SessionClosed)?;
                }
                Some(proto::execute_server_message::Payload::StorageRequest(request)) => {
                    let response = match services.sandbox_operation(request.operation).await {
                        Ok(result) => proto::CallStorageResponse {
                            query_id: request.query_id,
                            success: true,
                            result,
                        },
                        Err(_) => proto::CallStorageResponse {
                            query_id: request.query_id,
                            success: false,
                            result: Vec::new(),
                        },
                    };
                    outbound
                        .send(proto::ExecuteClientMessage {
                            payload: Some(proto::execute_client_message::Payload::StorageResponse(
                                response,
                            )),
                        })
                        .await
                        .map_err(|_| ExecutorError::SessionClosed)?;
                }
                None => {}
            }
        }

        Err(ExecutorError::ServiceUnavailable {
            service: "vm",
            reason: "call stream closed before returning".to_string(),
        })
    }
}

// endregion

// region messenger

pub struct RpcMessengerTransport {
    client: proto::messenger_client::MessengerClient<Channel>,
}

impl RpcMessengerTransport {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::messenger_client::MessengerClient::new(channel),
        }
    }
}

#[async_trait]
impl MessengerTransport for RpcMessengerTransport {
    async fn connect(&self) -> ExecutorResult<Box<dyn MessengerSession>> {
        let mut client = self.client.clone();
        let (outbound, receiver) = mpsc::channel::<proto::MessengerClientMessage>(128);
        let inbound = client
            .session(ReceiverStream::new(receiver))
            .await?
            .into_inner();
        Ok(Box::new(RpcMessengerSession {
            outbound,
            inbound: tokio::sync::Mutex::new(inbound),
        }))
    }
}

struct RpcMessengerSession {
    outbound: mpsc::Sender<proto::MessengerClientMessage>,
    inbound: tokio::sync::Mutex<tonic::codec::Streaming<proto::InputMessage>>,
}

#[async_trait]
impl MessengerSession for RpcMessengerSession {
    async fn subscribe(&self, tag: String) -> ExecutorResult<()> {
        self.outbound
            .send(proto::MessengerClientMessage {
                payload: Some(proto::messenger_client_message::Payload::Subscribe(tag)),
            })
            .await
            .map_err(|_| ExecutorError::SessionClosed)
    }

    async fn write(&self, message: OutputMessage) -> ExecutorResult<()> {
        self.outbound
            .send(proto::MessengerClientMessage {
                payload: Some(proto::messenger_client_message::Payload::Write(
                    proto::OutputMessage {
                        receiver: message.receiver.as_ref().to_vec(),
                        tag: message.tag,
                        content: message.content,
                    },
                )),
            })
            .await
            .map_err(|_| ExecutorError::SessionClosed)
    }

    async fn read(&self) -> ExecutorResult<InputMessage> {
        let mut inbound = self.inbound.lock().await;
        match inbound.message().await? {
            Some(message) => Ok(InputMessage {
                tag: message.tag,
                content: message.content,
            }),
            None => Err(ExecutorError::SessionClosed),
        }
    }
}

// endregion

// region hosting node

pub struct RpcHostLink {
    client: proto::executor_host_client::ExecutorHostClient<Channel>,
}

impl RpcHostLink {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: proto::executor_host_client::ExecutorHostClient::new(channel),
        }
    }
}

#[async_trait]
impl HostLink for RpcHostLink {
    async fn connect(&self) -> ExecutorResult<Box<dyn HostSession>> {
        let mut client = self.client.clone();
        let (outbound, receiver) = mpsc::channel::<proto::ServerMessage>(128);
        let inbound = client
            .session(ReceiverStream::new(receiver))
            .await?
            .into_inner();
        Ok(Box::new(RpcHostSession {
            outbound,
            inbound: tokio::sync::Mutex::new(inbound),
        }))
    }
}

struct RpcHostSession {
    outbound: mpsc::Sender<proto::ServerMessage>,
    inbound: tokio::sync::Mutex<tonic::codec::Streaming<proto::ClientMessage>>,
}

#[async_trait]
impl HostSession for RpcHostSession {
    async fn recv(&self) -> ExecutorResult<HostCommand> {
        let mut inbound = self.inbound.lock().await;
        loop {
            let Some(message) = inbound.message().await? else {
                return Err(ExecutorError::SessionClosed);
            };
            // Commands this build does not know are skipped, not failed on.
            match decode_command(message)? {
                Some(command) => return Ok(command),
                None => continue,
            }
        }
    }

    async fn send(&self, announcement: HostAnnouncement) -> ExecutorResult<()> {
        self.outbound
            .send(encode_announcement(announcement)?)
            .await
            .map_err(|_| ExecutorError::SessionClosed)
    }
}

fn decode_command(message: proto::ClientMessage) -> ExecutorResult<Option<HostCommand>> {
    use proto::client_message::Command;

    let contract_key = ContractKey::new(to_array_32(&message.contract_key)?);
    let command = match message.command {
        Some(command) => command,
        None => return Ok(None),
    };

    let command = match command {
        Command::AddContract(bytes) => HostCommand::AddContract {
            contract_key,
            request: bcs::from_bytes(&bytes)?,
        },
        Command::RemoveContract(_) => HostCommand::RemoveContract { contract_key },
        Command::AddManualCall(bytes) => HostCommand::AddManualCall {
            contract_key,
            request: bcs::from_bytes::<ManualCallRequest>(&bytes)?,
        },
        Command::AddBlockInfo(info) => HostCommand::AddBlockInfo {
            contract_key,
            height: info.height,
            block: Block {
                hash: BlockHash::new(to_array_32(&info.hash)?),
                block_time: info.block_time,
            },
        },
        Command::AddBlock(height) => HostCommand::AddBlock {
            contract_key,
            height,
        },
        Command::SetExecutors(bytes) => HostCommand::SetExecutors {
            contract_key,
            executors: bcs::from_bytes::<std::collections::BTreeSet<ExecutorKey>>(&bytes)?,
        },
        Command::SetAutomaticExecutionsEnabledSince(since) => {
            HostCommand::SetAutomaticExecutionsEnabledSince {
                contract_key,
                height: since.enabled.then_some(since.height),
            }
        }
        Command::EndBatchExecutionPublished(bytes) => {
            HostCommand::EndBatchExecutionPublished(bcs::from_bytes(&bytes)?)
        }
        Command::EndBatchExecutionSingleTransactionPublished(bytes) => {
            HostCommand::EndBatchExecutionSingleTransactionPublished(bcs::from_bytes(&bytes)?)
        }
        Command::EndBatchExecutionFailed(bytes) => {
            HostCommand::EndBatchExecutionFailed(bcs::from_bytes(&bytes)?)
        }
        Command::StorageSynchronizedPublished(batch_index) => {
            HostCommand::StorageSynchronizedPublished {
                contract_key,
                batch_index,
            }
        }
    };
    Ok(Some(command))
}

fn encode_announcement(announcement: HostAnnouncement) -> ExecutorResult<proto::ServerMessage> {
    use proto::server_message::Announcement;

    let (contract_key, announcement) = match announcement {
        HostAnnouncement::SuccessfulEndBatchTransactionIsReady(info) => (
            info.contract_key,
            Announcement::SuccessfulEndBatch(bcs::to_bytes(&info)?),
        ),
        HostAnnouncement::UnsuccessfulEndBatchTransactionIsReady(info) => (
            info.contract_key,
            Announcement::UnsuccessfulEndBatch(bcs::to_bytes(&info)?),
        ),
        HostAnnouncement::EndBatchExecutionSingleTransactionIsReady(info) => (
            info.contract_key,
            Announcement::EndBatchSingle(bcs::to_bytes(&info)?),
        ),
        HostAnnouncement::SynchronizationSingleTransactionIsReady(info) => (
            info.contract_key,
            Announcement::SynchronizationSingle(bcs::to_bytes(&info)?),
        ),
        HostAnnouncement::ReleasedTransactionsAreReady {
            contract_key,
            transactions_hash,
            transactions,
        } => (
            contract_key,
            Announcement::ReleasedTransactions(proto::ReleasedTransactions {
                transactions_hash: transactions_hash.as_ref().to_vec(),
                max_fee: transactions.max_fee,
                transactions: transactions.transactions,
            }),
        ),
    };

    Ok(proto::ServerMessage {
        contract_key: contract_key.as_ref().to_vec(),
        announcement: Some(announcement),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use executor_types::AddContractRequest;
    use prost::Message as _;

    #[test]
    fn unknown_commands_are_skipped() {
        let message = proto::ClientMessage {
            contract_key: vec![1; 32],
            command: None,
        };
        assert!(decode_command(message).unwrap().is_none());
    }

    #[test]
    fn add_contract_roundtrip() {
        let request = AddContractRequest {
            drive_key: DriveKey::new([2; 32]),
            executors: [ExecutorKey::new([3; 32])].into(),
            recent_batches_information: Default::default(),
            contract_deployment_base_modification_id: Default::default(),
            automatic_executions_file_name: "auto.wasm".to_string(),
            automatic_executions_function_name: "run".to_string(),
            automatic_executions_sc_limit: 10,
            automatic_executions_sm_limit: 20,
            batches_executed: 0,
            unsuccessful_approval_expectation_ms: 60_000,
        };
        let message = proto::ClientMessage {
            contract_key: vec![1; 32],
            command: Some(proto::client_message::Command::AddContract(
                bcs::to_bytes(&request).unwrap(),
            )),
        };

        // Survives a protobuf encode/decode cycle.
        let encoded = message.encode_to_vec();
        let decoded = proto::ClientMessage::decode(encoded.as_slice()).unwrap();

        match decode_command(decoded).unwrap().unwrap() {
            HostCommand::AddContract {
                contract_key,
                request: decoded_request,
            } => {
                assert_eq!(contract_key, ContractKey::new([1; 32]));
                assert_eq!(decoded_request.drive_key, request.drive_key);
                assert_eq!(
                    decoded_request.automatic_executions_file_name,
                    request.automatic_executions_file_name
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
