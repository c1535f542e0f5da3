// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Wire types of the executor's gRPC surfaces, kept in the shape produced by
//! tonic-build. Structured payloads (requests, opinions, transaction infos)
//! travel as bcs bytes inside protobuf fields; protobuf carries only the
//! routing envelope, so unknown fields and commands are ignored by decoders.

// region blockchain

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct BlockRequest {
    #[prost(uint64, tag = "1")]
    pub height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub block_time: u64,
}

// endregion

// region storage

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SynchronizeStorageRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub drive_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub storage_hash: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InitiateModificationsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub drive_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub batch_index: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplySandboxModificationsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub drive_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub batch_index: u64,
    #[prost(bool, tag = "3")]
    pub success: bool,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ApplySandboxModificationsResponse {
    #[prost(int64, tag = "1")]
    pub sandbox_size_delta: i64,
    #[prost(int64, tag = "2")]
    pub state_size_delta: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluateStorageHashRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub drive_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub batch_index: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluateStorageHashResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub storage_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub used_storage_size: u64,
    #[prost(uint64, tag = "3")]
    pub meta_files_size: u64,
    #[prost(uint64, tag = "4")]
    pub file_structure_size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplyStorageModificationsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub drive_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub batch_index: u64,
    #[prost(bool, tag = "3")]
    pub success: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SandboxOperationRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub drive_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub batch_index: u64,
    #[prost(bytes = "vec", tag = "3")]
    pub operation: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SandboxOperationResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub result: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

// endregion

// region virtual machine

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecuteClientMessage {
    #[prost(oneof = "execute_client_message::Payload", tags = "1, 2, 3")]
    pub payload: ::core::option::Option<execute_client_message::Payload>,
}

pub mod execute_client_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// bcs-encoded call descriptor, sent exactly once to open the call.
        #[prost(bytes = "vec", tag = "1")]
        Call(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "2")]
        BlockResponse(super::CallBlockResponse),
        #[prost(message, tag = "3")]
        StorageResponse(super::CallStorageResponse),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecuteServerMessage {
    #[prost(oneof = "execute_server_message::Payload", tags = "1, 2, 3")]
    pub payload: ::core::option::Option<execute_server_message::Payload>,
}

pub mod execute_server_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// bcs-encoded `CallExecutionResult`, terminating the call.
        #[prost(bytes = "vec", tag = "1")]
        Returns(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "2")]
        BlockQuery(super::CallBlockQuery),
        #[prost(message, tag = "3")]
        StorageRequest(super::CallStorageRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallStorageRequest {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub operation: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallStorageResponse {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(bool, tag = "2")]
    pub success: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub result: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct CallBlockQuery {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(uint64, tag = "2")]
    pub height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallBlockResponse {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(bool, tag = "2")]
    pub found: bool,
    #[prost(bytes = "vec", tag = "3")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "4")]
    pub block_time: u64,
}

// endregion

// region messenger

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessengerClientMessage {
    #[prost(oneof = "messenger_client_message::Payload", tags = "1, 2")]
    pub payload: ::core::option::Option<messenger_client_message::Payload>,
}

pub mod messenger_client_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(string, tag = "1")]
        Subscribe(::prost::alloc::string::String),
        #[prost(message, tag = "2")]
        Write(super::OutputMessage),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OutputMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub receiver: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub tag: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "3")]
    pub content: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputMessage {
    #[prost(string, tag = "1")]
    pub tag: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub content: ::prost::alloc::vec::Vec<u8>,
}

// endregion

// region hosting node

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub contract_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(
        oneof = "client_message::Command",
        tags = "2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12"
    )]
    pub command: ::core::option::Option<client_message::Command>,
}

pub mod client_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Command {
        /// bcs-encoded `AddContractRequest`.
        #[prost(bytes = "vec", tag = "2")]
        AddContract(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "3")]
        RemoveContract(super::Empty),
        /// bcs-encoded `ManualCallRequest`.
        #[prost(bytes = "vec", tag = "4")]
        AddManualCall(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "5")]
        AddBlockInfo(super::BlockInfo),
        #[prost(uint64, tag = "6")]
        AddBlock(u64),
        /// bcs-encoded set of executor keys.
        #[prost(bytes = "vec", tag = "7")]
        SetExecutors(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "8")]
        SetAutomaticExecutionsEnabledSince(super::AutomaticExecutionsEnabledSince),
        /// bcs-encoded `PublishedEndBatchExecutionTransactionInfo`.
        #[prost(bytes = "vec", tag = "9")]
        EndBatchExecutionPublished(::prost::alloc::vec::Vec<u8>),
        /// bcs-encoded `PublishedEndBatchExecutionSingleTransactionInfo`.
        #[prost(bytes = "vec", tag = "10")]
        EndBatchExecutionSingleTransactionPublished(::prost::alloc::vec::Vec<u8>),
        /// bcs-encoded `FailedEndBatchExecutionTransactionInfo`.
        #[prost(bytes = "vec", tag = "11")]
        EndBatchExecutionFailed(::prost::alloc::vec::Vec<u8>),
        #[prost(uint64, tag = "12")]
        StorageSynchronizedPublished(u64),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlockInfo {
    #[prost(uint64, tag = "1")]
    pub height: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub block_time: u64,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct AutomaticExecutionsEnabledSince {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(uint64, tag = "2")]
    pub height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ServerMessage {
    #[prost(bytes = "vec", tag = "1")]
    pub contract_key: ::prost::alloc::vec::Vec<u8>,
    #[prost(oneof = "server_message::Announcement", tags = "2, 3, 4, 5, 6")]
    pub announcement: ::core::option::Option<server_message::Announcement>,
}

pub mod server_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Announcement {
        /// bcs-encoded `SuccessfulEndBatchExecutionTransactionInfo`.
        #[prost(bytes = "vec", tag = "2")]
        SuccessfulEndBatch(::prost::alloc::vec::Vec<u8>),
        /// bcs-encoded `UnsuccessfulEndBatchExecutionTransactionInfo`.
        #[prost(bytes = "vec", tag = "3")]
        UnsuccessfulEndBatch(::prost::alloc::vec::Vec<u8>),
        /// bcs-encoded `EndBatchExecutionSingleTransactionInfo`.
        #[prost(bytes = "vec", tag = "4")]
        EndBatchSingle(::prost::alloc::vec::Vec<u8>),
        /// bcs-encoded `SynchronizationSingleTransactionInfo`.
        #[prost(bytes = "vec", tag = "5")]
        SynchronizationSingle(::prost::alloc::vec::Vec<u8>),
        #[prost(message, tag = "6")]
        ReleasedTransactions(super::ReleasedTransactions),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReleasedTransactions {
    #[prost(bytes = "vec", tag = "1")]
    pub transactions_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub max_fee: u64,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub transactions: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
}

// endregion

// region clients

/// Generated client implementations.
pub mod blockchain_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct BlockchainClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl BlockchainClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> BlockchainClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub async fn block(
            &mut self,
            request: impl tonic::IntoRequest<super::BlockRequest>,
        ) -> std::result::Result<tonic::Response<super::BlockResponse>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/executor.Blockchain/Block");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.Blockchain", "Block"));
            self.inner.unary(req, path, codec).await
        }
    }
}

/// Generated client implementations.
pub mod storage_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct StorageClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl StorageClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> StorageClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub async fn synchronize_storage(
            &mut self,
            request: impl tonic::IntoRequest<super::SynchronizeStorageRequest>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/executor.Storage/SynchronizeStorage");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.Storage", "SynchronizeStorage"));
            self.inner.unary(req, path, codec).await
        }
        pub async fn initiate_modifications(
            &mut self,
            request: impl tonic::IntoRequest<super::InitiateModificationsRequest>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/executor.Storage/InitiateModifications");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.Storage", "InitiateModifications"));
            self.inner.unary(req, path, codec).await
        }
        pub async fn sandbox_operation(
            &mut self,
            request: impl tonic::IntoRequest<super::SandboxOperationRequest>,
        ) -> std::result::Result<tonic::Response<super::SandboxOperationResponse>, tonic::Status>
        {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/executor.Storage/SandboxOperation");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.Storage", "SandboxOperation"));
            self.inner.unary(req, path, codec).await
        }
        pub async fn apply_sandbox_modifications(
            &mut self,
            request: impl tonic::IntoRequest<super::ApplySandboxModificationsRequest>,
        ) -> std::result::Result<
            tonic::Response<super::ApplySandboxModificationsResponse>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/executor.Storage/ApplySandboxModifications",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "executor.Storage",
                "ApplySandboxModifications",
            ));
            self.inner.unary(req, path, codec).await
        }
        pub async fn evaluate_storage_hash(
            &mut self,
            request: impl tonic::IntoRequest<super::EvaluateStorageHashRequest>,
        ) -> std::result::Result<tonic::Response<super::EvaluateStorageHashResponse>, tonic::Status>
        {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/executor.Storage/EvaluateStorageHash");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.Storage", "EvaluateStorageHash"));
            self.inner.unary(req, path, codec).await
        }
        pub async fn apply_storage_modifications(
            &mut self,
            request: impl tonic::IntoRequest<super::ApplyStorageModificationsRequest>,
        ) -> std::result::Result<tonic::Response<super::Empty>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/executor.Storage/ApplyStorageModifications",
            );
            let mut req = request.into_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "executor.Storage",
                "ApplyStorageModifications",
            ));
            self.inner.unary(req, path, codec).await
        }
    }
}

/// Generated client implementations.
pub mod virtual_machine_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct VirtualMachineClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl VirtualMachineClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> VirtualMachineClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub async fn execute_call(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::ExecuteClientMessage>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::ExecuteServerMessage>>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/executor.VirtualMachine/ExecuteCall");
            let mut req = request.into_streaming_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.VirtualMachine", "ExecuteCall"));
            self.inner.streaming(req, path, codec).await
        }
    }
}

/// Generated client implementations.
pub mod messenger_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct MessengerClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl MessengerClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> MessengerClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub async fn session(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::MessengerClientMessage>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::InputMessage>>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/executor.Messenger/Session");
            let mut req = request.into_streaming_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.Messenger", "Session"));
            self.inner.streaming(req, path, codec).await
        }
    }
}

/// Generated client implementations.
pub mod executor_host_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::wildcard_imports)]
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct ExecutorHostClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl ExecutorHostClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> ExecutorHostClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub async fn session(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::ServerMessage>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::ClientMessage>>,
            tonic::Status,
        > {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/executor.ExecutorHost/Session");
            let mut req = request.into_streaming_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("executor.ExecutorHost", "Session"));
            self.inner.streaming(req, path, codec).await
        }
    }
}

// endregion
