// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::Parser;
use executor_config::{ExecutorKeyPair, HeightConfigTable, Parameters};
use executor_core::{
    rpc::{RpcBlockchain, RpcHostLink, RpcMessengerTransport, RpcStorage, RpcVirtualMachine},
    ExecutorNode, ExecutorServices,
};
use prometheus::Registry;
use tonic::transport::{Channel, Endpoint};
use tracing::info;

/// Off-chain contract batch-execution node. Coordinates the virtual machine,
/// storage, messenger and blockchain services it is pointed at, and reports
/// ready transactions to the hosting node.
#[derive(Parser)]
#[command(name = "executor-node")]
struct Args {
    /// Address of the virtual machine RPC endpoint.
    #[arg(long)]
    vm_address: String,

    /// Address of the storage service RPC endpoint.
    #[arg(long)]
    storage_address: String,

    /// Address of the messenger service RPC endpoint.
    #[arg(long)]
    messenger_address: String,

    /// Address of the blockchain gateway RPC endpoint.
    #[arg(long)]
    blockchain_address: String,

    /// Address of the hosting node RPC endpoint.
    #[arg(long)]
    host_address: String,

    /// Network identifier byte folded into emitted transaction versions.
    #[arg(long, default_value_t = 0)]
    network_identifier: u8,

    /// File holding the hex-encoded Ed25519 private key of this executor.
    #[arg(long)]
    key_file: PathBuf,

    /// Log file; logs go to stderr when not set.
    #[arg(long)]
    log_path: Option<PathBuf>,
}

fn init_logging(log_path: Option<&PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_path {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(move || file.try_clone().expect("log file clone"))
                .init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn load_keypair(path: &PathBuf) -> Result<ExecutorKeyPair> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read key file {}", path.display()))?;
    let bytes = hex::decode(content.trim()).context("key file is not valid hex")?;
    ExecutorKeyPair::from_bytes(&bytes).context("key file does not hold an Ed25519 private key")
}

fn dial(address: &str) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(address.to_string())
        .with_context(|| format!("invalid endpoint address {address}"))?;
    Ok(endpoint.connect_lazy())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_path.as_ref())?;

    let keypair = load_keypair(&args.key_file)?;
    let parameters = Parameters {
        network_identifier: args.network_identifier,
        ..Default::default()
    };

    let services = ExecutorServices {
        vm: Arc::new(RpcVirtualMachine::new(dial(&args.vm_address)?)),
        storage: Arc::new(RpcStorage::new(dial(&args.storage_address)?)),
        blockchain: Arc::new(RpcBlockchain::new(dial(&args.blockchain_address)?)),
        messenger: Arc::new(RpcMessengerTransport::new(dial(&args.messenger_address)?)),
        host: Arc::new(RpcHostLink::new(dial(&args.host_address)?)),
    };

    let registry = Registry::new();
    let mut node = ExecutorNode::start(
        keypair,
        parameters,
        HeightConfigTable::default(),
        &registry,
        services,
    );

    tokio::select! {
        _ = node.wait_for_shutdown() => {
            info!("Executor shut down after losing the host session");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }
    node.stop();
    Ok(())
}
