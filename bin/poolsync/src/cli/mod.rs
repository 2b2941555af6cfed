// This file is part of Poolsync.
//
// Poolsync is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Poolsync is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Poolsync.
// If not, see https://www.gnu.org/licenses/.

use std::{collections::HashSet, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use clap::{builder::RangedU64ValueParser, Args, Parser};
use poolsync_provider::{BitcoindClient, ClientSettings};
use poolsync_sync::{SyncEvent, SyncNode, SyncTask, SyncTaskArgs};
use poolsync_types::{NodeConfig, NodeId};
use poolsync_utils::{emit, handle, retry::RetryOpts};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

mod json;
mod logging;
mod progress;

use json::get_json_config;
use progress::Progress;

/// Main entry point for the CLI
///
/// Loads the node list, runs one sync over it and exits with an error unless
/// every node converged or stalled. A ctrl-c cancels the run; nodes still in
/// progress are reported as failed.
pub async fn run() -> anyhow::Result<()> {
    let opt = Cli::parse();
    let _guard = logging::configure_logging(&opt.logs)?;
    tracing::info!("Parsed CLI options: {:#?}", opt);

    let configs: Vec<NodeConfig> =
        get_json_config(&opt.config_file).context("should load node config")?;
    if configs.is_empty() {
        bail!("no nodes listed in {}", opt.config_file.display());
    }
    let nodes = connect_nodes(&configs, opt.rpc.client_settings())?;

    let (event_sender, event_rx) = broadcast::channel::<SyncEvent>(emit::EVENT_CHANNEL_CAPACITY);
    let (progress, progress_handle) = Progress::track(event_sender.subscribe());
    let log_handle =
        emit::receive_and_log_events_with_filter(event_rx, |event| !event.kind.is_per_transaction());

    let shutdown = CancellationToken::new();
    let task = SyncTask::new(opt.sync.task_args(), nodes, event_sender);
    let run = task.run(shutdown.clone());
    tokio::pin!(run);

    let report = tokio::select! {
        report = &mut run => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received ctrl-c, cancelling sync");
            shutdown.cancel();
            run.await
        }
    };

    // all senders are gone once the run returns
    handle::as_anyhow_handle(progress_handle).await?;
    handle::as_anyhow_handle(log_handle).await?;
    progress::log_summary(&report, &progress);

    if shutdown.is_cancelled() {
        bail!("sync cancelled");
    }
    let incomplete: Vec<_> = report
        .nodes
        .iter()
        .filter(|node| !node.outcome.is_complete())
        .map(|node| node.node.as_str())
        .collect();
    if !incomplete.is_empty() {
        bail!("sync incomplete for {}", incomplete.join(", "));
    }

    tracing::info!("Sync complete");
    Ok(())
}

/// Build a client per node. Node names key events and the summary, so they
/// must be unique.
fn connect_nodes(
    configs: &[NodeConfig],
    settings: ClientSettings,
) -> anyhow::Result<Vec<SyncNode<BitcoindClient>>> {
    let mut names = HashSet::new();
    for config in configs {
        let name = config.display_name();
        if !names.insert(name.clone()) {
            bail!("node {name} is listed more than once, give each node a unique name");
        }
    }

    configs
        .iter()
        .enumerate()
        .map(|(i, config)| {
            let client = BitcoindClient::new(config, settings)
                .with_context(|| format!("should create client for {}", config.display_name()))?;
            let name = client.name().to_string();
            Ok::<_, anyhow::Error>(SyncNode::new(NodeId(i), name, client))
        })
        .collect()
}

/// CLI options
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Node list
    ///
    /// JSON array of node descriptors:
    /// `{ "name"?, "protocol", "host", "port", "username", "password" }`
    #[arg(long = "config-file", name = "config-file", env = "POOLSYNC_CONFIG_FILE")]
    config_file: PathBuf,

    #[clap(flatten)]
    rpc: RpcArgs,

    #[clap(flatten)]
    sync: SyncArgs,

    #[clap(flatten)]
    logs: LogsArgs,
}

/// CLI options for node RPC
#[derive(Debug, Args)]
#[command(next_help_heading = "RPC")]
pub struct RpcArgs {
    /// Timeout for a single RPC request
    #[arg(
        long = "rpc.timeout_seconds",
        name = "rpc.timeout_seconds",
        env = "RPC_TIMEOUT_SECONDS",
        default_value = "30"
    )]
    timeout_seconds: u64,
}

impl RpcArgs {
    fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            request_timeout: Duration::from_secs(self.timeout_seconds),
            ..Default::default()
        }
    }
}

/// CLI options for the sync run
#[derive(Debug, Args)]
#[command(next_help_heading = "Sync")]
pub struct SyncArgs {
    /// Attempts at fetching a node's mempool before it is excluded
    #[arg(
        long = "fetch.max_attempts",
        name = "fetch.max_attempts",
        env = "FETCH_MAX_ATTEMPTS",
        default_value = "3",
        value_parser = RangedU64ValueParser::<u64>::new().range(1..)
    )]
    fetch_max_attempts: u64,

    /// Transactions in flight per node within a pass
    #[arg(
        long = "delivery.concurrency",
        name = "delivery.concurrency",
        env = "DELIVERY_CONCURRENCY",
        default_value = "1",
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    delivery_concurrency: usize,

    /// Do not sync to nodes whose mempool is empty
    #[arg(long = "skip_empty_targets", env = "SKIP_EMPTY_TARGETS")]
    skip_empty_targets: bool,
}

impl SyncArgs {
    fn task_args(&self) -> SyncTaskArgs {
        SyncTaskArgs {
            fetch_retry: RetryOpts {
                max_attempts: self.fetch_max_attempts,
                ..Default::default()
            },
            delivery_concurrency: self.delivery_concurrency,
            skip_empty_targets: self.skip_empty_targets,
        }
    }
}

/// CLI options for logging
#[derive(Debug, Args)]
#[command(next_help_heading = "Logging")]
pub struct LogsArgs {
    /// Log file
    ///
    /// If not provided, logs will be written to stdout
    #[arg(
        long = "log.file",
        name = "log.file",
        env = "LOG_FILE",
        default_value = None
    )]
    file: Option<String>,

    /// Log JSON
    ///
    /// If set, logs will be written in JSON format
    #[arg(
        long = "log.json",
        name = "log.json",
        env = "LOG_JSON",
        required = false,
        num_args = 0
    )]
    json: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["poolsync", "--config-file", "nodes.json"]).unwrap();
        assert_eq!(cli.config_file, PathBuf::from("nodes.json"));
        assert_eq!(cli.rpc.client_settings().request_timeout, Duration::from_secs(30));

        let args = cli.sync.task_args();
        assert_eq!(args.fetch_retry.max_attempts, 3);
        assert_eq!(args.delivery_concurrency, 1);
        assert!(!args.skip_empty_targets);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "poolsync",
            "--config-file",
            "nodes.json",
            "--rpc.timeout_seconds",
            "5",
            "--delivery.concurrency",
            "8",
            "--skip_empty_targets",
            "--log.json",
        ])
        .unwrap();
        assert_eq!(cli.rpc.timeout_seconds, 5);
        assert_eq!(cli.sync.delivery_concurrency, 8);
        assert!(cli.sync.skip_empty_targets);
        assert!(cli.logs.json);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let res = Cli::try_parse_from([
            "poolsync",
            "--config-file",
            "nodes.json",
            "--delivery.concurrency",
            "0",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_duplicate_node_names_rejected() {
        let configs: Vec<NodeConfig> = serde_json::from_str(
            r#"[
                {"host": "127.0.0.1", "port": 18332},
                {"name": "127.0.0.1:18332", "host": "10.0.0.2", "port": 18332}
            ]"#,
        )
        .unwrap();

        let err = connect_nodes(&configs, ClientSettings::default()).unwrap_err();
        assert!(err.to_string().contains("127.0.0.1:18332"));

        let same_address: Vec<NodeConfig> = serde_json::from_str(
            r#"[
                {"host": "127.0.0.1", "port": 18332},
                {"host": "127.0.0.1", "port": 18332, "username": "other"}
            ]"#,
        )
        .unwrap();
        assert!(connect_nodes(&same_address, ClientSettings::default()).is_err());
    }

    #[test]
    fn test_connect_nodes() {
        let configs: Vec<NodeConfig> = serde_json::from_str(
            r#"[
                {"host": "127.0.0.1", "port": 18332},
                {"name": "backup", "protocol": "https", "host": "node.example", "port": 8332}
            ]"#,
        )
        .unwrap();

        let nodes = connect_nodes(&configs, ClientSettings::default()).unwrap();

        let names: Vec<_> = nodes.iter().map(|n| (n.id, n.name.as_str())).collect();
        assert_eq!(
            names,
            vec![(NodeId(0), "127.0.0.1:18332"), (NodeId(1), "backup")]
        );
    }
}
