// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use staking_accounting::{
    AccountingState, Deployment, MemoryStore, NodeOperatorsRewards, ReceiptProcessor,
    TransactionReceipt, ValidatorWeightedDistribution,
};

/// Arguments for the accounting replay.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct ReplayArgs {
    /// JSON-lines file of transaction receipts, in chain order.
    #[clap(short, long, env)]
    receipts: PathBuf,

    /// Checkpoint file. Loaded on start when it exists, rewritten after every pass.
    #[clap(long, env)]
    checkpoint: PathBuf,

    /// Chain ID of a known deployment. Ignored when the deployment is given explicitly.
    #[clap(long, env, default_value = "1")]
    network: u64,

    /// JSON list of node operators used to split the operators' fee.
    #[clap(long, env)]
    operators: Option<PathBuf>,

    /// Keep polling the receipts file for new receipts.
    #[clap(long, default_value_t = false)]
    follow: bool,

    /// Interval in seconds between passes over the receipts file.
    #[clap(long, default_value = "60")]
    interval: u64,

    /// Number of retries before quitting after an error.
    #[clap(long, default_value = "3")]
    retries: u32,

    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,

    #[clap(flatten, next_help_heading = "Deployment")]
    deployment: Option<Deployment>,
}

/// Replays a receipts file into an [AccountingState], checkpointing after each pass.
struct Replay<D> {
    processor: ReceiptProcessor<D>,
    state: AccountingState,
    receipts: PathBuf,
    checkpoint: PathBuf,
}

impl<D: NodeOperatorsRewards> Replay<D> {
    async fn load(
        processor: ReceiptProcessor<D>,
        receipts: PathBuf,
        checkpoint: PathBuf,
    ) -> Result<Self> {
        let state = if tokio::fs::try_exists(&checkpoint).await? {
            let json = tokio::fs::read_to_string(&checkpoint)
                .await
                .with_context(|| format!("Failed to read checkpoint {}", checkpoint.display()))?;
            let store: MemoryStore = serde_json::from_str(&json).context("Invalid checkpoint")?;
            let state = AccountingState::restore(&store)?;
            match state.last_processed {
                Some(position) => tracing::info!("Resuming after {position}"),
                None => tracing::info!("Checkpoint has no processed receipts"),
            }
            state
        } else {
            tracing::info!(
                "No checkpoint at {}; starting from an empty ledger",
                checkpoint.display()
            );
            AccountingState::new()
        };
        Ok(Self { processor, state, receipts, checkpoint })
    }

    /// Process every receipt past the last processed position. Returns the number processed.
    async fn run(&mut self) -> Result<usize> {
        if self.state.ledger.is_halted() {
            bail!("Ledger halted; refusing to process further receipts");
        }
        let contents = tokio::fs::read_to_string(&self.receipts)
            .await
            .with_context(|| format!("Failed to read receipts {}", self.receipts.display()))?;

        let mut processed = 0;
        for (line, json) in contents.lines().enumerate() {
            if json.trim().is_empty() {
                continue;
            }
            let receipt: TransactionReceipt = serde_json::from_str(json)
                .with_context(|| format!("Invalid receipt on line {}", line + 1))?;
            if self.state.last_processed.is_some_and(|last| receipt.position() <= last) {
                continue;
            }
            match self.processor.process_receipt(&mut self.state, &receipt) {
                Ok(_) => processed += 1,
                Err(err) if err.is_fatal() => {
                    save_checkpoint(&self.checkpoint, &self.state).await?;
                    return Err(err).context("Accounting halted");
                }
                Err(err) => {
                    // The events before the failure stay applied; never replay the receipt.
                    tracing::error!("Skipping receipt {}: {err}", receipt.transaction_hash);
                    self.state.last_processed = Some(receipt.position());
                }
            }
        }

        save_checkpoint(&self.checkpoint, &self.state).await?;
        let totals = self.state.ledger.totals();
        tracing::info!(
            "Processed {processed} receipts; pooled value {}, total shares {}, {} reports",
            totals.total_pooled_value,
            totals.total_shares,
            self.state.reports.len()
        );
        Ok(processed)
    }
}

async fn save_checkpoint(path: &Path, state: &AccountingState) -> Result<()> {
    let mut store = MemoryStore::new();
    state.checkpoint(&mut store)?;
    let json = serde_json::to_vec_pretty(&store)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write checkpoint {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn load_operators(path: Option<&Path>) -> Result<ValidatorWeightedDistribution> {
    let Some(path) = path else {
        tracing::warn!("No node operators configured; the operators' fee stays with the treasury");
        return Ok(ValidatorWeightedDistribution::default());
    };
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read node operators {}", path.display()))?;
    ValidatorWeightedDistribution::from_json(&json)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ReplayArgs::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();

    if args.log_json {
        tracing_subscriber::fmt().with_ansi(false).json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_ansi(false).with_env_filter(filter).init();
    }

    let deployment = match args.deployment {
        Some(deployment) => deployment,
        None => Deployment::from_chain_id(args.network)
            .with_context(|| format!("No known deployment for chain {}", args.network))?,
    };
    let operators = load_operators(args.operators.as_deref()).await?;
    let processor = ReceiptProcessor::new(deployment, operators)?;
    let mut replay = Replay::load(processor, args.receipts, args.checkpoint).await?;

    if !args.follow {
        replay.run().await?;
        return Ok(());
    }

    let mut failures = 0u32;
    loop {
        match replay.run().await {
            Ok(_) => {
                failures = 0;
                tracing::debug!("Sleeping for {} seconds", args.interval);
                tokio::time::sleep(Duration::from_secs(args.interval)).await;
            }
            Err(e) => {
                if replay.state.ledger.is_halted() {
                    return Err(e);
                }
                failures += 1;
                tracing::error!("Error replaying receipts: {:?}", e);
                if failures >= args.retries {
                    bail!("Maximum retries reached");
                }
                tracing::info!("Retrying in {} seconds", args.interval);
                tokio::time::sleep(Duration::from_secs(args.interval)).await;
            }
        }
    }
}
