use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context as _, Result};
use clap::Parser;
use coinflip_prover::catch_up::{CatchUpEngine, Pacing};
use coinflip_prover::endpoint::cli::CliEndpointConfig;
use coinflip_prover::env::load_dotenvy_vars_if_present;
use coinflip_prover::provider::ContractClient;
use coinflip_prover::simulate::simulate;
use tokio::sync::watch;
use tracing::{info, warn};

use self::prover::*;
use crate::cli::Command;
mod prover {
    pub mod cli;
    pub mod keys;
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenvy_vars_if_present();
    coinflip_prover::tracing::init();

    let args = cli::Cli::parse();

    match args.command {
        Command::Run { endpoint, engine } => {
            let transport = endpoint.transport()?;
            let (endpoint, key_pair) = endpoint.into_parts()?;
            info!(?endpoint, public_key = %key_pair.public_key(), "starting prover");

            let client = ContractClient::new(transport, endpoint).with_max_fee(engine.max_fee);
            let engine = CatchUpEngine::start(client, key_pair, Pacing::from(&engine))
                .await
                .context("could not read the chain state")?;

            let (stop, shutdown) = watch::channel(false);
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("could not listen for ctrl-c: {e}");
                    std::future::pending::<()>().await;
                }
                info!("received ctrl-c, stopping");
                stop.send_replace(true);
            });
            engine.run(shutdown).await;
        }
        Command::Simulate {
            endpoint,
            output,
            lowest_block,
        } => {
            simulate_main(endpoint, output, lowest_block).await?;
        }
        Command::Gen => keys::generate().iter().for_each(|line| println!("{line}")),
        Command::Prove { msg, privkey } => {
            keys::prove(&msg, &privkey)?
                .iter()
                .for_each(|line| println!("{line}"));
        }
        Command::Verify { msg, proof, key } => println!("{}", keys::verify(&msg, &proof, &key)?),
    }

    Ok(())
}

async fn simulate_main(
    endpoint: CliEndpointConfig,
    output: std::path::PathBuf,
    lowest_block: u64,
) -> Result<()> {
    let transport = endpoint.transport()?;
    let (endpoint, key_pair) = endpoint.into_parts()?;
    let client = ContractClient::new(transport, endpoint);

    let file = File::create(&output)
        .with_context(|| format!("could not create {}", output.display()))?;
    let mut log = BufWriter::new(file);

    let tally = simulate(&client, &key_pair, &mut log, lowest_block).await?;
    info!(
        blocks = tally.total(),
        outcome0 = tally.outcome0,
        outcome1 = tally.outcome1,
        output = %output.display(),
        "simulation finished"
    );
    Ok(())
}
