//! Offline coin-flip simulation.
//!
//! Proves the seed of every block from the chain head down to a lowest height
//! and records the resulting outcomes, to check that the flips are fair. Only
//! chain reads are used; nothing is submitted.

use std::io::{self, Write};

use coinflip_vrf::VrfError;
use tracing::info;

use crate::catch_up::SeedProver;
use crate::provider::BlockSeedSource;
use crate::rpc::RpcError;

/// Heights at which the log is flushed.
pub const FLUSH_EVERY: u64 = 1000;
/// Number of blocks between progress reports.
pub const REPORT_EVERY: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("could not read block {height}: {source}")]
    Read { height: u64, source: RpcError },
    #[error("could not prove block {height}: {source}")]
    Proof { height: u64, source: VrfError },
    #[error("could not write simulation log: {0}")]
    Log(#[from] io::Error),
}

/// Counts of each coin side seen so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub outcome0: u64,
    pub outcome1: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: u8) {
        if outcome == 0 {
            self.outcome0 += 1;
        } else {
            self.outcome1 += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.outcome0 + self.outcome1
    }

    /// Share of zero outcomes in percent, `0.0` before anything was recorded.
    pub fn percentage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.outcome0 as f64 / total as f64 * 100.0,
        }
    }
}

/// Walks from the latest block down to `lowest_block` (inclusive), writing
/// one `"<height> 0x<seed> <proof> = <outcome>"` line per block to `log`.
pub async fn simulate<SourceT, ProverT, LogT>(
    source: &SourceT,
    prover: &ProverT,
    log: &mut LogT,
    lowest_block: u64,
) -> Result<Tally, SimulationError>
where
    SourceT: BlockSeedSource,
    ProverT: SeedProver,
    LogT: Write,
{
    let latest = source
        .latest_block_height()
        .await
        .map_err(|source| SimulationError::Read { height: 0, source })?;
    info!(latest, lowest_block, "starting simulation");

    let mut tally = Tally::default();
    for height in (lowest_block..=latest).rev() {
        let seed = source
            .block_seed(height)
            .await
            .map_err(|source| SimulationError::Read { height, source })?;
        let output = prover
            .prove(&seed)
            .map_err(|source| SimulationError::Proof { height, source })?;
        let outcome = output.outcome();
        tally.record(outcome);

        writeln!(
            log,
            "{height} 0x{} {} = {outcome}",
            hex::encode(&seed),
            hex::encode(&output.proof)
        )?;
        if height % FLUSH_EVERY == 0 {
            log.flush()?;
        }
        if tally.total() % REPORT_EVERY == 0 {
            report(height, &tally);
        }
    }

    log.flush()?;
    report(lowest_block.min(latest), &tally);
    Ok(tally)
}

fn report(height: u64, tally: &Tally) {
    info!(
        height,
        outcome0 = tally.outcome0,
        outcome1 = tally.outcome1,
        percentage = format_args!("{:.2}", tally.percentage()),
        "simulation progress"
    );
}
