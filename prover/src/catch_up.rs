//! Catch-up polling engine.
//!
//! The engine walks the chain one block at a time starting just before the
//! oldest block whose round can still be settled, asks the contract whether
//! the block's round waits for a proof, and if so proves the block seed and
//! submits the proof. It never stops on its own; [`CatchUpEngine::run`] loops
//! until its stop signal fires.
//!
//! Probing is decoupled from waiting: [`CatchUpEngine::step`] performs exactly
//! one probe and reports what happened, and [`CatchUpEngine::pause_after`]
//! decides how long to wait before the next one.

use std::time::Duration;

use coinflip_vrf::{KeyPair, VrfError, VrfOutput};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::provider::RoundProvider;
use crate::rpc::RpcError;

/// Consecutive failed probes of the same block after which the failure is
/// logged as a warning instead of at debug level.
pub const NOT_READY_WARN_EVERY: u32 = 30;

/// Produces the proof settling a round from its seed.
#[cfg_attr(test, mockall::automock)]
pub trait SeedProver {
    fn prove(&self, seed: &[u8]) -> Result<VrfOutput, VrfError>;
}

impl SeedProver for KeyPair {
    fn prove(&self, seed: &[u8]) -> Result<VrfOutput, VrfError> {
        coinflip_vrf::prove(self, seed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Wait before probing a block again after its probe failed.
    pub retry_delay: Duration,
    /// Wait between probes once the engine is past the height it started at.
    pub poll_interval: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// Last block whose round has been evaluated. Never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RoundCursor {
    last_proved_block: u64,
}

impl RoundCursor {
    pub fn new(last_proved_block: u64) -> Self {
        Self { last_proved_block }
    }

    /// Cursor for a chain at `latest_height`. Rounds older than the
    /// submission window can no longer be settled, so they are skipped.
    pub fn starting_at(latest_height: u64, submission_window: u64) -> Self {
        Self::new(
            latest_height
                .saturating_sub(submission_window)
                .saturating_sub(1),
        )
    }

    pub fn last_proved_block(&self) -> u64 {
        self.last_proved_block
    }

    pub fn next_block(&self) -> u64 {
        self.last_proved_block + 1
    }

    fn advance_to(&mut self, height: u64) {
        self.last_proved_block = self.last_proved_block.max(height);
    }
}

/// Why a pending round was given up.
#[derive(Debug, thiserror::Error)]
pub enum RoundFailure {
    #[error("could not prove round: {0}")]
    Proof(#[from] VrfError),
    #[error(transparent)]
    Submission(#[from] RpcError),
}

/// Result of probing a single block.
#[derive(Debug)]
pub enum StepOutcome {
    /// The probe failed, most likely because the block is not mined yet. The
    /// same block is probed again.
    NotReady { height: u64, error: RpcError },
    NoRoundPending { height: u64 },
    Submitted { height: u64, tx_hash: String },
    /// The round waited for a proof but proving or submitting failed. It is
    /// not retried.
    Abandoned { height: u64, reason: RoundFailure },
}

impl StepOutcome {
    pub fn height(&self) -> u64 {
        match self {
            StepOutcome::NotReady { height, .. }
            | StepOutcome::NoRoundPending { height }
            | StepOutcome::Submitted { height, .. }
            | StepOutcome::Abandoned { height, .. } => *height,
        }
    }
}

pub struct CatchUpEngine<ProviderT, ProverT> {
    provider: ProviderT,
    prover: ProverT,
    cursor: RoundCursor,
    /// Chain height when the engine started; below it the engine is catching
    /// up and does not pause between probes.
    start_height: u64,
    pacing: Pacing,
    not_ready_streak: u32,
}

impl<ProviderT, ProverT> CatchUpEngine<ProviderT, ProverT>
where
    ProviderT: RoundProvider,
    ProverT: SeedProver,
{
    /// Reads the submission window and the chain height and places the cursor
    /// just before the oldest round that can still be settled.
    pub async fn start(
        provider: ProviderT,
        prover: ProverT,
        pacing: Pacing,
    ) -> Result<Self, RpcError> {
        let submission_window = provider.submission_window().await?;
        let start_height = provider.latest_block_height().await?;
        let cursor = RoundCursor::starting_at(start_height, submission_window);
        info!(
            submission_window,
            start_height,
            last_proved_block = cursor.last_proved_block(),
            "starting catch-up"
        );
        Ok(Self::new(provider, prover, cursor, start_height, pacing))
    }

    pub fn new(
        provider: ProviderT,
        prover: ProverT,
        cursor: RoundCursor,
        start_height: u64,
        pacing: Pacing,
    ) -> Self {
        Self {
            provider,
            prover,
            cursor,
            start_height,
            pacing,
            not_ready_streak: 0,
        }
    }

    pub fn cursor(&self) -> RoundCursor {
        self.cursor
    }

    pub fn start_height(&self) -> u64 {
        self.start_height
    }

    /// Probes the block after the cursor and settles its round if needed.
    pub async fn step(&mut self) -> StepOutcome {
        let height = self.cursor.next_block();

        let seed = match self.provider.provable_seed(height).await {
            Ok(seed) => seed,
            Err(error) => {
                self.not_ready_streak += 1;
                if self.not_ready_streak % NOT_READY_WARN_EVERY == 0 {
                    warn!(
                        height,
                        attempts = self.not_ready_streak,
                        %error,
                        "block still not provable"
                    );
                } else {
                    debug!(height, %error, "block not provable yet");
                }
                return StepOutcome::NotReady { height, error };
            }
        };
        self.not_ready_streak = 0;
        self.cursor.advance_to(height);

        let Some(seed) = seed else {
            debug!(height, "no round pending");
            return StepOutcome::NoRoundPending { height };
        };

        info!(height, seed = %hex::encode(&seed), "proving block");
        match self.settle(height, &seed).await {
            Ok(tx_hash) => StepOutcome::Submitted { height, tx_hash },
            Err(reason) => {
                error!(height, %reason, "could not settle round");
                StepOutcome::Abandoned { height, reason }
            }
        }
    }

    async fn settle(&self, height: u64, seed: &[u8]) -> Result<String, RoundFailure> {
        let output = self.prover.prove(seed)?;
        info!(
            height,
            proof = %hex::encode(&output.proof),
            hash = %hex::encode(output.hash),
            outcome = output.outcome(),
            "generated proof"
        );
        Ok(self.provider.submit_proof(height, &output.proof).await?)
    }

    /// How long to wait after `outcome` before the next probe.
    pub fn pause_after(&self, outcome: &StepOutcome) -> Duration {
        match outcome {
            StepOutcome::NotReady { .. } => self.pacing.retry_delay,
            _ if self.cursor.last_proved_block() > self.start_height => self.pacing.poll_interval,
            _ => Duration::ZERO,
        }
    }

    /// Probes blocks until `shutdown` turns `true` or its sender is dropped.
    /// Returns the final cursor.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RoundCursor {
        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            let outcome = self.step().await;
            let pause = self.pause_after(&outcome);
            if pause.is_zero() {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            last_proved_block = self.cursor.last_proved_block(),
            "catch-up stopped"
        );
        self.cursor
    }
}
