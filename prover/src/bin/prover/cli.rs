use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use coinflip_prover::endpoint::cli::{CliEndpointConfig, CliEngineConfig};

/// Proves and settles coin-flip rounds.
#[derive(Parser)]
#[command(version = coinflip_prover::version(), propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Follows the chain and submits a proof for every round that waits for
    /// one.
    Run {
        #[command(flatten)]
        endpoint: CliEndpointConfig,
        #[command(flatten)]
        engine: CliEngineConfig,
    },
    /// Proves every block seed from the chain head downwards and records the
    /// outcomes without submitting anything.
    Simulate {
        #[command(flatten)]
        endpoint: CliEndpointConfig,
        /// File receiving one line per simulated block.
        #[arg(short, long, default_value = "/tmp/simulation.txt", value_hint = ValueHint::FilePath)]
        output: PathBuf,
        /// Lowest block height to simulate.
        #[arg(long, default_value_t = 1)]
        lowest_block: u64,
    },
    /// Generates a new key pair.
    Gen,
    /// Proves a message.
    Prove {
        /// Text to prove, or binary data if prefixed with 0x.
        #[arg(long)]
        msg: String,
        /// Hex encoded 64-byte key pair.
        #[arg(long, env = "PROVER_PRIVKEY", hide_env_values = true)]
        privkey: String,
    },
    /// Verifies a proof of a message.
    Verify {
        /// Text the proof was made for, or binary data if prefixed with 0x.
        #[arg(long)]
        msg: String,
        /// Hex encoded proof.
        #[arg(long)]
        proof: String,
        #[command(flatten)]
        key: VerifyingKey,
    },
}

/// Public key the proof is checked against. `pubkey` wins over the one
/// derived from `privkey`.
#[derive(Args)]
pub(crate) struct VerifyingKey {
    /// Hex encoded 32-byte public key.
    #[arg(long)]
    pub(crate) pubkey: Option<String>,
    /// Hex encoded 64-byte key pair.
    #[arg(long, env = "PROVER_PRIVKEY", hide_env_values = true)]
    pub(crate) privkey: Option<String>,
}
