use std::time::Duration;

use clap::{Args, ValueHint};
use coinflip_vrf::KeyPair;
use url::Url;

use super::{ConfigError, EndpointConfig};
use crate::catch_up::Pacing;
use crate::provider::DEFAULT_MAX_FEE;
use crate::rpc::{http::HttpTransport, retry::build_http_retry_transport, TransportError};

const NODE_HELP_HEADING: &str = "Node options";
const ENGINE_HELP_HEADING: &str = "Polling options";

/// Node, contract and signing key settings shared by `run` and `simulate`.
#[derive(Args, Clone)]
pub struct CliEndpointConfig {
    /// URL of the node's JSON-RPC endpoint.
    #[arg(long, env = "PROVER_RPC_URL", help_heading = NODE_HELP_HEADING, value_hint = ValueHint::Url)]
    pub rpc_url: Url,
    /// Access key of the node.
    #[arg(long, env = "PROVER_RPC_KEY", help_heading = NODE_HELP_HEADING, hide_env_values = true)]
    pub rpc_key: String,
    /// Address that sends the proof transactions.
    #[arg(long, env = "PROVER_ADDRESS", help_heading = NODE_HELP_HEADING)]
    pub address: String,
    /// Address of the coin-flip contract.
    #[arg(long, env = "PROVER_CONTRACT", help_heading = NODE_HELP_HEADING)]
    pub contract: String,
    /// Hex encoded 64-byte key pair used to generate proofs.
    #[arg(long, env = "PROVER_PRIVKEY", hide_env_values = true)]
    pub privkey: String,
    /// Backoff in milliseconds before resending a request the node did not
    /// answer.
    #[arg(long, env = "PROVER_BACKOFF", help_heading = NODE_HELP_HEADING, default_value_t = 0)]
    pub backoff: u64,
    /// The maximum number of resends per request.
    #[arg(long, env = "PROVER_MAX_RETRIES", help_heading = NODE_HELP_HEADING, default_value_t = 0)]
    pub max_retries: u32,
    /// Per-request timeout in seconds.
    #[arg(long, env = "PROVER_TIMEOUT", help_heading = NODE_HELP_HEADING, default_value_t = 30)]
    pub timeout: u64,
}

impl CliEndpointConfig {
    /// Validates the settings and decodes the signing key.
    pub fn into_parts(self) -> Result<(EndpointConfig, KeyPair), ConfigError> {
        let keys = KeyPair::from_hex(&self.privkey)?;
        let endpoint = EndpointConfig::new(self.rpc_url, self.rpc_key, self.address, self.contract)?;
        Ok((endpoint, keys))
    }

    pub fn transport(&self) -> Result<HttpTransport, TransportError> {
        build_http_retry_transport(
            self.rpc_url.clone(),
            Duration::from_secs(self.timeout),
            self.backoff,
            self.max_retries,
        )
    }
}

/// Cadence and fee settings of the polling engine.
#[derive(Args, Clone, Debug)]
pub struct CliEngineConfig {
    /// Fee ceiling for each proof transaction.
    #[arg(long, env = "PROVER_MAX_FEE", help_heading = ENGINE_HELP_HEADING, default_value_t = DEFAULT_MAX_FEE)]
    pub max_fee: u64,
    /// Milliseconds to wait before probing a block again after a failed
    /// probe.
    #[arg(long, env = "PROVER_RETRY_DELAY", help_heading = ENGINE_HELP_HEADING, default_value_t = 2000)]
    pub retry_delay: u64,
    /// Milliseconds between probes once the prover has caught up with the
    /// chain.
    #[arg(long, env = "PROVER_POLL_INTERVAL", help_heading = ENGINE_HELP_HEADING, default_value_t = 3000)]
    pub poll_interval: u64,
}

impl From<&CliEngineConfig> for Pacing {
    fn from(cli: &CliEngineConfig) -> Self {
        Self {
            retry_delay: Duration::from_millis(cli.retry_delay),
            poll_interval: Duration::from_millis(cli.poll_interval),
        }
    }
}
