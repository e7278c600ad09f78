//! Settles coin-flip rounds of an on-chain contract with verifiable random
//! function proofs over block seeds.

pub mod catch_up;
pub mod endpoint;
pub mod env;
pub mod provider;
pub mod rpc;
pub mod simulate;
pub mod tracing;

/// Common information for the `--version` CLI flag.
pub fn version() -> String {
    let pkg_name = env!("CARGO_PKG_NAME");
    let pkg_version = env!("CARGO_PKG_VERSION");
    format!("{pkg_name} {pkg_version} (keccak-256 vrf)")
}
