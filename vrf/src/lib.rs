//! Verifiable random function used to settle coin-flip rounds.
//!
//! The prover publishes, for every round that received bets, a proof that the
//! round outcome was derived from the block seed with a key whose public half
//! is pinned in the contract. Anyone holding the public key can check the
//! proof with [`verify`] and recompute the outcome with [`proof_to_hash`] and
//! [`outcome`].
//!
//! The construction is the edwards25519 VRF checked on chain by the contract:
//! Keccak-256 try-and-increment hash-to-curve, a 16-byte challenge and
//! 81-byte proofs whose hash is the compressed `Gamma` point. Key pairs use
//! the ed25519 64-byte `seed || public key` layout so keys produced by common
//! ed25519 tooling can be used directly.

mod ecvrf;
mod keys;

pub use ecvrf::{outcome, proof_to_hash, prove, verify, VrfOutput, HASH_LENGTH, PROOF_LENGTH};
pub use keys::{KeyError, KeyPair, PublicKey};

/// Errors raised while producing or decoding proofs.
#[derive(Debug, thiserror::Error)]
pub enum VrfError {
    #[error("proof must be {PROOF_LENGTH} bytes with a valid curve point, got {0} bytes")]
    InvalidProof(usize),
    #[error("no curve point found for the message after 100 attempts")]
    HashToCurve,
}
