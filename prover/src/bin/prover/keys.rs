use anyhow::{bail, Context as _, Result};
use coinflip_vrf::{KeyPair, PublicKey};

use crate::cli::VerifyingKey;

/// Message bytes from the command line: hex if prefixed with `0x`, the UTF-8
/// text otherwise.
pub(crate) fn parse_message(msg: &str) -> Result<Vec<u8>> {
    match msg.strip_prefix("0x") {
        Some(digits) => hex::decode(digits).context("message is not valid hex"),
        None => Ok(msg.as_bytes().to_vec()),
    }
}

pub(crate) fn generate() -> Vec<String> {
    let keys = KeyPair::generate();
    vec![
        format!("Public key: {}", keys.public_key()),
        format!("Private key: {}", hex::encode(keys.to_bytes())),
    ]
}

pub(crate) fn prove(msg: &str, privkey: &str) -> Result<Vec<String>> {
    let keys = KeyPair::from_hex(privkey).context("invalid private key")?;
    let output = coinflip_vrf::prove(&keys, &parse_message(msg)?)?;
    Ok(vec![
        format!("Proof: {}", hex::encode(&output.proof)),
        format!("Hash: {}", hex::encode(output.hash)),
    ])
}

pub(crate) fn verify(msg: &str, proof: &str, key: &VerifyingKey) -> Result<String> {
    let public = verifying_key(key)?;
    let proof = hex::decode(proof.strip_prefix("0x").unwrap_or(proof))
        .context("proof is not valid hex")?;

    if !coinflip_vrf::verify(&public, &proof, &parse_message(msg)?) {
        return Ok("false".to_string());
    }
    let hash = coinflip_vrf::proof_to_hash(&proof)?;
    Ok(format!("true (outcome: {})", coinflip_vrf::outcome(&hash)))
}

fn verifying_key(key: &VerifyingKey) -> Result<PublicKey> {
    match (&key.pubkey, &key.privkey) {
        (Some(pubkey), _) => PublicKey::from_hex(pubkey).context("invalid public key"),
        (None, Some(privkey)) => Ok(KeyPair::from_hex(privkey)
            .context("invalid private key")?
            .public_key()),
        (None, None) => bail!("either --pubkey or --privkey is required"),
    }
}
