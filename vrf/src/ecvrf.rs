use curve25519_dalek::constants::ED25519_BASEPOINT_COMPRESSED;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::Scalar;
use sha2::{Digest, Sha512};
use tiny_keccak::{Hasher, Keccak};

use crate::{KeyPair, PublicKey, VrfError};

/// `sign (1) || Gamma (32) || c (16) || s (32)`, integers big-endian.
pub const PROOF_LENGTH: usize = 81;
/// The hash is the compressed `Gamma` point carried by the proof.
pub const HASH_LENGTH: usize = 32;

const CHALLENGE_LENGTH: usize = 16;
const HASH_TO_CURVE_ATTEMPTS: u32 = 100;

/// A proof together with the hash it commits to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VrfOutput {
    pub proof: Vec<u8>,
    pub hash: [u8; HASH_LENGTH],
}

impl VrfOutput {
    pub fn outcome(&self) -> u8 {
        outcome(&self.hash)
    }
}

/// Coin side decided by a VRF hash: the low bit of its first byte.
pub fn outcome(hash: &[u8; HASH_LENGTH]) -> u8 {
    hash[0] % 2
}

/// Proves `alpha` with `keys`. Deterministic: the same key and message always
/// yield the same proof.
pub fn prove(keys: &KeyPair, alpha: &[u8]) -> Result<VrfOutput, VrfError> {
    let (x, nonce_prefix) = keys.expand();
    let public = keys.public_key();

    let h = hash_to_curve(&public, alpha)?;
    let gamma = (h * x).compress();
    let k = nonce(&nonce_prefix, &h);
    let c = challenge(
        &public,
        &h,
        &gamma,
        &EdwardsPoint::mul_base(&k).compress(),
        &(h * k).compress(),
    );
    let s = k - challenge_scalar(&c) * x;

    let mut proof = Vec::with_capacity(PROOF_LENGTH);
    proof.extend_from_slice(&with_sign_octet(gamma.as_bytes()));
    proof.extend_from_slice(&c);
    proof.extend(s.as_bytes().iter().rev());

    Ok(VrfOutput {
        proof,
        hash: gamma.to_bytes(),
    })
}

/// Checks that `proof` was produced for `alpha` by the holder of `public`.
pub fn verify(public: &PublicKey, proof: &[u8], alpha: &[u8]) -> bool {
    let Some(y) = public.point() else {
        return false;
    };
    if y.is_small_order() {
        return false;
    }
    let Some(decoded) = DecodedProof::new(proof) else {
        return false;
    };
    let Ok(h) = hash_to_curve(public, alpha) else {
        return false;
    };

    let c = challenge_scalar(&decoded.c);
    let u = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &y, &decoded.s);
    let v = decoded.gamma * c + h * decoded.s;
    challenge(public, &h, &decoded.gamma.compress(), &u.compress(), &v.compress()) == decoded.c
}

/// Hash committed to by `proof`. Only the layout is checked, not the proof.
pub fn proof_to_hash(proof: &[u8]) -> Result<[u8; HASH_LENGTH], VrfError> {
    let decoded = DecodedProof::new(proof).ok_or(VrfError::InvalidProof(proof.len()))?;
    Ok(decoded.gamma_bytes)
}

struct DecodedProof {
    gamma: EdwardsPoint,
    gamma_bytes: [u8; HASH_LENGTH],
    c: [u8; CHALLENGE_LENGTH],
    s: Scalar,
}

impl DecodedProof {
    fn new(proof: &[u8]) -> Option<Self> {
        if proof.len() != PROOF_LENGTH {
            return None;
        }
        let sign = match proof[0] {
            sign @ (0x02 | 0x03) => sign - 0x02,
            _ => return None,
        };

        let gamma_bytes: [u8; 32] = proof[1..33].try_into().ok()?;
        let mut encoded = gamma_bytes;
        encoded[31] = (sign << 7) | (encoded[31] & 0x7f);
        let gamma = CompressedEdwardsY(encoded).decompress()?;

        let c: [u8; CHALLENGE_LENGTH] = proof[33..49].try_into().ok()?;
        let mut s = [0u8; 32];
        s.iter_mut()
            .zip(proof[49..].iter().rev())
            .for_each(|(dst, src)| *dst = *src);

        Some(Self {
            gamma,
            gamma_bytes,
            c,
            s: Scalar::from_bytes_mod_order(s),
        })
    }
}

/// Try-and-increment: the first Keccak-256 of `alpha || pk || counter` that
/// decodes as a curve point, with the cofactor cleared.
fn hash_to_curve(public: &PublicKey, alpha: &[u8]) -> Result<EdwardsPoint, VrfError> {
    for counter in 0..HASH_TO_CURVE_ATTEMPTS {
        let candidate = keccak256(&[alpha, public.as_bytes(), &counter.to_be_bytes()]);
        if let Some(point) = CompressedEdwardsY(candidate).decompress() {
            return Ok(point.mul_by_cofactor());
        }
    }
    Err(VrfError::HashToCurve)
}

fn nonce(prefix: &[u8; 32], h: &EdwardsPoint) -> Scalar {
    let digest = Sha512::new()
        .chain_update(prefix)
        .chain_update(h.compress().as_bytes())
        .finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// First 16 bytes of the Keccak-256 over the sign-prefixed encodings of
/// `B, H, Y, Gamma, U, V`, read as a big-endian integer.
fn challenge(
    public: &PublicKey,
    h: &EdwardsPoint,
    gamma: &CompressedEdwardsY,
    u: &CompressedEdwardsY,
    v: &CompressedEdwardsY,
) -> [u8; CHALLENGE_LENGTH] {
    let points = [
        with_sign_octet(ED25519_BASEPOINT_COMPRESSED.as_bytes()),
        with_sign_octet(h.compress().as_bytes()),
        with_sign_octet(public.as_bytes()),
        with_sign_octet(gamma.as_bytes()),
        with_sign_octet(u.as_bytes()),
        with_sign_octet(v.as_bytes()),
    ];
    let parts: Vec<&[u8]> = points.iter().map(|it| it.as_slice()).collect();
    let digest = keccak256(&parts);

    let mut c = [0u8; CHALLENGE_LENGTH];
    c.copy_from_slice(&digest[..CHALLENGE_LENGTH]);
    c
}

fn challenge_scalar(c: &[u8; CHALLENGE_LENGTH]) -> Scalar {
    let mut bytes = [0u8; 32];
    bytes[..CHALLENGE_LENGTH]
        .iter_mut()
        .zip(c.iter().rev())
        .for_each(|(dst, src)| *dst = *src);
    Scalar::from_bytes_mod_order(bytes)
}

/// `0x02` or `0x03` depending on the x sign bit, followed by the encoding
/// itself (sign bit left in place).
fn with_sign_octet(encoded: &[u8; 32]) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = 0x02 + (encoded[31] >> 7);
    out[1..].copy_from_slice(encoded);
    out
}

fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}
