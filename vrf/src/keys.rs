use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::Scalar;
use ed25519_dalek::{SigningKey, KEYPAIR_LENGTH, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use sha2::{Digest, Sha512};

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("invalid hex in key: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected a {expected}-byte key, got {actual} bytes")]
    Length { expected: usize, actual: usize },
    #[error("public half of the key pair does not match its secret half")]
    Mismatch,
    #[error("public key is not a valid curve point")]
    InvalidPoint,
}

/// Signing key pair, stored in the ed25519 `seed || public key` layout.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    pub fn from_secret(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing: SigningKey::from_bytes(secret),
        }
    }

    /// Decodes the 64-byte `seed || public key` layout, rejecting pairs whose
    /// halves disagree.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: &[u8; KEYPAIR_LENGTH] = bytes.try_into().map_err(|_| KeyError::Length {
            expected: KEYPAIR_LENGTH,
            actual: bytes.len(),
        })?;
        let signing = SigningKey::from_keypair_bytes(bytes).map_err(|_| KeyError::Mismatch)?;
        Ok(Self { signing })
    }

    /// Like [`KeyPair::from_bytes`], from hex text with an optional `0x`
    /// prefix.
    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&decode_hex(text)?)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; KEYPAIR_LENGTH] {
        self.signing.to_keypair_bytes()
    }

    /// Secret scalar and nonce prefix, expanded from the seed the same way
    /// ed25519 does.
    pub(crate) fn expand(&self) -> (Scalar, [u8; 32]) {
        let digest = Sha512::digest(self.signing.as_bytes());
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&digest[..32]);
        scalar_bytes[0] &= 248;
        scalar_bytes[31] &= 127;
        scalar_bytes[31] |= 64;

        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&digest[32..]);
        (Scalar::from_bytes_mod_order(scalar_bytes), prefix)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::Length {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            })?;
        if CompressedEdwardsY(bytes).decompress().is_none() {
            return Err(KeyError::InvalidPoint);
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(text: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&decode_hex(text)?)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }

    pub(crate) fn point(&self) -> Option<EdwardsPoint> {
        CompressedEdwardsY(self.0).decompress()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let text = text.trim();
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
}
