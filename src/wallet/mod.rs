//! secp256k1 key handling and ECDSA signing for transactions.
//!
//! A single [`CryptoContext`] is created at startup and dropped at shutdown;
//! every key operation goes through it.

use log::{debug, info};
use rand::RngCore;
use rand::rngs::OsRng;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey, ecdsa::Signature};
use std::fmt;
use thiserror::Error;

use crate::blockchain::{ErrorKind, hash};

/// Length of an uncompressed SEC1 public key (`0x04 | X | Y`).
pub const EC_PUB_LEN: usize = 65;

/// Bytes of the key hash kept as the account address.
pub const ADDRESS_LEN: usize = 20;

// A random 32-byte string is an invalid scalar with probability ~2^-128.
const KEYGEN_RETRIES: usize = 4;

#[derive(Debug, Error, PartialEq)]
pub enum WalletError {
    #[error("cryptographic primitive unavailable: {0}")]
    PrimitiveUnavailable(String),

    #[error("invalid public key encoding")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl WalletError {
    /// Chain-level classification, when there is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            WalletError::PrimitiveUnavailable(_) => Some(ErrorKind::PrimitiveUnavailable),
            _ => None,
        }
    }
}

/// Generated keypair. The secret never leaves this type except through
/// [`KeyPair::secret_hex`].
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    #[cfg(test)]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Uncompressed public point, exactly [`EC_PUB_LEN`] bytes.
    pub fn to_pub(&self) -> [u8; EC_PUB_LEN] {
        self.public.serialize_uncompressed()
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.secret_bytes())
    }

    pub fn address(&self) -> String {
        address_of(&self.public)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.to_pub()))
            .finish_non_exhaustive()
    }
}

/// Process-wide secp256k1 context.
pub struct CryptoContext {
    secp: Secp256k1<All>,
}

impl CryptoContext {
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        info!("secp256k1 context initialised");
        Self { secp }
    }

    pub fn generate_keypair(&self) -> Result<KeyPair, WalletError> {
        let mut seed = [0u8; 32];
        for _ in 0..KEYGEN_RETRIES {
            OsRng
                .try_fill_bytes(&mut seed)
                .map_err(|e| WalletError::PrimitiveUnavailable(e.to_string()))?;
            if let Ok(secret) = SecretKey::from_slice(&seed) {
                let public = PublicKey::from_secret_key(&self.secp, &secret);
                return Ok(KeyPair { secret, public });
            }
        }
        Err(WalletError::PrimitiveUnavailable(
            "entropy source kept yielding invalid scalars".into(),
        ))
    }

    /// Rebuild a keypair from a hex-encoded 32-byte secret.
    pub fn keypair_from_secret_hex(&self, secret_hex: &str) -> Result<KeyPair, WalletError> {
        let bytes = hex::decode(secret_hex.trim())?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| WalletError::InvalidSecretKey)?;
        let public = PublicKey::from_secret_key(&self.secp, &secret);
        Ok(KeyPair { secret, public })
    }

    /// DER signature over a 32-byte digest.
    pub fn sign(&self, keys: &KeyPair, digest: [u8; 32]) -> Result<Vec<u8>, WalletError> {
        let msg = Message::from_digest_slice(&digest)
            .map_err(|e| WalletError::PrimitiveUnavailable(e.to_string()))?;
        let sig = self.secp.sign_ecdsa(&msg, &keys.secret);
        Ok(sig.serialize_der().to_vec())
    }

    /// Verify a DER signature. `Ok(false)` means well-formed but wrong.
    pub fn verify(
        &self,
        public: &PublicKey,
        digest: [u8; 32],
        signature_der: &[u8],
    ) -> Result<bool, WalletError> {
        let sig = Signature::from_der(signature_der).map_err(|_| WalletError::InvalidSignature)?;
        let msg = Message::from_digest_slice(&digest)
            .map_err(|e| WalletError::PrimitiveUnavailable(e.to_string()))?;
        Ok(self.secp.verify_ecdsa(&msg, &sig, public).is_ok())
    }
}

impl Default for CryptoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CryptoContext {
    fn drop(&mut self) {
        debug!("secp256k1 context released");
    }
}

/// Parse an uncompressed public point. Anything that is not exactly
/// [`EC_PUB_LEN`] bytes starting with `0x04` is rejected.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, WalletError> {
    if bytes.len() != EC_PUB_LEN || bytes[0] != 0x04 {
        return Err(WalletError::InvalidPublicKey);
    }
    PublicKey::from_slice(bytes).map_err(|_| WalletError::InvalidPublicKey)
}

/// Hex of the first [`ADDRESS_LEN`] bytes of SHA-256 over the uncompressed key.
pub fn address_of(public: &PublicKey) -> String {
    let digest = hash::sha256(&public.serialize_uncompressed());
    hex::encode(&digest.0[..ADDRESS_LEN])
}

/// Generate a new keypair and return (priv_hex, pub_hex_uncompressed, address_hex).
pub fn generate_keypair_hex(ctx: &CryptoContext) -> Result<(String, String, String), WalletError> {
    let keys = ctx.generate_keypair()?;
    Ok((keys.secret_hex(), hex::encode(keys.to_pub()), keys.address()))
}

/// Parse a hex uncompressed public key.
pub fn public_key_from_hex(pubkey_hex: &str) -> Result<PublicKey, WalletError> {
    let bytes = hex::decode(pubkey_hex.trim())?;
    public_key_from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_round_trips_through_bytes() {
        let ctx = CryptoContext::new();
        let keys = ctx.generate_keypair().unwrap();
        let bytes = keys.to_pub();
        assert_eq!(bytes.len(), EC_PUB_LEN);
        assert_eq!(bytes[0], 0x04);
        let back = public_key_from_bytes(&bytes).unwrap();
        assert_eq!(&back, keys.public_key());
    }

    #[test]
    fn malformed_public_keys_are_rejected() {
        let ctx = CryptoContext::new();
        let keys = ctx.generate_keypair().unwrap();
        let compressed = keys.public_key().serialize();
        assert_eq!(
            public_key_from_bytes(&compressed),
            Err(WalletError::InvalidPublicKey)
        );
        let mut off_curve = keys.to_pub();
        off_curve[64] ^= 0x01;
        assert_eq!(
            public_key_from_bytes(&off_curve),
            Err(WalletError::InvalidPublicKey)
        );
        assert_eq!(
            public_key_from_bytes(&[0u8; EC_PUB_LEN]),
            Err(WalletError::InvalidPublicKey)
        );
    }

    #[test]
    fn sign_and_verify() {
        let ctx = CryptoContext::new();
        let keys = ctx.generate_keypair().unwrap();
        let digest = hash::sha256(b"payload").0;
        let sig = ctx.sign(&keys, digest).unwrap();
        assert!(ctx.verify(keys.public_key(), digest, &sig).unwrap());

        let other = hash::sha256(b"other").0;
        assert!(!ctx.verify(keys.public_key(), other, &sig).unwrap());
        assert_eq!(
            ctx.verify(keys.public_key(), digest, &[0x01, 0x02]),
            Err(WalletError::InvalidSignature)
        );
    }

    #[test]
    fn hex_helpers_agree() {
        let ctx = CryptoContext::new();
        let (sk, pk, addr) = generate_keypair_hex(&ctx).unwrap();
        assert_eq!(sk.len(), 64);
        assert_eq!(pk.len(), EC_PUB_LEN * 2);
        assert_eq!(addr.len(), ADDRESS_LEN * 2);
        assert_eq!(address_of(&public_key_from_hex(&pk).unwrap()), addr);
        assert!(matches!(
            public_key_from_hex("zz"),
            Err(WalletError::InvalidHex(_))
        ));

        let keys = ctx.keypair_from_secret_hex(&sk).unwrap();
        assert_eq!(hex::encode(keys.to_pub()), pk);
        assert_eq!(keys.address(), addr);
    }

    #[test]
    fn bad_secrets_are_rejected() {
        let ctx = CryptoContext::new();
        assert_eq!(
            ctx.keypair_from_secret_hex(&"00".repeat(32)).unwrap_err(),
            WalletError::InvalidSecretKey
        );
        assert_eq!(
            ctx.keypair_from_secret_hex("abcd").unwrap_err(),
            WalletError::InvalidSecretKey
        );
        assert!(matches!(
            ctx.keypair_from_secret_hex("xyz"),
            Err(WalletError::InvalidHex(_))
        ));
    }

    #[test]
    fn only_primitive_failures_map_to_a_chain_kind() {
        assert_eq!(
            WalletError::PrimitiveUnavailable("rng".into()).kind(),
            Some(ErrorKind::PrimitiveUnavailable)
        );
        assert_eq!(WalletError::InvalidSignature.kind(), None);
    }

    #[test]
    fn debug_hides_secret() {
        let ctx = CryptoContext::new();
        let keys = ctx.generate_keypair().unwrap();
        let shown = format!("{keys:?}");
        assert!(!shown.contains(&keys.secret_hex()));
    }
}
