use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::ErrorKind;
use crate::blockchain::hash::{self, Hash256};
use crate::wallet::{CryptoContext, KeyPair, WalletError, address_of};
use secp256k1::PublicKey;

/// Width of the zero-padded `from` / `to` fields in the encoding.
pub const ACCOUNT_FIELD_LEN: usize = 64;

/// Longest account identifier; one byte of the field is left for a NUL.
pub const MAX_ACCOUNT_LEN: usize = ACCOUNT_FIELD_LEN - 1;

pub const MAX_SIGNATURE_LEN: usize = 128;

/// `from[64] | to[64] | amount f64 LE | signature_len u16 LE | signature[128]`
pub const TX_ENCODED_LEN: usize = ACCOUNT_FIELD_LEN * 2 + 8 + 2 + MAX_SIGNATURE_LEN;

/// Sender id used by coinbase transactions.
pub const COINBASE_SENDER: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Error, PartialEq)]
pub enum TransactionError {
    #[error("{field} is {len} bytes long (max {max})")]
    AccountTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{0} must not be empty or contain NUL bytes")]
    InvalidAccount(&'static str),

    #[error("amount must be finite and non-negative, got {0}")]
    InvalidAmount(f64),

    #[error("signature is {0} bytes long (max 128)")]
    SignatureTooLong(usize),

    #[error("coinbase transactions are created by the miner only")]
    UnexpectedCoinbase,

    #[error("sender {from} is not the address of the signing key ({address})")]
    SenderMismatch { from: String, address: String },

    #[error("missing or invalid signature")]
    BadSignature,

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),
}

impl TransactionError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TransactionError::Wallet(e) => e.kind(),
            _ => None,
        }
    }
}

/// A transfer between two accounts. Only the block payload as a whole is
/// committed to; transactions are not hashed on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: f64,
    /// DER ECDSA signature over [`Transaction::sighash`].
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

fn check_account(field: &'static str, value: &str) -> Result<(), TransactionError> {
    if value.is_empty() || value.as_bytes().contains(&0) {
        return Err(TransactionError::InvalidAccount(field));
    }
    if value.len() > MAX_ACCOUNT_LEN {
        return Err(TransactionError::AccountTooLong {
            field,
            len: value.len(),
            max: MAX_ACCOUNT_LEN,
        });
    }
    Ok(())
}

fn put_account(out: &mut Vec<u8>, value: &str) {
    let mut field = [0u8; ACCOUNT_FIELD_LEN];
    let len = value.len().min(MAX_ACCOUNT_LEN);
    field[..len].copy_from_slice(&value.as_bytes()[..len]);
    out.extend_from_slice(&field);
}

impl Transaction {
    /// Build an unsigned transaction, checking field bounds.
    pub fn new(from: &str, to: &str, amount: f64) -> Result<Self, TransactionError> {
        check_account("from", from)?;
        check_account("to", to)?;
        if !amount.is_finite() || amount < 0.0 {
            return Err(TransactionError::InvalidAmount(amount));
        }
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            // -0.0 and 0.0 must encode identically
            amount: if amount == 0.0 { 0.0 } else { amount },
            signature: Vec::new(),
        })
    }

    /// Reward transaction paying `amount` to `miner`.
    pub fn coinbase(miner: &str, amount: f64) -> Result<Self, TransactionError> {
        Self::new(COINBASE_SENDER, miner, amount)
    }

    pub fn is_coinbase(&self) -> bool {
        self.from == COINBASE_SENDER
    }

    /// Canonical signing payload: the encoding without the signature part.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ACCOUNT_FIELD_LEN * 2 + 8);
        put_account(&mut out, &self.from);
        put_account(&mut out, &self.to);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out
    }

    /// SHA-256 of the signing payload.
    pub fn sighash(&self) -> Hash256 {
        hash::sha256(&self.signing_payload())
    }

    /// Fixed-width encoding that goes into the block commitment.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signing_payload();
        out.reserve(2 + MAX_SIGNATURE_LEN);
        let len = self.signature.len().min(MAX_SIGNATURE_LEN);
        out.extend_from_slice(&(len as u16).to_le_bytes());
        let mut sig = [0u8; MAX_SIGNATURE_LEN];
        sig[..len].copy_from_slice(&self.signature[..len]);
        out.extend_from_slice(&sig);
        out
    }

    pub fn sign(&mut self, ctx: &CryptoContext, keys: &KeyPair) -> Result<(), TransactionError> {
        let signature = ctx.sign(keys, self.sighash().0)?;
        if signature.len() > MAX_SIGNATURE_LEN {
            return Err(TransactionError::SignatureTooLong(signature.len()));
        }
        self.signature = signature;
        Ok(())
    }

    /// True when the signature was produced by `public` over this content.
    pub fn verify_signature(&self, ctx: &CryptoContext, public: &PublicKey) -> bool {
        if self.signature.is_empty() {
            return false;
        }
        ctx.verify(public, self.sighash().0, &self.signature)
            .unwrap_or(false)
    }

    /// Accept a user transaction only when `public` owns `from` and signed
    /// this exact content. Coinbase transactions never come from users.
    pub fn authenticate(
        &self,
        ctx: &CryptoContext,
        public: &PublicKey,
    ) -> Result<(), TransactionError> {
        if self.is_coinbase() {
            return Err(TransactionError::UnexpectedCoinbase);
        }
        let address = address_of(public);
        if address != self.from {
            return Err(TransactionError::SenderMismatch {
                from: self.from.clone(),
                address,
            });
        }
        if !self.verify_signature(ctx, public) {
            return Err(TransactionError::BadSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_has_fixed_width() {
        let tx = Transaction::new("alice", "bob", 12.5).unwrap();
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), TX_ENCODED_LEN);
        assert_eq!(&bytes[..5], b"alice");
        assert!(bytes[5..64].iter().all(|&b| b == 0));
        assert_eq!(&bytes[64..67], b"bob");
        assert_eq!(&bytes[128..136], &12.5f64.to_le_bytes());
        assert_eq!(&bytes[136..138], &[0, 0]);
    }

    #[test]
    fn rejects_out_of_bounds_fields() {
        let long = "x".repeat(MAX_ACCOUNT_LEN + 1);
        assert_eq!(
            Transaction::new(&long, "bob", 1.0),
            Err(TransactionError::AccountTooLong {
                field: "from",
                len: 64,
                max: 63
            })
        );
        assert!(Transaction::new(&"y".repeat(MAX_ACCOUNT_LEN), "bob", 1.0).is_ok());
        assert_eq!(
            Transaction::new("alice", "", 1.0),
            Err(TransactionError::InvalidAccount("to"))
        );
        assert_eq!(
            Transaction::new("al\0ce", "bob", 1.0),
            Err(TransactionError::InvalidAccount("from"))
        );
        assert!(matches!(
            Transaction::new("alice", "bob", -1.0),
            Err(TransactionError::InvalidAmount(_))
        ));
        assert!(Transaction::new("alice", "bob", f64::NAN).is_err());
        assert!(Transaction::new("alice", "bob", f64::INFINITY).is_err());
    }

    #[test]
    fn negative_zero_encodes_like_zero() {
        let a = Transaction::new("alice", "bob", 0.0).unwrap();
        let b = Transaction::new("alice", "bob", -0.0).unwrap();
        assert_eq!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn coinbase_uses_zero_sender() {
        let tx = Transaction::coinbase("miner", 50.0).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.from.len(), 40);
        assert!(!Transaction::new("alice", "bob", 1.0).unwrap().is_coinbase());
    }

    #[test]
    fn signature_covers_content_but_not_itself() {
        let ctx = CryptoContext::new();
        let keys = ctx.generate_keypair().unwrap();
        let mut tx = Transaction::new("alice", "bob", 3.0).unwrap();
        let before = tx.sighash();
        assert!(!tx.verify_signature(&ctx, keys.public_key()));

        tx.sign(&ctx, &keys).unwrap();
        assert_eq!(tx.sighash(), before);
        assert!(tx.verify_signature(&ctx, keys.public_key()));
        assert_eq!(
            u16::from_le_bytes([tx.to_bytes()[136], tx.to_bytes()[137]]) as usize,
            tx.signature.len()
        );

        let mut forged = tx.clone();
        forged.amount = 300.0;
        assert!(!forged.verify_signature(&ctx, keys.public_key()));

        let other = ctx.generate_keypair().unwrap();
        assert!(!tx.verify_signature(&ctx, other.public_key()));
    }

    #[test]
    fn authenticate_checks_owner_and_signature() {
        let ctx = CryptoContext::new();
        let keys = ctx.generate_keypair().unwrap();
        let mut tx = Transaction::new(&keys.address(), "bob", 2.0).unwrap();
        assert_eq!(
            tx.authenticate(&ctx, keys.public_key()),
            Err(TransactionError::BadSignature)
        );

        tx.sign(&ctx, &keys).unwrap();
        assert_eq!(tx.authenticate(&ctx, keys.public_key()), Ok(()));

        let other = ctx.generate_keypair().unwrap();
        assert!(matches!(
            tx.authenticate(&ctx, other.public_key()),
            Err(TransactionError::SenderMismatch { .. })
        ));

        let mut coinbase = Transaction::coinbase("miner", 50.0).unwrap();
        coinbase.sign(&ctx, &keys).unwrap();
        assert_eq!(
            coinbase.authenticate(&ctx, keys.public_key()),
            Err(TransactionError::UnexpectedCoinbase)
        );
    }

    #[test]
    fn wallet_primitive_failure_keeps_its_kind() {
        let err = TransactionError::from(WalletError::PrimitiveUnavailable("rng".into()));
        assert_eq!(err.kind(), Some(ErrorKind::PrimitiveUnavailable));
        assert_eq!(TransactionError::BadSignature.kind(), None);
    }

    #[test]
    fn signature_bytes_change_the_encoding() {
        let mut a = Transaction::new("alice", "bob", 1.0).unwrap();
        let plain = a.to_bytes();
        a.signature = vec![0x30, 0x00];
        let signed = a.to_bytes();
        a.signature = vec![0x30];
        assert_ne!(plain, signed);
        assert_ne!(signed, a.to_bytes());
    }

    #[test]
    fn json_uses_hex_signature() {
        let mut tx = Transaction::new("alice", "bob", 1.0).unwrap();
        tx.signature = vec![0xde, 0xad];
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["signature"], "dead");
        let back: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
