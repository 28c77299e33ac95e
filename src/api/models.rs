use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::blockchain::{
    Block, BlockHeader, Blockchain, CancelFlag, ChainError, ErrorKind, Hash256, LedgerError,
    Payload,
};
use crate::config::{Config, MiningSettings};
use crate::transaction::{Transaction, TransactionError};
use crate::wallet::{CryptoContext, WalletError};

/// Open templates kept at once; the oldest is evicted past this.
pub const MAX_OPEN_TEMPLATES: usize = 256;

#[derive(Clone)]
pub struct MiningTemplate {
    pub template_id: String,
    pub header: BlockHeader, // nonce 0, difficulty fixed at issue time
    pub payload: Payload,
    pub issued: Instant,
}

/// Shared application state around the single authoritative chain.
pub struct AppState {
    pub blockchain: Mutex<Blockchain>,
    pub mining_templates: Mutex<HashMap<String, MiningTemplate>>,
    /// Tripped whenever the tail moves, stopping searches on the old tail.
    pub head_cancel: Mutex<CancelFlag>,
    pub mining: MiningSettings,
    pub crypto: CryptoContext,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            blockchain: Mutex::new(Blockchain::new(config.difficulty)),
            mining_templates: Mutex::new(HashMap::new()),
            head_cancel: Mutex::new(CancelFlag::new()),
            mining: config.mining,
            crypto: CryptoContext::new(),
        }
    }

    /// Candidate on the current tail plus a flag that trips when that tail is
    /// replaced or the configured timeout passes.
    pub fn start_search(&self, payload: &Payload) -> (BlockHeader, CancelFlag) {
        let bc = self.blockchain.lock().expect("mutex poisoned");
        let head = self.head_cancel.lock().expect("mutex poisoned");
        let flag = head.clone().with_deadline(Instant::now() + self.mining.timeout);
        (bc.candidate(payload), flag)
    }

    /// Append under the chain lock; on success stop stale searches and drop
    /// templates that no longer extend the tail.
    pub fn append(&self, block: Block) -> Result<(u32, Hash256), ChainError> {
        let (index, tail_hash) = {
            let mut bc = self.blockchain.lock().expect("mutex poisoned");
            bc.append(block)?;
            let stale = std::mem::take(&mut *self.head_cancel.lock().expect("mutex poisoned"));
            stale.cancel();
            let tail = bc.last_block();
            (tail.header.index, tail.hash)
        };

        let mut templates = self.mining_templates.lock().expect("mutex poisoned");
        templates.retain(|_, t| t.header.previous_hash == tail_hash);
        Ok((index, tail_hash))
    }

    /// Store a template, dropping expired ones and evicting the oldest when
    /// the map is full. Returns how many templates are open afterwards.
    pub fn insert_template(&self, template: MiningTemplate) -> usize {
        let ttl = self.mining.timeout;
        let mut templates = self.mining_templates.lock().expect("mutex poisoned");
        templates.retain(|_, t| t.issued.elapsed() < ttl);
        while templates.len() >= MAX_OPEN_TEMPLATES {
            let oldest = templates
                .values()
                .min_by_key(|t| t.issued)
                .map(|t| t.template_id.clone());
            match oldest {
                Some(id) => templates.remove(&id),
                None => break,
            };
        }
        templates.insert(template.template_id.clone(), template);
        templates.len()
    }

    /// Remove and return a template that has not expired yet. Templates are
    /// single use.
    pub fn take_template(&self, template_id: &str) -> Option<MiningTemplate> {
        let mut templates = self.mining_templates.lock().expect("mutex poisoned");
        templates
            .remove(template_id)
            .filter(|t| t.issued.elapsed() < self.mining.timeout)
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: Option<ErrorKind>,
    pub position: Option<usize>,
}

impl ErrorResponse {
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
            position: None,
        }
    }

    fn with_kind(error: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        Self {
            kind,
            ..Self::message(error)
        }
    }
}

impl From<ChainError> for ErrorResponse {
    fn from(e: ChainError) -> Self {
        Self {
            error: e.to_string(),
            kind: Some(e.kind),
            position: Some(e.position),
        }
    }
}

impl From<LedgerError> for ErrorResponse {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Chain(e) => e.into(),
            other => Self::with_kind(other.to_string(), other.kind()),
        }
    }
}

impl From<WalletError> for ErrorResponse {
    fn from(e: WalletError) -> Self {
        Self::with_kind(e.to_string(), e.kind())
    }
}

impl From<TransactionError> for ErrorResponse {
    fn from(e: TransactionError) -> Self {
        Self::with_kind(e.to_string(), e.kind())
    }
}

/* ---------- Transaction API Models ---------- */

/// A user transaction plus the hex uncompressed key that signed it.
#[derive(Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub public_key: String,
}

/// Dev helper body: sign a transfer from the address of `secret_key`.
#[derive(Deserialize)]
pub struct SignTxRequest {
    pub secret_key: String,
    pub to: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct SignTxResponse {
    pub transaction: Transaction,
    pub public_key: String,
}

/* ---------- Mining API Models ---------- */

#[derive(Deserialize)]
pub struct TemplateRequest {
    pub data: Option<String>,
    pub miner_address: Option<String>,
    #[serde(default)]
    pub transactions: Vec<SignedTransaction>,
}

#[derive(Serialize)]
pub struct TemplateResponse {
    pub template_id: String,
    pub index: u32,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u64,
    pub difficulty: u32,
    /// Serialized header with nonce 0; the nonce is the last 4 bytes (LE).
    pub header_hex: String,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub template_id: String,
    pub nonce: u32,
    pub hash: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub mined_index: Option<u32>,
    pub hash: Option<Hash256>,
    pub difficulty: Option<u32>,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse<'a> {
    pub length: usize,
    pub difficulty: u32,
    pub chain: &'a [Block],
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub length: usize,
    pub difficulty: u32,
    pub failure: Option<ErrorResponse>,
}

/// Body for `/mine/`: raw `data`, or a transaction block made of an optional
/// coinbase paying `miner_address` followed by signed `transactions`.
#[derive(Deserialize)]
pub struct MineRequest {
    pub data: Option<String>,
    pub miner_address: Option<String>,
    #[serde(default)]
    pub transactions: Vec<SignedTransaction>,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub mined_index: u32,
    pub hash: Hash256,
    pub nonce: u32,
    pub difficulty: u32,
}

#[derive(Serialize)]
pub struct DifficultyResponse {
    pub difficulty: u32,
}

#[derive(Deserialize)]
pub struct SetDifficultyRequest {
    pub difficulty: u32,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub height: usize,
    pub difficulty: u32,
    pub tail_hash: Hash256,
    pub stats_window: usize,
    pub last_interval_secs: Option<u64>,
    pub avg_interval_secs: Option<f64>,
    pub open_templates: usize,
}
