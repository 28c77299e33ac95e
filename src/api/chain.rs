use actix_web::{HttpResponse, Responder, get, post, web};
use log::{debug, info, warn};

use super::models::{
    AppState, ChainResponse, DifficultyResponse, ErrorResponse, MineRequest, MineResponse,
    SetDifficultyRequest, SignedTransaction, ValidateResponse,
};
use super::tx::authenticate_all;
use crate::blockchain::{BASE_REWARD, Block, DIFF_MAX, LedgerError, MiningError, Payload, miner};
use crate::transaction::Transaction;

/// Largest raw payload accepted over the API.
pub const MAX_DATA_LEN: usize = 1024;

/// Get the full blockchain.
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    let resp = ChainResponse {
        length: bc.len(),
        difficulty: bc.difficulty(),
        chain: bc.blocks(),
    };
    HttpResponse::Ok().json(resp)
}

#[get("/chain/{index}/")]
pub async fn get_block(state: web::Data<AppState>, path: web::Path<(usize,)>) -> impl Responder {
    let index = path.into_inner().0;
    let bc = state.blockchain.lock().expect("mutex poisoned");
    match bc.get(index) {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().json(ErrorResponse::message(format!(
            "no block at index {index} (height {})",
            bc.len()
        ))),
    }
}

/// Validate the whole chain.
#[get("/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    let result = bc.verify();
    if let Err(e) = &result {
        warn!("VALIDATE - {e}");
    }
    HttpResponse::Ok().json(ValidateResponse {
        valid: result.is_ok(),
        length: bc.len(),
        difficulty: bc.difficulty(),
        failure: result.err().map(ErrorResponse::from),
    })
}

/// Mine a new block:
/// - Build the payload (raw data, or coinbase + authenticated transactions)
/// - Snapshot a candidate on the current tail
/// - Mine PoW off the chain lock
/// - Append; a block that lost the race is reported as stale
#[post("/mine/")]
pub async fn mine_block(state: web::Data<AppState>, req: web::Json<MineRequest>) -> impl Responder {
    let MineRequest {
        data,
        miner_address,
        transactions,
    } = req.into_inner();
    let payload = match request_payload(&state, data, miner_address, transactions) {
        Ok(p) => p,
        Err(msg) => return HttpResponse::BadRequest().json(ErrorResponse::message(msg)),
    };

    // snapshot the tail; the chain lock is released before PoW
    let (candidate, cancel) = state.start_search(&payload);
    let difficulty = candidate.difficulty;
    let settings = state.mining;
    debug!(
        "MINER - candidate #{} on {} (diff={}, workers={})",
        candidate.index, candidate.previous_hash, difficulty, settings.workers
    );

    let outcome = web::block(move || {
        miner::mine_parallel(
            candidate,
            difficulty,
            settings.max_attempts,
            settings.workers,
            &cancel,
        )
    })
    .await;

    let (header, hash) = match outcome {
        Ok(Ok(found)) => found,
        Ok(Err(e @ MiningError::Cancelled { .. })) => {
            warn!("MINER - {e}");
            return HttpResponse::Conflict().json(ErrorResponse::from(LedgerError::from(e)));
        }
        Ok(Err(e)) => {
            warn!("MINER - {e}");
            return HttpResponse::ServiceUnavailable()
                .json(ErrorResponse::from(LedgerError::from(e)));
        }
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::message(format!("mining worker failed: {e}")));
        }
    };

    match state.append(Block::seal(header, payload, hash)) {
        Ok((index, hash)) => {
            info!("MINER - accepted block #{index} (hash={hash}, nonce={})", header.nonce);
            HttpResponse::Ok().json(MineResponse {
                mined_index: index,
                hash,
                nonce: header.nonce,
                difficulty,
            })
        }
        Err(e) => HttpResponse::Conflict().json(ErrorResponse::from(e)),
    }
}

/// Get current PoW difficulty.
#[get("/difficulty/")]
pub async fn get_difficulty(state: web::Data<AppState>) -> impl Responder {
    let bc = state.blockchain.lock().expect("mutex poisoned");
    HttpResponse::Ok().json(DifficultyResponse {
        difficulty: bc.difficulty(),
    })
}

/// Update PoW difficulty (affects future blocks only).
#[post("/difficulty/")]
pub async fn set_difficulty(
    state: web::Data<AppState>,
    body: web::Json<SetDifficultyRequest>,
) -> impl Responder {
    if body.difficulty > DIFF_MAX {
        return HttpResponse::BadRequest().json(ErrorResponse::message(format!(
            "difficulty too high for dev mode (max {DIFF_MAX})"
        )));
    }
    let mut bc = state.blockchain.lock().expect("mutex poisoned");
    bc.set_difficulty(body.difficulty);
    info!("difficulty set to {}", body.difficulty);
    HttpResponse::Ok().json(DifficultyResponse {
        difficulty: bc.difficulty(),
    })
}

/* -------------------- Helpers -------------------- */

/// Authenticate any submitted transactions, then build the payload.
pub(super) fn request_payload(
    state: &AppState,
    data: Option<String>,
    miner_address: Option<String>,
    transactions: Vec<SignedTransaction>,
) -> Result<Payload, String> {
    let txs = authenticate_all(&state.crypto, transactions)?;
    build_payload(data.as_deref(), miner_address.as_deref(), txs)
}

/// Raw `data` stands alone. Otherwise the block carries an optional coinbase
/// paying `miner_address`, followed by `txs`.
fn build_payload(
    data: Option<&str>,
    miner_address: Option<&str>,
    txs: Vec<Transaction>,
) -> Result<Payload, String> {
    if let Some(data) = data {
        if !txs.is_empty() {
            return Err("data and transactions cannot be combined".to_string());
        }
        if data.len() > MAX_DATA_LEN {
            return Err(format!("data too large: {} bytes (max {MAX_DATA_LEN})", data.len()));
        }
        return Ok(Payload::Raw(data.as_bytes().to_vec()));
    }

    let mut block_txs = Vec::with_capacity(txs.len() + 1);
    if let Some(addr) = miner_address.map(str::trim).filter(|a| !a.is_empty()) {
        block_txs.push(Transaction::coinbase(addr, BASE_REWARD).map_err(|e| e.to_string())?);
    }
    block_txs.extend(txs);
    if block_txs.is_empty() {
        return Err("data, miner_address or transactions required".to_string());
    }
    Ok(Payload::Transactions(block_txs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_data_takes_precedence() {
        let p = build_payload(Some("hello"), Some("miner"), Vec::new()).unwrap();
        assert_eq!(p, Payload::Raw(b"hello".to_vec()));
    }

    #[test]
    fn miner_address_builds_coinbase() {
        let p = build_payload(None, Some(" miner "), Vec::new()).unwrap();
        let txs = p.transactions();
        assert_eq!(txs.len(), 1);
        assert!(txs[0].is_coinbase());
        assert_eq!(txs[0].to, "miner");
        assert_eq!(txs[0].amount, BASE_REWARD);
    }

    #[test]
    fn rejects_missing_and_oversized_input() {
        assert!(build_payload(None, None, Vec::new()).is_err());
        assert!(build_payload(None, Some("  "), Vec::new()).is_err());
        assert!(build_payload(Some(&"x".repeat(MAX_DATA_LEN + 1)), None, Vec::new()).is_err());
        assert!(build_payload(None, Some(&"m".repeat(80)), Vec::new()).is_err());
    }

    #[test]
    fn coinbase_comes_before_user_transactions() {
        let transfer = Transaction::new("alice", "bob", 4.0).unwrap();
        let p = build_payload(None, Some("miner"), vec![transfer.clone()]).unwrap();
        let txs = p.transactions();
        assert_eq!(txs.len(), 2);
        assert!(txs[0].is_coinbase());
        assert_eq!(txs[1], transfer);

        let p = build_payload(None, None, vec![transfer.clone()]).unwrap();
        assert_eq!(p, Payload::Transactions(vec![transfer.clone()]));

        assert!(build_payload(Some("raw"), None, vec![transfer]).is_err());
    }
}
