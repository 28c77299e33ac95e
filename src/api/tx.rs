use actix_web::{HttpResponse, Responder, post, web};
use log::{debug, info, warn};

use super::models::{AppState, ErrorResponse, SignTxRequest, SignTxResponse, SignedTransaction};
use crate::transaction::{Transaction, TransactionError};
use crate::wallet::{CryptoContext, public_key_from_hex};

/// Most user transactions accepted into one block.
pub const MAX_BLOCK_TXS: usize = 64;

/// DEV helper: sign a transfer from the address owned by `secret_key`.
/// The secret only lives for the duration of the request.
#[post("/tx/sign/")]
pub async fn sign_transaction(
    state: web::Data<AppState>,
    body: web::Json<SignTxRequest>,
) -> impl Responder {
    let keys = match state.crypto.keypair_from_secret_hex(&body.secret_key) {
        Ok(k) => k,
        Err(e) => {
            warn!("POST /tx/sign/ - rejected: {e}");
            return HttpResponse::BadRequest().json(ErrorResponse::from(e));
        }
    };

    let signed = Transaction::new(&keys.address(), body.to.trim(), body.amount)
        .and_then(|mut tx| tx.sign(&state.crypto, &keys).map(|()| tx));
    match signed {
        Ok(transaction) => {
            debug!(
                "POST /tx/sign/ - {} -> {} amount={}",
                transaction.from, transaction.to, transaction.amount
            );
            HttpResponse::Ok().json(SignTxResponse {
                transaction,
                public_key: hex::encode(keys.to_pub()),
            })
        }
        Err(e @ TransactionError::Wallet(_)) => {
            HttpResponse::ServiceUnavailable().json(ErrorResponse::from(e))
        }
        Err(e) => HttpResponse::BadRequest().json(ErrorResponse::from(e)),
    }
}

/// Check every submitted transaction against the key that claims it.
/// The first failure is reported with its position in the request.
pub(super) fn authenticate_all(
    ctx: &CryptoContext,
    signed: Vec<SignedTransaction>,
) -> Result<Vec<Transaction>, String> {
    if signed.len() > MAX_BLOCK_TXS {
        return Err(format!(
            "too many transactions: {} (max {MAX_BLOCK_TXS})",
            signed.len()
        ));
    }
    let mut accepted = Vec::with_capacity(signed.len());
    for (i, SignedTransaction { transaction, public_key }) in signed.into_iter().enumerate() {
        let checked = public_key_from_hex(&public_key)
            .map_err(TransactionError::from)
            .and_then(|pk| transaction.authenticate(ctx, &pk));
        if let Err(e) = checked {
            warn!("TX - rejected transaction #{i}: {e}");
            return Err(format!("transaction #{i}: {e}"));
        }
        accepted.push(transaction);
    }
    if !accepted.is_empty() {
        info!("TX - {} signed transaction(s) accepted for mining", accepted.len());
    }
    Ok(accepted)
}
