use actix_web::{HttpResponse, Responder, post, web};
use log::warn;
use serde::Serialize;

use super::models::{AppState, ErrorResponse};
use crate::wallet::generate_keypair_hex;

#[derive(Serialize)]
struct NewWalletResponse {
    private_key: String,
    public_key: String,
    address: String,
}

#[post("/wallet/new/")]
pub async fn create_wallet(state: web::Data<AppState>) -> impl Responder {
    match generate_keypair_hex(&state.crypto) {
        Ok((sk, pk, addr)) => HttpResponse::Ok().json(NewWalletResponse {
            private_key: sk,
            public_key: pk,
            address: addr,
        }),
        Err(e) => {
            warn!("WALLET - key generation failed: {e}");
            HttpResponse::ServiceUnavailable().json(ErrorResponse::from(e))
        }
    }
}
