use actix_web::{HttpResponse, Responder, post, web};
use log::{debug, info, warn};
use std::time::Instant;
use uuid::Uuid;

use super::chain::request_payload;
use super::models::{
    AppState, ErrorResponse, MiningTemplate, SubmitRequest, SubmitResponse, TemplateRequest,
    TemplateResponse,
};
use crate::blockchain::hash::{self, Hash256};
use crate::blockchain::{Block, miner};

fn rejected() -> SubmitResponse {
    SubmitResponse {
        accepted: false,
        mined_index: None,
        hash: None,
        difficulty: None,
    }
}

/// Issue a template for an external miner: header fixed except for the nonce.
#[post("/mining/template/")]
pub async fn get_template(
    state: web::Data<AppState>,
    req: web::Json<TemplateRequest>,
) -> impl Responder {
    let TemplateRequest {
        data,
        miner_address,
        transactions,
    } = req.into_inner();
    let payload = match request_payload(&state, data, miner_address, transactions) {
        Ok(p) => p,
        Err(msg) => return HttpResponse::BadRequest().json(ErrorResponse::message(msg)),
    };

    // snapshot of the head, with the chain difficulty written into the header
    let header = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        bc.candidate(&payload)
    };

    let template_id = Uuid::new_v4().to_string();
    let open = state.insert_template(MiningTemplate {
        template_id: template_id.clone(),
        header,
        payload,
        issued: Instant::now(),
    });

    debug!(
        "TEMPLATE id={} height={} diff={} open={}",
        &template_id, header.index, header.difficulty, open
    );

    HttpResponse::Ok().json(TemplateResponse {
        template_id,
        index: header.index,
        previous_hash: header.previous_hash,
        merkle_root: header.merkle_root,
        timestamp: header.timestamp,
        difficulty: header.difficulty,
        header_hex: hex::encode(hash::serialize_header(&header)),
    })
}

/// Submit a PoW solution (nonce/hash) for a template.
/// Templates are single use and expire after the mining timeout; the chain
/// re-checks everything on append.
#[post("/mining/submit/")]
pub async fn submit_solution(
    state: web::Data<AppState>,
    req: web::Json<SubmitRequest>,
) -> impl Responder {
    let template = match state.take_template(&req.template_id) {
        Some(t) => t,
        None => return HttpResponse::BadRequest().json(rejected()),
    };

    let claimed = match Hash256::from_hex(&req.hash) {
        Ok(h) => h,
        Err(e) => {
            return HttpResponse::BadRequest()
                .json(ErrorResponse::message(format!("invalid hash: {e}")));
        }
    };

    let mut header = template.header;
    header.nonce = req.nonce;
    let block = Block::seal(header, template.payload, claimed);
    if block.compute_hash() != Some(claimed) {
        return HttpResponse::BadRequest().json(ErrorResponse::message("hash mismatch"));
    }
    if !miner::meets_difficulty(&claimed, header.difficulty) {
        return HttpResponse::BadRequest()
            .json(ErrorResponse::message("hash does not meet difficulty"));
    }

    match state.append(block) {
        Ok((index, hash)) => {
            info!(
                "ACCEPTED template {} -> block#{} hash={} diff={}",
                template.template_id, index, hash, header.difficulty
            );
            HttpResponse::Ok().json(SubmitResponse {
                accepted: true,
                mined_index: Some(index),
                hash: Some(hash),
                difficulty: Some(header.difficulty),
            })
        }
        Err(e) => {
            warn!("stale template {}: {}", template.template_id, e);
            HttpResponse::Conflict().json(ErrorResponse::from(e))
        }
    }
}
