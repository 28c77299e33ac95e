use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, StatsResponse};
use crate::blockchain::{Block, STATS_WINDOW};

fn interval(newer: &Block, older: &Block) -> u64 {
    newer.header.timestamp.saturating_sub(older.header.timestamp)
}

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let (height, difficulty, tail_hash, last_interval, avg_interval) = {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        let blocks = bc.blocks();
        let height = blocks.len();

        let last_interval_secs = match blocks {
            [.., older, newer] => Some(interval(newer, older)),
            _ => None,
        };

        // average over the most recent window; the genesis interval is skipped
        let avg_secs = if height > STATS_WINDOW + 1 {
            let recent = &blocks[height - (STATS_WINDOW + 1)..];
            let total: u64 = recent.windows(2).map(|w| interval(&w[1], &w[0])).sum();
            Some(total as f64 / STATS_WINDOW as f64)
        } else {
            None
        };

        (
            height,
            bc.difficulty(),
            bc.last_block().hash,
            last_interval_secs,
            avg_secs,
        )
    };

    let open_templates = {
        let map = state.mining_templates.lock().expect("mutex poisoned");
        map.len()
    };

    HttpResponse::Ok().json(StatsResponse {
        height,
        difficulty,
        tail_hash,
        stats_window: STATS_WINDOW,
        last_interval_secs: last_interval,
        avg_interval_secs: avg_interval,
        open_templates,
    })
}
