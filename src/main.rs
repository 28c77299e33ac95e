mod api;
mod blockchain;
mod config;
mod transaction;
mod wallet;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;

use api::AppState;
use config::Config;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env();
    let (host, port) = (config.host.clone(), config.port);

    println!("⛓️ Starting blockchain API at http://{host}:{port}");

    let state = web::Data::new(AppState::new(&config));
    {
        let bc = state.blockchain.lock().expect("mutex poisoned");
        info!(
            "genesis {} ready (difficulty={}, max_attempts={}, workers={})",
            bc.last_block().hash,
            bc.difficulty(),
            config.mining.max_attempts,
            config.mining.workers
        );
    }

    let server_state = state.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    // stop any search still running, then let the crypto context drop
    state.head_cancel.lock().expect("mutex poisoned").cancel();
    info!("shutting down");
    Ok(())
}
