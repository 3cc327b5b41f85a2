// Allow common clippy warnings for game development
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

mod admin;
mod auth;
mod command;
mod config;
mod database;
mod entity;
mod game_data;
mod instance;
mod map;
mod mapgen;
mod moderation;
mod network;
mod server;
mod session;
mod tick;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};
use tokio::sync::mpsc;

use crate::admin::AdminList;
use crate::command::SaveOp;
use crate::database::Database;
use crate::game_data::GameData;
use crate::server::GameServer;
use crate::session::SessionContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Production secrets and overrides may come from a .env file.
    dotenvy::dotenv().ok();

    let config = Arc::new(config::ServerConfig::load().map_err(anyhow::Error::msg)?);

    let data = Arc::new(GameData::default());
    data.validate();

    let db = Arc::new(Database::connect(&config.server.db_path).await?);

    let admins = AdminList::load(&config.security.admin_allowlist);
    // The watcher must outlive the accept loop to keep reloads flowing.
    let _allowlist_watcher = admin::watch(Arc::clone(&admins));

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (save_tx, mut save_rx) = mpsc::unbounded_channel::<SaveOp>();

    // Persistence task: drains simulation save operations until every
    // sender is gone, so the final flush on shutdown always lands.
    let save_db = Arc::clone(&db);
    let persistence = tokio::spawn(async move {
        while let Some(op) = save_rx.recv().await {
            let result = match &op {
                SaveOp::Character(record) => save_db.save_character(record).await,
                SaveOp::Kill(record) => save_db.kill_character(record).await,
                SaveOp::Vault { account_id, items } => {
                    save_db.save_vault_items(*account_id, items).await
                }
            };
            if let Err(e) = result {
                error!("save failed: {}", e);
            }
        }
    });

    // The simulation owns all instances on its own thread; sessions talk
    // to it exclusively through the command channel.
    let running = Arc::new(AtomicBool::new(true));
    let game = GameServer::new(Arc::clone(&data), Arc::clone(&admins), cmd_rx, save_tx);
    let sim_flag = Arc::clone(&running);
    let sim_thread = std::thread::Builder::new()
        .name("simulation".to_string())
        .spawn(move || tick::run(game, sim_flag))?;

    let ctx = SessionContext { db, data, config, cmd_tx };
    tokio::select! {
        result = network::run(ctx) => {
            if let Err(e) = result {
                error!("network loop failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    // Cooperative stop: the tick loop notices the flag, runs its final
    // save flush, and drops the save sender; the persistence task then
    // drains to completion.
    running.store(false, Ordering::Relaxed);
    if let Err(e) = sim_thread.join() {
        error!("simulation thread panicked: {:?}", e);
    }
    let _ = persistence.await;
    info!("goodbye");
    Ok(())
}
