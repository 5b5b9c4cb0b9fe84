pub mod action;
pub mod auto_reply;
pub mod autosend;
pub mod clients;
pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod events;
pub mod intent;
pub mod labels;
pub mod mail;
pub mod models;
pub mod notifications;
pub mod origin;
pub mod parser;
pub mod pipeline;
pub mod poller;
pub mod routes;

use auto_reply::AutoReplyService;
use autosend::AutoSendGate;
use clients::ClientSet;
use config::AppConfig;
use db::Db;
use embeddings::EmbeddingStore;
use events::EventHub;
use pipeline::PipelineCoordinator;
use poller::MailboxPoller;
use rocket_cors::CorsOptions;
use std::sync::Arc;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    let config = AppConfig::from_env();
    let clients = ClientSet::from_config(&config);
    rocket_with_state(config, clients)
}

/// Build the full service against an explicit config and capability set.
/// Tests inject fakes here; production wiring goes through `rocket()`.
pub fn rocket_with_state(config: AppConfig, clients: ClientSet) -> rocket::Rocket<rocket::Build> {
    // Ensure data directory exists
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Db::new(&config.db_path);
    let hub = Arc::new(EventHub::new());

    let gate = AutoSendGate::new(config.auto_send_min_total, config.auto_send_min_rate);
    let store = EmbeddingStore::new(config.embed_min_similarity);
    let service = Arc::new(AutoReplyService::new(
        clients.clone(),
        gate,
        store,
        config.mailbox_address.clone(),
    ));

    // The coordinator runs on its own connection so background ticks never
    // contend with request handlers.
    let coordinator = Arc::new(PipelineCoordinator {
        db: Arc::new(Db::new(&config.db_path)),
        hub: hub.clone(),
        service: service.clone(),
        poller: MailboxPoller::new(clients.mailbox.clone(), &config.ota_sender_query),
        worker_pool_size: config.worker_pool_size,
        default_batch: config.poll_batch_size,
        default_since_days: config.poll_since_days,
    });

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    let poller_enabled = config.poller_enabled;
    let poll_interval = config.poll_interval_secs;
    let loop_coordinator = coordinator.clone();

    rocket::build()
        .manage(db)
        .manage(hub)
        .manage(service)
        .manage(coordinator)
        .manage(config)
        .attach(cors)
        .register("/", rocket::catchers![routes::not_found])
        .mount(
            "/",
            rocket::routes![
                routes::health,
                routes::stats,
                routes::suggest_auto_reply,
                routes::list_auto_replies,
                routes::reply_feedback,
                routes::create_intent_label,
                routes::list_intent_labels,
                routes::events_ws,
                routes::events_status,
                routes::list_staff_notifications,
                routes::resolve_staff_notification,
                routes::auto_send_stats,
                routes::run_pipeline,
            ],
        )
        .attach(rocket::fairing::AdHoc::on_liftoff(
            "Mailbox Poll Loop",
            move |_rocket| {
                Box::pin(async move {
                    if !poller_enabled {
                        println!("📪 mailbox poll loop disabled (POLLER_ENABLED=false)");
                        return;
                    }
                    pipeline::spawn_poll_loop(loop_coordinator, poll_interval);
                    println!("📬 mailbox poll loop started (every {poll_interval}s)");
                })
            },
        ))
}
