use std::sync::Arc;
use std::time::Duration;

use actix_request_identifier::{IdReuse, RequestIdentifier};
use actix_web::web::Data;
use anyhow::Context;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::database::connect::{create_db_connection_pool, run_migrations};
use crate::database::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
use crate::dialogue::Dialogue;
use crate::notify::{HttpSink, LogSink, MessageSink, Notifier};
use crate::service::AccountService;
use crate::settings::{Backend, Settings};
use crate::webhook::WebhookIngestion;

mod database;
mod dialogue;
mod error;
mod notify;
mod points;
mod proto;
mod public_code;
mod responses;
mod routes;
mod schema;
mod service;
mod settings;
mod webhook;

const NOTIFY_QUEUE_CAPACITY: usize = 1024;
const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(60);

fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match settings.backend {
        Backend::Postgres => {
            let url = settings.database_url.as_deref().context("DATABASE_URL is not set")?;
            let db = create_db_connection_pool(url)?;
            run_migrations(&db)?;
            Ok(Arc::new(PgLedgerStore::new(db)))
        }
        Backend::Memory => {
            warn!("using the in-memory ledger, nothing survives a restart");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // setup tracing and use bunyan formatter
    let formatting_layer = BunyanFormattingLayer::new("loyalty-ledger".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(filter_fn(|metadata| *metadata.level() <= tracing::Level::INFO))
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;

    let settings = Settings::from_env()?;
    let store = open_store(&settings)?;
    let service = AccountService::new(store, settings.policy.clone());

    let sink: Arc<dyn MessageSink> = match &settings.notify_url {
        Some(url) => Arc::new(HttpSink::new(url.clone())),
        None => Arc::new(LogSink),
    };
    let notifier = Notifier::start(sink, NOTIFY_QUEUE_CAPACITY);
    let ingestion = WebhookIngestion::new(service.clone(), notifier);
    let dialogue = Dialogue::new(service.clone(), settings.admin_ids.clone(), settings.session_ttl);

    let sweeper = dialogue.clone();
    actix_web::rt::spawn(async move {
        let mut interval = actix_web::rt::time::interval(SESSION_SWEEP_PERIOD);
        loop {
            interval.tick().await;
            sweeper.sessions().sweep();
        }
    });

    info!(
        bind_address = settings.bind_address.as_str(),
        backend = ?settings.backend,
        admins = settings.admin_ids.len(),
        "starting loyalty ledger"
    );

    let server = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .wrap(TracingLogger::default())
            .wrap(RequestIdentifier::with_uuid().use_incoming_id(IdReuse::UseIncoming))
            .app_data(Data::new(service.clone()))
            .app_data(Data::new(ingestion.clone()))
            .app_data(Data::new(dialogue.clone()))
            .configure(routes::configure)
    });

    server
        .bind(settings.bind_address.as_str())
        .with_context(|| format!("failed to bind {}", settings.bind_address))?
        .run()
        .await
        .context("server terminated")?;
    Ok(())
}
