use std::sync::Arc;

use leadflow::blob::fs::FsBlobStore;
use leadflow::config::{BackendKind, Config};
use leadflow::mail::{LogMailer, Mailer, ResendMailer};
use leadflow::state::AppState;
use leadflow::store::Store;
use leadflow::store::memory::MemoryStore;
use leadflow::store::pg::PgStore;
use leadflow::{db, routes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("leadflow=info,tower_http=info")),
        )
        .init();

    let store: Arc<dyn Store> = match &config.backend {
        BackendKind::Postgres { database_url, max_connections } => {
            let pool = db::init_pool(database_url, *max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgStore::new(pool))
        }
        BackendKind::Memory => {
            tracing::warn!("using in-memory backend; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let blobs = Arc::new(FsBlobStore::new(
        config.blob_root.clone(),
        config.public_base_url.clone(),
        config.upload_chunk_bytes,
    ));

    let mailer: Arc<dyn Mailer> = match &config.resend {
        Some(resend) => Arc::new(ResendMailer::new(&resend.api_key, resend.from.clone())),
        None => {
            tracing::warn!("RESEND_API_KEY not set; password reset mail is logged only");
            Arc::new(LogMailer)
        }
    };

    let port = config.port;
    let state = AppState::new(store, blobs, mailer, config);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "leadflow listening");
    axum::serve(listener, app).await.expect("server failed");
}
