use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pixur_api::{AppStateInner, router};
use pixur_db::{AdapterRegistry, migrations};
use pixur_tasks::TaskRunner;
use pixur_types::{Configuration, Context};

fn load_site_config() -> anyhow::Result<Configuration> {
    let Ok(path) = std::env::var("PIXUR_SITE_CONFIG") else {
        return Ok(Configuration::default());
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("can't read site config {}", path))?;
    let conf = serde_json::from_str(&raw)
        .with_context(|| format!("can't parse site config {}", path))?;
    info!("loaded site config from {}", path);
    Ok(conf)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixur=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("PIXUR_JWT_SECRET").unwrap_or_else(|_| {
        warn!("PIXUR_JWT_SECRET unset, using the development secret");
        "dev-secret-change-me".into()
    });
    let adapter_name = std::env::var("PIXUR_DB_ADAPTER").unwrap_or_else(|_| "sqlite3".into());
    let db_config = std::env::var("PIXUR_DB_CONFIG").unwrap_or_else(|_| "pixur.db".into());
    let pix_path =
        PathBuf::from(std::env::var("PIXUR_PIX_PATH").unwrap_or_else(|_| "pix".into()));
    let host = std::env::var("PIXUR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PIXUR_PORT")
        .unwrap_or_else(|_| "8888".into())
        .parse()?;
    let request_timeout: u64 = std::env::var("PIXUR_REQUEST_TIMEOUT")
        .unwrap_or_else(|_| "30".into())
        .parse()?;
    let conf = Arc::new(load_site_config()?);

    // Init database
    let registry = AdapterRegistry::with_defaults();
    info!(adapters = ?registry.names(), "using {} adapter", adapter_name);
    let db = registry.open(&adapter_name, &db_config)?;
    let adapter = db.adapter();
    db.init_schema(&Context::new(), &migrations::schema(adapter.as_ref()))?;
    std::fs::create_dir_all(&pix_path)
        .with_context(|| format!("can't create {}", pix_path.display()))?;

    let state = Arc::new(AppStateInner {
        db,
        runner: TaskRunner::new(adapter),
        jwt_secret,
        pix_path,
        conf,
        // Zero disables the deadline
        request_timeout: (request_timeout > 0).then(|| Duration::from_secs(request_timeout)),
    });

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Pixur server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
