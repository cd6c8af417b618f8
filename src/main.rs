//! Risk Compass server.
//!
//! Usage:
//!   cargo run --bin load_data      # optional demo data
//!   cargo run --bin risk_compass   # start the REST API (PORT, default 3000)
//!
//! Configuration comes from the environment (or a `.env` file); see `config.rs`.

use tokio::net::TcpListener;
use tracing::{info, warn};

use risk_compass::auth::{ensure_admin, Authenticator};
use risk_compass::config::Config;
use risk_compass::logging;
use risk_compass::rest::create_router;
use risk_compass::storage::Storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::from_env()?;
    let _log_guard = logging::init(&config);

    if config.uses_dev_secret() {
        warn!("JWT_SECRET not set; using the development secret");
    }

    let storage = Storage::open(&config.data_dir)?;
    let auth = Authenticator::from_config(&config);

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        if let Some(admin) = ensure_admin(&storage, &auth, email, password)? {
            info!(email = %admin.email, "bootstrap admin created");
        }
    }

    let addr = config.bind_addr()?;
    let app = create_router(storage.clone(), auth);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, data_dir = %config.data_dir.display(), "risk register API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    storage.flush().await?;
    Ok(())
}
