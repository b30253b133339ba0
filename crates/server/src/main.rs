use clap::Parser;

use democrm_server::config::ServerArgs;
use democrm_server::storage::ClientStore;
use democrm_server::{AppState, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = ServerArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "democrm_server=info,tower_http=info".into()),
        )
        .init();

    let store = ClientStore::open(&args.data_file).await?;
    tracing::info!("client store: {}", store.path().display());

    let state = AppState {
        store,
        config: args.app_config(),
    };
    let app = build_router(state);

    let addr = args.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
        })
        .await?;

    Ok(())
}
