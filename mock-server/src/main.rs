use mock_server::{AppState, Fixture, StoredContent};
use serde_json::json;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let space = std::env::var("SPACE_ID").unwrap_or_else(|_| "demo-space".to_string());
    let addr = format!("127.0.0.1:{port}");

    let fixture = Fixture::new(&space)
        .with_channel("website", "demo-key")
        .with_content(
            StoredContent::live("home", "page", json!({ "title": "Welcome" })).with_tags(&["nav"]),
        )
        .with_content(StoredContent::live("about", "page", json!({ "title": "About us" })))
        .with_content(StoredContent::staging("launch", "article", json!({ "title": "Coming soon" })));

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, %space, "mock content API listening");
    mock_server::run_until(listener, AppState::new(fixture), async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutting down"),
            Err(err) => {
                tracing::warn!(%err, "ctrl-c handler unavailable");
                std::future::pending::<()>().await
            }
        }
    })
    .await
}
