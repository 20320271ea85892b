use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let service_name = std::env::var("SERVICE_NAME").unwrap_or_else(|_| "minesweeper-server".to_string());
    // Matches the original Go server's `strconv.Atoi` zero-on-error behavior:
    // an operator who forgets CAPACITY gets a server that refuses every
    // create_room, not a panic.
    let capacity: usize = std::env::var("CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());

    tracing::info!(%service_name, capacity, %port, "starting up");

    let (app, _state) = minesweeper_server::build_app(capacity);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind");

    tracing::info!(addr, "listening");
    axum::serve(listener, app).await.expect("server error");
}
