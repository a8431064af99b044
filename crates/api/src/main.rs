use api::{build_app, default_notifier, init_auth_state};
use config::{ApiConfig, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A local .env file feeds the environment loader
    let _ = dotenvy::dotenv();

    let config = ApiConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without GOOGLE_LOGIN_CLIENT_ID, GOOGLE_LOGIN_CLIENT_SECRET and SESSION_SECRET.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    let auth_state = init_auth_state(&config, default_notifier())?;
    let app = build_app(auth_state);

    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;

    tracing::info!(address = %bind_address, public_url = %config.server.public_url(), "Server started successfully");
    tracing::info!("Endpoints:");
    tracing::info!("  - GET /auth/signin (Sign-in page)");
    tracing::info!("  - GET /auth/signin_redirect (Redirect to Google)");
    tracing::info!("  - GET /auth/oauth2callback (Google callback)");
    tracing::info!("  - GET /auth/logout (Logout)");
    tracing::info!("  - GET /health (Health check)");

    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
