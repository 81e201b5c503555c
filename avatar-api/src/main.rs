use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use avatar_api::{config::read_config, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_filename("./avatar-api/.env.local").ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatar_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = read_config()?;

    let connection_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect_with(config.database.with_db())
        .await?;

    sqlx::migrate!("./migrations").run(&connection_pool).await?;

    let address = format!("{}:{}", config.application.host, config.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Listening on {}", address);

    let app = router::create(connection_pool, config).await;
    axum::serve(listener, app).await?;

    Ok(())
}
