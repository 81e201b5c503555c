use axum::{http::Method, routing::get, Router};
use axum_extra::extract::cookie::SameSite;
use axum_login::{
    tower_sessions::{CachingSessionStore, ExpiredDeletion, Expiry, SessionManagerLayer},
    AuthManagerLayer, AuthManagerLayerBuilder,
};
use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use sqlx::PgPool;
use time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tower_sessions_moka_store::MokaStore;
use tower_sessions_sqlx_store::PostgresStore;

type SessionStore = CachingSessionStore<MokaStore, PostgresStore>;

use crate::{app_state::AppState, auth, config::Settings, routes};

pub async fn create(connection_pool: PgPool, config: Settings) -> Router<()> {
    let base_app = Router::new()
        .route("/", get(|| async { "avatar-api" }))
        .nest("/avatars", routes::avatars::router())
        .nest("/notifications", routes::notifications::router());

    // Handlers gate themselves through the AuthUser extractor; this layer
    // only provides the session-backed login machinery.
    let app_with_auth = if config.application.disable_auth {
        base_app
    } else {
        let auth_layer = new_auth_layer(connection_pool.clone(), config.clone()).await;
        base_app.merge(auth::router()).layer(auth_layer)
    };

    let app_state = AppState::new(connection_pool, &config);

    let app_url = config.application.app_url.clone();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(["content-type".parse().unwrap()])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin.to_str().unwrap_or_default() == app_url
        }));

    app_with_auth
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}

async fn new_auth_layer(
    connection_pool: PgPool,
    config: Settings,
) -> AuthManagerLayer<auth::AuthBackend, SessionStore> {
    let client = BasicClient::new(
        ClientId::new(config.auth.client_id),
        Some(ClientSecret::new(config.auth.client_secret)),
        AuthUrl::new(config.auth.auth_url).expect("Invalid authorization endpoint URL"),
        Some(TokenUrl::new(config.auth.token_url).expect("Invalid token endpoint URL")),
    )
    .set_redirect_uri(RedirectUrl::new(config.auth.redirect_url).expect("Invalid redirect URL"));

    // DB-backed sessions persist across restarts.
    let db_store = PostgresStore::new(connection_pool.clone());
    db_store
        .migrate()
        .await
        .expect("Failed to run session store migration");

    // Clean up expired sessions in the background.
    let deletion_task = tokio::task::spawn(
        db_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );
    drop(deletion_task);

    // In-memory cache in front of the DB store for hot sessions.
    let cache_store = MokaStore::new(Some(2_000));
    let session_store = CachingSessionStore::new(cache_store, db_store);

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)));

    let backend = auth::AuthBackend::new(connection_pool, client, config.auth.userinfo_url);
    AuthManagerLayerBuilder::new(backend, session_layer).build()
}
