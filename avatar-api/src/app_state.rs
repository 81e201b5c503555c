use std::sync::Arc;

use reqwest::Url;
use sqlx::PgPool;

use crate::{
    config::Settings,
    domain::{AvatarNotifier, NoopNotifier},
    repositories::{PostgresAvatarRepository, PushSubscriptionRepositoryImpl},
    services::{AvatarService, WebPushNotifier, WebpProcessor},
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<PgPool>,
    pub app_url: Url,
    pub avatar_service: Arc<AvatarService>,
    pub push_subscriptions_repo: PushSubscriptionRepositoryImpl,
}

impl AppState {
    pub fn new(db_pool: PgPool, config: &Settings) -> Self {
        let app_url = Url::parse(&config.application.app_url).expect("Invalid app URL");

        let repository = Arc::new(PostgresAvatarRepository::new(db_pool.clone()));
        let processor = Arc::new(WebpProcessor);
        let notifier = build_notifier(&db_pool, config);

        let avatar_service = Arc::new(AvatarService::new(
            repository,
            processor,
            notifier,
            config.avatar.clone(),
            config.application.api_url.clone(),
        ));

        Self {
            db_pool: Arc::new(db_pool.clone()),
            app_url,
            avatar_service,
            push_subscriptions_repo: PushSubscriptionRepositoryImpl::new(db_pool),
        }
    }
}

/// Notification fan-out is an optional capability; without the flag (or a
/// usable VAPID key) the service gets the no-op implementation.
fn build_notifier(db_pool: &PgPool, config: &Settings) -> Arc<dyn AvatarNotifier> {
    if !config.avatar.notifications_enabled {
        return Arc::new(NoopNotifier);
    }

    let Some(vapid_private_key) = config.avatar.vapid_private_key.clone() else {
        tracing::warn!("Notifications enabled but no VAPID key configured; fan-out disabled");
        return Arc::new(NoopNotifier);
    };

    match WebPushNotifier::new(db_pool.clone(), vapid_private_key) {
        Ok(notifier) => Arc::new(notifier),
        Err(err) => {
            tracing::error!("Failed to create web push client: {}; fan-out disabled", err);
            Arc::new(NoopNotifier)
        }
    }
}
