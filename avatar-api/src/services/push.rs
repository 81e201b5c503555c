use async_trait::async_trait;
use futures::future;
use serde::Serialize;
use sqlx::PgPool;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessage, WebPushMessageBuilder, URL_SAFE,
};

use crate::{
    domain::{
        models::{Avatar, UserId},
        AvatarNotifier,
    },
    repositories::{
        PushSubscription, PushSubscriptionRepository, PushSubscriptionRepositoryImpl,
        UserRepository, UserRepositoryImpl,
    },
};

#[derive(Debug, Serialize)]
pub struct PushNotification {
    title: String,
    body: String,
    icon: Option<String>,
}

impl PushNotification {
    pub fn new(title: &str, body: &str, icon: Option<&str>) -> Self {
        PushNotification {
            title: title.to_string(),
            body: body.to_string(),
            icon: icon.map(|s| s.to_string()),
        }
    }

    pub fn to_web_push_message(
        &self,
        sub_info: &SubscriptionInfo,
        vapid_private_key: &str,
    ) -> Result<WebPushMessage, WebPushError> {
        let sig_builder =
            VapidSignatureBuilder::from_base64(vapid_private_key, URL_SAFE, sub_info)?.build()?;

        let payload = serde_json::to_vec(self).expect("Could not serialize notification");

        let mut builder = WebPushMessageBuilder::new(sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, &payload);
        builder.set_vapid_signature(sig_builder);

        builder.build()
    }
}

/// Web-push implementation of the fan-out capability: the owner's own
/// subscriptions get an "avatar updated" message, their connections get a
/// "connection's avatar updated" one. Delivery failures are logged, never
/// propagated.
pub struct WebPushNotifier {
    user_repo: UserRepositoryImpl,
    push_subscriptions_repo: PushSubscriptionRepositoryImpl,
    web_push_client: IsahcWebPushClient,
    vapid_private_key: String,
}

impl WebPushNotifier {
    pub fn new(db_pool: PgPool, vapid_private_key: String) -> Result<Self, WebPushError> {
        Ok(Self {
            user_repo: UserRepositoryImpl::new(db_pool.clone()),
            push_subscriptions_repo: PushSubscriptionRepositoryImpl::new(db_pool),
            web_push_client: IsahcWebPushClient::new()?,
            vapid_private_key,
        })
    }

    async fn send_to_subscriptions(
        &self,
        subscriptions: Vec<PushSubscription>,
        notification: PushNotification,
    ) {
        let sends = subscriptions.into_iter().map(|subscription| {
            let sub_info = SubscriptionInfo::new(
                subscription.endpoint.clone(),
                subscription.p256dh.clone(),
                subscription.auth.clone(),
            );
            let message = notification.to_web_push_message(&sub_info, &self.vapid_private_key);

            async move {
                match message {
                    Ok(message) => {
                        if let Err(e) = self.web_push_client.send(message).await {
                            tracing::error!(
                                "Failed to send push notification to {}: {}",
                                subscription.endpoint,
                                e
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to build push message for {}: {}",
                            subscription.endpoint,
                            e
                        );
                    }
                }
            }
        });

        future::join_all(sends).await;
    }
}

#[async_trait]
impl AvatarNotifier for WebPushNotifier {
    async fn avatar_updated(&self, owner: UserId, avatar: &Avatar) {
        let own_subscriptions = match self
            .push_subscriptions_repo
            .subscriptions_for_users(&[owner])
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!("Failed to load push subscriptions for {}: {}", owner, e);
                return;
            }
        };

        self.send_to_subscriptions(
            own_subscriptions,
            PushNotification::new("Avatar updated", "Your avatar has changed.", None),
        )
        .await;

        let connections = match self.user_repo.connected_user_ids(owner).await {
            Ok(connections) => connections,
            Err(e) => {
                tracing::error!("Failed to load connections for {}: {}", owner, e);
                return;
            }
        };
        if connections.is_empty() {
            return;
        }

        let connection_subscriptions = match self
            .push_subscriptions_repo
            .subscriptions_for_users(&connections)
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(
                    "Failed to load connection subscriptions for {}: {}",
                    owner,
                    e
                );
                return;
            }
        };

        tracing::info!(
            "Fanning out avatar {} update to {} connection subscription(s)",
            avatar.id,
            connection_subscriptions.len()
        );
        self.send_to_subscriptions(
            connection_subscriptions,
            PushNotification::new(
                "Avatar updated",
                "A connection of yours has a new avatar.",
                None,
            ),
        )
        .await;
    }
}
