use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    app_state::AppState,
    auth::AuthUser,
    repositories::{NewPushSubscription, PushSubscriptionRepository},
    routes::ApiError,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/subscribe", post(subscribe))
}

#[instrument(name = "subscribe", skip(user, app_state, body), fields(user = %user.id))]
async fn subscribe(
    user: AuthUser,
    State(app_state): State<AppState>,
    Json(body): Json<web_push::SubscriptionInfo>,
) -> Result<StatusCode, ApiError> {
    let new_push_subscription = NewPushSubscription {
        user_id: user.id,
        device: "web".to_string(),
        endpoint: body.endpoint,
        auth: body.keys.auth,
        p256dh: body.keys.p256dh,
    };

    app_state
        .push_subscriptions_repo
        .upsert_push_subscription(new_push_subscription)
        .await?;

    Ok(StatusCode::OK)
}
