use async_trait::async_trait;

use super::models::{Avatar, UserId};

/// Optional fan-out capability: tell the owner (and their connections) that
/// an avatar changed. Injected at construction; failures are the notifier's
/// problem to log, never the request's.
#[async_trait]
pub trait AvatarNotifier: Send + Sync + 'static {
    async fn avatar_updated(&self, owner: UserId, avatar: &Avatar);
}

/// Default implementation used when notifications are switched off.
pub struct NoopNotifier;

#[async_trait]
impl AvatarNotifier for NoopNotifier {
    async fn avatar_updated(&self, _owner: UserId, _avatar: &Avatar) {}
}
