mod avatar_service;
mod processor;
mod push;

pub use avatar_service::AvatarService;
pub use processor::{ImageProcessor, WebpProcessor};
pub use push::{PushNotification, WebPushNotifier};
