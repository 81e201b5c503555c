use std::{collections::HashSet, sync::Arc};

use moka::sync::Cache;

use crate::{
    config::AvatarSettings,
    domain::{
        models::{Avatar, AvatarId, AvatarImage, CropRegion, UserId},
        selection::{self, Selection},
        AvatarError, AvatarNotifier,
    },
    repositories::AvatarRepository,
};

use super::processor::ImageProcessor;

const PRIMARY_CACHE_CAPACITY: u64 = 10_000;

/// Memoized outcome of a primary-avatar lookup. `None` memoizes absence so
/// users without avatars don't hit the store on every render.
#[derive(Debug, Clone)]
struct PrimaryRef {
    avatar_id: AvatarId,
    fingerprint: i128,
}

impl PrimaryRef {
    fn of(avatar: &Avatar) -> Self {
        Self {
            avatar_id: avatar.id,
            fingerprint: avatar.fingerprint(),
        }
    }
}

/// Orchestrates the avatar operations: upload, primary change, crop, delete
/// with reassignment, and primary-URL resolution through the per-user cache.
///
/// Every successful mutation invalidates the owner's cache entry exactly once
/// before returning, and fans out through the injected notifier.
pub struct AvatarService {
    repository: Arc<dyn AvatarRepository>,
    processor: Arc<dyn ImageProcessor>,
    notifier: Arc<dyn AvatarNotifier>,
    primary_cache: Cache<UserId, Option<PrimaryRef>>,
    settings: AvatarSettings,
    api_url: String,
}

impl AvatarService {
    pub fn new(
        repository: Arc<dyn AvatarRepository>,
        processor: Arc<dyn ImageProcessor>,
        notifier: Arc<dyn AvatarNotifier>,
        settings: AvatarSettings,
        api_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            processor,
            notifier,
            primary_cache: Cache::new(PRIMARY_CACHE_CAPACITY),
            settings,
            api_url: api_url.into(),
        }
    }

    pub fn settings(&self) -> &AvatarSettings {
        &self.settings
    }

    /// The current primary plus the bounded list, for page rendering.
    pub async fn page(&self, owner: UserId) -> Result<Selection, AvatarError> {
        let avatars = self.repository.list_for_user(owner).await?;
        Ok(selection::select(&avatars, self.settings.max_per_user))
    }

    pub async fn owned_avatar(
        &self,
        owner: UserId,
        id: AvatarId,
    ) -> Result<Option<Avatar>, AvatarError> {
        Ok(self.repository.get_owned(owner, id).await?)
    }

    /// Pre-rendered URL for an avatar at `size`, fingerprinted for cache
    /// busting.
    pub fn avatar_url(&self, avatar: &Avatar, size: u32) -> String {
        self.sized_url(avatar.id, avatar.fingerprint(), size)
    }

    fn sized_url(&self, id: AvatarId, fingerprint: i128, size: u32) -> String {
        let base_url = self.api_url.trim_end_matches('/');
        format!("{base_url}/avatars/{id}/image/{size}?v={fingerprint}")
    }

    /// Store an upload as the owner's new primary avatar.
    pub async fn upload(
        &self,
        owner: UserId,
        payload: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<Avatar, AvatarError> {
        if payload.len() > self.settings.max_upload_bytes {
            return Err(AvatarError::PayloadTooLarge);
        }

        if let Some(content_type) = content_type.as_deref() {
            if !content_type.starts_with("image/") {
                return Err(AvatarError::UnsupportedMediaType);
            }
        }

        let processor = Arc::clone(&self.processor);
        let processed = tokio::task::spawn_blocking(move || processor.process_upload(&payload))
            .await
            .map_err(|err| AvatarError::storage(format!("image processing task failed: {err}")))??;

        // New uploads always become primary; the store clears the old flag.
        let avatar = self.repository.create(owner, &processed, true).await?;

        self.primary_cache.invalidate(&owner);
        self.notifier.avatar_updated(owner, &avatar).await;

        Ok(avatar)
    }

    /// Designate one of the owner's existing avatars as primary.
    ///
    /// A `choice` that is not one of the owner's avatars is a silent no-op
    /// (`Ok(None)`); callers redirect either way.
    pub async fn set_primary(
        &self,
        owner: UserId,
        choice: AvatarId,
    ) -> Result<Option<Avatar>, AvatarError> {
        let Some(_) = self.repository.get_owned(owner, choice).await? else {
            return Ok(None);
        };

        self.repository.set_primary(owner, choice).await?;
        let avatar = self
            .repository
            .get_owned(owner, choice)
            .await?
            .ok_or(AvatarError::NotFound)?;

        self.primary_cache.invalidate(&owner);
        self.notifier.avatar_updated(owner, &avatar).await;

        Ok(Some(avatar))
    }

    /// Apply a crop region to one of the owner's avatars.
    pub async fn crop(
        &self,
        owner: UserId,
        id: AvatarId,
        region: CropRegion,
    ) -> Result<Avatar, AvatarError> {
        let avatar = self
            .repository
            .get_owned(owner, id)
            .await?
            .ok_or(AvatarError::NotFound)?;

        if !region.fits_within(avatar.width as u32, avatar.height as u32) {
            return Err(AvatarError::InvalidCrop);
        }

        let stored = self
            .repository
            .image_bytes(id)
            .await?
            .ok_or(AvatarError::NotFound)?;

        let processor = Arc::clone(&self.processor);
        let cropped =
            tokio::task::spawn_blocking(move || processor.apply_crop(&stored, region))
                .await
                .map_err(|err| {
                    AvatarError::storage(format!("image processing task failed: {err}"))
                })??;

        self.repository.update_image(id, &cropped).await?;
        let avatar = self
            .repository
            .get_owned(owner, id)
            .await?
            .unwrap_or(avatar);

        self.primary_cache.invalidate(&owner);
        self.notifier.avatar_updated(owner, &avatar).await;

        Ok(avatar)
    }

    /// Bulk-delete avatars, promoting the first survivor when the primary is
    /// among the doomed.
    ///
    /// Returns the number of deleted rows. A selection that is empty or
    /// reaches outside the owner's avatars mutates nothing.
    pub async fn delete(&self, owner: UserId, ids: &[AvatarId]) -> Result<u64, AvatarError> {
        if ids.is_empty() {
            return Err(AvatarError::InvalidSelection);
        }

        let avatars = self.repository.list_for_user(owner).await?;
        let owned: HashSet<AvatarId> = avatars.iter().map(|avatar| avatar.id).collect();
        if ids.iter().any(|id| !owned.contains(id)) {
            return Err(AvatarError::InvalidSelection);
        }

        let doomed: HashSet<AvatarId> = ids.iter().copied().collect();
        let primary = avatars.iter().find(|avatar| avatar.primary);

        if let Some(target) = selection::reassignment_target(primary, &avatars, &doomed) {
            self.repository.set_primary(owner, target).await?;
            if let Some(promoted) = self.repository.get_owned(owner, target).await? {
                self.notifier.avatar_updated(owner, &promoted).await;
            }
        }

        let deleted = self.repository.delete_many(owner, ids).await?;

        self.primary_cache.invalidate(&owner);

        Ok(deleted)
    }

    /// Resolve the owner's primary avatar URL at `size`, through the cache.
    ///
    /// `None` means the user has no primary; callers fall back to the
    /// configured default avatar.
    pub async fn primary_url(
        &self,
        owner: UserId,
        size: u32,
    ) -> Result<Option<String>, AvatarError> {
        if let Some(cached) = self.primary_cache.get(&owner) {
            return Ok(cached.map(|r| self.sized_url(r.avatar_id, r.fingerprint, size)));
        }

        let avatars = self.repository.list_for_user(owner).await?;
        let primary = avatars.iter().find(|avatar| avatar.primary);
        let resolved = primary.map(PrimaryRef::of);

        self.primary_cache.insert(owner, resolved.clone());

        Ok(resolved.map(|r| self.sized_url(r.avatar_id, r.fingerprint, size)))
    }

    /// Render a stored avatar scaled to `size`, for the image-serving route.
    ///
    /// The route is anonymous, so `size` is clamped to the configured ceiling
    /// before any pixel work happens.
    pub async fn render_image(
        &self,
        id: AvatarId,
        size: u32,
    ) -> Result<AvatarImage, AvatarError> {
        let size = size.min(self.settings.max_render_size);
        let stored = self
            .repository
            .image_bytes(id)
            .await?
            .ok_or(AvatarError::NotFound)?;

        let processor = Arc::clone(&self.processor);
        tokio::task::spawn_blocking(move || processor.render_sized(&stored, size))
            .await
            .map_err(|err| AvatarError::storage(format!("image processing task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::repositories::mock::InMemoryAvatarRepository;

    /// Skips real codec work; dimensions are fabricated deterministically.
    struct StubProcessor;

    impl ImageProcessor for StubProcessor {
        fn process_upload(&self, input: &[u8]) -> Result<AvatarImage, AvatarError> {
            if input.is_empty() {
                return Err(AvatarError::InvalidImage);
            }
            Ok(AvatarImage::new(input.to_vec(), "image/webp", 1600, 900))
        }

        fn apply_crop(
            &self,
            stored: &AvatarImage,
            region: CropRegion,
        ) -> Result<AvatarImage, AvatarError> {
            Ok(AvatarImage::new(
                stored.bytes.clone(),
                "image/webp",
                region.width,
                region.height,
            ))
        }

        fn render_sized(&self, stored: &AvatarImage, size: u32) -> Result<AvatarImage, AvatarError> {
            Ok(AvatarImage::new(stored.bytes.clone(), "image/webp", size, size))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<(UserId, AvatarId)>>,
    }

    impl RecordingNotifier {
        fn events(&self) -> Vec<(UserId, AvatarId)> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AvatarNotifier for RecordingNotifier {
        async fn avatar_updated(&self, owner: UserId, avatar: &Avatar) {
            self.events.lock().unwrap().push((owner, avatar.id));
        }
    }

    fn test_settings() -> AvatarSettings {
        AvatarSettings {
            max_per_user: 5,
            default_size: 80,
            crop_view_size: 400,
            max_render_size: 1024,
            default_avatar_url: "https://cdn.example.com/default.png".to_string(),
            max_upload_bytes: 1024,
            notifications_enabled: true,
            vapid_private_key: None,
        }
    }

    struct Harness {
        service: AvatarService,
        repository: Arc<InMemoryAvatarRepository>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        let repository = Arc::new(InMemoryAvatarRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AvatarService::new(
            Arc::clone(&repository) as Arc<dyn AvatarRepository>,
            Arc::new(StubProcessor),
            Arc::clone(&notifier) as Arc<dyn AvatarNotifier>,
            test_settings(),
            "https://api.example.com/",
        );
        Harness {
            service,
            repository,
            notifier,
        }
    }

    const OWNER: UserId = UserId::new(1);

    #[tokio::test]
    async fn upload_becomes_primary() {
        let h = harness();

        let first = h.service.upload(OWNER, vec![1], None).await.unwrap();
        assert!(first.primary);

        let second = h.service.upload(OWNER, vec![2], None).await.unwrap();
        assert!(second.primary);

        let selection = h.service.page(OWNER).await.unwrap();
        assert_eq!(selection.primary.map(|a| a.id), Some(second.id));
        assert_eq!(selection.avatars.len(), 2);
        assert_eq!(h.notifier.events().len(), 2);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected_without_mutation() {
        let h = harness();

        let err = h.service.upload(OWNER, vec![0; 2048], None).await.unwrap_err();
        assert!(matches!(err, AvatarError::PayloadTooLarge));
        assert_eq!(h.repository.row_count().await, 0);
        assert!(h.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn non_image_media_type_is_rejected() {
        let h = harness();

        let err = h
            .service
            .upload(OWNER, vec![1], Some("text/plain".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, AvatarError::UnsupportedMediaType));
        assert_eq!(h.repository.row_count().await, 0);
    }

    #[tokio::test]
    async fn set_primary_flips_the_flag() {
        let h = harness();
        let first = h.service.upload(OWNER, vec![1], None).await.unwrap();
        let _second = h.service.upload(OWNER, vec![2], None).await.unwrap();

        let promoted = h.service.set_primary(OWNER, first.id).await.unwrap();
        assert_eq!(promoted.map(|a| a.id), Some(first.id));

        let selection = h.service.page(OWNER).await.unwrap();
        assert_eq!(selection.primary.map(|a| a.id), Some(first.id));
    }

    #[tokio::test]
    async fn set_primary_with_foreign_choice_is_a_silent_no_op() {
        let h = harness();
        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();
        let intruder = UserId::new(2);

        let result = h.service.set_primary(intruder, avatar.id).await.unwrap();
        assert!(result.is_none());

        let selection = h.service.page(OWNER).await.unwrap();
        assert_eq!(selection.primary.map(|a| a.id), Some(avatar.id));
    }

    #[tokio::test]
    async fn deleting_the_primary_promotes_the_first_survivor() {
        let h = harness();
        let first = h.service.upload(OWNER, vec![1], None).await.unwrap();
        let _second = h.service.upload(OWNER, vec![2], None).await.unwrap();
        let third = h.service.upload(OWNER, vec![3], None).await.unwrap();

        let deleted = h.service.delete(OWNER, &[third.id]).await.unwrap();
        assert_eq!(deleted, 1);

        let selection = h.service.page(OWNER).await.unwrap();
        assert_eq!(selection.avatars.len(), 2);
        assert_eq!(selection.primary.map(|a| a.id), Some(first.id));

        // The promotion itself fanned out.
        assert!(h.notifier.events().contains(&(OWNER, first.id)));
    }

    #[tokio::test]
    async fn deleting_everything_leaves_no_primary() {
        let h = harness();
        let first = h.service.upload(OWNER, vec![1], None).await.unwrap();
        let second = h.service.upload(OWNER, vec![2], None).await.unwrap();

        h.service.delete(OWNER, &[first.id, second.id]).await.unwrap();

        let selection = h.service.page(OWNER).await.unwrap();
        assert!(selection.primary.is_none());
        assert!(selection.avatars.is_empty());

        // Subsequent resolution falls through to the default-avatar path.
        let url = h.service.primary_url(OWNER, 80).await.unwrap();
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn delete_rejects_selections_outside_the_owner() {
        let h = harness();
        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();

        let err = h
            .service
            .delete(OWNER, &[avatar.id, AvatarId::new(999)])
            .await
            .unwrap_err();
        assert!(matches!(err, AvatarError::InvalidSelection));
        assert_eq!(h.repository.row_count().await, 1);
    }

    #[tokio::test]
    async fn delete_rejects_empty_selection() {
        let h = harness();
        h.service.upload(OWNER, vec![1], None).await.unwrap();

        let err = h.service.delete(OWNER, &[]).await.unwrap_err();
        assert!(matches!(err, AvatarError::InvalidSelection));
        assert_eq!(h.repository.row_count().await, 1);
    }

    #[tokio::test]
    async fn crop_outside_bounds_is_rejected_without_mutation() {
        let h = harness();
        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();

        let err = h
            .service
            .crop(
                OWNER,
                avatar.id,
                CropRegion {
                    x: 1500,
                    y: 0,
                    width: 200,
                    height: 200,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AvatarError::InvalidCrop));

        let unchanged = h.service.owned_avatar(OWNER, avatar.id).await.unwrap().unwrap();
        assert_eq!((unchanged.width, unchanged.height), (1600, 900));
    }

    #[tokio::test]
    async fn crop_updates_dimensions() {
        let h = harness();
        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();

        let cropped = h
            .service
            .crop(
                OWNER,
                avatar.id,
                CropRegion {
                    x: 100,
                    y: 100,
                    width: 400,
                    height: 400,
                },
            )
            .await
            .unwrap();
        assert_eq!((cropped.width, cropped.height), (400, 400));
    }

    #[tokio::test]
    async fn crop_of_someone_elses_avatar_is_not_found() {
        let h = harness();
        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();

        let err = h
            .service
            .crop(
                UserId::new(2),
                avatar.id,
                CropRegion {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AvatarError::NotFound));
    }

    #[tokio::test]
    async fn mutations_refresh_the_primary_cache() {
        let h = harness();
        let first = h.service.upload(OWNER, vec![1], None).await.unwrap();
        let second = h.service.upload(OWNER, vec![2], None).await.unwrap();

        // Prime the cache, then mutate; the stale entry must not survive.
        let before = h.service.primary_url(OWNER, 80).await.unwrap().unwrap();
        assert!(before.contains(&format!("/avatars/{}/image/80", second.id)));

        h.service.set_primary(OWNER, first.id).await.unwrap();

        let after = h.service.primary_url(OWNER, 80).await.unwrap().unwrap();
        assert!(after.contains(&format!("/avatars/{}/image/80", first.id)));
    }

    #[tokio::test]
    async fn render_size_is_clamped_to_the_configured_ceiling() {
        let h = harness();
        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();

        let rendered = h.service.render_image(avatar.id, u32::MAX).await.unwrap();
        assert_eq!((rendered.width, rendered.height), (1024, 1024));

        let rendered = h.service.render_image(avatar.id, 80).await.unwrap();
        assert_eq!((rendered.width, rendered.height), (80, 80));
    }

    #[tokio::test]
    async fn absence_is_memoized_until_the_next_mutation() {
        let h = harness();

        assert!(h.service.primary_url(OWNER, 80).await.unwrap().is_none());

        let avatar = h.service.upload(OWNER, vec![1], None).await.unwrap();
        let url = h.service.primary_url(OWNER, 80).await.unwrap().unwrap();
        assert!(url.contains(&format!("/avatars/{}/image/80", avatar.id)));
    }
}
