use image::imageops::FilterType;

use crate::domain::{
    models::{AvatarImage, CropRegion},
    AvatarError,
};

/// CPU-bound image work, kept behind a trait so the service can run it on a
/// blocking thread and tests can stub it out.
pub trait ImageProcessor: Send + Sync + 'static {
    /// Decode an upload and normalize it to the stored format.
    fn process_upload(&self, input: &[u8]) -> Result<AvatarImage, AvatarError>;

    /// Cut `region` out of a stored image and re-encode.
    fn apply_crop(&self, stored: &AvatarImage, region: CropRegion)
        -> Result<AvatarImage, AvatarError>;

    /// Scale a stored image so its long edge fits `size`.
    fn render_sized(&self, stored: &AvatarImage, size: u32) -> Result<AvatarImage, AvatarError>;
}

const WEBP_QUALITY: f32 = 80.0;

/// Normalizes everything to webp. Uploads keep their native resolution so
/// crops still have the full image to work with.
#[derive(Default)]
pub struct WebpProcessor;

impl WebpProcessor {
    fn encode(image: &image::DynamicImage) -> AvatarImage {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();

        let encoder = webp::Encoder::from_rgba(&rgba, width, height);
        let webp = encoder.encode(WEBP_QUALITY);

        AvatarImage::new(webp.to_vec(), "image/webp", width, height)
    }
}

impl ImageProcessor for WebpProcessor {
    fn process_upload(&self, input: &[u8]) -> Result<AvatarImage, AvatarError> {
        let image = image::load_from_memory(input).map_err(|_| AvatarError::InvalidImage)?;

        Ok(Self::encode(&image))
    }

    fn apply_crop(
        &self,
        stored: &AvatarImage,
        region: CropRegion,
    ) -> Result<AvatarImage, AvatarError> {
        let image =
            image::load_from_memory(&stored.bytes).map_err(|_| AvatarError::InvalidImage)?;

        if !region.fits_within(image.width(), image.height()) {
            return Err(AvatarError::InvalidCrop);
        }

        let cropped = image.crop_imm(region.x, region.y, region.width, region.height);

        Ok(Self::encode(&cropped))
    }

    fn render_sized(&self, stored: &AvatarImage, size: u32) -> Result<AvatarImage, AvatarError> {
        let image =
            image::load_from_memory(&stored.bytes).map_err(|_| AvatarError::InvalidImage)?;

        let resized = image.resize(size, size, FilterType::Lanczos3);

        Ok(Self::encode(&resized))
    }
}
