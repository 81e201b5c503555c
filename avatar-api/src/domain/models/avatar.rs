use serde::Serialize;
use time::OffsetDateTime;

use super::{AvatarId, UserId};

/// A stored avatar record, without its image payload.
///
/// Rows are returned in insertion order (ascending id); that order is the
/// "natural order" the selection and reassignment logic relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub id: AvatarId,
    pub user_id: UserId,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    #[sqlx(rename = "is_primary")]
    pub primary: bool,
    #[serde(skip)]
    pub created_at: OffsetDateTime,
    #[serde(skip)]
    pub updated_at: OffsetDateTime,
}

impl Avatar {
    /// Cache-busting fingerprint derived from the last mutation time.
    pub fn fingerprint(&self) -> i128 {
        self.updated_at.unix_timestamp_nanos() / 1_000_000
    }
}

/// A processed image payload ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl AvatarImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            width,
            height,
        }
    }
}

/// A user-submitted crop rectangle in native image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// A region is applicable when it is non-empty and fully inside the image.
    pub fn fits_within(&self, native_width: u32, native_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= native_width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= native_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_region_bounds() {
        let region = CropRegion {
            x: 10,
            y: 10,
            width: 100,
            height: 100,
        };
        assert!(region.fits_within(110, 110));
        assert!(!region.fits_within(109, 110));
        assert!(!region.fits_within(110, 109));
    }

    #[test]
    fn crop_region_rejects_empty() {
        let region = CropRegion {
            x: 0,
            y: 0,
            width: 0,
            height: 50,
        };
        assert!(!region.fits_within(100, 100));
    }

    #[test]
    fn crop_region_overflow_is_out_of_bounds() {
        let region = CropRegion {
            x: u32::MAX,
            y: 0,
            width: 2,
            height: 2,
        };
        assert!(!region.fits_within(u32::MAX, u32::MAX));
    }
}
