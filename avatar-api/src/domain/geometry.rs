//! Aspect-ratio arithmetic for the crop view.

/// A scaled display box preserving the native aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBox {
    pub width: u32,
    pub height: u32,
}

impl DisplayBox {
    /// Suggested side for the initial square crop selection.
    pub fn initial_crop_size(&self) -> u32 {
        self.width.min(self.height)
    }
}

/// Scale a `native_width` x `native_height` image so its long edge equals
/// `target_long_edge`, flooring the short edge.
///
/// Callers guard against zero dimensions; behavior is only defined for
/// positive inputs.
pub fn compute_display_box(native_width: u32, native_height: u32, target_long_edge: u32) -> DisplayBox {
    if native_width >= native_height {
        DisplayBox {
            width: target_long_edge,
            height: scale_edge(target_long_edge, native_height, native_width),
        }
    } else {
        DisplayBox {
            width: scale_edge(target_long_edge, native_width, native_height),
            height: target_long_edge,
        }
    }
}

fn scale_edge(target: u32, short: u32, long: u32) -> u32 {
    (u64::from(target) * u64::from(short) / u64::from(long)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_scales_width_to_target() {
        let display = compute_display_box(1600, 900, 160);
        assert_eq!((display.width, display.height), (160, 90));
        assert_eq!(display.initial_crop_size(), 90);
    }

    #[test]
    fn portrait_scales_height_to_target() {
        let display = compute_display_box(900, 1600, 160);
        assert_eq!((display.width, display.height), (90, 160));
        assert_eq!(display.initial_crop_size(), 90);
    }

    #[test]
    fn square_maps_to_square() {
        let display = compute_display_box(512, 512, 96);
        assert_eq!((display.width, display.height), (96, 96));
        assert_eq!(display.initial_crop_size(), 96);
    }

    #[test]
    fn short_edge_is_floored() {
        // 100 * 99 / 100 = 99 exactly; 100 * 50 / 99 floors to 50.
        let display = compute_display_box(99, 50, 100);
        assert_eq!((display.width, display.height), (100, 50));
    }

    #[test]
    fn upscales_small_images() {
        let display = compute_display_box(40, 30, 160);
        assert_eq!((display.width, display.height), (160, 120));
    }
}
