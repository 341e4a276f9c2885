//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions of a bounding-box fit.
///
/// Scales `source` so it fits entirely inside `bounds` while keeping its
/// aspect ratio. Never upscales: a source that already fits is returned
/// unchanged. Each output edge is at least 1px.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `bounds` - Bounding box (width, height)
///
/// # Examples
/// ```
/// # use imgstore::imaging::fit_within;
/// // 800x600 into 200x200 → width-limited → 200x150
/// assert_eq!(fit_within((800, 600), (200, 200)), (200, 150));
///
/// // 120x120 into 500x500 → already fits → unchanged
/// assert_eq!(fit_within((120, 120), (500, 500)), (120, 120));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = (bounds.0.max(1), bounds.1.max(1));

    if src_w == 0 || src_h == 0 {
        return source;
    }
    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let scale = f64::min(max_w as f64 / src_w as f64, max_h as f64 / src_h as f64);

    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.min(src_w));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.min(src_h));
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_into_square_box_is_width_limited() {
        assert_eq!(fit_within((800, 600), (200, 200)), (200, 150));
    }

    #[test]
    fn portrait_into_square_box_is_height_limited() {
        assert_eq!(fit_within((600, 800), (200, 200)), (150, 200));
    }

    #[test]
    fn same_aspect_fills_box_exactly() {
        assert_eq!(fit_within((1600, 900), (160, 90)), (160, 90));
    }

    #[test]
    fn wide_box_limits_by_height() {
        // 1000x1000 into 400x100 → 100x100
        assert_eq!(fit_within((1000, 1000), (400, 100)), (100, 100));
    }

    #[test]
    fn smaller_source_is_not_upscaled() {
        assert_eq!(fit_within((120, 120), (500, 500)), (120, 120));
    }

    #[test]
    fn partially_larger_source_only_shrinks() {
        // Wider than the box but shorter: width governs, height shrinks too.
        assert_eq!(fit_within((1000, 100), (500, 500)), (500, 50));
    }

    #[test]
    fn extreme_ratio_keeps_one_pixel() {
        assert_eq!(fit_within((10_000, 10), (100, 100)), (100, 1));
    }

    #[test]
    fn output_never_exceeds_box_or_source() {
        let sources = [(1, 1), (7, 3), (120, 120), (333, 777), (4000, 3000), (10_000, 1)];
        let boxes = [(1, 1), (2, 9), (90, 90), (150, 150), (200, 100), (10_000, 10_000)];
        for &src in &sources {
            for &bounds in &boxes {
                let (w, h) = fit_within(src, bounds);
                assert!(w >= 1 && h >= 1, "{src:?} into {bounds:?} → {w}x{h}");
                assert!(w <= bounds.0 && h <= bounds.1, "{src:?} into {bounds:?} → {w}x{h}");
                assert!(w <= src.0 && h <= src.1, "{src:?} into {bounds:?} → {w}x{h}");
            }
        }
    }

    #[test]
    fn aspect_ratio_preserved_within_rounding() {
        let (w, h) = fit_within((333, 777), (150, 150));
        let src_ratio = 333.0 / 777.0;
        // One pixel of rounding on the short edge
        assert!(((w as f64) / (h as f64) - src_ratio).abs() < 1.0 / h as f64 + 0.01);
    }
}
