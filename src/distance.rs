//! Patch dissimilarity metric between two masked images.
use crate::masked::MaskedImage;
use crate::{DISTANCE_SCALE, SSD_SCALE};

use num_traits::ToPrimitive;

/// Maximum summed squared difference of one RGB pixel pair.
const MAX_PIXEL_SSD: f64 = 3.0 * 255.0 * 255.0;

/// Score how poorly the patch around `(xs, ys)` in `source` matches the patch
/// around `(xt, yt)` in `target`.
///
/// Every offset of the `(2 * radius + 1)` square window contributes: pairs
/// where both pixels are in bounds and unmasked contribute their squared RGB
/// difference scaled into `[0, SSD_SCALE]`, while pairs with either position
/// out of bounds or masked contribute the full [`SSD_SCALE`] penalty. The
/// result is the average contribution rounded to an integer in
/// `[0, DISTANCE_SCALE]`, so patch centers near borders or near the hole
/// remain comparable to interior ones.
#[must_use]
pub fn patch_distance(
    source: &MaskedImage,
    xs: i64,
    ys: i64,
    target: &MaskedImage,
    xt: i64,
    yt: i64,
    radius: i64,
) -> u16 {
    let mut ssd_sum: i64 = 0;
    let mut invalid: i32 = 0;
    let mut total: i32 = 0;

    for dy in -radius..=radius {
        for dx in -radius..=radius {
            total += 1;
            let (ax, ay) = (xs + dx, ys + dy);
            let (bx, by) = (xt + dx, yt + dy);

            match (source.pixel(ax, ay), target.pixel(bx, by)) {
                (Some(pa), Some(pb))
                    if !source.is_masked(ax, ay) && !target.is_masked(bx, by) =>
                {
                    for c in 0..3 {
                        let d = i64::from(pa[c]) - i64::from(pb[c]);
                        ssd_sum += d * d;
                    }
                }
                _ => invalid += 1,
            }
        }
    }

    let scaled = f64::from(invalid) * f64::from(SSD_SCALE)
        + ssd_sum.to_f64().unwrap_or(0.0) * f64::from(SSD_SCALE) / MAX_PIXEL_SSD;
    let averaged = (scaled / f64::from(total)).round();

    averaged
        .clamp(0.0, f64::from(DISTANCE_SCALE))
        .to_u16()
        .unwrap_or(DISTANCE_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_image(width: u32, height: u32, rgb: [u8; 3]) -> MaskedImage {
        let pixels = (width * height) as usize;
        let mut image = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            image.extend_from_slice(&rgb);
        }
        MaskedImage::from_buffers(width, height, image, vec![false; pixels]).unwrap()
    }

    #[test]
    fn test_identical_patches_have_zero_distance() {
        let img = constant_image(16, 16, [100, 150, 200]);
        assert_eq!(patch_distance(&img, 8, 8, &img, 8, 8, 3), 0);
        assert_eq!(patch_distance(&img, 8, 8, &img, 4, 11, 3), 0);
    }

    #[test]
    fn test_fully_invalid_patch_is_maximal() {
        let a = constant_image(16, 16, [0, 0, 0]);
        let mut b = constant_image(16, 16, [0, 0, 0]);
        for y in 0..16 {
            for x in 0..16 {
                b.set_mask(x, y, true);
            }
        }
        assert_eq!(patch_distance(&a, 8, 8, &b, 8, 8, 3), SSD_SCALE);
        // Entirely out of bounds on the target side.
        assert_eq!(
            patch_distance(&a, 8, 8, &a, 100, 100, 3),
            SSD_SCALE
        );
    }

    #[test]
    fn test_distance_increases_with_dissimilarity() {
        let a = constant_image(16, 16, [0, 0, 0]);
        let near = constant_image(16, 16, [10, 10, 10]);
        let far = constant_image(16, 16, [200, 200, 200]);
        let d_near = patch_distance(&a, 8, 8, &near, 8, 8, 3);
        let d_far = patch_distance(&a, 8, 8, &far, 8, 8, 3);
        assert!(d_near < d_far);
        assert!(d_far <= SSD_SCALE);
    }

    #[test]
    fn test_border_patch_is_penalized_but_bounded() {
        let img = constant_image(16, 16, [30, 30, 30]);
        let d = patch_distance(&img, 0, 0, &img, 0, 0, 3);
        // The window is clipped the same way on both sides, so the valid
        // pairs still match exactly; only out-of-bounds offsets penalize.
        assert!(d > 0);
        assert!(d < SSD_SCALE);
    }

    #[test]
    fn test_masked_source_pixel_penalizes() {
        let clean = constant_image(16, 16, [80, 80, 80]);
        let mut holed = constant_image(16, 16, [80, 80, 80]);
        holed.set_mask(8, 8, true);
        let d = patch_distance(&holed, 8, 8, &clean, 8, 8, 3);
        // One of 49 offsets carries the full penalty.
        assert_eq!(d, SSD_SCALE / 49);
    }
}
