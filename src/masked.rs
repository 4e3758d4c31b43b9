//! Masked raster images and the pyramid resampling operations on them.
use crate::error::InpaintError;
use crate::{
    get_in_bounds, get_mut_in_bounds, rgb_in_bounds, rgb_mut_in_bounds, DOWNSAMPLE_KERNEL,
};

use num_traits::ToPrimitive;

/// An RGB raster paired with a boolean hole mask of the same shape.
///
/// The image buffer is row-major with three bytes per pixel; the mask marks
/// pixels to be synthesized (`true` = hole). Both buffers always have
/// identical dimensions. Pixel values are only rewritten together with
/// clearing the mask flag, which keeps the pair consistent while the
/// expectation-maximization loop refines a target image.
#[derive(Clone, Debug)]
pub struct MaskedImage {
    width: u32,
    height: u32,
    image: Vec<u8>,
    mask: Vec<bool>,
}

impl MaskedImage {
    /// Create a [`MaskedImage`] from an owned RGB buffer and hole mask.
    ///
    /// `image` must hold `width * height * 3` bytes and `mask` must hold
    /// `width * height` flags.
    pub fn from_buffers(
        width: u32,
        height: u32,
        image: Vec<u8>,
        mask: Vec<bool>,
    ) -> Result<Self, InpaintError> {
        if width == 0 || height == 0 {
            return Err(InpaintError::InvalidImageDimension);
        }
        let pixels = usize::try_from(u64::from(width) * u64::from(height))
            .or(Err("Image dimensions do not fit in memory"))?;
        if Some(image.len()) != pixels.checked_mul(3) {
            return Err(InpaintError::MismatchedImageBuffer);
        }
        if mask.len() != pixels {
            return Err(InpaintError::MismatchedMaskBuffer);
        }

        Ok(Self {
            width,
            height,
            image,
            mask,
        })
    }

    /// Create a [`MaskedImage`] by copying raw byte buffers.
    ///
    /// A nonzero `mask` byte marks the pixel as a hole.
    pub fn from_bytes(
        width: u32,
        height: u32,
        image: &[u8],
        mask: &[u8],
    ) -> Result<Self, InpaintError> {
        let mut image_buffer = Vec::new();
        image_buffer.try_reserve_exact(image.len())?;
        image_buffer.extend_from_slice(image);

        let mut mask_buffer = Vec::new();
        mask_buffer.try_reserve_exact(mask.len())?;
        mask_buffer.extend(mask.iter().map(|&m| m != 0));

        Self::from_buffers(width, height, image_buffer, mask_buffer)
    }

    /// Image width in pixels.
    #[inline]
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width as a signed coordinate bound.
    #[inline]
    pub(crate) fn width_i(&self) -> i64 {
        i64::from(self.width)
    }

    /// Height as a signed coordinate bound.
    #[inline]
    pub(crate) fn height_i(&self) -> i64 {
        i64::from(self.height)
    }

    /// The raw row-major RGB bytes.
    #[inline]
    #[must_use]
    pub fn image_bytes(&self) -> &[u8] {
        &self.image
    }

    /// Whether the pixel is part of the hole.
    ///
    /// Out-of-bounds positions report as masked: they carry no usable sample.
    #[inline]
    #[must_use]
    pub fn is_masked(&self, x: i64, y: i64) -> bool {
        get_in_bounds(self.width_i(), self.height_i(), x, y, &self.mask)
            .copied()
            .unwrap_or(true)
    }

    /// The RGB components of the pixel, if it is in bounds.
    #[inline]
    #[must_use]
    pub fn pixel(&self, x: i64, y: i64) -> Option<[u8; 3]> {
        let rgb = rgb_in_bounds(self.width_i(), self.height_i(), x, y, &self.image)?;
        Some([rgb[0], rgb[1], rgb[2]])
    }

    /// Set or clear the hole flag of an in-bounds pixel.
    #[inline]
    pub fn set_mask(&mut self, x: i64, y: i64, value: bool) {
        let (w, h) = (self.width_i(), self.height_i());
        if let Some(m) = get_mut_in_bounds(w, h, x, y, &mut self.mask) {
            *m = value;
        }
    }

    /// Clear every hole flag.
    #[inline]
    pub fn clear_mask(&mut self) {
        self.mask.fill(false);
    }

    /// Overwrite an in-bounds pixel with a synthesized value and clear its
    /// hole flag.
    pub fn write_pixel(&mut self, x: i64, y: i64, rgb: [u8; 3]) {
        let (w, h) = (self.width_i(), self.height_i());
        if let Some(bytes) = rgb_mut_in_bounds(w, h, x, y, &mut self.image) {
            bytes.copy_from_slice(&rgb);
        } else {
            return;
        }
        if let Some(m) = get_mut_in_bounds(w, h, x, y, &mut self.mask) {
            *m = false;
        }
    }

    /// Whether any pixel of the `(2 * radius + 1)` square window centered at
    /// `(x, y)`, clipped to the image bounds, is part of the hole.
    #[must_use]
    pub fn contains_mask(&self, x: i64, y: i64, radius: i64) -> bool {
        let (w, h) = (self.width_i(), self.height_i());
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if get_in_bounds(w, h, x + dx, y + dy, &self.mask) == Some(&true) {
                    return true;
                }
            }
        }
        false
    }

    /// Whether every pixel is part of the hole.
    #[must_use]
    pub fn is_fully_masked(&self) -> bool {
        self.mask.iter().all(|&m| m)
    }

    /// Halve the image with a low-pass filter.
    ///
    /// Each axis is filtered with the 6-tap [`DOWNSAMPLE_KERNEL`] before
    /// taking every other sample; the borders reflect symmetrically. Hole
    /// pixels are excluded from the weighted average and the output pixel is
    /// marked as a hole whenever any contributing pixel was one. The result
    /// is `(width / 2, height / 2)`, rounded down.
    #[must_use]
    pub fn downsample(&self) -> Self {
        let new_width = self.width / 2;
        let new_height = self.height / 2;
        let (w, h) = (self.width_i(), self.height_i());
        let pixels = usize::try_from(u64::from(new_width) * u64::from(new_height)).unwrap_or(0);

        let mut image = Vec::with_capacity(pixels * 3);
        let mut mask = Vec::with_capacity(pixels);

        for ny in 0..i64::from(new_height) {
            for nx in 0..i64::from(new_width) {
                let mut acc = [0_i64; 3];
                let mut weight = 0_i64;
                let mut any_masked = false;

                // The kernel taps cover offsets -2..=3 around the even sample
                // so the 2x2 decimation footprint sits inside the support.
                for (ky, dy) in (-2_i64..=3).enumerate() {
                    for (kx, dx) in (-2_i64..=3).enumerate() {
                        let sy = reflect(2 * ny + dy, h);
                        let sx = reflect(2 * nx + dx, w);
                        if self.is_masked(sx, sy) {
                            any_masked = true;
                        } else if let Some(px) = self.pixel(sx, sy) {
                            let k = DOWNSAMPLE_KERNEL[ky] * DOWNSAMPLE_KERNEL[kx];
                            acc[0] += k * i64::from(px[0]);
                            acc[1] += k * i64::from(px[1]);
                            acc[2] += k * i64::from(px[2]);
                            weight += k;
                        }
                    }
                }

                for channel in acc {
                    let value = if weight > 0 {
                        u8::try_from((2 * channel + weight) / (2 * weight)).unwrap_or(u8::MAX)
                    } else {
                        0
                    };
                    image.push(value);
                }
                mask.push(any_masked);
            }
        }

        Self {
            width: new_width,
            height: new_height,
            image,
            mask,
        }
    }

    /// Resize the image to `(new_width, new_height)` with bilinear
    /// interpolation.
    ///
    /// A destination pixel is marked as a hole whenever its bilinear kernel
    /// touches any hole pixel of the source.
    #[must_use]
    pub fn upsample(&self, new_width: u32, new_height: u32) -> Self {
        let (w, h) = (self.width_i(), self.height_i());
        let src_w = f64::from(self.width);
        let src_h = f64::from(self.height);
        let pixels = usize::try_from(u64::from(new_width) * u64::from(new_height)).unwrap_or(0);

        let mut image = Vec::with_capacity(pixels * 3);
        let mut mask = Vec::with_capacity(pixels);

        for y in 0..new_height {
            let fy = (f64::from(y) + 0.5) * src_h / f64::from(new_height) - 0.5;
            let floor_y = fy.floor();
            let wy = fy - floor_y;
            let y0 = floor_y.to_i64().unwrap_or(0);

            for x in 0..new_width {
                let fx = (f64::from(x) + 0.5) * src_w / f64::from(new_width) - 0.5;
                let floor_x = fx.floor();
                let wx = fx - floor_x;
                let x0 = floor_x.to_i64().unwrap_or(0);

                let taps = [
                    (x0, y0, (1.0 - wx) * (1.0 - wy)),
                    (x0 + 1, y0, wx * (1.0 - wy)),
                    (x0, y0 + 1, (1.0 - wx) * wy),
                    (x0 + 1, y0 + 1, wx * wy),
                ];

                let mut acc = [0_f64; 3];
                let mut any_masked = false;
                for (tx, ty, tap_weight) in taps {
                    if tap_weight <= 0.0 {
                        continue;
                    }
                    let cx = tx.clamp(0, w - 1);
                    let cy = ty.clamp(0, h - 1);
                    if self.is_masked(cx, cy) {
                        any_masked = true;
                    }
                    if let Some(px) = self.pixel(cx, cy) {
                        acc[0] += tap_weight * f64::from(px[0]);
                        acc[1] += tap_weight * f64::from(px[1]);
                        acc[2] += tap_weight * f64::from(px[2]);
                    }
                }

                for channel in acc {
                    image.push(quantize_channel(channel));
                }
                mask.push(any_masked);
            }
        }

        Self {
            width: new_width,
            height: new_height,
            image,
            mask,
        }
    }
}

/// Round an accumulated channel value into an 8-bit sample.
#[inline]
pub(crate) fn quantize_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0).to_u8().unwrap_or(u8::MAX)
}

/// Reflect an out-of-range coordinate back into `[0, len)` symmetrically.
#[inline]
fn reflect(i: i64, len: i64) -> i64 {
    let r = if i < 0 {
        -i - 1
    } else if i >= len {
        2 * len - i - 1
    } else {
        i
    };
    r.clamp(0, len - 1)
}
