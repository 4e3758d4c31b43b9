//! Image completion based on randomized patch correspondence.
//!
//! The crate fills in ("inpaints") masked regions of an RGB image by
//! synthesizing plausible content from the unmasked remainder of the same
//! image. The engine couples a coarse-to-fine image pyramid with the
//! **PatchMatch** approximate nearest-neighbor search and an
//! expectation-maximization loop in which matched patches vote for the color
//! of every hole pixel.
//!
//! The algorithm is randomized; a seed is part of the API and fixed seeds
//! reproduce byte-identical output.
//!
//! ## Usage
//!
//! The convenience function [`inpaint_from_bytes`] runs the whole pipeline on
//! raw row-major RGB and mask buffers (mask nonzero = pixel to replace).
//!
//! ```
//! use simple_inpaint::inpaint_from_bytes;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (width, height) = (16u32, 16u32);
//! let image = vec![170u8; 16 * 16 * 3];
//! let mut mask = vec![0u8; 16 * 16];
//! mask[8 * 16 + 8] = 255;
//! let output = inpaint_from_bytes(width, height, &image, &mask, 3, 0)?;
//!
//! assert_eq!(output.len(), image.len());
//! # Ok(())
//! # }
//! ```
//!
//! ### Driving the engine directly
//!
//! [`Inpainter`] exposes the seed and accepts an optional [`ProgressSink`]
//! for per-level and per-iteration events.
//!
//! ```
//! use simple_inpaint::{Inpainter, MaskedImage};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let (width, height) = (16u32, 16u32);
//! # let image = vec![170u8; 16 * 16 * 3];
//! # let mask = vec![0u8; 16 * 16];
//! let masked = MaskedImage::from_bytes(width, height, &image, &mask)?;
//! let inpainter = Inpainter::new(masked, 3)?.with_seed(7);
//! let restored = inpainter.run(None)?;
//! # let _ = restored;
//! # Ok(())
//! # }
//! ```
#![forbid(
    absolute_paths_not_starting_with_crate,
    missing_docs,
    non_ascii_idents,
    noop_method_call,
    unsafe_code,
    unused_results
)]
#![warn(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod distance;
pub mod error;
mod inpaint;
pub mod masked;
pub mod nnf;
pub mod similarity;

pub use inpaint::{inpaint_from_bytes, Inpainter, ProgressSink, Stage};
pub use masked::MaskedImage;

/// Upper bound of the quantized patch distance scale.
///
/// Patch distances are integers in `[0, DISTANCE_SCALE]` so they can index
/// the [similarity table](crate::similarity) directly.
pub const DISTANCE_SCALE: u16 = u16::MAX;

/// Maximum dissimilarity a single pixel pair contributes before the patch
/// average is taken.
///
/// Out-of-bounds and masked positions contribute exactly this amount, which
/// steers the search toward in-bounds, unmasked correspondences.
pub const SSD_SCALE: u16 = 20_000;

/// Six-tap low-pass kernel applied along each axis before 2x decimation.
pub const DOWNSAMPLE_KERNEL: [i64; 6] = [1, 5, 10, 10, 5, 1];

/// Default patch half-size; patches span `2 * DEFAULT_PATCH_RADIUS + 1`
/// pixels on a side.
pub const DEFAULT_PATCH_RADIUS: u32 = 3;

/// Checks if the index is in bounds and returns a reference to the data at
/// that point if it exists.
#[inline]
fn get_in_bounds<T>(width: i64, _height: i64, x: i64, y: i64, data: &[T]) -> Option<&T> {
    if (0..width).contains(&x) {
        let i = u64::try_from(y)
            .ok()?
            .checked_mul(u64::try_from(width).ok()?)?
            .checked_add(u64::try_from(x).ok()?)
            .and_then(|i| usize::try_from(i).ok())?;
        data.get(i)
    } else {
        None
    }
}

/// Checks if the index is in bounds and returns a mutable reference to the
/// data at that point if it exists.
#[inline]
fn get_mut_in_bounds<T>(
    width: i64,
    _height: i64,
    x: i64,
    y: i64,
    data: &mut [T],
) -> Option<&mut T> {
    if (0..width).contains(&x) {
        let i = u64::try_from(y)
            .ok()?
            .checked_mul(u64::try_from(width).ok()?)?
            .checked_add(u64::try_from(x).ok()?)
            .and_then(|i| usize::try_from(i).ok())?;
        data.get_mut(i)
    } else {
        None
    }
}

/// Checks if the pixel is in bounds and returns its three RGB components as a
/// subslice if it exists.
#[inline]
fn rgb_in_bounds(width: i64, _height: i64, x: i64, y: i64, image: &[u8]) -> Option<&[u8]> {
    if (0..width).contains(&x) {
        let i = u64::try_from(y)
            .ok()?
            .checked_mul(u64::try_from(width).ok()?)?
            .checked_add(u64::try_from(x).ok()?)
            .and_then(|i| usize::try_from(i).ok())?;
        let start = i.checked_mul(3)?;
        image.get(start..start.checked_add(3)?)
    } else {
        None
    }
}

/// Checks if the pixel is in bounds and returns its three RGB components as a
/// mutable subslice if it exists.
#[inline]
fn rgb_mut_in_bounds(
    width: i64,
    _height: i64,
    x: i64,
    y: i64,
    image: &mut [u8],
) -> Option<&mut [u8]> {
    if (0..width).contains(&x) {
        let i = u64::try_from(y)
            .ok()?
            .checked_mul(u64::try_from(width).ok()?)?
            .checked_add(u64::try_from(x).ok()?)
            .and_then(|i| usize::try_from(i).ok())?;
        let start = i.checked_mul(3)?;
        image.get_mut(start..start.checked_add(3)?)
    } else {
        None
    }
}
