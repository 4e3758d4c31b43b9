//! Dense approximate nearest-neighbor fields computed with PatchMatch.
use crate::distance::patch_distance;
use crate::error::InpaintError;
use crate::masked::MaskedImage;
use crate::{get_in_bounds, get_mut_in_bounds};

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// One field entry: the best target patch center found so far for a source
/// patch center, with its evaluated distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NnfEntry {
    /// X-coordinate of the matched patch center in the target image.
    pub tx: i64,
    /// Y-coordinate of the matched patch center in the target image.
    pub ty: i64,
    /// Quantized patch distance of the match.
    pub distance: u16,
}

/// For every patch center of a source image, the best-matching patch center
/// found in a target image.
///
/// The field is minimized with PatchMatch: random initialization, then
/// alternating raster sweeps that propagate good matches from neighbors and
/// probe random candidates at exponentially shrinking radii. The field owns
/// clones of both images; [`set_source`](Self::set_source) and
/// [`set_target`](Self::set_target) swap one side out between
/// expectation-maximization iterations.
#[derive(Clone, Debug)]
pub struct NearestNeighborField {
    source: MaskedImage,
    target: MaskedImage,
    patch_radius: i64,
    entries: Vec<NnfEntry>,
    rng: StdRng,
}

impl NearestNeighborField {
    /// Create a field with every entry drawn uniformly at random from the
    /// target and its distance evaluated.
    pub fn new(
        source: MaskedImage,
        target: MaskedImage,
        patch_radius: u32,
        seed: u64,
    ) -> Result<Self, InpaintError> {
        let mut field = Self::allocate(source, target, patch_radius, seed)?;
        field.randomize();
        Ok(field)
    }

    /// Create a field by scaling up a field computed at half resolution.
    ///
    /// Each entry doubles the parent entry at its half-resolution position,
    /// keeps the sub-pixel parity, clips to the target bounds, and
    /// re-evaluates the distance at this resolution.
    pub fn inherit(
        source: MaskedImage,
        target: MaskedImage,
        patch_radius: u32,
        parent: &Self,
        seed: u64,
    ) -> Result<Self, InpaintError> {
        let mut field = Self::allocate(source, target, patch_radius, seed)?;
        field.inherit_from(parent);
        Ok(field)
    }

    fn allocate(
        source: MaskedImage,
        target: MaskedImage,
        patch_radius: u32,
        seed: u64,
    ) -> Result<Self, InpaintError> {
        let count = usize::try_from(u64::from(source.width()) * u64::from(source.height()))
            .or(Err("Field dimensions do not fit in memory"))?;
        let mut entries = Vec::new();
        entries.try_reserve_exact(count)?;
        entries.extend((0..count).map(|_| NnfEntry::default()));

        Ok(Self {
            source,
            target,
            patch_radius: i64::from(patch_radius),
            entries,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// The image whose patch centers index the field.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &MaskedImage {
        &self.source
    }

    /// The image the field's matches point into.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &MaskedImage {
        &self.target
    }

    /// The entry for the patch centered at `(x, y)`, if in bounds.
    #[inline]
    #[must_use]
    pub fn entry(&self, x: i64, y: i64) -> Option<NnfEntry> {
        get_in_bounds(
            self.source.width_i(),
            self.source.height_i(),
            x,
            y,
            &self.entries,
        )
        .copied()
    }

    /// Pin the entry at `(x, y)` to the identity match with zero distance.
    ///
    /// Patch centers whose neighborhood holds no hole pixel need no
    /// synthesis; the driver pins them before each minimization.
    pub fn set_identity(&mut self, x: i64, y: i64) {
        let (w, h) = (self.source.width_i(), self.source.height_i());
        let (tw, th) = (self.target.width_i(), self.target.height_i());
        if let Some(entry) = get_mut_in_bounds(w, h, x, y, &mut self.entries) {
            *entry = NnfEntry {
                tx: x.clamp(0, tw - 1),
                ty: y.clamp(0, th - 1),
                distance: 0,
            };
        }
    }

    /// Replace the source image and re-evaluate every entry's distance.
    pub fn set_source(&mut self, image: MaskedImage) {
        debug_assert_eq!(
            (image.width(), image.height()),
            (self.source.width(), self.source.height())
        );
        self.source = image;
        self.refresh_distances();
    }

    /// Replace the target image and re-evaluate every entry's distance.
    pub fn set_target(&mut self, image: MaskedImage) {
        debug_assert_eq!(
            (image.width(), image.height()),
            (self.target.width(), self.target.height())
        );
        self.target = image;
        self.refresh_distances();
    }

    /// Run PatchMatch sweeps over the field.
    ///
    /// Even sweeps scan in increasing row-major order and propagate matches
    /// from the up/left neighbors; odd sweeps scan decreasing and propagate
    /// from down/right, giving two-way propagation every two passes. Entries
    /// whose source neighborhood holds no hole pixel are skipped. A stored
    /// distance never increases.
    pub fn minimize(&mut self, iterations: usize) {
        let (w, h) = (self.source.width_i(), self.source.height_i());
        for iteration in 0..iterations {
            if iteration % 2 == 0 {
                for y in 0..h {
                    for x in 0..w {
                        self.improve(x, y, [(-1, 0), (0, -1)]);
                    }
                }
            } else {
                for y in (0..h).rev() {
                    for x in (0..w).rev() {
                        self.improve(x, y, [(1, 0), (0, 1)]);
                    }
                }
            }
        }
    }

    /// One propagation + random-search step for the entry at `(x, y)`.
    fn improve(&mut self, x: i64, y: i64, neighbors: [(i64, i64); 2]) {
        if !self.source.contains_mask(x, y, self.patch_radius) {
            return;
        }
        let (w, h) = (self.source.width_i(), self.source.height_i());
        let (tw, th) = (self.target.width_i(), self.target.height_i());
        let mut best = if let Some(&entry) = get_in_bounds(w, h, x, y, &self.entries) {
            entry
        } else {
            return;
        };

        // Propagation: shift a neighbor's match by the offset separating us,
        // so contiguous regions ride the same correspondence.
        for (dx, dy) in neighbors {
            if let Some(&neighbor) = get_in_bounds(w, h, x + dx, y + dy, &self.entries) {
                let (cx, cy) = (neighbor.tx - dx, neighbor.ty - dy);
                if (0..tw).contains(&cx) && (0..th).contains(&cy) {
                    let d =
                        patch_distance(&self.source, x, y, &self.target, cx, cy, self.patch_radius);
                    if d < best.distance {
                        best = NnfEntry {
                            tx: cx,
                            ty: cy,
                            distance: d,
                        };
                    }
                }
            }
        }

        // Random search: probe a uniform candidate in the square around the
        // current best, halving the radius until it collapses.
        let mut radius = tw.max(th);
        while radius >= 1 {
            let cx = (best.tx + self.rng.gen_range(-radius..=radius)).clamp(0, tw - 1);
            let cy = (best.ty + self.rng.gen_range(-radius..=radius)).clamp(0, th - 1);
            let d = patch_distance(&self.source, x, y, &self.target, cx, cy, self.patch_radius);
            if d < best.distance {
                best = NnfEntry {
                    tx: cx,
                    ty: cy,
                    distance: d,
                };
            }
            radius /= 2;
        }

        if let Some(entry) = get_mut_in_bounds(w, h, x, y, &mut self.entries) {
            *entry = best;
        }
    }

    fn randomize(&mut self) {
        let (w, h) = (self.source.width_i(), self.source.height_i());
        let (tw, th) = (self.target.width_i(), self.target.height_i());
        let sample_x = Uniform::from(0..tw);
        let sample_y = Uniform::from(0..th);

        for y in 0..h {
            for x in 0..w {
                let tx = sample_x.sample(&mut self.rng);
                let ty = sample_y.sample(&mut self.rng);
                let distance =
                    patch_distance(&self.source, x, y, &self.target, tx, ty, self.patch_radius);
                if let Some(entry) = get_mut_in_bounds(w, h, x, y, &mut self.entries) {
                    *entry = NnfEntry { tx, ty, distance };
                }
            }
        }
    }

    fn inherit_from(&mut self, parent: &Self) {
        let (w, h) = (self.source.width_i(), self.source.height_i());
        let (tw, th) = (self.target.width_i(), self.target.height_i());
        let (pw, ph) = (parent.source.width_i(), parent.source.height_i());

        for y in 0..h {
            for x in 0..w {
                let px = (x / 2).min(pw - 1);
                let py = (y / 2).min(ph - 1);
                let coarse = if let Some(&entry) = get_in_bounds(pw, ph, px, py, &parent.entries) {
                    entry
                } else {
                    NnfEntry::default()
                };
                let tx = (2 * coarse.tx + x % 2).clamp(0, tw - 1);
                let ty = (2 * coarse.ty + y % 2).clamp(0, th - 1);
                let distance =
                    patch_distance(&self.source, x, y, &self.target, tx, ty, self.patch_radius);
                if let Some(entry) = get_mut_in_bounds(w, h, x, y, &mut self.entries) {
                    *entry = NnfEntry { tx, ty, distance };
                }
            }
        }
    }

    fn refresh_distances(&mut self) {
        let (w, h) = (self.source.width_i(), self.source.height_i());
        for y in 0..h {
            for x in 0..w {
                if let Some(&entry) = get_in_bounds(w, h, x, y, &self.entries) {
                    let distance = patch_distance(
                        &self.source,
                        x,
                        y,
                        &self.target,
                        entry.tx,
                        entry.ty,
                        self.patch_radius,
                    );
                    if let Some(slot) = get_mut_in_bounds(w, h, x, y, &mut self.entries) {
                        slot.distance = distance;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 16x16 two-tone image with a masked square in the middle.
    fn holed_image() -> MaskedImage {
        let mut image = Vec::with_capacity(16 * 16 * 3);
        for y in 0..16u32 {
            for _x in 0..16u32 {
                if y < 8 {
                    image.extend_from_slice(&[220, 40, 40]);
                } else {
                    image.extend_from_slice(&[40, 40, 220]);
                }
            }
        }
        let mut mask = vec![false; 16 * 16];
        for y in 5..9 {
            for x in 5..9 {
                mask[y * 16 + x] = true;
            }
        }
        MaskedImage::from_buffers(16, 16, image, mask).unwrap()
    }

    fn clean_target() -> MaskedImage {
        let mut target = holed_image();
        target.clear_mask();
        target
    }

    #[test]
    fn test_entries_stay_in_bounds_and_consistent() {
        let mut field = NearestNeighborField::new(holed_image(), clean_target(), 3, 11).unwrap();
        field.minimize(2);
        for y in 0..16 {
            for x in 0..16 {
                let entry = field.entry(x, y).unwrap();
                assert!((0..16).contains(&entry.tx));
                assert!((0..16).contains(&entry.ty));
                let recomputed = patch_distance(
                    field.source(),
                    x,
                    y,
                    field.target(),
                    entry.tx,
                    entry.ty,
                    3,
                );
                assert_eq!(entry.distance, recomputed);
            }
        }
    }

    #[test]
    fn test_minimize_never_increases_distance() {
        let mut field = NearestNeighborField::new(holed_image(), clean_target(), 3, 5).unwrap();
        field.minimize(1);
        let before: Vec<u16> = (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .map(|(x, y)| field.entry(x, y).unwrap().distance)
            .collect();
        field.minimize(2);
        for (i, (x, y)) in (0..16)
            .flat_map(|y| (0..16).map(move |x| (x, y)))
            .enumerate()
        {
            assert!(field.entry(x, y).unwrap().distance <= before[i]);
        }
    }

    #[test]
    fn test_set_identity_pins_entry() {
        let mut field = NearestNeighborField::new(holed_image(), clean_target(), 3, 2).unwrap();
        field.set_identity(6, 7);
        assert_eq!(
            field.entry(6, 7).unwrap(),
            NnfEntry {
                tx: 6,
                ty: 7,
                distance: 0
            }
        );
    }

    #[test]
    fn test_minimize_skips_mask_free_neighborhoods() {
        let mut field = NearestNeighborField::new(holed_image(), clean_target(), 3, 13).unwrap();
        // (1, 1) is more than a patch radius away from the hole at 5..9.
        assert!(!field.source().contains_mask(1, 1, 3));
        field.set_identity(1, 1);
        field.minimize(3);
        assert_eq!(
            field.entry(1, 1).unwrap(),
            NnfEntry {
                tx: 1,
                ty: 1,
                distance: 0
            }
        );
    }

    #[test]
    fn test_inherited_field_scales_matches() {
        let coarse_source = holed_image().downsample();
        let coarse_target = clean_target().downsample();
        let mut parent =
            NearestNeighborField::new(coarse_source, coarse_target, 3, 21).unwrap();
        parent.minimize(2);

        let field =
            NearestNeighborField::inherit(holed_image(), clean_target(), 3, &parent, 22).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                let entry = field.entry(x, y).unwrap();
                assert!((0..16).contains(&entry.tx));
                assert!((0..16).contains(&entry.ty));
                let coarse = parent.entry(x / 2, y / 2).unwrap();
                assert_eq!(entry.tx, (2 * coarse.tx + x % 2).clamp(0, 15));
                assert_eq!(entry.ty, (2 * coarse.ty + y % 2).clamp(0, 15));
            }
        }
    }

    #[test]
    fn test_set_target_refreshes_distances() {
        let mut field = NearestNeighborField::new(holed_image(), clean_target(), 3, 8).unwrap();
        field.minimize(1);
        let mut brighter = clean_target();
        for y in 0..16 {
            for x in 0..16 {
                brighter.write_pixel(x, y, [255, 255, 255]);
            }
        }
        field.set_target(brighter);
        for y in 0..16 {
            for x in 0..16 {
                let entry = field.entry(x, y).unwrap();
                let recomputed = patch_distance(
                    field.source(),
                    x,
                    y,
                    field.target(),
                    entry.tx,
                    entry.ty,
                    3,
                );
                assert_eq!(entry.distance, recomputed);
            }
        }
    }
}
