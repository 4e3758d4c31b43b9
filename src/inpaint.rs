//! Top-level multi-scale inpainting driver.
use crate::error::InpaintError;
use crate::masked::{quantize_channel, MaskedImage};
use crate::nnf::NearestNeighborField;
use crate::similarity::similarity;
use crate::{get_in_bounds, get_mut_in_bounds, rgb_mut_in_bounds};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Internal stage of one expectation-maximization iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// PatchMatch sweeps over both correspondence fields.
    NnfMinimize,
    /// Vote pass along the source-to-target field (completeness).
    ExpectationSourceToTarget,
    /// Vote pass along the target-to-source field (coherence).
    ExpectationTargetToSource,
    /// Writing the weight-normalized vote means back into the target.
    Maximization,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NnfMinimize => write!(f, "nnf_minimize"),
            Self::ExpectationSourceToTarget => write!(f, "expectation_st"),
            Self::ExpectationTargetToSource => write!(f, "expectation_ts"),
            Self::Maximization => write!(f, "maximization"),
        }
    }
}

/// Receiver for progress events from [`Inpainter::run`].
///
/// Every method has an empty default so implementors only override what they
/// observe. [`cancelled`](Self::cancelled) is polled between
/// expectation-maximization iterations; returning `true` aborts the run with
/// [`InpaintError::Cancelled`].
pub trait ProgressSink {
    /// Called when work begins on a pyramid level.
    fn on_level_begin(&mut self, _level: usize) {}

    /// Called at the start of each expectation-maximization iteration of a
    /// level.
    fn on_em_iteration(&mut self, _level: usize, _iteration: usize) {}

    /// Called when an internal stage of the current iteration begins.
    fn on_stage(&mut self, _stage: Stage) {}

    /// Polled between iterations; return `true` to cancel the run.
    fn cancelled(&self) -> bool {
        false
    }
}

/// Sink used when the caller passes no progress receiver.
struct NoProgress;

impl ProgressSink for NoProgress {}

/// Multi-scale exemplar-based inpainting engine.
///
/// Construction builds the image pyramid; [`run`](Self::run) seeds the
/// coarsest level and alternates PatchMatch correspondence search with patch
/// voting up through the pyramid. The engine is randomized: runs with the
/// same input and seed produce byte-identical output.
#[derive(Clone, Debug)]
pub struct Inpainter {
    pyramid: Vec<MaskedImage>,
    patch_radius: u32,
    seed: u64,
}

impl Inpainter {
    /// Create an engine for `image`, taking ownership of it as pyramid
    /// level 0.
    ///
    /// `patch_radius` is the patch half-size; patches span
    /// `2 * patch_radius + 1` pixels. Both image dimensions must exceed the
    /// patch span so at least one coarser pyramid level exists.
    pub fn new(image: MaskedImage, patch_radius: u32) -> Result<Self, InpaintError> {
        let span = i64::from(2 * patch_radius + 1);
        if image.width_i() <= span || image.height_i() <= span {
            return Err(InpaintError::ImageTooSmall);
        }
        if image.is_fully_masked() {
            log::warn!("every input pixel is masked; output is synthesized from a blurred seed");
        }
        let _ = similarity();

        let mut pyramid = vec![image];
        while let Some(last) = pyramid.last() {
            if last.width_i() > span && last.height_i() > span {
                let down = last.downsample();
                pyramid.push(down);
            } else {
                break;
            }
        }
        log::debug!(
            "built {} pyramid levels, coarsest {}x{}",
            pyramid.len(),
            pyramid.last().map_or(0, MaskedImage::width),
            pyramid.last().map_or(0, MaskedImage::height),
        );

        Ok(Self {
            pyramid,
            patch_radius,
            seed: 0,
        })
    }

    /// Set the seed of the run's pseudorandom number generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of pyramid levels, including the original resolution.
    #[must_use]
    pub fn levels(&self) -> usize {
        self.pyramid.len()
    }

    /// Fill the masked region and return the completed row-major RGB buffer.
    ///
    /// Originally-unmasked pixels are returned bit-exactly; masked pixels are
    /// replaced with synthesized content. The engine may be run repeatedly;
    /// each run restarts from the stored seed.
    pub fn run(
        &self,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<Vec<u8>, InpaintError> {
        let mut noop = NoProgress;
        let sink: &mut dyn ProgressSink = if let Some(sink) = progress { sink } else { &mut noop };

        let levels = self.pyramid.len();
        let coarsest = levels - 1;
        let radius = self.patch_radius;
        let mut master = StdRng::seed_from_u64(self.seed);

        // The coarsest target starts as the source with every pixel treated
        // as known; the blurred decimation is the rough initial guess.
        let seed_source = &self.pyramid[coarsest];
        let mut target = seed_source.clone();
        target.clear_mask();

        let mut s2t =
            NearestNeighborField::new(seed_source.clone(), target.clone(), radius, master.gen())?;
        let mut t2s =
            NearestNeighborField::new(target.clone(), seed_source.clone(), radius, master.gen())?;

        for level in (1..levels).rev() {
            sink.on_level_begin(level);
            log::debug!("inpainting level {level}");

            let source = &self.pyramid[level];
            if level != coarsest {
                s2t = NearestNeighborField::inherit(
                    source.clone(),
                    target.clone(),
                    radius,
                    &s2t,
                    master.gen(),
                )?;
                t2s = NearestNeighborField::inherit(
                    target.clone(),
                    source.clone(),
                    radius,
                    &t2s,
                    master.gen(),
                )?;
            }

            target = self.expectation_maximization(level, source, target, &mut s2t, &mut t2s, sink)?;
        }

        self.composite(&target)
    }

    /// Run the EM iterations of one pyramid level.
    ///
    /// Returns the target for the next-finer level: the last iteration votes
    /// into a target built at the next level's resolution, which upsamples
    /// with less blur than rescaling the finished target would.
    fn expectation_maximization(
        &self,
        level: usize,
        source: &MaskedImage,
        mut target: MaskedImage,
        s2t: &mut NearestNeighborField,
        t2s: &mut NearestNeighborField,
        sink: &mut dyn ProgressSink,
    ) -> Result<MaskedImage, InpaintError> {
        let em_iterations = 1 + 2 * level;
        let nnf_iterations = (1 + level).min(7);
        let radius = i64::from(self.patch_radius);

        for iteration in 0..em_iterations {
            if sink.cancelled() {
                return Err(InpaintError::Cancelled);
            }
            sink.on_em_iteration(level, iteration);

            if iteration != 0 {
                s2t.set_target(target.clone());
                t2s.set_source(target.clone());
            }

            // Patch centers with no hole in reach map to themselves.
            for y in 0..source.height_i() {
                for x in 0..source.width_i() {
                    if !source.contains_mask(x, y, radius) {
                        s2t.set_identity(x, y);
                        t2s.set_identity(x, y);
                    }
                }
            }

            sink.on_stage(Stage::NnfMinimize);
            s2t.minimize(nnf_iterations);
            t2s.minimize(nnf_iterations);

            let upscaled = iteration + 1 == em_iterations;
            let new_source = if upscaled {
                &self.pyramid[level - 1]
            } else {
                source
            };
            let mut new_target = if upscaled {
                target.upsample(new_source.width(), new_source.height())
            } else {
                target.clone()
            };

            let cells =
                usize::try_from(u64::from(new_target.width()) * u64::from(new_target.height()))
                    .or(Err("Vote buffer does not fit in memory"))?;
            let mut vote = Vec::new();
            vote.try_reserve_exact(cells)?;
            vote.extend((0..cells).map(|_| [0.0_f64; 4]));

            sink.on_stage(Stage::ExpectationSourceToTarget);
            expectation_step(
                s2t,
                true,
                &mut vote,
                new_target.width_i(),
                new_target.height_i(),
                new_source,
                upscaled,
                radius,
            );
            sink.on_stage(Stage::ExpectationTargetToSource);
            expectation_step(
                t2s,
                false,
                &mut vote,
                new_target.width_i(),
                new_target.height_i(),
                new_source,
                upscaled,
                radius,
            );

            sink.on_stage(Stage::Maximization);
            maximization_step(&mut new_target, &vote);

            target = new_target;
        }

        Ok(target)
    }

    /// Copy synthesized content into the hole pixels of the original image.
    fn composite(&self, target: &MaskedImage) -> Result<Vec<u8>, InpaintError> {
        let original = &self.pyramid[0];
        let (w, h) = (original.width_i(), original.height_i());

        let mut output = Vec::new();
        output.try_reserve_exact(original.image_bytes().len())?;
        output.extend_from_slice(original.image_bytes());

        for y in 0..h {
            for x in 0..w {
                if original.is_masked(x, y) {
                    if let (Some(rgb), Some(slot)) =
                        (target.pixel(x, y), rgb_mut_in_bounds(w, h, x, y, &mut output))
                    {
                        slot.copy_from_slice(&rgb);
                    }
                }
            }
        }

        Ok(output)
    }
}

/// Cast votes along one correspondence field.
///
/// Every pixel pair of every matched patch casts a similarity-weighted vote.
/// Votes always flow from `new_source` into the vote grid: for the
/// target-to-source field the pair is swapped so the roles line up. When
/// `upscaled`, source and vote grid are at double the field's resolution and
/// each pair fans out over its 2x2 block.
#[allow(clippy::too_many_arguments)]
fn expectation_step(
    nnf: &NearestNeighborField,
    source_to_target: bool,
    vote: &mut [[f64; 4]],
    vote_width: i64,
    vote_height: i64,
    new_source: &MaskedImage,
    upscaled: bool,
    patch_radius: i64,
) {
    let lut = similarity();
    let (sw, sh) = (nnf.source().width_i(), nnf.source().height_i());
    let (tw, th) = (nnf.target().width_i(), nnf.target().height_i());

    for y in 0..sh {
        for x in 0..sw {
            let entry = if let Some(entry) = nnf.entry(x, y) {
                entry
            } else {
                continue;
            };
            debug_assert!(usize::from(entry.distance) < lut.len());
            let weight = lut[usize::from(entry.distance)];

            for dy in -patch_radius..=patch_radius {
                for dx in -patch_radius..=patch_radius {
                    let (xs, ys) = (x + dx, y + dy);
                    let (xt, yt) = (entry.tx + dx, entry.ty + dy);
                    if !(0..sw).contains(&xs) || !(0..sh).contains(&ys) {
                        continue;
                    }
                    if !(0..tw).contains(&xt) || !(0..th).contains(&yt) {
                        continue;
                    }

                    let (xs, ys, xt, yt) = if source_to_target {
                        (xs, ys, xt, yt)
                    } else {
                        (xt, yt, xs, ys)
                    };

                    if upscaled {
                        for uy in 0..2 {
                            for ux in 0..2 {
                                weighted_copy(
                                    new_source,
                                    2 * xs + ux,
                                    2 * ys + uy,
                                    vote,
                                    vote_width,
                                    vote_height,
                                    2 * xt + ux,
                                    2 * yt + uy,
                                    weight,
                                );
                            }
                        }
                    } else {
                        weighted_copy(
                            new_source, xs, ys, vote, vote_width, vote_height, xt, yt, weight,
                        );
                    }
                }
            }
        }
    }
}

/// Accumulate one weighted vote; masked source pixels carry no information
/// and vote nothing.
#[allow(clippy::too_many_arguments)]
fn weighted_copy(
    source: &MaskedImage,
    xs: i64,
    ys: i64,
    vote: &mut [[f64; 4]],
    vote_width: i64,
    vote_height: i64,
    xt: i64,
    yt: i64,
    weight: f64,
) {
    if source.is_masked(xs, ys) {
        return;
    }
    let px = if let Some(px) = source.pixel(xs, ys) {
        px
    } else {
        return;
    };
    if let Some(cell) = get_mut_in_bounds(vote_width, vote_height, xt, yt, vote) {
        cell[0] += weight * f64::from(px[0]);
        cell[1] += weight * f64::from(px[1]);
        cell[2] += weight * f64::from(px[2]);
        cell[3] += weight;
    }
}

/// Replace every voted pixel with the weight-normalized mean of its votes and
/// clear its hole flag; pixels with no votes stay masked for the next
/// iteration.
fn maximization_step(target: &mut MaskedImage, vote: &[[f64; 4]]) {
    let (w, h) = (target.width_i(), target.height_i());
    for y in 0..h {
        for x in 0..w {
            if let Some(cell) = get_in_bounds(w, h, x, y, vote) {
                if cell[3] > 0.0 {
                    let rgb = [
                        quantize_channel(cell[0] / cell[3]),
                        quantize_channel(cell[1] / cell[3]),
                        quantize_channel(cell[2] / cell[3]),
                    ];
                    target.write_pixel(x, y, rgb);
                }
            }
        }
    }
}

/// Inpaint raw row-major byte buffers.
///
/// A nonzero `mask` byte marks the pixel to be replaced. Returns the
/// completed RGB buffer at the input dimensions.
///
/// `image` must hold `width * height * 3` bytes and `mask` must hold
/// `width * height` bytes. Both image dimensions must exceed the patch span
/// `2 * patch_radius + 1`.
pub fn inpaint_from_bytes(
    width: u32,
    height: u32,
    image: &[u8],
    mask: &[u8],
    patch_radius: u32,
    seed: u64,
) -> Result<Vec<u8>, InpaintError> {
    let masked = MaskedImage::from_bytes(width, height, image, mask)?;
    Inpainter::new(masked, patch_radius)?.with_seed(seed).run(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_with_hole(width: u32, height: u32) -> MaskedImage {
        let pixels = (width * height) as usize;
        let mut mask = vec![false; pixels];
        mask[pixels / 2] = true;
        MaskedImage::from_buffers(width, height, vec![128; pixels * 3], mask).unwrap()
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::NnfMinimize.to_string(), "nnf_minimize");
        assert_eq!(Stage::ExpectationSourceToTarget.to_string(), "expectation_st");
        assert_eq!(Stage::ExpectationTargetToSource.to_string(), "expectation_ts");
        assert_eq!(Stage::Maximization.to_string(), "maximization");
    }

    #[test]
    fn test_rejects_images_smaller_than_patch_span() {
        let img = gray_with_hole(7, 12);
        assert!(matches!(
            Inpainter::new(img, 3),
            Err(InpaintError::ImageTooSmall)
        ));
    }

    #[test]
    fn test_pyramid_terminates_at_patch_span() {
        let inpainter = Inpainter::new(gray_with_hole(32, 32), 3).unwrap();
        // 32 -> 16 -> 8 -> 4; 8 still exceeds the 7-pixel span, 4 does not.
        assert_eq!(inpainter.levels(), 4);
    }

    #[test]
    fn test_cancellation_between_iterations() {
        struct CancelNow;
        impl ProgressSink for CancelNow {
            fn cancelled(&self) -> bool {
                true
            }
        }

        let inpainter = Inpainter::new(gray_with_hole(16, 16), 3).unwrap();
        let mut sink = CancelNow;
        assert!(matches!(
            inpainter.run(Some(&mut sink)),
            Err(InpaintError::Cancelled)
        ));
    }

    #[test]
    fn test_progress_events_are_emitted() {
        #[derive(Default)]
        struct Counter {
            levels: Vec<usize>,
            iterations: usize,
            stages: usize,
        }
        impl ProgressSink for Counter {
            fn on_level_begin(&mut self, level: usize) {
                self.levels.push(level);
            }
            fn on_em_iteration(&mut self, _level: usize, _iteration: usize) {
                self.iterations += 1;
            }
            fn on_stage(&mut self, _stage: Stage) {
                self.stages += 1;
            }
        }

        let inpainter = Inpainter::new(gray_with_hole(16, 16), 3).unwrap();
        let mut sink = Counter::default();
        let _ = inpainter.run(Some(&mut sink)).unwrap();
        // 16 -> 8 -> 4: levels 1 and 2 run EM with 3 and 5 iterations.
        assert_eq!(sink.levels, vec![2, 1]);
        assert_eq!(sink.iterations, 8);
        assert_eq!(sink.stages, 8 * 4);
    }
}
