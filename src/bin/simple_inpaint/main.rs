mod args;
mod utils;

use crate::args::Opt;
use crate::utils::{generate_filename, save_image};

use clap::Parser;

use palette::Srgb;
use simple_inpaint::{inpaint_from_bytes, Inpainter, MaskedImage, ProgressSink};
use std::fmt::Write;
use std::str::FromStr;

fn main() {
    if let Err(e) = try_main() {
        eprintln!("simple_inpaint: {}", e);
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::parse();

    let output_image = if let Some(output) = opt.output {
        output
    } else {
        generate_filename(&opt)?.into()
    };

    let input_image = image::open(&opt.input)?.into_rgb8();
    let (width, height) = input_image.dimensions();
    let pixels = usize::try_from(u64::from(width) * u64::from(height))?;

    let mut mask = Vec::new();
    mask.try_reserve_exact(pixels)?;
    mask.extend((0..pixels).map(|_| 0_u8));

    if let Some(path) = &opt.mask {
        let mask_image = image::open(path)?.into_luma8();
        if mask_image.dimensions() != (width, height) {
            return Err("Mask image dimensions do not match the input image".into());
        }
        for (hole, sample) in mask.iter_mut().zip(mask_image.as_raw()) {
            if *sample != 0 {
                *hole = 255;
            }
        }
    }

    if let Some(hex) = &opt.mark_color {
        let mark: Srgb<u8> =
            Srgb::from_str(hex.as_str()).or(Err("Marker color is invalid hex"))?;
        let mark = [mark.red, mark.green, mark.blue];
        for (hole, px) in mask
            .iter_mut()
            .zip(input_image.as_raw().chunks_exact(3))
        {
            if px == &mark[..] {
                *hole = 255;
            }
        }
    }

    if opt.benchmark {
        let t0 = std::time::Instant::now();
        let _ = inpaint_from_bytes(
            width,
            height,
            input_image.as_raw(),
            &mask,
            opt.patch_radius,
            opt.seed,
        )?;
        println!("inpaint: {:?}", t0.elapsed());
        return Ok(());
    }

    let masked = MaskedImage::from_bytes(width, height, input_image.as_raw(), &mask)?;
    let inpainter = Inpainter::new(masked, opt.patch_radius)?.with_seed(opt.seed);

    let mut display_string = String::new();
    let t0 = std::time::Instant::now();
    let output_buffer = if opt.verbose {
        let mut progress = PrintProgress;
        inpainter.run(Some(&mut progress))?
    } else {
        inpainter.run(None)?
    };
    let elapsed = t0.elapsed();

    save_image(output_image.as_ref(), &output_buffer, width, height)?;

    if opt.verbose {
        write!(
            &mut display_string,
            "inpaint: {:?}, {} levels",
            elapsed,
            inpainter.levels()
        )?;
        println!("{display_string}");
    }

    Ok(())
}

/// Prints pyramid levels and iterations as the engine reaches them.
struct PrintProgress;

impl ProgressSink for PrintProgress {
    fn on_level_begin(&mut self, level: usize) {
        println!("level {level}");
    }

    fn on_em_iteration(&mut self, level: usize, iteration: usize) {
        println!("  level {level}, iteration {iteration}");
    }
}
