use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{codecs::jpeg::JpegEncoder, ColorType, ImageEncoder};

// Create a file name displaying the patch radius and seed used.
pub fn generate_filename(opt: &crate::args::Opt) -> Result<String, Box<dyn std::error::Error>> {
    let mut filename = opt
        .input
        .file_stem()
        .ok_or("No file stem")?
        .to_str()
        .ok_or("Could not convert file stem to string")?
        .to_string();

    let format =
        if opt.format.eq_ignore_ascii_case("jpg") || opt.format.eq_ignore_ascii_case("jpeg") {
            "jpg"
        } else {
            opt.format.as_str()
        };

    use std::fmt::Write;
    write!(
        &mut filename,
        "-inpaint-r{radius}-s{seed}.{format}",
        radius = opt.patch_radius,
        seed = opt.seed
    )?;

    Ok(filename)
}

// Saves image buffer to file.
pub fn save_image(
    output: &std::path::Path,
    imgbuf: &[u8],
    width: u32,
    height: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let w = std::io::BufWriter::new(std::fs::File::create(output)?);

    // Save as jpg if it matches the extension
    if let Some(ext) = output.extension() {
        if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") {
            let mut encoder = JpegEncoder::new_with_quality(w, 90);

            if let Err(err) = encoder.encode(imgbuf, width, height, ColorType::Rgb8) {
                eprintln!("simple_inpaint: {}", err);
                std::fs::remove_file(output)?;
            }

            return Ok(());
        }
    }

    // Sub filter seemed to result in better filesize compared to Adaptive
    let encoder = PngEncoder::new_with_quality(w, CompressionType::Best, FilterType::Sub);

    // Clean up if file is created but there's a problem writing to it
    if let Err(err) = encoder.write_image(imgbuf, width, height, ColorType::Rgb8) {
        eprintln!("simple_inpaint: {}", err);
        std::fs::remove_file(output)?;
    }

    Ok(())
}
