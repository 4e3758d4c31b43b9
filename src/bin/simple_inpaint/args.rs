use clap::Parser;

#[derive(Debug, Parser)]
#[clap(version, about, long_about = None)]
pub struct Opt {
    /// Input image file.
    #[clap(short, long, parse(from_os_str))]
    pub input: std::path::PathBuf,

    /// Mask image file; nonzero pixels mark the region to fill.
    #[clap(
        short,
        long,
        parse(from_os_str),
        required_unless_present = "mark_color"
    )]
    pub mask: Option<std::path::PathBuf>,

    /// Output file, defaults to PNG image output.
    #[clap(short, long, parse(from_os_str))]
    pub output: Option<std::path::PathBuf>,

    /// Patch half-size; patches span `2r + 1` pixels on a side.
    #[clap(short = 'r', long, default_value_t = simple_inpaint::DEFAULT_PATCH_RADIUS)]
    pub patch_radius: u32,

    /// Seed for the randomized correspondence search.
    #[clap(short, long, default_value_t = 0)]
    pub seed: u64,

    /// Fill input pixels that exactly match this hexadecimal RGB color, for
    /// holes annotated directly on the image.
    #[clap(long)]
    pub mark_color: Option<String>,

    /// Print per-level progress and the time taken.
    #[clap(short, long)]
    pub verbose: bool,

    /// Save as a JPG or PNG file.
    #[clap(long, default_value = "png")]
    pub format: String,

    /// Development flag for testing speeds of calculation.
    #[clap(long, hide = true)]
    pub benchmark: bool,
}
