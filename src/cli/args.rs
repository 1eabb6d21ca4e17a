// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use clap::{Args, Parser, Subcommand};

use crate::geometry::{Rect, Size};

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Predict Options:
    --model, -m <MODEL>    Path to the exported ONNX pose model
    --config, -c <CONFIG>  Path to the model's pose_cfg.yaml
    --source, -s <SOURCE>  Input source (image, directory or glob)
    --conf <CONF>          Mask body parts below this confidence
    --scale <SCALE>        Resize frames by this factor before inference
    --roi <X,Y,W,H>        Only analyze this region of each frame
    --color <COLOR>        Color conversion (bgr2rgb, rgb2bgr, gray2rgb, gray2bgr, none) [default: none]
    --maps                 Decode score maps instead of the regression output
    --batch <BATCH>        Frames per inference call [default: 1]
    --margin <W,H>         Bounding box margin [default: 10,10]
    --fixed-size           Use a fixed-size bounding box of --margin dimensions
    --device <DEVICE>      Device (cpu, cuda:0, coreml, mps)
    --verbose              Show verbose output

Examples:
    dlc-inference predict -m dlc_model.onnx -c pose_cfg.yaml -s frame.png
    dlc-inference predict -m dlc_model.onnx -c pose_cfg.yaml -s frames/ --batch 8
    dlc-inference predict -m dlc_model.onnx -c pose_cfg.yaml -s "frames/*.png" --maps --conf 0.6
    dlc-inference predict -m dlc_model.onnx -c pose_cfg.yaml -s frame.png --roi 100,50,320,240 --scale 0.5"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate poses in still images
    Predict(PredictArgs),
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Path to the exported ONNX pose model
    #[arg(short, long)]
    pub model: String,

    /// Path to the model's `pose_cfg.yaml`
    #[arg(short, long)]
    pub config: String,

    /// Input source (image, directory or glob)
    #[arg(short, long)]
    pub source: String,

    /// Mask body parts below this confidence
    #[arg(long)]
    pub conf: Option<f32>,

    /// Resize frames by this factor before inference
    #[arg(long)]
    pub scale: Option<f32>,

    /// Only analyze this region of each frame, as `x,y,w,h`
    #[arg(long, value_parser = parse_rect)]
    pub roi: Option<Rect>,

    /// Color conversion applied while packing frames
    #[arg(long, default_value = "none")]
    pub color: String,

    /// Decode score maps instead of the regression output
    #[arg(long, default_value_t = false)]
    pub maps: bool,

    /// Frames per inference call
    #[arg(long, default_value_t = 1)]
    pub batch: usize,

    /// Bounding box margin, or its size with `--fixed-size`, as `w,h`
    #[arg(long, default_value = "10,10", value_parser = parse_size)]
    pub margin: Size,

    /// Use a fixed-size bounding box centered on the pose
    #[arg(long, default_value_t = false)]
    pub fixed_size: bool,

    /// Device to use (cpu, cuda:0, coreml, mps)
    #[arg(long)]
    pub device: Option<String>,

    /// Intra-op threads for the runtime (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Show verbose output
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub verbose: bool,
}

/// Parse a comma separated list of exactly `N` integers.
fn parse_ints<const N: usize>(s: &str) -> Result<[i32; N], String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<i32>().map_err(|e| format!("'{v}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    values
        .try_into()
        .map_err(|v: Vec<i32>| format!("expected {N} comma separated integers, got {}", v.len()))
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let [x, y, width, height] = parse_ints::<4>(s)?;
    Ok(Rect::new(x, y, width, height))
}

fn parse_size(s: &str) -> Result<Size, String> {
    let [width, height] = parse_ints::<2>(s)?;
    if width < 0 || height < 0 {
        return Err(format!("size must not be negative: {s}"));
    }
    Ok(Size::new(width, height))
}
