//! Bino Cam - stereo camera viewer tools
//!
//! Command line entry point for offline use of the viewer core.
//! Run with: cargo run --bin bino-cam -- <command>

use std::env;
use std::path::Path;

use anyhow::{bail, Context};
use bino_cam::calibration::codec::{self, CalibrationBlock};
use bino_cam::{
    AppSettings, CalibrationStore, DisplayMode, FrameSource, RenderContext, StereoRig,
    StillImageSource,
};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage:
  bino-cam inspect <calibration-file> [--stereo]
  bino-cam compose <side-by-side|anaglyph|rectified> <left|-> <right|-> <out> [--offset N] [--calibration FILE]
  bino-cam settings

Settings are read from the config directory and overridden by BINO_CAM_* variables.";

fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut settings = AppSettings::load();
    settings
        .apply_env_overrides()
        .context("Invalid BINO_CAM_* override")?;

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("inspect") => inspect(&args[1..]),
        Some("compose") => compose(&args[1..], &settings),
        Some("settings") => show_settings(&settings),
        Some("-h") | Some("--help") | None => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn inspect(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .context("Missing calibration file")?;
    let stereo = args.iter().any(|arg| arg == "--stereo");

    if stereo {
        let file = codec::read_stereo(path).with_context(|| format!("Cannot parse {}", path))?;
        match file.resolution {
            Some(resolution) => println!("Working resolution: {}", resolution),
            None => println!("Working resolution: none (no complete block)"),
        }
        for (name, block) in [("Left", &file.left), ("Right", &file.right)] {
            match block {
                Some(block) => print_block(name, block),
                None => println!("{}: incomplete or missing\n", name),
            }
        }
    } else {
        let block = codec::read_single(path).with_context(|| format!("Cannot parse {}", path))?;
        print_block("Camera", &block);
    }
    Ok(())
}

fn print_block(name: &str, block: &CalibrationBlock) {
    println!("{} ({})", name, block.resolution());
    println!("camera matrix:{}", block.camera_matrix);
    println!("distortion:{}", block.distortion.transpose());
    println!("rectification:{}", block.rectification);
    println!("projection:{}", block.projection);
}

fn compose(args: &[String], settings: &AppSettings) -> anyhow::Result<()> {
    let mut positional = Vec::new();
    let mut offset = settings.anaglyph_offset;
    let mut calibration = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--offset" => {
                let value = iter.next().context("--offset needs a value")?;
                offset = value
                    .parse()
                    .with_context(|| format!("Invalid offset '{}'", value))?;
            }
            "--calibration" => {
                calibration = Some(iter.next().context("--calibration needs a file")?);
            }
            _ => positional.push(arg.as_str()),
        }
    }
    let [mode, left, right, out] = positional[..] else {
        bail!("compose expects <mode> <left> <right> <out>\n\n{}", USAGE);
    };

    let mode = match mode.parse::<DisplayMode>()? {
        DisplayMode::Anaglyph { .. } => DisplayMode::Anaglyph { offset },
        other => other,
    };

    let left = open_source(left)?;
    let right = open_source(right)?;
    // Offline frames define the canvas; the configured one only applies
    // when neither side has an image.
    let canvas = left
        .as_ref()
        .or(right.as_ref())
        .map(|source| source.resolution())
        .unwrap_or_else(|| settings.canvas());

    let mut store = CalibrationStore::new();
    if let Some(path) = calibration {
        let file = codec::read_stereo(path).with_context(|| format!("Cannot parse {}", path))?;
        let installed = store.import_stereo(&file);
        if installed == 0 {
            bail!("{} holds no complete calibration block", path);
        }
        if let Some(resolution) = store.working_resolution() {
            println!("Loaded {} calibration(s) at {}", installed, resolution);
        }
    }

    let mut rig = StereoRig::new(
        left.map(|s| Box::new(s) as Box<dyn FrameSource>),
        right.map(|s| Box::new(s) as Box<dyn FrameSource>),
    )
    .with_canvas(canvas);
    if !rig.canvas().is_established() {
        bail!("Cannot compose without a canvas resolution");
    }

    let frames = rig.grab();
    let image = mode.render(&frames, &RenderContext::new(rig.canvas(), &store))?;
    image
        .save(out)
        .with_context(|| format!("Failed to write {}", out))?;
    println!("Wrote {} ({}x{}, {})", out, image.width(), image.height(), mode);
    Ok(())
}

fn open_source(path: &str) -> anyhow::Result<Option<StillImageSource>> {
    if path == "-" {
        return Ok(None);
    }
    if !Path::new(path).exists() {
        tracing::warn!("{} does not exist, using a placeholder", path);
        return Ok(None);
    }
    Ok(Some(StillImageSource::open(path)?))
}

fn show_settings(settings: &AppSettings) -> anyhow::Result<()> {
    match AppSettings::settings_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory"),
    }
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
