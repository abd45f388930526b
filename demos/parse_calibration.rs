//! Load a stereo calibration and render a rectified composite.
//!
//! Run with: cargo run --example parse_calibration -- [calibration-file]

use bino_cam::calibration::codec;
use bino_cam::{CalibrationStore, DisplayMode, FramePair, RenderContext, Resolution, Side};
use image::{Rgb, RgbImage};

const SAMPLE: &str = "\
# oST version 5.0 parameters
[image]
width
640
height
480
[narrow_stereo/left]
camera matrix
700 0 319.5
0 700 239.5
0 0 1
distortion
-0.28 0.07 0.001 -0.0005 0
rectification
1 0 0
0 1 0
0 0 1
projection
700 0 319.5 0
0 700 239.5 0
0 0 1 0
[image]
width
640
height
480
[narrow_stereo/right]
camera matrix
690 0 321
0 690 241
0 0 1
distortion
-0.3 0.08 0 0 0
rectification
1 0 0
0 1 0
0 0 1
projection
700 0 319.5 -42.5
0 700 239.5 0
0 0 1 0
";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let file = match std::env::args().nth(1) {
        Some(path) => codec::read_stereo(path)?,
        None => codec::parse_stereo(SAMPLE)?,
    };

    let mut store = CalibrationStore::new();
    let installed = store.import_stereo(&file);
    match file.resolution {
        Some(resolution) => println!("📐 Installed {} calibration(s) at {}", installed, resolution),
        None => println!("📐 No complete calibration block found"),
    }

    for side in Side::BOTH {
        match store.get(side) {
            Some(result) => println!("  {}: fx = {:.1}", side, result.camera_matrix[(0, 0)]),
            None => println!("  {}: not calibrated", side),
        }
    }

    // A checker pattern makes the lens correction visible.
    let canvas = Resolution::new(640, 480);
    let checker = RgbImage::from_fn(canvas.width, canvas.height, |x, y| {
        if (x / 40 + y / 40) % 2 == 0 {
            Rgb([230, 230, 230])
        } else {
            Rgb([40, 40, 40])
        }
    });
    let frames = FramePair::new(Some(checker.clone()), Some(checker), canvas);

    let composite = DisplayMode::Rectified.render(&frames, &RenderContext::new(canvas, &store))?;
    composite.save("rectified.png")?;
    println!("✅ Wrote rectified.png ({}x{})", composite.width(), composite.height());

    Ok(())
}
