//! ascv CLI - Convert, encode, inspect and play character-grid animations.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ascv::{
    animation::{
        Clock, Compression, Container, FrameRecord, PlaybackToken, SystemClock, TemporalDecoder,
        TemporalEncoder,
    },
    compute::{FrameAssembler, rainbow_rgb, rgba_from_fn, unpack_rgb},
    schema::{ColorMode, Frame, PipelineConfig},
};

/// Interval between demo frames and playback ticks.
const FRAME_MS: f64 = 40.0;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("--example") => print_example_config(),
        Some("demo") if args.len() >= 4 => {
            let frames = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(60);
            run_demo(Path::new(&args[2]), &PathBuf::from(&args[3]), frames);
        }
        Some("convert") if args.len() >= 7 => {
            let width = parse_arg(&args[4], "width");
            let height = parse_arg(&args[5], "height");
            run_convert(
                Path::new(&args[2]),
                Path::new(&args[3]),
                width,
                height,
                &PathBuf::from(&args[6]),
            );
        }
        Some("inspect") if args.len() >= 3 => run_inspect(Path::new(&args[2])),
        Some("play") if args.len() >= 3 => {
            let seconds: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(5.0);
            run_play(Path::new(&args[2]), seconds);
        }
        _ => {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <command> [args]");
    eprintln!();
    eprintln!("Convert images to character grids and encode them as .ascv containers.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  --example                                   Print an example configuration");
    eprintln!("  demo <config.json> <out> [frames]           Encode a synthetic animation (default: 60 frames)");
    eprintln!("  convert <config.json> <in.rgba> <w> <h> <out>  Convert a raw RGBA8 image to a still container");
    eprintln!("  inspect <file>                              Print container metadata and record counts");
    eprintln!("  play <file> [seconds]                       Play in the terminal (default: 5 seconds)");
    eprintln!();
    eprintln!("Output compression follows the extension: .ascv, .ascv.gz or .ascv.lz4.");
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn parse_arg(value: &str, name: &str) -> usize {
    value
        .parse()
        .unwrap_or_else(|_| fail(format!("{name} must be a positive integer, got {value:?}")))
}

fn load_config(path: &Path) -> PipelineConfig {
    let config_str = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("reading config file: {e}")));
    let config: PipelineConfig = serde_json::from_str(&config_str)
        .unwrap_or_else(|e| fail(format!("parsing config: {e}")));
    if let Err(e) = config.validate() {
        fail(format!("invalid config: {e}"));
    }
    config
}

fn save(container: &Container, out: &Path) {
    let requested = Compression::from_path(out);
    let applied = container
        .save(out, requested)
        .unwrap_or_else(|e| fail(format!("writing {}: {e}", out.display())));
    let size = fs::metadata(out).map(|m| m.len()).unwrap_or(0);
    println!("Wrote {} ({size} bytes, {applied:?})", out.display());
}

/// Synthetic source: a drifting plasma with a bright orbiting disc.
fn demo_source(width: usize, height: usize, t: f32) -> Vec<u8> {
    let (cx, cy) = (
        width as f32 * (0.5 + 0.3 * t.cos()),
        height as f32 * (0.5 + 0.3 * t.sin()),
    );
    let radius = height as f32 * 0.15;
    rgba_from_fn(width, height, |x, y| {
        let (fx, fy) = (x as f32, y as f32);
        let plasma = ((fx * 0.05 + t).sin() + (fy * 0.07 - t * 0.5).cos()) * 0.25 + 0.5;
        let inside = (fx - cx).hypot(fy - cy) < radius;
        let v = if inside { 1.0 } else { plasma * 0.6 };
        [
            (v * 255.0) as u8,
            (plasma * 180.0) as u8,
            ((1.0 - plasma) * 255.0) as u8,
            255,
        ]
    })
}

fn run_demo(config_path: &Path, out: &Path, frames: u32) {
    let config = load_config(config_path);
    let assembler = FrameAssembler::new(config.conversion)
        .unwrap_or_else(|e| fail(format!("invalid config: {e}")));
    let mut encoder = TemporalEncoder::new(config.encoder);

    let (src_w, src_h) = (320, 180);
    println!("ascv demo");
    println!("=========");
    println!(
        "Mode: {:?}, color: {:?}, {} columns",
        assembler.config().mode,
        assembler.config().color_mode,
        assembler.config().resolution
    );
    println!("Frames: {frames}");
    println!();

    let start = Instant::now();
    encoder.start();
    for i in 0..frames {
        let data = demo_source(src_w, src_h, i as f32 * 0.15);
        let frame = assembler
            .convert_source(src_w, src_h, &data)
            .unwrap_or_else(|e| fail(format!("converting frame {i}: {e}")));
        if let Err(e) = encoder.push_at(&frame, i as f64 * FRAME_MS) {
            fail(format!("encoding frame {i}: {e}"));
        }
    }
    if let Some(stats) = encoder.stats() {
        println!("Encoded: {stats}");
    }
    let container = encoder
        .stop(None)
        .unwrap_or_else(|e| fail(format!("finishing container: {e}")));
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
    save(&container, out);
}

fn run_convert(config_path: &Path, input: &Path, width: usize, height: usize, out: &Path) {
    let config = load_config(config_path);
    let assembler = FrameAssembler::new(config.conversion)
        .unwrap_or_else(|e| fail(format!("invalid config: {e}")));
    let data = fs::read(input).unwrap_or_else(|e| fail(format!("reading {}: {e}", input.display())));
    let frame = assembler
        .convert_source(width, height, &data)
        .unwrap_or_else(|e| fail(format!("converting image: {e}")));
    println!("Grid: {}x{}", frame.width(), frame.height());
    save(&Container::still(frame), out);
}

fn run_inspect(path: &Path) {
    let container =
        Container::open(path).unwrap_or_else(|e| fail(format!("loading {}: {e}", path.display())));

    println!("{}", path.display());
    println!("  Version: {}", container.version());
    println!("  Records: {}", container.len());
    println!(
        "  Keyframes: {}, deltas: {}",
        container.keyframe_count(),
        container.delta_count()
    );
    println!("  Duration: {:.0} ms", container.duration());
    if let Some(date) = &container.meta.date {
        println!("  Date: {date}");
    }

    let patches: usize = container
        .frames
        .iter()
        .filter_map(|r| match r {
            FrameRecord::Delta(d) => Some(d.patch_count()),
            _ => None,
        })
        .sum();
    if container.delta_count() > 0 {
        println!(
            "  Mean patches per delta: {:.1}",
            patches as f64 / container.delta_count() as f64
        );
    }

    let mut decoder = TemporalDecoder::new();
    if let Err(e) = decoder.load(container) {
        fail(e);
    }
    if let Some(frame) = decoder.seek(0.0) {
        println!(
            "  First frame: {}x{}, {:?}, {:?}, {}-bit, {} symbols",
            frame.width(),
            frame.height(),
            frame.mode(),
            frame.color_mode(),
            frame.color_depth().bits(),
            frame.charset().len()
        );
    }
}

/// Frame as ANSI truecolor text.
fn render_ansi(frame: &Frame, phase: f32) -> String {
    let mut out = String::with_capacity(frame.cell_count() * 20);
    out.push_str("\x1b[H");
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let rgb = match frame.color_mode() {
                ColorMode::Color => frame
                    .color_at(x, y)
                    .and_then(|code| unpack_rgb(code, frame.color_depth())),
                ColorMode::Rainbow => Some(rainbow_rgb(x, y, frame.width(), frame.height(), phase)),
                ColorMode::Mono => None,
            };
            match rgb {
                Some([r, g, b]) => {
                    let _ = write!(out, "\x1b[38;2;{r};{g};{b}m{}", frame.char_at(x, y));
                }
                None => {
                    let _ = write!(out, "\x1b[39m{}", frame.char_at(x, y));
                }
            }
        }
        out.push_str("\x1b[0m\n");
    }
    out
}

fn run_play(path: &Path, seconds: f64) {
    let mut decoder = TemporalDecoder::new();
    let container =
        Container::open(path).unwrap_or_else(|e| fail(format!("loading {}: {e}", path.display())));
    if let Err(e) = decoder.load(container) {
        fail(e);
    }

    let clock = SystemClock::new();
    let Some(token) = decoder.play(clock.now_ms()) else {
        return;
    };
    print!("\x1b[2J");
    let result = play_to(&mut decoder, token, &clock, &mut std::io::stdout(), seconds * 1000.0);
    if let Err(e) = result {
        log::warn!("stopping playback: {e}");
        decoder.stop();
        return;
    }
    println!("\x1b[0m");
}

/// Tick `decoder` until it finishes or `limit_ms` passes, drawing frames to `out`.
///
/// Stops at the first failed write.
fn play_to<C: Clock, W: std::io::Write>(
    decoder: &mut TemporalDecoder,
    token: PlaybackToken,
    clock: &C,
    out: &mut W,
    limit_ms: f64,
) -> std::io::Result<()> {
    let mut write_error: Option<std::io::Error> = None;
    loop {
        let now = clock.now_ms();
        let phase = (now / 4000.0) as f32;
        let mut sink = |frame: &Frame| {
            if write_error.is_some() {
                return;
            }
            if let Err(e) = out
                .write_all(render_ansi(frame, phase).as_bytes())
                .and_then(|()| out.flush())
            {
                write_error = Some(e);
            }
        };
        let outcome = decoder.tick(token, now, &mut sink);
        if let Some(e) = write_error {
            return Err(e);
        }
        if !outcome.should_continue() || now >= limit_ms {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(FRAME_MS as u64));
    }
}

fn print_example_config() {
    let config = PipelineConfig::default();
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(e),
    }
}
