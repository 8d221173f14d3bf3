//! Headless VAV host
//!
//! Brings the engine up without a GUI: picks a frame source, loads an
//! optional preset, starts the threads, and drives the renderer at 30 fps
//! until the user presses Enter.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use vav_engine::{Engine, EngineConfig, EngineEvent, load_preset};
use vav_vision::{FrameSource, ImageSequenceSource, TestPatternSource};

#[derive(Parser, Debug)]
#[command(name = "vav", about = "Camera-driven audiovisual instrument")]
struct Args {
    /// Camera device id; -1 plays an image sequence from --media instead
    #[arg(long, default_value_t = 0)]
    camera: i32,

    /// Directory of stills for --camera -1
    #[arg(long)]
    media: Option<PathBuf>,

    /// Output audio device name (default device when omitted)
    #[arg(long)]
    audio_device: Option<String>,

    /// Preset file to load at startup
    #[arg(long)]
    preset: Option<PathBuf>,

    /// Run without a window; rendering switches to the null backend
    #[arg(long)]
    no_gui: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let source: Box<dyn FrameSource> = if args.camera < 0 {
        let dir = args
            .media
            .as_ref()
            .context("--camera -1 requires --media DIR")?;
        Box::new(ImageSequenceSource::open(dir)?)
    } else {
        // Live capture is provided by the windowed host; headless runs use
        // the deterministic pattern so the full CV path stays exercised.
        log::info!(
            "camera {} requested; using synthetic test pattern in headless mode",
            args.camera
        );
        Box::new(TestPatternSource::new(640, 480))
    };

    let config = EngineConfig {
        output_device: args.audio_device.clone(),
        headless_render: args.no_gui,
        ..Default::default()
    };

    let mut engine = Engine::new(config, Some(source))?;
    if let Some(path) = &args.preset {
        load_preset(path, engine.store())
            .with_context(|| format!("loading preset {}", path.display()))?;
    }

    engine.start()?;
    println!("vav running; press Enter to stop");

    // Stop signal from stdin so the render loop below stays in charge.
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = stop_tx.send(());
    });

    let frame_period = Duration::from_millis(33);
    loop {
        let frame_start = Instant::now();

        if stop_rx.try_recv().is_ok() {
            break;
        }
        for event in engine.events().try_iter() {
            match event {
                EngineEvent::CameraUnavailable(why) => {
                    log::warn!("camera unavailable: {why} (CVs frozen, audio unaffected)");
                }
                EngineEvent::SourceSwitched(name) => log::info!("source: {name}"),
                EngineEvent::Error(e) => log::error!("{e}"),
            }
        }

        engine.render_frame();

        let elapsed = frame_start.elapsed();
        if elapsed < frame_period {
            std::thread::sleep(frame_period - elapsed);
        }
    }

    engine.stop(true);
    println!("stopped");
    Ok(())
}
