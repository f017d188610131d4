use anyhow::{anyhow, bail, Context};
use snapcam::backend::SimulatedBackend;
use snapcam::config::SnapcamConfig;
use snapcam::testing::SyntheticFrameSpec;
use snapcam::types::{CaptureRequest, FlashMode, OutputMode};
use snapcam::{frame_channel, DeviceCatalog, SessionController};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const USAGE: &str =
    "Usage: snapcam-cli <devices|prepare|capture|switch|stream|config> [--config <path>] [--json]";
const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Flags shared by every command.
struct CommonArgs {
    config_path: Option<PathBuf>,
    json: bool,
}

impl CommonArgs {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut config_path = None;
        let mut i = 2;
        while i < args.len() {
            if args[i] == "--config" {
                i += 1;
                let path = args.get(i).ok_or_else(|| anyhow!("--config needs a path"))?;
                config_path = Some(PathBuf::from(path));
            }
            i += 1;
        }
        Ok(Self {
            config_path,
            json: args.contains(&"--json".to_string()),
        })
    }

    fn load_config(&self) -> anyhow::Result<SnapcamConfig> {
        SnapcamConfig::load_layered(self.config_path.as_deref()).context("loading configuration")
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    snapcam::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }
    let common = CommonArgs::parse(&args)?;

    let command = &args[1];
    match command.as_str() {
        "devices" => cmd_devices(&common),
        "prepare" => cmd_prepare(&args, &common).await,
        "capture" => cmd_capture(&args, &common).await,
        "switch" => cmd_switch(&common).await,
        "stream" => cmd_stream(&args, &common).await,
        "config" => cmd_config(&common),
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

async fn start_controller(
    config: SnapcamConfig,
) -> anyhow::Result<(SessionController, Arc<SimulatedBackend>)> {
    let backend = Arc::new(SimulatedBackend::front_and_rear());
    let controller = SessionController::new(backend.clone(), config)?;
    controller.prepare_async().await.context("preparing camera session")?;
    Ok((controller, backend))
}

fn cmd_devices(common: &CommonArgs) -> anyhow::Result<()> {
    let backend = SimulatedBackend::front_and_rear();
    let devices = backend.discover(
        &[snapcam::types::DeviceType::BuiltInWideAngle],
        snapcam::types::DevicePosition::Unspecified,
    );

    if common.json {
        let listing: Vec<serde_json::Value> = devices
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.unique_id(),
                    "name": d.localized_name(),
                    "position": d.position(),
                    "device_type": d.device_type(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string(&listing)?);
    } else {
        for d in devices {
            println!("{}: {} ({:?})", d.unique_id(), d.localized_name(), d.position());
        }
    }
    Ok(())
}

async fn cmd_prepare(args: &[String], common: &CommonArgs) -> anyhow::Result<()> {
    let mut config = common.load_config()?;
    if let Some(mode) = flag_value(args, "--mode") {
        config.session.output_mode = match mode {
            "photo" => OutputMode::Photo,
            "stream" => OutputMode::FrameStream,
            other => bail!("unknown mode '{}', expected photo or stream", other),
        };
    }

    let (controller, _backend) = start_controller(config).await?;
    let stats = controller.stats();
    if common.json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!(
            "Session {:?} is {} on {:?} camera",
            controller.session_id(),
            stats.state.as_str(),
            stats.current_position
        );
    }
    controller.teardown();
    Ok(())
}

async fn cmd_capture(args: &[String], common: &CommonArgs) -> anyhow::Result<()> {
    let config = common.load_config()?;
    let count: u32 = flag_value(args, "--count")
        .map(str::parse::<u32>)
        .transpose()?
        .unwrap_or(1);
    let flash = if args.contains(&"--flash".to_string()) {
        FlashMode::On
    } else {
        config.session.default_flash
    };
    let stream_mode = config.session.output_mode == OutputMode::FrameStream;

    let (controller, backend) = start_controller(config).await?;

    // Frame stream stills resolve with the next frame, so keep frames coming
    let pumped = if stream_mode {
        let session = backend
            .last_session()
            .ok_or_else(|| anyhow!("simulated backend created no session"))?;
        session.start_frame_pump(None, FRAME_INTERVAL, SyntheticFrameSpec::default())?;
        Some(session)
    } else {
        None
    };

    let outcome = capture_stills(&controller, count, flash, common.json).await;
    if let Some(session) = pumped {
        session.stop_frame_pump();
    }
    controller.teardown();
    outcome
}

async fn capture_stills(
    controller: &SessionController,
    count: u32,
    flash: FlashMode,
    json: bool,
) -> anyhow::Result<()> {
    for _ in 0..count {
        let capture = controller.capture_image_async(CaptureRequest::with_flash(flash));
        let image = tokio::time::timeout(CAPTURE_TIMEOUT, capture)
            .await
            .map_err(|_| anyhow!("capture did not finish within {:?}", CAPTURE_TIMEOUT))??;
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "ticket": image.ticket,
                    "width": image.width(),
                    "height": image.height(),
                    "position": image.position,
                    "captured_at": image.captured_at,
                })
            );
        } else {
            println!(
                "Captured {}x{} from {} camera (flash {:?})",
                image.width(),
                image.height(),
                image.position,
                flash
            );
        }
    }
    Ok(())
}

async fn cmd_switch(common: &CommonArgs) -> anyhow::Result<()> {
    let config = common.load_config()?;
    let (controller, _backend) = start_controller(config).await?;

    let before = controller.current_camera_position();
    let after = controller.switch_cameras()?;
    if common.json {
        println!("{}", serde_json::json!({ "from": before, "to": after }));
    } else {
        println!("Switched from {:?} to {}", before, after);
    }
    controller.teardown();
    Ok(())
}

async fn cmd_stream(args: &[String], common: &CommonArgs) -> anyhow::Result<()> {
    let mut config = common.load_config()?;
    config.session.output_mode = OutputMode::FrameStream;
    let frames: Option<u64> = flag_value(args, "--frames")
        .map(str::parse::<u64>)
        .transpose()?;

    let (controller, backend) = start_controller(config).await?;
    let session = backend
        .last_session()
        .ok_or_else(|| anyhow!("simulated backend created no session"))?;

    let (observer, mut receiver) = frame_channel();
    controller.set_frame_observer(&observer);

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    let stopper = session.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        stopper.stop_frame_pump();
    })?;

    let pump = session.start_frame_pump(frames, FRAME_INTERVAL, SyntheticFrameSpec::default())?;

    let mut received = 0u64;
    while frames.map_or(true, |n| received < n) {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let next = tokio::time::timeout(Duration::from_secs(1), receiver.recv()).await;
        let Ok(Some(image)) = next else {
            if pump.is_finished() {
                break;
            }
            continue;
        };
        received += 1;
        if common.json {
            println!(
                "{}",
                serde_json::json!({
                    "frame": received,
                    "width": image.width(),
                    "height": image.height(),
                    "position": image.position,
                })
            );
        } else {
            println!(
                "Frame {}: {}x{} ({})",
                received,
                image.width(),
                image.height(),
                image.position
            );
        }
    }

    session.stop_frame_pump();
    let stats = controller.stats();
    log::info!(
        "Stream finished: {} received, {} dropped",
        received,
        stats.frames_dropped
    );
    controller.teardown();
    Ok(())
}

fn cmd_config(common: &CommonArgs) -> anyhow::Result<()> {
    let config = common.load_config()?;
    if common.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}
