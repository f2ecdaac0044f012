//! TouchLink demo host
//!
//! Drives the orchestrator the way a tracking host would: initialize once,
//! update at the headset refresh rate, shut down. Runs against the simulated
//! runtime and tool, scripting a swaying headset and one tracked object, then
//! prints the final joint snapshot as RON.
//!
//! Usage: `touchlink_host [config.toml|config.ron] [--frames N] [--keep-alive]`

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

use touchlink::backend::simulated::SimulatedBackend;
use touchlink::backend::{ConnectedDevices, TrackingState};
use touchlink::config::ConfigError;
use touchlink::foundation::logging;
use touchlink::foundation::math::{quat_xyzw, Pose, PoseState, Vec3};
use touchlink::foundation::time::FrameTimer;
use touchlink::prelude::*;
use touchlink::watchdog::{FixedLocator, ScriptedController};

const REFRESH_HZ: u32 = 90;
const DEFAULT_FRAMES: u64 = 270;

#[derive(Error, Debug)]
enum HostError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("bad argument: {0}")]
    Argument(String),

    #[error("initialization failed: {0}")]
    Init(String),

    #[error("snapshot serialization: {0}")]
    Snapshot(#[from] ron::Error),
}

struct Args {
    config: PathBuf,
    frames: u64,
    keep_alive: bool,
}

impl Args {
    fn parse() -> Result<Self, HostError> {
        let mut args = Self {
            config: PathBuf::from("touchlink.toml"),
            frames: DEFAULT_FRAMES,
            keep_alive: false,
        };

        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| HostError::Argument("--frames needs a value".to_string()))?;
                    args.frames = value
                        .parse()
                        .map_err(|_| HostError::Argument(format!("invalid frame count '{value}'")))?;
                }
                "--keep-alive" => args.keep_alive = true,
                other if other.starts_with("--") => {
                    return Err(HostError::Argument(format!("unknown flag '{other}'")));
                }
                path => args.config = PathBuf::from(path),
            }
        }
        Ok(args)
    }
}

fn load_config(args: &Args) -> Result<TouchLinkConfig, HostError> {
    let mut config = TouchLinkConfig::load_or_default(&args.config)?.sanitized();
    if let Err(err) = config.validate() {
        log::warn!("Invalid configuration ({err}), using defaults");
        config = TouchLinkConfig::default();
    }
    if args.keep_alive {
        config.tracking.keep_alive = true;
    }
    Ok(config)
}

/// Headset swaying on a circle, object spinning slowly in front of it
fn script_poses(backend: &SimulatedBackend, frame: u64) {
    let t = frame as f32 / REFRESH_HZ as f32;
    let phase = t * TAU * 0.25;

    let head = Pose::new(
        Vec3::new(0.1 * phase.cos(), 1.7, 0.1 * phase.sin()),
        quat_xyzw(0.0, 0.0, 0.0, 1.0),
    );
    let hand = |side: f32| PoseState::at_rest(Pose::from_position(Vec3::new(0.25 * side, 1.2, -0.3)));
    backend.set_tracking_state(TrackingState {
        head_pose: PoseState {
            linear_velocity: Vec3::new(-0.1 * phase.sin(), 0.0, 0.1 * phase.cos()) * TAU * 0.25,
            ..PoseState::at_rest(head)
        },
        hand_poses: [hand(-1.0), hand(1.0)],
    });

    let half = phase * 0.5;
    backend.set_object_pose(
        0,
        PoseState::at_rest(Pose::new(
            Vec3::new(0.0, 1.0, -1.0),
            quat_xyzw(0.0, half.sin(), 0.0, half.cos()),
        )),
    );
}

fn run(args: &Args) -> Result<i32, HostError> {
    let config = load_config(args)?;
    let frames = args.frames;

    let backend = SimulatedBackend::new();
    backend.set_connected(ConnectedDevices::TOUCH | ConnectedDevices::OBJECT0);
    let tool = ScriptedController::new();

    let mut tracking = TrackingOrchestrator::with_tool(
        config,
        Box::new(backend.clone()),
        Arc::new(tool.clone()),
        Box::new(FixedLocator::new("simulated-odt")),
    );

    let errors = Arc::new(AtomicUsize::new(0));
    {
        let errors = Arc::clone(&errors);
        tracking.log_channel().subscribe(move |record| {
            if record.severity == Severity::Error {
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    let status = tracking.initialize();
    log::info!("Initialize: {}", StatusCode::from_code(status));
    if status != STATUS_SUCCESS {
        return Err(HostError::Init(StatusCode::from_code(status).describe()));
    }

    let mut timer = FrameTimer::new(REFRESH_HZ);
    for frame in 0..frames {
        script_poses(&backend, frame);
        tracking.update();
        timer.end_frame();
    }
    log::info!(
        "{} frames at {:.1} fps, watchdog {:?}, {} pings",
        tracking.frame_count(),
        timer.average_fps(),
        tracking.watchdog_state(),
        tool.ping_count()
    );

    let snapshot = tracking.tracked_joints();
    let pretty = ron::ser::PrettyConfig::new().depth_limit(4);
    println!("{}", ron::ser::to_string_pretty(&snapshot, pretty)?);

    let result = tracking.shutdown();
    log::info!(
        "Shutdown returned {result}; {} error records",
        errors.load(Ordering::Relaxed)
    );
    Ok(result)
}

fn main() {
    logging::init_with_level("info");
    log::info!("Starting TouchLink demo host");

    let code = match Args::parse().and_then(|args| run(&args)) {
        Ok(0) => 0,
        Ok(result) => {
            log::error!("Shutdown reported {result}");
            1
        }
        Err(err) => {
            log::error!("{err}");
            1
        }
    };
    std::process::exit(code);
}
