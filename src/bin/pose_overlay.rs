use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pose_overlay::camera::OpenCvCamera;
use pose_overlay::config::Config;
use pose_overlay::pose::PoseDetector;
use pose_overlay::render::MinifbSurface;
use pose_overlay::scheduler::DetectionLoop;

const CONFIG_PATH: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load_or_default(CONFIG_PATH);

    println!("=== Pose Overlay ({}) ===", env!("GIT_VERSION"));
    println!("Press ESC to exit");

    let camera = OpenCvCamera::open(&config.camera).context("failed to open camera")?;
    let (width, height) = camera.resolution();
    info!("camera resolution: {}x{}", width, height);

    info!("loading model from {}", config.model.path);
    let detector = PoseDetector::from_config(&config.model)
        .with_context(|| format!("failed to load {}", config.model.path))?;

    let surface = MinifbSurface::new("Pose Overlay", config.window.width, config.window.height)?;

    let mut detection = DetectionLoop::from_config(camera, detector, surface, &config);

    // Ctrl+C で停止
    let stop = detection.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            stop.stop();
        }
    });

    let mut refresh = tokio::time::interval(Duration::from_secs_f64(1.0 / config.app.target_fps as f64));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    match detection.run(&mut refresh).await {
        Ok(frames) => info!("rendered {} frames", frames),
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    }

    println!("Shutting down...");
    Ok(())
}
